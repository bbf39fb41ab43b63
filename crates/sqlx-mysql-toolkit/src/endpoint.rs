//! Connection strings: producing them per scope and turning them into
//! sqlx connect options

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use sqlx::ConnectOptions;
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use tracing::trace;

use crate::{Error, Result};

/// Name of the scratch database created at server startup
pub const DEFAULT_DATABASE: &str = "testserver";

/// Host the local server is reached on
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// User every connection authenticates as (grant tables are skipped)
pub const DEFAULT_USER: &str = "root";

/// Which endpoint a connection targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
   /// The server itself, no database selected. Used for administrative
   /// statements and readiness probing.
   Server,
   /// The scratch database. Used for ordinary queries.
   Database,
}

/// Produces connection strings for the two scopes.
///
/// Implementations are stateless: the same input always yields the same
/// string.
pub trait ConnectionStringFactory: Send + Sync {
   /// Server-scope endpoint (no database selected)
   fn server(&self) -> String;

   /// Endpoint for a specific database
   fn database_named(&self, name: &str) -> String;

   /// Endpoint for the default database
   fn database(&self) -> String {
      self.database_named(DEFAULT_DATABASE)
   }

   fn for_scope(&self, scope: Scope) -> String {
      match scope {
         Scope::Server => self.server(),
         Scope::Database => self.database(),
      }
   }
}

/// Local-transport connection strings:
/// `Server=127.0.0.1;Protocol=pipe;` and
/// `Server=127.0.0.1;Database=<name>;Protocol=pipe;`.
///
/// On Unix these resolve to the server's socket file. The driver has no
/// named-pipe support and a server started with `--skip-grant-tables` does
/// not listen on TCP, so on Windows they cannot be connected to and
/// [`ConnectionString::connect_options`] fails with
/// [`Error::LocalTransportUnavailable`].
#[derive(Debug, Clone)]
pub struct PipeConnectionStrings {
   host: String,
   database: String,
}

impl PipeConnectionStrings {
   pub fn new(database: impl Into<String>) -> Self {
      Self {
         host: DEFAULT_HOST.to_string(),
         database: database.into(),
      }
   }
}

impl Default for PipeConnectionStrings {
   fn default() -> Self {
      Self::new(DEFAULT_DATABASE)
   }
}

impl ConnectionStringFactory for PipeConnectionStrings {
   fn server(&self) -> String {
      format!("Server={};Protocol=pipe;", self.host)
   }

   fn database_named(&self, name: &str) -> String {
      format!("Server={};Database={};Protocol=pipe;", self.host, name)
   }

   fn database(&self) -> String {
      self.database_named(&self.database)
   }
}

/// Transport named by the `Protocol` key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
   #[default]
   Tcp,
   /// Windows named pipe, served through the local socket on Unix
   Pipe,
   Unix,
   Memory,
}

impl FromStr for Protocol {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      match s.trim().to_ascii_lowercase().as_str() {
         "tcp" | "socket" | "tcpip" => Ok(Protocol::Tcp),
         "pipe" | "namedpipe" => Ok(Protocol::Pipe),
         "unix" | "unixsocket" => Ok(Protocol::Unix),
         "memory" | "sharedmemory" => Ok(Protocol::Memory),
         other => Err(Error::InvalidConnectionString(format!(
            "unknown protocol '{}'",
            other
         ))),
      }
   }
}

impl fmt::Display for Protocol {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Protocol::Tcp => "tcp",
         Protocol::Pipe => "pipe",
         Protocol::Unix => "unix",
         Protocol::Memory => "memory",
      })
   }
}

/// A parsed `key=value;` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
   pub host: String,
   pub port: Option<u16>,
   pub database: Option<String>,
   pub protocol: Protocol,
   pub user: Option<String>,
   pub password: Option<String>,
}

impl Default for ConnectionString {
   fn default() -> Self {
      Self {
         host: DEFAULT_HOST.to_string(),
         port: None,
         database: None,
         protocol: Protocol::default(),
         user: None,
         password: None,
      }
   }
}

impl ConnectionString {
   /// Parse a MySQL Connector style connection string. Keys are
   /// case-insensitive; unknown keys are ignored.
   pub fn parse(s: &str) -> Result<Self> {
      let mut parsed = Self::default();

      for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
         let (key, value) = part.split_once('=').ok_or_else(|| {
            Error::InvalidConnectionString(format!("expected key=value, found '{}'", part))
         })?;
         let value = value.trim();

         match key.trim().to_ascii_lowercase().as_str() {
            "server" | "host" | "data source" | "datasource" | "address" | "addr" => {
               parsed.host = value.to_string();
            }
            "port" => {
               let port = value.parse().map_err(|_| {
                  Error::InvalidConnectionString(format!("invalid port '{}'", value))
               })?;
               parsed.port = Some(port);
            }
            "database" | "initial catalog" => {
               parsed.database = (!value.is_empty()).then(|| value.to_string());
            }
            "protocol" | "connection protocol" | "connectionprotocol" | "transport" => {
               parsed.protocol = value.parse()?;
            }
            "uid" | "user" | "user id" | "userid" | "username" => {
               parsed.user = Some(value.to_string());
            }
            "pwd" | "password" => {
               parsed.password = Some(value.to_string());
            }
            other => trace!(key = other, "Ignoring unsupported connection string option"),
         }
      }

      Ok(parsed)
   }

   /// Convert into sqlx connect options.
   ///
   /// Local transports (`pipe`, `unix`) need `local_socket` and a Unix host.
   /// There is no TCP fallback: the local server does not listen on TCP.
   pub fn connect_options(&self, local_socket: Option<&Path>) -> Result<MySqlConnectOptions> {
      let mut options = MySqlConnectOptions::new()
         .host(&self.host)
         .username(self.user.as_deref().unwrap_or(DEFAULT_USER))
         .log_statements(LevelFilter::Debug);

      if let Some(port) = self.port {
         options = options.port(port);
      }
      if let Some(password) = &self.password {
         options = options.password(password);
      }
      if let Some(database) = &self.database {
         options = options.database(database);
      }

      match (self.protocol, local_socket) {
         (Protocol::Tcp, _) => {}
         (Protocol::Pipe | Protocol::Unix, Some(socket)) if cfg!(unix) => {
            options = options.socket(socket).ssl_mode(MySqlSslMode::Disabled);
         }
         (protocol, _) => {
            return Err(Error::LocalTransportUnavailable(protocol.to_string()));
         }
      }

      Ok(options)
   }
}

impl fmt::Display for ConnectionString {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "Server={};", self.host)?;
      if let Some(port) = self.port {
         write!(f, "Port={};", port)?;
      }
      if let Some(database) = &self.database {
         write!(f, "Database={};", database)?;
      }
      if let Some(user) = &self.user {
         write!(f, "Uid={};", user)?;
      }
      if self.password.is_some() {
         f.write_str("Pwd=***;")?;
      }
      write!(f, "Protocol={};", self.protocol)
   }
}
