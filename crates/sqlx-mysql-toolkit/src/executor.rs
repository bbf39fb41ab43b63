use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::Connection;
use sqlx::mysql::MySqlConnection;
use tracing::{debug, trace, warn};

use crate::command::{Command, Params};
use crate::cursor::RowCursor;
use crate::decode::first_column;
use crate::endpoint::{ConnectionString, ConnectionStringFactory, Scope};
use crate::{Error, Result};

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The AUTO_INCREMENT value generated by the statement, 0 if none.
   pub last_insert_id: u64,
}

struct OpenConnection {
   conn: MySqlConnection,
   scope: Scope,
}

/// Runs commands over a single, lazily opened connection.
///
/// The connection is either closed or open against one [`Scope`]. Asking for
/// a different scope closes and reopens it. Every `execute_*` call closes the
/// connection when it finishes, successfully or not; a reader keeps it until
/// the returned cursor is released.
pub struct CommandExecutor {
   endpoints: Arc<dyn ConnectionStringFactory>,
   local_socket: Option<PathBuf>,
   connect_timeout: Option<Duration>,
   connection: Option<OpenConnection>,
}

impl CommandExecutor {
   pub fn new(endpoints: impl ConnectionStringFactory + 'static) -> Self {
      Self {
         endpoints: Arc::new(endpoints),
         local_socket: None,
         connect_timeout: None,
         connection: None,
      }
   }

   /// Socket used for local-transport connection strings on Unix
   pub fn with_local_socket(mut self, path: impl Into<PathBuf>) -> Self {
      self.local_socket = Some(path.into());
      self
   }

   /// Upper bound on a single connection attempt
   pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
      self.connect_timeout = Some(limit);
      self
   }

   pub fn local_socket(&self) -> Option<&Path> {
      self.local_socket.as_deref()
   }

   pub fn is_open(&self) -> bool {
      self.connection.is_some()
   }

   /// Scope of the open connection, `None` when closed
   pub fn open_scope(&self) -> Option<Scope> {
      self.connection.as_ref().map(|open| open.scope)
   }

   /// Ensure a connection is open against `scope` and return it.
   ///
   /// An already open connection with the same scope is reused.
   pub async fn open(&mut self, scope: Scope) -> Result<&mut MySqlConnection> {
      let conn = self.acquire(scope).await?;
      Ok(&mut self.connection.insert(OpenConnection { conn, scope }).conn)
   }

   /// Close the connection if open. Closing a closed executor is a no-op.
   pub async fn close(&mut self) -> Result<()> {
      match self.connection.take() {
         Some(open) => {
            trace!(scope = ?open.scope, "Closing connection");
            open.conn.close().await.map_err(Error::from)
         }
         None => Ok(()),
      }
   }

   /// Run a statement against the database scope
   pub async fn execute_non_query(
      &mut self,
      query: &str,
      params: &Params,
   ) -> Result<WriteQueryResult> {
      self.execute_non_query_scoped(query, Scope::Database, params).await
   }

   /// Run a statement against an explicit scope
   pub async fn execute_non_query_scoped(
      &mut self,
      query: &str,
      scope: Scope,
      params: &Params,
   ) -> Result<WriteQueryResult> {
      let command = Command::new(query, params)?;

      let conn = self
         .open(scope)
         .await
         .inspect_err(|e| warn!(error = %e, "Could not open connection for non query"))?;
      let result = command.query().execute(&mut *conn).await;
      self.finish().await;

      match result {
         Ok(done) => Ok(WriteQueryResult {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_id(),
         }),
         Err(e) => {
            warn!(error = %e, "Could not execute non query");
            Err(e.into())
         }
      }
   }

   /// First column of the first row, `None` when the query yields no rows
   pub async fn execute_scalar(
      &mut self,
      query: &str,
      params: &Params,
   ) -> Result<Option<JsonValue>> {
      let command = Command::new(query, params)?;

      let conn = self
         .open(Scope::Database)
         .await
         .inspect_err(|e| warn!(error = %e, "Could not open connection for scalar"))?;
      let result = command.query().fetch_optional(&mut *conn).await;
      self.finish().await;

      match result {
         Ok(Some(row)) => first_column(&row),
         Ok(None) => Ok(None),
         Err(e) => {
            warn!(error = %e, "Could not execute scalar");
            Err(e.into())
         }
      }
   }

   /// Run a query against the database scope and stream its rows.
   ///
   /// The connection moves into the returned cursor. The executor is closed
   /// afterwards and stays borrowed until the cursor goes away.
   pub async fn execute_reader(&mut self, query: &str, params: &Params) -> Result<RowCursor<'_>> {
      let command = Command::new(query, params)?;
      let conn = self
         .acquire(Scope::Database)
         .await
         .inspect_err(|e| warn!(error = %e, "Could not open connection for reader"))?;

      RowCursor::open(conn, command)
         .await
         .inspect_err(|e| warn!(error = %e, "Could not execute reader"))
   }

   /// Take the open connection if it matches `scope`, otherwise connect
   async fn acquire(&mut self, scope: Scope) -> Result<MySqlConnection> {
      match self.connection.take() {
         Some(open) if open.scope == scope => {
            trace!(?scope, "Reusing open connection");
            Ok(open.conn)
         }
         Some(open) => {
            debug!(from = ?open.scope, to = ?scope, "Scope changed, reconnecting");
            if let Err(e) = open.conn.close().await {
               debug!(error = %e, "Could not close previous connection");
            }
            self.connect(scope).await
         }
         None => self.connect(scope).await,
      }
   }

   async fn connect(&self, scope: Scope) -> Result<MySqlConnection> {
      let descriptor = self.endpoints.for_scope(scope);
      let options =
         ConnectionString::parse(&descriptor)?.connect_options(self.local_socket.as_deref())?;

      trace!(?scope, "Opening connection");
      let connecting = MySqlConnection::connect_with(&options);

      let result = match self.connect_timeout {
         Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| Error::ConnectTimedOut(limit))?,
         None => connecting.await,
      };

      result.map_err(|e| {
         debug!(?scope, error = %e, "Could not open connection");
         Error::from(e)
      })
   }

   /// Close after a command, keeping the command's own outcome
   async fn finish(&mut self) {
      if let Err(e) = self.close().await {
         debug!(error = %e, "Could not close connection");
      }
   }
}

impl std::fmt::Debug for CommandExecutor {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("CommandExecutor")
         .field("local_socket", &self.local_socket)
         .field("connect_timeout", &self.connect_timeout)
         .field("open_scope", &self.open_scope())
         .finish()
   }
}
