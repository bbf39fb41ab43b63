//! Server executable materialization

use std::borrow::Cow;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::workspace::Workspace;
use crate::{Error, Result};

/// Process name of the server, as seen in the process table
pub const PROCESS_NAME: &str = "mysqld";

/// File name of the server executable inside the binary directory
#[cfg(windows)]
pub const SERVER_EXECUTABLE: &str = "mysqld.exe";

/// File name of the server executable inside the binary directory
#[cfg(not(windows))]
pub const SERVER_EXECUTABLE: &str = "mysqld";

/// File name of the error message catalog the server loads at startup
pub const MESSAGE_CATALOG: &str = "errmsg.sys";

/// Environment variable naming a directory that holds an installed server
pub const DIST_DIR_ENV: &str = "MYSQLD_DIST_DIR";

/// Where the server executable and its message catalog come from.
pub trait BinarySource: Send + Sync {
   /// Bytes of the server executable
   fn server_executable(&self) -> io::Result<Cow<'_, [u8]>>;

   /// Bytes of the `errmsg.sys` message catalog
   fn message_catalog(&self) -> io::Result<Cow<'_, [u8]>>;
}

/// Payloads compiled into the test binary, typically with `include_bytes!`.
///
/// ```ignore
/// use mysqld_supervisor::EmbeddedBinaries;
///
/// static BINARIES: EmbeddedBinaries = EmbeddedBinaries {
///    server: include_bytes!("../resources/mysqld"),
///    messages: include_bytes!("../resources/errmsg.sys"),
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedBinaries {
   pub server: &'static [u8],
   pub messages: &'static [u8],
}

impl BinarySource for EmbeddedBinaries {
   fn server_executable(&self) -> io::Result<Cow<'_, [u8]>> {
      Ok(Cow::Borrowed(self.server))
   }

   fn message_catalog(&self) -> io::Result<Cow<'_, [u8]>> {
      Ok(Cow::Borrowed(self.messages))
   }
}

/// Copies the server from an existing installation on disk.
#[derive(Debug, Clone)]
pub struct InstalledBinaries {
   server: PathBuf,
   messages: PathBuf,
}

impl InstalledBinaries {
   pub fn new(server: impl Into<PathBuf>, messages: impl Into<PathBuf>) -> Self {
      Self {
         server: server.into(),
         messages: messages.into(),
      }
   }

   /// Find an installed server.
   ///
   /// Looks in `$MYSQLD_DIST_DIR` first, then every `PATH` entry. The
   /// message catalog is searched next to the executable and in the usual
   /// `share/**/english` locations relative to it.
   pub fn locate() -> io::Result<Self> {
      let mut candidates: Vec<PathBuf> = Vec::new();
      if let Some(dir) = std::env::var_os(DIST_DIR_ENV) {
         candidates.push(PathBuf::from(dir));
      }
      if let Some(path) = std::env::var_os("PATH") {
         candidates.extend(std::env::split_paths(&path));
      }

      let server = candidates
         .iter()
         .map(|dir| dir.join(SERVER_EXECUTABLE))
         .find(|candidate| candidate.is_file())
         .ok_or_else(|| {
            io::Error::new(
               ErrorKind::NotFound,
               format!("{} not found in ${} or PATH", SERVER_EXECUTABLE, DIST_DIR_ENV),
            )
         })?;

      let messages = message_catalog_candidates(&server)
         .into_iter()
         .find(|candidate| candidate.is_file())
         .ok_or_else(|| {
            io::Error::new(
               ErrorKind::NotFound,
               format!("{} not found near {}", MESSAGE_CATALOG, server.display()),
            )
         })?;

      debug!(
         "Located server at {} (messages: {})",
         server.display(),
         messages.display()
      );
      Ok(Self::new(server, messages))
   }

   pub fn server_path(&self) -> &Path {
      &self.server
   }

   pub fn messages_path(&self) -> &Path {
      &self.messages
   }
}

impl BinarySource for InstalledBinaries {
   fn server_executable(&self) -> io::Result<Cow<'_, [u8]>> {
      fs::read(&self.server).map(Cow::Owned)
   }

   fn message_catalog(&self) -> io::Result<Cow<'_, [u8]>> {
      fs::read(&self.messages).map(Cow::Owned)
   }
}

fn message_catalog_candidates(server: &Path) -> Vec<PathBuf> {
   let bin_dir = server.parent().unwrap_or(Path::new("."));
   let prefix = bin_dir.parent().unwrap_or(bin_dir);

   vec![
      bin_dir.join(MESSAGE_CATALOG),
      prefix.join("share").join("english").join(MESSAGE_CATALOG),
      prefix
         .join("share")
         .join("mysql")
         .join("english")
         .join(MESSAGE_CATALOG),
      prefix
         .join("share")
         .join("mysql-8.0")
         .join("english")
         .join(MESSAGE_CATALOG),
   ]
}

/// What [`ensure_binaries`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
   /// The executable was already in place; nothing was written
   AlreadyPresent,
   /// The executable and message catalog were written from the source
   Written,
}

/// Make sure the server executable and its message catalog exist in the
/// workspace's binary directory, writing them from `source` when the
/// executable is missing.
///
/// Any failure here is fatal: without the binary nothing else can proceed.
pub fn ensure_binaries(workspace: &Workspace, source: &dyn BinarySource) -> Result<Materialized> {
   let executable = workspace.server_executable();
   if executable.is_file() {
      trace!("Server executable already present at {}", executable.display());
      return Ok(Materialized::AlreadyPresent);
   }

   let server = source.server_executable().map_err(Error::SourceUnavailable)?;
   let messages = source.message_catalog().map_err(Error::SourceUnavailable)?;

   // The executable marks a complete materialization, so it goes last
   write_file(&workspace.message_catalog(), &messages)?;
   write_file(&executable, &server)?;
   make_executable(&executable)?;

   debug!(
      bytes = server.len(),
      "Materialized server executable at {}",
      executable.display()
   );
   Ok(Materialized::Written)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
   fs::write(path, bytes).map_err(|source| Error::Materialize {
      path: path.to_path_buf(),
      source,
   })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
   use std::os::unix::fs::PermissionsExt;

   fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
      Error::Materialize {
         path: path.to_path_buf(),
         source,
      }
   })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
   Ok(())
}

#[cfg(test)]
mod tests {
   use super::*;
   use tempfile::TempDir;

   const FAKE: EmbeddedBinaries = EmbeddedBinaries {
      server: b"fake server",
      messages: b"fake messages",
   };

   struct Unavailable;

   impl BinarySource for Unavailable {
      fn server_executable(&self) -> io::Result<Cow<'_, [u8]>> {
         Err(io::Error::new(ErrorKind::NotFound, "no payload"))
      }

      fn message_catalog(&self) -> io::Result<Cow<'_, [u8]>> {
         Err(io::Error::new(ErrorKind::NotFound, "no payload"))
      }
   }

   fn provisioned() -> (Workspace, TempDir) {
      let temp = TempDir::new().unwrap();
      let ws = Workspace::new(temp.path());
      assert!(ws.provision().is_clean());
      (ws, temp)
   }

   #[test]
   fn test_writes_executable_and_catalog() {
      let (ws, _temp) = provisioned();

      let outcome = ensure_binaries(&ws, &FAKE).unwrap();

      assert_eq!(outcome, Materialized::Written);
      assert_eq!(fs::read(ws.server_executable()).unwrap(), b"fake server");
      assert_eq!(fs::read(ws.message_catalog()).unwrap(), b"fake messages");
   }

   #[cfg(unix)]
   #[test]
   fn test_executable_bit_is_set() {
      use std::os::unix::fs::PermissionsExt;

      let (ws, _temp) = provisioned();
      ensure_binaries(&ws, &FAKE).unwrap();

      let mode = fs::metadata(ws.server_executable())
         .unwrap()
         .permissions()
         .mode();
      assert_eq!(mode & 0o111, 0o111);
   }

   #[test]
   fn test_existing_executable_is_left_alone() {
      let (ws, _temp) = provisioned();
      fs::write(ws.server_executable(), b"already here").unwrap();

      // Even a broken source is never consulted
      let outcome = ensure_binaries(&ws, &Unavailable).unwrap();

      assert_eq!(outcome, Materialized::AlreadyPresent);
      assert_eq!(fs::read(ws.server_executable()).unwrap(), b"already here");
   }

   #[test]
   fn test_unavailable_source_is_fatal() {
      let (ws, _temp) = provisioned();

      let err = ensure_binaries(&ws, &Unavailable).unwrap_err();

      assert_eq!(err.error_code(), "BINARY_SOURCE_UNAVAILABLE");
      assert!(!ws.server_executable().exists());
   }

   #[test]
   fn test_missing_bin_dir_is_fatal() {
      let temp = TempDir::new().unwrap();
      let ws = Workspace::new(temp.path().join("not-provisioned"));

      let err = ensure_binaries(&ws, &FAKE).unwrap_err();

      assert!(matches!(err, Error::Materialize { .. }));
   }

   #[test]
   fn test_installed_binaries_copy_from_disk() {
      let dist = TempDir::new().unwrap();
      let server = dist.path().join(SERVER_EXECUTABLE);
      let messages = dist.path().join(MESSAGE_CATALOG);
      fs::write(&server, b"installed server").unwrap();
      fs::write(&messages, b"installed messages").unwrap();

      let (ws, _temp) = provisioned();
      ensure_binaries(&ws, &InstalledBinaries::new(&server, &messages)).unwrap();

      assert_eq!(fs::read(ws.server_executable()).unwrap(), b"installed server");
      assert_eq!(fs::read(ws.message_catalog()).unwrap(), b"installed messages");
   }

   #[test]
   fn test_catalog_candidates_cover_share_layouts() {
      let candidates = message_catalog_candidates(Path::new("/usr/sbin/mysqld"));
      assert!(candidates.contains(&PathBuf::from("/usr/sbin/errmsg.sys")));
      assert!(candidates.contains(&PathBuf::from("/usr/share/mysql/english/errmsg.sys")));
   }
}
