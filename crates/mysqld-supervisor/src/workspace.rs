//! Scratch directory layout for a disposable server instance

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::binaries::{MESSAGE_CATALOG, SERVER_EXECUTABLE};
use crate::cleanup::CleanupReport;

/// Directory under the base directory holding binaries and data
pub const SERVER_DIR: &str = "tempServer";

/// Data root directory name under [`SERVER_DIR`]
pub const DATA_DIR: &str = "data";

/// File name of the local socket the server listens on (Unix)
pub const SOCKET_FILE: &str = "mysqld.sock";

/// The three directories a server instance lives in.
///
/// ```text
/// <base_dir>/tempServer               binaries + message catalog
/// <base_dir>/tempServer/data          data root
/// <base_dir>/tempServer/data/<uuid>   per-instance data directory
/// ```
///
/// The per-instance directory is named after a fresh UUID on every
/// construction so leftovers from a crashed run never collide with it.
#[derive(Debug, Clone)]
pub struct Workspace {
   bin_dir: PathBuf,
   data_root: PathBuf,
   data_dir: PathBuf,
   instance_id: Uuid,
}

impl Workspace {
   /// Lay out a workspace under `base_dir` with a freshly generated instance id.
   pub fn new(base_dir: impl AsRef<Path>) -> Self {
      Self::with_instance_id(base_dir, Uuid::new_v4())
   }

   pub fn with_instance_id(base_dir: impl AsRef<Path>, instance_id: Uuid) -> Self {
      let bin_dir = base_dir.as_ref().join(SERVER_DIR);
      let data_root = bin_dir.join(DATA_DIR);
      let data_dir = data_root.join(instance_id.to_string());

      Self {
         bin_dir,
         data_root,
         data_dir,
         instance_id,
      }
   }

   pub fn bin_dir(&self) -> &Path {
      &self.bin_dir
   }

   pub fn data_root(&self) -> &Path {
      &self.data_root
   }

   pub fn data_dir(&self) -> &Path {
      &self.data_dir
   }

   pub fn instance_id(&self) -> Uuid {
      self.instance_id
   }

   pub fn server_executable(&self) -> PathBuf {
      self.bin_dir.join(SERVER_EXECUTABLE)
   }

   pub fn message_catalog(&self) -> PathBuf {
      self.bin_dir.join(MESSAGE_CATALOG)
   }

   /// Path of the Unix socket the server is told to listen on.
   ///
   /// Kept in the binary directory rather than the data directory so the
   /// path stays under the platform limit for socket addresses.
   pub fn local_socket(&self) -> PathBuf {
      self.bin_dir.join(SOCKET_FILE)
   }

   /// Outermost first.
   pub fn directories(&self) -> [&Path; 3] {
      [&self.bin_dir, &self.data_root, &self.data_dir]
   }

   /// Delete and recreate every directory, outermost first.
   ///
   /// Best-effort: a directory that cannot be deleted or created is recorded
   /// as a warning and provisioning moves on to the next one.
   pub fn provision(&self) -> CleanupReport {
      let mut report = CleanupReport::new();

      for dir in self.directories() {
         if dir.exists() {
            trace!("Removing stale directory {}", dir.display());
            if let Err(e) = fs::remove_dir_all(dir)
               && e.kind() != ErrorKind::NotFound
            {
               report.remove_directory(dir, e);
            }
         }

         if let Err(e) = fs::create_dir_all(dir) {
            report.create_directory(dir, e);
         }
      }

      debug!(
         instance = %self.instance_id,
         clean = report.is_clean(),
         "Provisioned workspace under {}",
         self.bin_dir.display()
      );
      report
   }

   /// Delete every directory, innermost first. Never recreates anything.
   pub fn deprovision(&self) -> CleanupReport {
      let mut report = CleanupReport::new();

      for dir in self.directories().into_iter().rev() {
         match fs::remove_dir_all(dir) {
            Ok(()) => trace!("Removed directory {}", dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => report.remove_directory(dir, e),
         }
      }

      debug!(
         instance = %self.instance_id,
         clean = report.is_clean(),
         "Deprovisioned workspace under {}",
         self.bin_dir.display()
      );
      report
   }
}

/// Default base directory: `<cwd>/target`, so the workspace lands in
/// `target/tempServer` next to the build output of the package under test.
/// Falls back to the system temp directory when the current directory is
/// unavailable.
pub fn default_base_dir() -> PathBuf {
   match std::env::current_dir() {
      Ok(cwd) => cwd.join("target"),
      Err(_) => std::env::temp_dir(),
   }
}
