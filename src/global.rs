//! Process-wide server shared by a whole test run
//!
//! ```no_run
//! use mysql_test_server::{Params, global};
//!
//! let server = global::instance().unwrap();
//! let mut server = server.lock();
//! server.start().unwrap();
//! server
//!    .execute_non_query("CREATE TABLE t (id INT)", Params::new())
//!    .unwrap();
//! drop(server);
//!
//! global::dispose();
//! ```

use std::sync::Arc;

use mysqld_supervisor::{CleanupReport, InstalledBinaries};
use parking_lot::{Mutex, const_mutex};
use tracing::debug;

use crate::{BlockingMySqlServer, Error, Result, ServerConfig};

/// Handle to the shared server
pub type SharedServer = Arc<Mutex<BlockingMySqlServer>>;

static INSTANCE: Mutex<Option<SharedServer>> = const_mutex(None);

/// The shared server, created on first access with the default
/// configuration and an installed `mysqld` (see
/// [`InstalledBinaries::locate`]).
pub fn instance() -> Result<SharedServer> {
   instance_with(|| {
      let binaries = InstalledBinaries::locate()
         .map_err(|e| Error::Supervisor(mysqld_supervisor::Error::SourceUnavailable(e)))?;
      BlockingMySqlServer::new(ServerConfig::default(), &binaries)
   })
}

/// The shared server, created with `init` if there is none yet.
///
/// `init` runs at most once per live instance; a failed `init` leaves the
/// slot empty so a later call can try again.
pub fn instance_with<F>(init: F) -> Result<SharedServer>
where
   F: FnOnce() -> Result<BlockingMySqlServer>,
{
   let mut slot = INSTANCE.lock();
   if let Some(server) = slot.as_ref() {
      return Ok(Arc::clone(server));
   }

   debug!("Creating shared server");
   let server = Arc::new(Mutex::new(init()?));
   *slot = Some(Arc::clone(&server));
   Ok(server)
}

/// Dispose the shared server and clear the slot. Does nothing when there is
/// no shared server, so it is safe to call more than once.
///
/// Handles obtained earlier keep the disposed server alive but every call on
/// it returns [`Error::Disposed`].
pub fn dispose() -> CleanupReport {
   let Some(server) = INSTANCE.lock().take() else {
      return CleanupReport::new();
   };
   debug!("Disposing shared server");
   server.lock().dispose()
}
