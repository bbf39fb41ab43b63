//! Configuration for the disposable server

use std::path::PathBuf;
use std::time::Duration;

use mysqld_supervisor::default_base_dir;
use sqlx_mysql_toolkit::DEFAULT_DATABASE;

/// Configuration for a [`MySqlServer`](crate::MySqlServer)
///
/// # Examples
///
/// ```
/// use mysql_test_server::ServerConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = ServerConfig::default();
///
/// // Override just one field
/// let config = ServerConfig {
///    startup_timeout: Duration::from_secs(30),
///    ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
   /// Directory the `tempServer` workspace is created under
   ///
   /// Default: `<cwd>/target`, or the system temp directory when the
   /// current directory is unavailable
   pub base_dir: PathBuf,

   /// Scratch database created at startup and used by every query
   ///
   /// Default: `testserver`
   pub database_name: String,

   /// How long to wait for the server to accept connections
   ///
   /// Default: 10 seconds
   pub startup_timeout: Duration,

   /// Pause between readiness attempts
   ///
   /// Default: 500 milliseconds
   pub poll_interval: Duration,

   /// Upper bound on a single connection attempt
   ///
   /// Default: 5 seconds
   pub connect_timeout: Duration,

   /// Force-kill every process named `mysqld` before launch and after
   /// shutdown, to clear servers orphaned by a crashed run.
   ///
   /// Default: true
   pub sweep_stray_processes: bool,
}

impl Default for ServerConfig {
   fn default() -> Self {
      Self {
         base_dir: default_base_dir(),
         database_name: DEFAULT_DATABASE.to_string(),
         startup_timeout: Duration::from_secs(10),
         poll_interval: Duration::from_millis(500),
         connect_timeout: Duration::from_secs(5),
         sweep_stray_processes: true,
      }
   }
}
