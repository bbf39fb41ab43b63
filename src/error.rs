//! Error types for mysql-test-server

use std::time::Duration;

use thiserror::Error;

use crate::server::Lifecycle;

/// Errors raised by the server lifecycle and by queries against it.
///
/// Cleanup failures are not errors; they are returned as a
/// [`CleanupReport`](mysqld_supervisor::CleanupReport).
#[derive(Error, Debug)]
pub enum Error {
   /// Provisioning, materialization, or process launch failed
   #[error(transparent)]
   Supervisor(#[from] mysqld_supervisor::Error),

   /// A command against the server failed
   #[error(transparent)]
   Query(#[from] sqlx_mysql_toolkit::Error),

   /// The server did not accept connections in time. Carries the error of
   /// the last connection attempt.
   #[error("server could not be started within {waited:?} ({attempts} attempts)")]
   StartupTimeout {
      waited: Duration,
      attempts: u32,
      #[source]
      last_error: Option<Box<Error>>,
   },

   /// The server process exited while we were waiting for it to come up
   #[error("server process exited during startup: {status}")]
   ExitedDuringStartup { status: String },

   /// `start` was called in a state it cannot start from
   #[error("server cannot be started from state {0:?}")]
   CannotStart(Lifecycle),

   /// A query was issued while the server is not running
   #[error("server is not running (state: {0:?})")]
   NotRunning(Lifecycle),

   /// The server has been disposed and cannot be used again
   #[error("server has been disposed")]
   Disposed,

   /// The runtime backing the blocking API could not be created
   #[error("could not create runtime: {0}")]
   Runtime(#[source] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Supervisor(e) => e.error_code().to_string(),
         Error::Query(e) => e.error_code(),
         Error::StartupTimeout { .. } => "STARTUP_TIMEOUT".to_string(),
         Error::ExitedDuringStartup { .. } => "EXITED_DURING_STARTUP".to_string(),
         Error::CannotStart(_) => "CANNOT_START".to_string(),
         Error::NotRunning(_) => "NOT_RUNNING".to_string(),
         Error::Disposed => "DISPOSED".to_string(),
         Error::Runtime(_) => "RUNTIME_UNAVAILABLE".to_string(),
      }
   }

   /// The last connection error behind a startup timeout
   pub fn last_startup_error(&self) -> Option<&Error> {
      match self {
         Error::StartupTimeout { last_error, .. } => last_error.as_deref(),
         _ => None,
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
