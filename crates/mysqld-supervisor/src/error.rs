//! Error types for mysqld-supervisor

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop the server from being brought up.
///
/// Only fatal conditions are represented here. Failures while creating or
/// removing directories, or while killing processes, are best-effort and are
/// reported through [`CleanupReport`](crate::CleanupReport) instead.
#[derive(Error, Debug)]
pub enum Error {
   /// The server executable or message catalog could not be written to the
   /// binary directory. Nothing downstream can succeed without them.
   #[error("could not materialize {}: {source}", path.display())]
   Materialize {
      path: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// The binary source could not produce the requested payload
   #[error("binary source unavailable: {0}")]
   SourceUnavailable(#[source] std::io::Error),

   /// The operating system rejected the spawn of the server process
   #[error("could not start server process {}: {source}", executable.display())]
   Launch {
      executable: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// IO error while inspecting the server process
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::Materialize { .. } => "MATERIALIZE_FAILED",
         Error::SourceUnavailable(_) => "BINARY_SOURCE_UNAVAILABLE",
         Error::Launch { .. } => "LAUNCH_FAILED",
         Error::Io(_) => "IO_ERROR",
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
   use super::*;
   use std::io::ErrorKind;

   #[test]
   fn test_launch_error_mentions_executable() {
      let err = Error::Launch {
         executable: PathBuf::from("/tmp/tempServer/mysqld"),
         source: std::io::Error::new(ErrorKind::PermissionDenied, "denied"),
      };
      assert_eq!(err.error_code(), "LAUNCH_FAILED");
      assert!(err.to_string().contains("tempServer/mysqld"));
      assert!(err.to_string().contains("denied"));
   }

   #[test]
   fn test_materialize_error_keeps_source() {
      let err = Error::Materialize {
         path: PathBuf::from("errmsg.sys"),
         source: std::io::Error::new(ErrorKind::StorageFull, "disk full"),
      };
      assert_eq!(err.error_code(), "MATERIALIZE_FAILED");
      let source = std::error::Error::source(&err).expect("source should be attached");
      assert_eq!(source.to_string(), "disk full");
   }
}
