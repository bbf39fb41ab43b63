use std::time::Duration;

/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for command execution against a MySQL server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations (connection, execution, decoding).
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Opening a connection took longer than the configured limit.
   #[error("connection attempt timed out after {0:?}")]
   ConnectTimedOut(Duration),

   /// Connection string could not be parsed.
   #[error("invalid connection string: {0}")]
   InvalidConnectionString(String),

   /// Parameter name contains invalid characters.
   ///
   /// Names must match `[a-zA-Z_$][a-zA-Z0-9_$]*`, optionally prefixed with `@`.
   #[error("invalid parameter name '{name}': must match [a-zA-Z_$][a-zA-Z0-9_$]*")]
   InvalidParameterName { name: String },

   /// A parameter was supplied but no `@name` placeholder references it.
   #[error("parameter '@{name}' is not referenced by the query")]
   UnusedParameter { name: String },

   /// A local-transport connection string cannot be served: the named pipe
   /// is not supported by the driver and no Unix socket is available.
   #[error("local transport '{0}' is unavailable on this platform")]
   LocalTransportUnavailable(String),

   /// MySQL type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Generic error for operations that don't fit other categories.
   #[error("{0}")]
   Other(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// Database errors carry the server's SQLSTATE, e.g. `MYSQL_42S02`.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("MYSQL_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectTimedOut(_) => "CONNECT_TIMED_OUT".to_string(),
         Error::InvalidConnectionString(_) => "INVALID_CONNECTION_STRING".to_string(),
         Error::InvalidParameterName { .. } => "INVALID_PARAMETER_NAME".to_string(),
         Error::UnusedParameter { .. } => "UNUSED_PARAMETER".to_string(),
         Error::LocalTransportUnavailable(_) => "LOCAL_TRANSPORT_UNAVAILABLE".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::Other(_) => "ERROR".to_string(),
      }
   }

   /// `true` when the server could not be reached at all, as opposed to the
   /// server rejecting a statement.
   pub fn is_connection_error(&self) -> bool {
      match self {
         Error::ConnectTimedOut(_) => true,
         Error::Sqlx(e) => matches!(
            e,
            sqlx::Error::Io(_)
               | sqlx::Error::Tls(_)
               | sqlx::Error::Protocol(_)
               | sqlx::Error::PoolTimedOut
               | sqlx::Error::WorkerCrashed
         ),
         _ => false,
      }
   }
}

impl From<time::error::Format> for Error {
   fn from(e: time::error::Format) -> Self {
      Error::Other(format!("could not format temporal value: {}", e))
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_code_unused_parameter() {
      let err = Error::UnusedParameter { name: "id".into() };
      assert_eq!(err.error_code(), "UNUSED_PARAMETER");
      assert!(err.to_string().contains("@id"));
   }

   #[test]
   fn test_error_code_invalid_parameter_name() {
      let err = Error::InvalidParameterName {
         name: "bad;name".into(),
      };
      assert_eq!(err.error_code(), "INVALID_PARAMETER_NAME");
      assert!(err.to_string().contains("bad;name"));
   }

   #[test]
   fn test_error_code_sqlx_non_database() {
      let err = Error::Sqlx(sqlx::Error::RowNotFound);
      assert_eq!(err.error_code(), "SQLX_ERROR");
      assert!(!err.is_connection_error());
   }

   #[test]
   fn test_io_failure_is_a_connection_error() {
      let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
      assert!(Error::Sqlx(sqlx::Error::Io(io)).is_connection_error());
      assert!(Error::ConnectTimedOut(Duration::from_millis(500)).is_connection_error());
   }

   #[test]
   fn test_error_code_connect_timed_out() {
      let err = Error::ConnectTimedOut(Duration::from_secs(2));
      assert_eq!(err.error_code(), "CONNECT_TIMED_OUT");
      assert!(err.to_string().contains("2s"));
   }

   #[test]
   fn test_error_code_local_transport_unavailable() {
      let err = Error::LocalTransportUnavailable("pipe".into());
      assert_eq!(err.error_code(), "LOCAL_TRANSPORT_UNAVAILABLE");
      assert!(err.to_string().contains("'pipe'"));
      assert!(!err.is_connection_error());
   }

   #[test]
   fn test_error_code_other() {
      let err = Error::Other("something went wrong".into());
      assert_eq!(err.error_code(), "ERROR");
      assert_eq!(err.to_string(), "something went wrong");
   }
}
