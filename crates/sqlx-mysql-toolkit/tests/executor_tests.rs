//! Executor behaviour that does not need a reachable server

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use sqlx_mysql_toolkit::{
   Command, CommandExecutor, ConnectionString, ConnectionStringFactory, Params,
   PipeConnectionStrings, Protocol, Scope,
};
use tempfile::TempDir;

/// Log output collected by a test subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
   fn contents(&self) -> String {
      String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
   }
}

impl io::Write for CapturedLogs {
   fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
   }

   fn flush(&mut self) -> io::Result<()> {
      Ok(())
   }
}

struct Refusing;

impl ConnectionStringFactory for Refusing {
   fn server(&self) -> String {
      "Server=127.0.0.1;Port=1;Protocol=tcp;".into()
   }

   fn database_named(&self, name: &str) -> String {
      format!("Server=127.0.0.1;Port=1;Database={};Protocol=tcp;", name)
   }
}

#[test]
fn factory_output_parses_back_to_the_same_endpoint() {
   let factory = PipeConnectionStrings::new("suite");

   let server = ConnectionString::parse(&factory.for_scope(Scope::Server)).unwrap();
   assert_eq!(server.host, "127.0.0.1");
   assert_eq!(server.database, None);
   assert_eq!(server.protocol, Protocol::Pipe);

   let database = ConnectionString::parse(&factory.for_scope(Scope::Database)).unwrap();
   assert_eq!(database.database.as_deref(), Some("suite"));
}

#[test]
fn insert_template_binds_in_reference_order() {
   let params: Params = [("value", json!("some value")), ("id", json!(1))].into();
   let command = Command::new(
      "INSERT INTO testTable (id, value) VALUES (@id, @value)",
      &params,
   )
   .unwrap();

   assert_eq!(command.sql(), "INSERT INTO testTable (id, value) VALUES (?, ?)");
   assert_eq!(command.values(), &[json!(1), json!("some value")]);
}

#[cfg(unix)]
#[tokio::test]
async fn missing_socket_is_a_connection_error() {
   let temp = TempDir::new().unwrap();
   let mut executor = CommandExecutor::new(PipeConnectionStrings::default())
      .with_local_socket(temp.path().join("mysqld.sock"))
      .with_connect_timeout(Duration::from_secs(2));

   let err = executor
      .execute_non_query_scoped("CREATE DATABASE IF NOT EXISTS testserver", Scope::Server, &Params::new())
      .await
      .unwrap_err();

   assert!(err.is_connection_error(), "{err:?}");
   assert!(!executor.is_open());
   assert_eq!(executor.open_scope(), None);
}

#[cfg(unix)]
#[tokio::test]
async fn reader_on_missing_socket_fails_without_a_cursor() {
   let temp = TempDir::new().unwrap();
   let mut executor = CommandExecutor::new(PipeConnectionStrings::default())
      .with_local_socket(temp.path().join("mysqld.sock"));

   let result = executor.execute_reader("SELECT 1", &Params::new()).await;

   assert!(matches!(result, Err(ref e) if e.is_connection_error()));
   drop(result);
   assert!(!executor.is_open());
}

#[tokio::test]
async fn local_transport_without_socket_fails_up_front() {
   let mut executor = CommandExecutor::new(PipeConnectionStrings::default());

   let err = executor
      .execute_non_query_scoped("SELECT 1", Scope::Server, &Params::new())
      .await
      .unwrap_err();

   assert_eq!(err.error_code(), "LOCAL_TRANSPORT_UNAVAILABLE");
   assert!(!err.is_connection_error());
   assert!(!executor.is_open());
}

#[tokio::test]
async fn failed_connect_is_logged_as_a_warning() {
   let logs = CapturedLogs::default();
   let writer = logs.clone();
   let subscriber = tracing_subscriber::fmt()
      .with_max_level(tracing::Level::WARN)
      .with_ansi(false)
      .with_writer(move || writer.clone())
      .finish();
   let _guard = tracing::subscriber::set_default(subscriber);

   let mut executor = CommandExecutor::new(Refusing);
   let err = executor.execute_scalar("SELECT 1", &Params::new()).await.unwrap_err();
   assert!(err.is_connection_error(), "{err:?}");

   let err = executor
      .execute_reader("SELECT 1", &Params::new())
      .await
      .err()
      .unwrap();
   assert!(err.is_connection_error(), "{err:?}");

   let output = logs.contents();
   assert!(output.contains("WARN"), "{output}");
   assert!(output.contains("Could not open connection for scalar"), "{output}");
   assert!(output.contains("Could not open connection for reader"), "{output}");
}
