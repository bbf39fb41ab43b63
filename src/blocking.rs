//! Synchronous facade over [`MySqlServer`]

use mysqld_supervisor::{BinarySource, CleanupReport};
use serde_json::Value as JsonValue;
use sqlx_mysql_toolkit::{Params, Row, RowCursor, WriteQueryResult};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::server::{Lifecycle, MySqlServer};
use crate::{Error, Result, ServerConfig};

/// [`MySqlServer`] driven from synchronous code.
///
/// Owns a single-threaded runtime and blocks on it for every call, so it
/// must not be used from inside an async context.
pub struct BlockingMySqlServer {
   // Declared first: the connection must drop while its runtime is alive
   inner: MySqlServer,
   runtime: Runtime,
}

impl BlockingMySqlServer {
   pub fn new(config: ServerConfig, binaries: &dyn BinarySource) -> Result<Self> {
      let runtime = Builder::new_current_thread()
         .enable_all()
         .build()
         .map_err(Error::Runtime)?;
      let inner = MySqlServer::new(config, binaries)?;
      Ok(Self { inner, runtime })
   }

   /// The underlying async server
   pub fn inner(&self) -> &MySqlServer {
      &self.inner
   }

   pub fn lifecycle(&self) -> Lifecycle {
      self.inner.lifecycle()
   }

   pub fn startup_warnings(&self) -> &CleanupReport {
      self.inner.startup_warnings()
   }

   pub fn is_connection_open(&self) -> bool {
      self.inner.is_connection_open()
   }

   pub fn start(&mut self) -> Result<()> {
      self.runtime.block_on(self.inner.start())
   }

   pub fn execute_non_query(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<WriteQueryResult> {
      self
         .runtime
         .block_on(self.inner.execute_non_query(query, params))
   }

   pub fn execute_server_non_query(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<WriteQueryResult> {
      self
         .runtime
         .block_on(self.inner.execute_server_non_query(query, params))
   }

   /// Run a query and iterate its rows
   pub fn execute_reader(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<BlockingRowCursor<'_>> {
      let cursor = self
         .runtime
         .block_on(self.inner.execute_reader(query, params))?;
      Ok(BlockingRowCursor {
         cursor: Some(cursor),
         runtime: &self.runtime,
      })
   }

   pub fn execute_scalar(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<Option<JsonValue>> {
      self
         .runtime
         .block_on(self.inner.execute_scalar(query, params))
   }

   pub fn close_connection(&mut self) -> Result<()> {
      self.runtime.block_on(self.inner.close_connection())
   }

   pub fn shut_down(&mut self) -> Result<CleanupReport> {
      self.runtime.block_on(self.inner.shut_down())
   }

   pub fn dispose(&mut self) -> CleanupReport {
      self.runtime.block_on(self.inner.dispose())
   }
}

impl std::fmt::Debug for BlockingMySqlServer {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("BlockingMySqlServer")
         .field("inner", &self.inner)
         .finish_non_exhaustive()
   }
}

/// Rows of a reader, one decoded row per iteration.
///
/// Iteration stops at the first error, after yielding it.
pub struct BlockingRowCursor<'a> {
   cursor: Option<RowCursor<'a>>,
   runtime: &'a Runtime,
}

impl BlockingRowCursor<'_> {
   /// Stop reading and close the connection
   pub fn release(mut self) -> Result<()> {
      match self.cursor.take() {
         Some(cursor) => Ok(self.runtime.block_on(cursor.release())?),
         None => Ok(()),
      }
   }

   fn release_quietly(&mut self) {
      if let Some(cursor) = self.cursor.take()
         && let Err(e) = self.runtime.block_on(cursor.release())
      {
         debug!(error = %e, "Could not release cursor");
      }
   }
}

impl Iterator for BlockingRowCursor<'_> {
   type Item = Result<Row>;

   fn next(&mut self) -> Option<Self::Item> {
      let cursor = self.cursor.as_mut()?;
      match self.runtime.block_on(cursor.next_row()) {
         Ok(Some(row)) => Some(Ok(row)),
         Ok(None) => {
            self.release_quietly();
            None
         }
         Err(e) => {
            self.release_quietly();
            Some(Err(e.into()))
         }
      }
   }
}

impl Drop for BlockingRowCursor<'_> {
   fn drop(&mut self) {
      self.release_quietly();
   }
}
