//! The disposable server: provisioning, startup, queries, teardown

use std::future::Future;

use mysqld_supervisor::{
   BinarySource, CleanupReport, CleanupWarning, PROCESS_NAME, ServerProcess, Workspace,
   ensure_binaries, sweep_stray_processes,
};
use serde_json::Value as JsonValue;
use sqlx_mysql_toolkit::{
   CommandExecutor, Params, PipeConnectionStrings, RowCursor, Scope, WriteQueryResult,
};
use tracing::{debug, info, trace, warn};

use crate::readiness::{Attempt, Probe, ReadinessPolicy, Unready, wait_until_ready};
use crate::{Error, Result, ServerConfig};

/// Where a [`MySqlServer`] is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
   /// Workspace provisioned and binaries in place, process not launched
   Created,
   /// Process launched and accepting connections
   Running,
   /// Launch or readiness failed; the process has been stopped
   Failed,
   ShutDown,
   Disposed,
}

/// A throwaway `mysqld` owned by the caller.
///
/// Construction sweeps stray servers, provisions a fresh workspace, and
/// writes the binaries; [`start`](Self::start) launches the process and
/// waits until it accepts connections. Every query opens a connection,
/// runs, and closes it again.
///
/// Teardown never fails: [`shut_down`](Self::shut_down) and
/// [`dispose`](Self::dispose) return a [`CleanupReport`] describing anything
/// that could not be cleaned up.
pub struct MySqlServer {
   config: ServerConfig,
   workspace: Workspace,
   executor: CommandExecutor,
   process: Option<ServerProcess>,
   lifecycle: Lifecycle,
   startup_warnings: CleanupReport,
}

impl MySqlServer {
   /// Prepare a server without launching it.
   ///
   /// Fails only if the binaries cannot be written. Problems with stray
   /// processes or directories are kept in [`startup_warnings`](Self::startup_warnings).
   pub fn new(config: ServerConfig, binaries: &dyn BinarySource) -> Result<Self> {
      let workspace = Workspace::new(&config.base_dir);
      debug!(
         instance = %workspace.instance_id(),
         "Preparing server workspace under {}",
         workspace.bin_dir().display()
      );

      let mut startup_warnings = CleanupReport::new();
      if config.sweep_stray_processes {
         startup_warnings.merge(sweep_stray_processes(PROCESS_NAME));
      }
      startup_warnings.merge(workspace.provision());

      ensure_binaries(&workspace, binaries)?;

      let executor = CommandExecutor::new(PipeConnectionStrings::new(&config.database_name))
         .with_local_socket(workspace.local_socket())
         .with_connect_timeout(config.connect_timeout);

      Ok(Self {
         config,
         workspace,
         executor,
         process: None,
         lifecycle: Lifecycle::Created,
         startup_warnings,
      })
   }

   pub fn lifecycle(&self) -> Lifecycle {
      self.lifecycle
   }

   pub fn config(&self) -> &ServerConfig {
      &self.config
   }

   pub fn workspace(&self) -> &Workspace {
      &self.workspace
   }

   /// Non-fatal problems met while preparing the workspace
   pub fn startup_warnings(&self) -> &CleanupReport {
      &self.startup_warnings
   }

   /// `true` while a connection is held. Only a live reader cursor keeps one
   /// open between calls.
   pub fn is_connection_open(&self) -> bool {
      self.executor.is_open()
   }

   /// Process id of the running server
   pub fn pid(&self) -> Option<u32> {
      self.process.as_ref().map(ServerProcess::pid)
   }

   /// Launch the server and wait until it accepts connections.
   ///
   /// Each readiness attempt opens a server-scope connection and creates the
   /// scratch database. If the server does not come up in
   /// `startup_timeout`, or exits first, the process is stopped and the
   /// server is left [`Failed`](Lifecycle::Failed). Starting a running
   /// server is a no-op.
   ///
   /// The server listens only on its local socket. On Windows it listens on
   /// a named pipe, which the driver cannot use, so startup gives up on the
   /// first attempt with a `LOCAL_TRANSPORT_UNAVAILABLE` error.
   pub async fn start(&mut self) -> Result<()> {
      match self.lifecycle {
         Lifecycle::Created => {}
         Lifecycle::Running => return Ok(()),
         Lifecycle::Disposed => return Err(Error::Disposed),
         state @ (Lifecycle::Failed | Lifecycle::ShutDown) => {
            return Err(Error::CannotStart(state));
         }
      }

      let mut process = match ServerProcess::start(&self.workspace) {
         Ok(process) => process,
         Err(e) => {
            self.lifecycle = Lifecycle::Failed;
            return Err(e.into());
         }
      };

      let policy = ReadinessPolicy::from(&self.config);
      let mut probe = StartupProbe {
         executor: &mut self.executor,
         process: &mut process,
         statement: format!(
            "CREATE DATABASE IF NOT EXISTS `{}`",
            self.config.database_name.replace('`', "``")
         ),
      };

      match wait_until_ready(&policy, &mut probe).await {
         Ok(attempts) => {
            info!(pid = process.pid(), attempts, "Server started");
            self.process = Some(process);
            self.lifecycle = Lifecycle::Running;
            Ok(())
         }
         Err(unready) => {
            self.lifecycle = Lifecycle::Failed;
            off_thread(move || process.stop()).await;
            Err(match unready {
               Unready::TimedOut {
                  waited,
                  attempts,
                  last_error,
               } => Error::StartupTimeout {
                  waited,
                  attempts,
                  last_error: last_error.map(Box::new),
               },
               Unready::GaveUp { error, .. } => error,
            })
         }
      }
   }

   /// Run a statement against the scratch database
   pub async fn execute_non_query(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<WriteQueryResult> {
      self.ensure_running()?;
      Ok(self.executor.execute_non_query(query, &params.into()).await?)
   }

   /// Run a statement with no database selected, e.g. `CREATE DATABASE`
   pub async fn execute_server_non_query(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<WriteQueryResult> {
      self.ensure_running()?;
      Ok(self
         .executor
         .execute_non_query_scoped(query, Scope::Server, &params.into())
         .await?)
   }

   /// Run a query and read its rows through a cursor. No other query can
   /// run until the cursor is released or dropped.
   pub async fn execute_reader(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<RowCursor<'_>> {
      self.ensure_running()?;
      Ok(self.executor.execute_reader(query, &params.into()).await?)
   }

   /// First column of the first row, `None` when there are no rows
   pub async fn execute_scalar(
      &mut self,
      query: &str,
      params: impl Into<Params>,
   ) -> Result<Option<JsonValue>> {
      self.ensure_running()?;
      Ok(self.executor.execute_scalar(query, &params.into()).await?)
   }

   /// Close the connection if one is open
   pub async fn close_connection(&mut self) -> Result<()> {
      if self.lifecycle == Lifecycle::Disposed {
         return Err(Error::Disposed);
      }
      Ok(self.executor.close().await?)
   }

   /// Close the connection, stop the process, sweep strays, and delete the
   /// workspace. Every step runs even if an earlier one fails.
   pub async fn shut_down(&mut self) -> Result<CleanupReport> {
      if self.lifecycle == Lifecycle::Disposed {
         return Err(Error::Disposed);
      }
      let report = self.teardown(self.config.sweep_stray_processes).await;
      self.lifecycle = Lifecycle::ShutDown;
      Ok(report)
   }

   /// Close the connection, stop the process, and mark the server unusable.
   /// A second call does nothing and returns an empty report.
   ///
   /// Unlike [`shut_down`](Self::shut_down) this never sweeps other `mysqld`
   /// processes. The workspace is still deleted since nothing else would
   /// remove it once the server is disposed.
   pub async fn dispose(&mut self) -> CleanupReport {
      if self.lifecycle == Lifecycle::Disposed {
         trace!("Server already disposed");
         return CleanupReport::new();
      }
      let report = self.teardown(false).await;
      self.lifecycle = Lifecycle::Disposed;
      report
   }

   async fn teardown(&mut self, sweep: bool) -> CleanupReport {
      debug!(state = ?self.lifecycle, "Tearing down server");

      let mut report = CleanupReport::new();
      if let Err(e) = self.executor.close().await {
         report.push(CleanupWarning::CloseConnection {
            error: e.to_string(),
         });
      }

      let process = self.process.take();
      let workspace = self.workspace.clone();

      report.merge(
         off_thread(move || {
            let mut report = CleanupReport::new();
            if let Some(process) = process {
               report.merge(process.stop());
            }
            if sweep {
               report.merge(sweep_stray_processes(PROCESS_NAME));
            }
            report.merge(workspace.deprovision());
            report
         })
         .await,
      );

      if report.is_clean() {
         info!("Server shut down");
      } else {
         warn!(warnings = report.warnings().len(), "Server shut down with warnings");
      }
      report
   }

   fn ensure_running(&self) -> Result<()> {
      match self.lifecycle {
         Lifecycle::Running => Ok(()),
         Lifecycle::Disposed => Err(Error::Disposed),
         state => Err(Error::NotRunning(state)),
      }
   }
}

impl Drop for MySqlServer {
   fn drop(&mut self) {
      // The process handle kills the child on drop; only the directories
      // are left to clean up.
      if matches!(self.lifecycle, Lifecycle::Created | Lifecycle::Running | Lifecycle::Failed) {
         debug!("MySqlServer dropped without shut_down, cleaning up");
         self.process.take();
         self.workspace.deprovision();
      }
   }
}

impl std::fmt::Debug for MySqlServer {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("MySqlServer")
         .field("lifecycle", &self.lifecycle)
         .field("workspace", &self.workspace)
         .field("pid", &self.pid())
         .finish()
   }
}

/// One readiness attempt: fail fast if the process is gone, otherwise try to
/// create the scratch database over a server-scope connection.
struct StartupProbe<'a> {
   executor: &'a mut CommandExecutor,
   process: &'a mut ServerProcess,
   statement: String,
}

impl Probe for StartupProbe<'_> {
   type Error = Error;

   fn attempt(&mut self) -> impl Future<Output = Attempt<Error>> + Send {
      async move {
         match self.process.try_exit_status() {
            Ok(Some(status)) => {
               return Attempt::GiveUp(Error::ExitedDuringStartup {
                  status: status.to_string(),
               });
            }
            Ok(None) => {}
            Err(e) => return Attempt::GiveUp(mysqld_supervisor::Error::from(e).into()),
         }

         // Connect first so refused attempts stay at debug level while polling
         if let Err(e) = self.executor.open(Scope::Server).await {
            return not_ready(e);
         }
         match self
            .executor
            .execute_non_query_scoped(&self.statement, Scope::Server, &Params::new())
            .await
         {
            Ok(_) => Attempt::Ready,
            Err(e) => not_ready(e),
         }
      }
   }
}

fn not_ready(e: sqlx_mysql_toolkit::Error) -> Attempt<Error> {
   match e {
      sqlx_mysql_toolkit::Error::LocalTransportUnavailable(_) => Attempt::GiveUp(e.into()),
      e => {
         if !e.is_connection_error() {
            debug!(error = %e, "Server answered the readiness probe with an error");
         }
         Attempt::NotYet(e.into())
      }
   }
}

/// Run blocking cleanup off the async worker
async fn off_thread<F>(cleanup: F) -> CleanupReport
where
   F: FnOnce() -> CleanupReport + Send + 'static,
{
   match tokio::task::spawn_blocking(cleanup).await {
      Ok(report) => report,
      Err(e) => {
         warn!(error = %e, "Cleanup task failed");
         CleanupReport::new()
      }
   }
}
