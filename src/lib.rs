//! # mysql-test-server
//!
//! A disposable `mysqld` for test suites. Provisions a scratch workspace,
//! launches the server, waits until it accepts connections, runs queries
//! against a scratch database, and removes every trace afterwards.
//!
//! ## Core Types
//!
//! - **[`MySqlServer`]**: caller-owned async server
//! - **[`BlockingMySqlServer`]**: the same server driven from synchronous code
//! - **[`global`]**: one shared [`BlockingMySqlServer`] per process
//! - **[`ServerConfig`]**: base directory, database name, timeouts
//! - **[`Error`]**: fatal failures; teardown problems come back as a
//!   [`CleanupReport`] instead
//!
//! ## Example
//!
//! ```no_run
//! use mysql_test_server::{InstalledBinaries, MySqlServer, Params, ServerConfig};
//!
//! # async fn example() -> mysql_test_server::Result<()> {
//! let binaries = InstalledBinaries::locate().expect("mysqld is installed");
//! let mut server = MySqlServer::new(ServerConfig::default(), &binaries)?;
//! server.start().await?;
//!
//! server
//!    .execute_non_query(
//!       "CREATE TABLE testTable (Id INT NOT NULL AUTO_INCREMENT, Value VARCHAR(50), PRIMARY KEY (Id))",
//!       Params::new(),
//!    )
//!    .await?;
//! server
//!    .execute_non_query(
//!       "INSERT INTO testTable (Value) VALUES (@value)",
//!       [("value", "Value 1")],
//!    )
//!    .await?;
//!
//! let count = server.execute_scalar("SELECT COUNT(*) FROM testTable", Params::new()).await?;
//! assert_eq!(count, Some(1.into()));
//!
//! let report = server.shut_down().await?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

mod blocking;
mod config;
mod error;
pub mod global;
mod readiness;
mod server;

pub use blocking::{BlockingMySqlServer, BlockingRowCursor};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use readiness::{Attempt, Probe, ReadinessPolicy, Unready, wait_until_ready};
pub use server::{Lifecycle, MySqlServer};

pub use mysqld_supervisor::{
   BinarySource, CleanupReport, CleanupWarning, EmbeddedBinaries, InstalledBinaries,
};
pub use sqlx_mysql_toolkit::{Params, Row, RowCursor, WriteQueryResult};
