//! # mysqld-supervisor
//!
//! Everything needed to bring a throwaway `mysqld` up and take it down again,
//! short of talking to it.
//!
//! ## Core Types
//!
//! - **[`Workspace`]**: the binary, data-root, and per-instance data directories
//! - **[`BinarySource`]**: where the server executable comes from
//!   ([`EmbeddedBinaries`], [`InstalledBinaries`])
//! - **[`ServerProcess`]**: handle to the launched server
//! - **[`CleanupReport`]**: aggregated non-fatal warnings from best-effort steps
//! - **[`Error`]**: fatal failures (materialization, launch)
//!
//! ## Failure policy
//!
//! - **Best-effort**: directory provisioning/removal and process killing
//!   never fail; they return a [`CleanupReport`]
//! - **Fatal**: writing the binaries and spawning the process return
//!   [`Error`] and are never retried

mod binaries;
mod cleanup;
mod error;
mod process;
mod workspace;

pub use binaries::{
   BinarySource, DIST_DIR_ENV, EmbeddedBinaries, InstalledBinaries, MESSAGE_CATALOG, Materialized,
   PROCESS_NAME, SERVER_EXECUTABLE, ensure_binaries,
};
pub use cleanup::{CleanupReport, CleanupWarning};
pub use error::{Error, Result};
pub use process::{Platform, ServerProcess, server_arguments, sweep_stray_processes};
pub use workspace::{DATA_DIR, SERVER_DIR, SOCKET_FILE, Workspace, default_base_dir};
