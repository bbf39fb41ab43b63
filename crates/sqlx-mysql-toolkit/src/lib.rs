//! # sqlx-mysql-toolkit
//!
//! Command execution against a MySQL server over a single connection, with
//! named `@parameters` and JSON row decoding.
//!
//! ## Core Types
//!
//! - **[`CommandExecutor`]**: lazily opened, scope-aware connection that runs
//!   non-queries, scalars, and readers
//! - **[`Params`]** / **[`Command`]**: named parameters resolved to a prepared
//!   statement
//! - **[`RowCursor`]**: forward-only reader that owns its connection
//! - **[`ConnectionStringFactory`]**: server and database endpoints
//!   ([`PipeConnectionStrings`])
//! - **[`Error`]**: error type with structured error codes
//!
//! ## Example
//!
//! ```no_run
//! use sqlx_mysql_toolkit::{CommandExecutor, Params, PipeConnectionStrings};
//!
//! # async fn example() -> sqlx_mysql_toolkit::Result<()> {
//! let mut executor = CommandExecutor::new(PipeConnectionStrings::default());
//!
//! executor
//!    .execute_non_query(
//!       "INSERT INTO testTable (Value) VALUES (@value)",
//!       &Params::new().with("value", "hello"),
//!    )
//!    .await?;
//!
//! let mut cursor = executor.execute_reader("SELECT * FROM testTable", &Params::new()).await?;
//! while let Some(row) = cursor.next_row().await? {
//!    println!("{:?}", row);
//! }
//! cursor.release().await?;
//! # Ok(())
//! # }
//! ```

mod command;
mod cursor;
mod decode;
mod endpoint;
mod error;
mod executor;

pub use command::{Command, Params};
pub use cursor::RowCursor;
pub use decode::{Row, ValueKind, classify, decode_row, to_json};
pub use endpoint::{
   ConnectionString, ConnectionStringFactory, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_USER,
   PipeConnectionStrings, Protocol, Scope,
};
pub use error::{Error, Result};
pub use executor::{CommandExecutor, WriteQueryResult};
