use std::marker::PhantomData;

use futures::StreamExt;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Row as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::command::Command;
use crate::decode::{Row, decode_row};
use crate::executor::CommandExecutor;
use crate::{Error, Result};

/// Rows buffered ahead of the consumer
const READ_AHEAD: usize = 32;

type RowItem = std::result::Result<MySqlRow, sqlx::Error>;

/// Forward-only cursor over a result set.
///
/// The cursor owns the connection it reads from and keeps the executor
/// borrowed, so no other command can run until it is released. Release it
/// with [`RowCursor::release`] to close the connection cleanly; dropping it
/// closes the connection in the background.
pub struct RowCursor<'a> {
   rows: mpsc::Receiver<RowItem>,
   peeked: Option<MySqlRow>,
   reader: Option<JoinHandle<MySqlConnection>>,
   _executor: PhantomData<&'a mut CommandExecutor>,
}

impl RowCursor<'_> {
   /// Start streaming `command` on `conn` and wait for the first row, so
   /// that statement errors surface here rather than on the first read.
   pub(crate) async fn open(conn: MySqlConnection, command: Command) -> Result<Self> {
      let (tx, rows) = mpsc::channel(READ_AHEAD);
      let reader = tokio::spawn(stream_rows(conn, command, tx));

      let mut cursor = Self {
         rows,
         peeked: None,
         reader: Some(reader),
         _executor: PhantomData,
      };

      match cursor.rows.recv().await {
         Some(Ok(row)) => cursor.peeked = Some(row),
         Some(Err(e)) => {
            if let Err(close_err) = cursor.shutdown().await {
               debug!(error = %close_err, "Could not close connection after failed query");
            }
            return Err(e.into());
         }
         None => trace!("Result set is empty"),
      }

      Ok(cursor)
   }

   /// Column names of the result set, if any row was produced
   pub fn columns(&self) -> Option<Vec<String>> {
      self.peeked.as_ref().map(|row| {
         row.columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect()
      })
   }

   /// Advance to the next row, `None` once the result set is exhausted
   pub async fn next_row(&mut self) -> Result<Option<Row>> {
      match self.next_raw().await? {
         Some(row) => decode_row(&row).map(Some),
         None => Ok(None),
      }
   }

   /// Advance without decoding, for callers that want typed access through
   /// [`sqlx::Row::try_get`]
   pub async fn next_raw(&mut self) -> Result<Option<MySqlRow>> {
      if let Some(row) = self.peeked.take() {
         return Ok(Some(row));
      }

      match self.rows.recv().await {
         Some(Ok(row)) => Ok(Some(row)),
         Some(Err(e)) => Err(e.into()),
         None => Ok(None),
      }
   }

   /// Read every remaining row
   pub async fn collect_rows(&mut self) -> Result<Vec<Row>> {
      let mut rows = Vec::new();
      while let Some(row) = self.next_row().await? {
         rows.push(row);
      }
      Ok(rows)
   }

   /// Stop reading and close the underlying connection
   pub async fn release(mut self) -> Result<()> {
      self.shutdown().await
   }

   async fn shutdown(&mut self) -> Result<()> {
      self.peeked = None;
      self.rows.close();

      let Some(reader) = self.reader.take() else {
         return Ok(());
      };

      let conn = reader
         .await
         .map_err(|e| Error::Other(format!("row reader task failed: {}", e)))?;
      conn.close().await?;
      trace!("Cursor released");
      Ok(())
   }
}

impl Drop for RowCursor<'_> {
   fn drop(&mut self) {
      if self.reader.is_some() {
         // The reader stops at its next send and drops the connection
         trace!("Cursor dropped without release");
      }
   }
}

async fn stream_rows(
   mut conn: MySqlConnection,
   command: Command,
   tx: mpsc::Sender<RowItem>,
) -> MySqlConnection {
   {
      let mut rows = command.query().fetch(&mut conn);
      while let Some(item) = rows.next().await {
         let failed = item.is_err();
         if tx.send(item).await.is_err() {
            trace!("Cursor released before the end of the result set");
            break;
         }
         if failed {
            break;
         }
      }
   }
   conn
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn test_release_without_reader_is_a_no_op() {
      let (_tx, rows) = mpsc::channel(1);
      let cursor = RowCursor {
         rows,
         peeked: None,
         reader: None,
         _executor: PhantomData,
      };

      assert!(cursor.columns().is_none());
      cursor.release().await.unwrap();
   }

   #[tokio::test]
   async fn test_closed_channel_reads_as_exhausted() {
      let (tx, rows) = mpsc::channel(1);
      drop(tx);
      let mut cursor = RowCursor {
         rows,
         peeked: None,
         reader: None,
         _executor: PhantomData,
      };

      assert!(cursor.next_row().await.unwrap().is_none());
      assert!(cursor.collect_rows().await.unwrap().is_empty());
   }

   #[tokio::test]
   async fn test_forwarded_error_surfaces_on_read() {
      let (tx, rows) = mpsc::channel(1);
      tx.send(Err(sqlx::Error::RowNotFound)).await.unwrap();
      let mut cursor = RowCursor {
         rows,
         peeked: None,
         reader: None,
         _executor: PhantomData,
      };

      let err = cursor.next_row().await.unwrap_err();
      assert!(matches!(err, Error::Sqlx(sqlx::Error::RowNotFound)));
   }
}
