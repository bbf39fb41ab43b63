//! Best-effort outcome reporting for provisioning and teardown.
//!
//! Provisioning and teardown never abort on a single failure: a stale lock
//! file or an unkillable process must not stop the rest of the cleanup from
//! running. Each failure is logged when recorded and collected into a
//! [`CleanupReport`], so callers can assert that teardown was clean without
//! that assertion masking the failure they are actually testing.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

/// A single non-fatal failure encountered while provisioning or cleaning up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CleanupWarning {
   /// A directory could not be removed
   RemoveDirectory { path: PathBuf, error: String },

   /// A directory could not be created
   CreateDirectory { path: PathBuf, error: String },

   /// A process could not be killed or reaped
   KillProcess { pid: u32, error: String },

   /// The process table could not be enumerated
   EnumerateProcesses { name: String, error: String },

   /// The live database connection could not be closed gracefully
   CloseConnection { error: String },
}

impl fmt::Display for CleanupWarning {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         CleanupWarning::RemoveDirectory { path, error } => {
            write!(f, "could not delete directory {}: {}", path.display(), error)
         }
         CleanupWarning::CreateDirectory { path, error } => {
            write!(f, "could not create directory {}: {}", path.display(), error)
         }
         CleanupWarning::KillProcess { pid, error } => {
            write!(f, "could not kill process {}: {}", pid, error)
         }
         CleanupWarning::EnumerateProcesses { name, error } => {
            write!(f, "could not enumerate '{}' processes: {}", name, error)
         }
         CleanupWarning::CloseConnection { error } => {
            write!(f, "could not close connection: {}", error)
         }
      }
   }
}

/// Aggregated warnings from a best-effort operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
   warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
   pub fn new() -> Self {
      Self::default()
   }

   /// Record a warning, logging it as it is recorded.
   pub fn push(&mut self, warning: CleanupWarning) {
      warn!("{}", warning);
      self.warnings.push(warning);
   }

   pub(crate) fn remove_directory(&mut self, path: &Path, error: impl fmt::Display) {
      self.push(CleanupWarning::RemoveDirectory {
         path: path.to_path_buf(),
         error: error.to_string(),
      });
   }

   pub(crate) fn create_directory(&mut self, path: &Path, error: impl fmt::Display) {
      self.push(CleanupWarning::CreateDirectory {
         path: path.to_path_buf(),
         error: error.to_string(),
      });
   }

   pub(crate) fn kill_process(&mut self, pid: u32, error: impl fmt::Display) {
      self.push(CleanupWarning::KillProcess {
         pid,
         error: error.to_string(),
      });
   }

   /// Fold another report's warnings into this one (already logged).
   pub fn merge(&mut self, other: CleanupReport) {
      self.warnings.extend(other.warnings);
   }

   /// `true` when every step succeeded
   pub fn is_clean(&self) -> bool {
      self.warnings.is_empty()
   }

   pub fn warnings(&self) -> &[CleanupWarning] {
      &self.warnings
   }

   pub fn into_warnings(self) -> Vec<CleanupWarning> {
      self.warnings
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_empty_report_is_clean() {
      let report = CleanupReport::new();
      assert!(report.is_clean());
      assert!(report.warnings().is_empty());
   }

   #[test]
   fn test_merge_preserves_order() {
      let mut first = CleanupReport::new();
      first.kill_process(41, "no such process");

      let mut second = CleanupReport::new();
      second.remove_directory(Path::new("/tmp/x"), "busy");
      second.push(CleanupWarning::CloseConnection {
         error: "broken pipe".into(),
      });

      first.merge(second);

      assert!(!first.is_clean());
      let warnings = first.into_warnings();
      assert_eq!(warnings.len(), 3);
      assert!(matches!(warnings[0], CleanupWarning::KillProcess { pid: 41, .. }));
      assert!(matches!(warnings[2], CleanupWarning::CloseConnection { .. }));
   }

   #[test]
   fn test_warning_serializes_with_kind_tag() {
      let warning = CleanupWarning::EnumerateProcesses {
         name: "mysqld".into(),
         error: "pgrep not found".into(),
      };
      let json = serde_json::to_value(&warning).unwrap();
      assert_eq!(json["kind"], "enumerate_processes");
      assert_eq!(json["name"], "mysqld");
      assert!(warning.to_string().contains("pgrep not found"));
   }
}
