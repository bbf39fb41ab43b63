//! End-to-end supervision flow against a stand-in server executable.
//!
//! The stand-in is a shell script that just sleeps, so these tests exercise
//! provisioning, materialization, launch, and teardown without needing a
//! real mysqld installation.

#![cfg(unix)]

use mysqld_supervisor::{
   EmbeddedBinaries, Error, Materialized, ServerProcess, Workspace, ensure_binaries,
};
use tempfile::TempDir;

const SLEEPER: EmbeddedBinaries = EmbeddedBinaries {
   server: b"#!/bin/sh\nexec sleep 30\n",
   messages: b"errmsg",
};

const NOT_AN_EXECUTABLE: EmbeddedBinaries = EmbeddedBinaries {
   server: b"\x00\x01 definitely not a program",
   messages: b"errmsg",
};

#[test]
fn full_lifecycle_leaves_nothing_behind() {
   let temp = TempDir::new().unwrap();
   let ws = Workspace::new(temp.path());

   assert!(ws.provision().is_clean());
   assert_eq!(ensure_binaries(&ws, &SLEEPER).unwrap(), Materialized::Written);

   let mut process = ServerProcess::start(&ws).unwrap();
   assert!(process.pid() > 0);
   assert!(process.try_exit_status().unwrap().is_none());

   let report = process.stop();
   assert!(report.is_clean(), "{:?}", report);

   let report = ws.deprovision();
   assert!(report.is_clean(), "{:?}", report);
   assert!(!ws.bin_dir().exists());
   assert!(temp.path().exists());
}

#[test]
fn rerun_reprovisions_and_rematerializes() {
   let temp = TempDir::new().unwrap();

   let first = Workspace::new(temp.path());
   first.provision();
   ensure_binaries(&first, &SLEEPER).unwrap();

   // Provisioning wipes the binary directory, so the next run writes again
   let second = Workspace::new(temp.path());
   second.provision();
   assert!(!second.server_executable().exists());
   assert_eq!(
      ensure_binaries(&second, &SLEEPER).unwrap(),
      Materialized::Written
   );
   assert_eq!(
      ensure_binaries(&second, &SLEEPER).unwrap(),
      Materialized::AlreadyPresent
   );
}

#[test]
fn spawn_rejected_by_os_is_a_launch_error() {
   let temp = TempDir::new().unwrap();
   let ws = Workspace::new(temp.path());
   ws.provision();
   ensure_binaries(&ws, &NOT_AN_EXECUTABLE).unwrap();

   let err = ServerProcess::start(&ws).unwrap_err();

   assert!(matches!(err, Error::Launch { .. }), "{err:?}");
   assert_eq!(err.error_code(), "LAUNCH_FAILED");
}

#[test]
fn dropping_a_process_handle_kills_the_child() {
   let temp = TempDir::new().unwrap();
   let ws = Workspace::new(temp.path());
   ws.provision();
   ensure_binaries(&ws, &SLEEPER).unwrap();

   let process = ServerProcess::start(&ws).unwrap();
   let pid = process.pid();
   drop(process);

   // The pid is reaped, so signalling it fails
   let alive = std::process::Command::new("kill")
      .args(["-0", &pid.to_string()])
      .stderr(std::process::Stdio::null())
      .status()
      .unwrap()
      .success();
   assert!(!alive, "process {pid} should have been killed on drop");
}
