//! Launching, stopping, and sweeping mysqld processes

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::cleanup::{CleanupReport, CleanupWarning};
use crate::workspace::Workspace;
use crate::{Error, Result};

/// How long a killed process gets to be reaped before teardown moves on
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for a killed process to be reaped
const REAP_POLL: Duration = Duration::from_millis(25);

/// Pause after killing strays so the OS releases their files and sockets
const SWEEP_SETTLE: Duration = Duration::from_millis(200);

/// Storage engine tuning shared by every platform: no doublewrite buffer, a
/// tiny redo log, small preallocated data files, and a shutdown that skips
/// all flushing. Durability is irrelevant for a throwaway server.
const INNODB_ARGUMENTS: [&str; 4] = [
   "--innodb_fast_shutdown=2",
   "--innodb_doublewrite=OFF",
   "--innodb_log_file_size=1048576",
   "--innodb_data_file_path=ibdata1:10M;ibdata2:10M:autoextend",
];

/// Target platform for the server's argument list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
   Windows,
   Unix,
}

impl Platform {
   pub const fn current() -> Self {
      if cfg!(windows) {
         Platform::Windows
      } else {
         Platform::Unix
      }
   }
}

/// Build the fixed argument list for a server running in `workspace`.
///
/// Authentication is disabled (`--skip-grant-tables`) and the server listens
/// on a local transport: a named pipe on Windows, a Unix socket in the binary
/// directory elsewhere. The Windows-only switches (`--standalone`,
/// `--console`, `--enable-named-pipe`) are rejected by Unix builds of mysqld,
/// so they are only passed on Windows. Skipping the grant tables also turns
/// off TCP networking, so the local transport is the only way in.
pub fn server_arguments(workspace: &Workspace, platform: Platform) -> Vec<OsString> {
   let mut args: Vec<OsString> = Vec::with_capacity(11);

   if platform == Platform::Windows {
      args.push("--standalone".into());
      args.push("--console".into());
   }

   args.push(path_arg("--basedir=", workspace.bin_dir()));
   args.push(path_arg("--lc-messages-dir=", workspace.bin_dir()));
   args.push(path_arg("--datadir=", workspace.data_dir()));
   args.push("--skip-grant-tables".into());

   match platform {
      Platform::Windows => args.push("--enable-named-pipe".into()),
      Platform::Unix => args.push(path_arg("--socket=", &workspace.local_socket())),
   }

   args.extend(INNODB_ARGUMENTS.iter().map(OsString::from));
   args
}

fn path_arg(flag: &str, path: &Path) -> OsString {
   let mut arg = OsString::from(flag);
   arg.push(path.as_os_str());
   arg
}

/// Handle to a launched server process.
///
/// The child is killed and released exactly once: by [`stop`](Self::stop),
/// or, if the handle is dropped without being stopped, by `Drop`.
#[derive(Debug)]
pub struct ServerProcess {
   child: Option<Child>,
   pid: u32,
   executable: PathBuf,
}

impl ServerProcess {
   /// Spawn the server from the workspace's binary directory.
   ///
   /// No shell is involved and no console window is created. A spawn
   /// failure is returned immediately and never retried.
   pub fn start(workspace: &Workspace) -> Result<Self> {
      let executable = workspace.server_executable();
      let args = server_arguments(workspace, Platform::current());

      info!(
         "Running {} {}",
         executable.display(),
         args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
      );

      let mut command = Command::new(&executable);
      command
         .args(&args)
         .current_dir(workspace.bin_dir())
         .stdin(Stdio::null())
         .stdout(Stdio::null())
         .stderr(Stdio::null());
      hide_window(&mut command);

      let child = command.spawn().map_err(|source| Error::Launch {
         executable: executable.clone(),
         source,
      })?;

      let pid = child.id();
      debug!(pid, "Server process spawned");

      Ok(Self {
         child: Some(child),
         pid,
         executable,
      })
   }

   pub fn pid(&self) -> u32 {
      self.pid
   }

   pub fn executable(&self) -> &Path {
      &self.executable
   }

   /// Exit status if the process has already exited, without blocking.
   pub fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
      match self.child.as_mut() {
         Some(child) => child.try_wait(),
         None => Ok(None),
      }
   }

   /// Force-kill the process if it is still running, then release the handle.
   pub fn stop(mut self) -> CleanupReport {
      let mut report = CleanupReport::new();
      if let Some(mut child) = self.child.take() {
         terminate(&mut child, &mut report);
      }
      report
   }
}

impl Drop for ServerProcess {
   fn drop(&mut self) {
      if let Some(mut child) = self.child.take() {
         debug!(pid = self.pid, "ServerProcess dropped without stop(), killing");
         terminate(&mut child, &mut CleanupReport::new());
      }
   }
}

fn terminate(child: &mut Child, report: &mut CleanupReport) {
   let pid = child.id();

   match child.try_wait() {
      Ok(Some(status)) => {
         debug!(pid, %status, "Server process had already exited");
         return;
      }
      Ok(None) => {}
      Err(e) => {
         report.kill_process(pid, e);
         return;
      }
   }

   if let Err(e) = child.kill() {
      report.kill_process(pid, e);
      return;
   }

   // Bounded reap: a process stuck in the kernel must not hang teardown
   let deadline = Instant::now() + KILL_WAIT;
   loop {
      match child.try_wait() {
         Ok(Some(status)) => {
            debug!(pid, %status, "Server process killed");
            return;
         }
         Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL),
         Ok(None) => {
            report.kill_process(pid, format!("did not exit within {:?}", KILL_WAIT));
            return;
         }
         Err(e) => {
            report.kill_process(pid, e);
            return;
         }
      }
   }
}

/// Force-kill every process named `name`, except the current one.
///
/// Guards against servers orphaned by a crashed earlier run. A process that
/// cannot be killed is recorded and the sweep continues with the rest.
pub fn sweep_stray_processes(name: &str) -> CleanupReport {
   let mut report = CleanupReport::new();

   let pids = match list_processes(name) {
      Ok(pids) => pids,
      Err(e) => {
         report.push(CleanupWarning::EnumerateProcesses {
            name: name.to_string(),
            error: e.to_string(),
         });
         return report;
      }
   };

   let own_pid = std::process::id();
   let mut killed = 0usize;
   for pid in pids.into_iter().filter(|pid| *pid != own_pid) {
      match kill_pid(pid) {
         Ok(()) => {
            debug!(pid, "Killed stray {} process", name);
            killed += 1;
         }
         Err(e) => report.kill_process(pid, e),
      }
   }

   if killed > 0 {
      thread::sleep(SWEEP_SETTLE);
   } else {
      trace!("No stray {} processes found", name);
   }

   report
}

#[cfg(unix)]
fn list_processes(name: &str) -> io::Result<Vec<u32>> {
   let output = Command::new("pgrep")
      .arg("-x")
      .arg(name)
      .stdin(Stdio::null())
      .stderr(Stdio::null())
      .output()?;

   // pgrep exits with 1 when nothing matched
   match output.status.code() {
      Some(0) | Some(1) => Ok(parse_pid_lines(&String::from_utf8_lossy(&output.stdout))),
      _ => Err(io::Error::other(format!("pgrep exited with {}", output.status))),
   }
}

#[cfg(windows)]
fn list_processes(name: &str) -> io::Result<Vec<u32>> {
   let mut command = Command::new("tasklist");
   command
      .args(["/FI", &format!("IMAGENAME eq {}.exe", name), "/FO", "CSV", "/NH"])
      .stdin(Stdio::null())
      .stderr(Stdio::null());
   hide_window(&mut command);

   let output = command.output()?;
   if !output.status.success() {
      return Err(io::Error::other(format!("tasklist exited with {}", output.status)));
   }
   Ok(parse_tasklist_csv(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(unix)]
fn kill_pid(pid: u32) -> io::Result<()> {
   let status = Command::new("kill")
      .args(["-9", &pid.to_string()])
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()?;

   if status.success() {
      Ok(())
   } else {
      Err(io::Error::other(format!("kill exited with {}", status)))
   }
}

#[cfg(windows)]
fn kill_pid(pid: u32) -> io::Result<()> {
   let mut command = Command::new("taskkill");
   command
      .args(["/F", "/PID", &pid.to_string()])
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null());
   hide_window(&mut command);

   let status = command.status()?;
   if status.success() {
      Ok(())
   } else {
      Err(io::Error::other(format!("taskkill exited with {}", status)))
   }
}

#[cfg(windows)]
fn hide_window(command: &mut Command) {
   use std::os::windows::process::CommandExt;

   const CREATE_NO_WINDOW: u32 = 0x0800_0000;
   command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_window(_command: &mut Command) {}

/// One pid per line, as printed by `pgrep`
fn parse_pid_lines(output: &str) -> Vec<u32> {
   output
      .lines()
      .filter_map(|line| line.trim().parse().ok())
      .collect()
}

/// `tasklist /FO CSV /NH` rows: `"mysqld.exe","1234","Console","1","10,000 K"`.
/// Informational lines ("INFO: No tasks are running ...") are skipped.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_tasklist_csv(output: &str) -> Vec<u32> {
   output
      .lines()
      .filter_map(|line| {
         let mut fields = line.trim().split("\",\"");
         fields.next()?.strip_prefix('"')?;
         fields.next()?.parse().ok()
      })
      .collect()
}
