//! Child processes whose output is relayed into a log file and a queue.
//!
//! Each spawned child gets one pump task per output stream and a single relay
//! task that owns the log file. Every line lands in the log; the in-memory
//! queue is bounded and drops lines nobody is reading, so a long-running
//! child cannot grow memory without bound.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lines kept for readers before new ones are dropped from the queue.
pub const OUTPUT_BUFFER: usize = 1024;

/// A spawned child with its output relayed to `log_path`.
pub struct ManagedProcess {
    name: String,
    child: Child,
    output: mpsc::Receiver<String>,
    log_path: PathBuf,
}

impl ManagedProcess {
    /// Spawn `command` with piped stdout/stderr.
    ///
    /// On Unix the child leads its own process group so that launcher
    /// scripts and everything they start can be stopped together.
    pub async fn spawn(
        name: impl Into<String>,
        mut command: Command,
        log_path: impl Into<PathBuf>,
    ) -> io::Result<Self> {
        let name = name.into();
        let log_path = log_path.into();

        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;

        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;
        info!(name = %name, pid = ?child.id(), log = %log_path.display(), "Process spawned");

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let (out_tx, out_rx) = mpsc::channel(OUTPUT_BUFFER);
        tokio::spawn(relay_lines(line_rx, log_file, out_tx));

        Ok(Self {
            name,
            child,
            output: out_rx,
            log_path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id, `None` once the child has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Next output line; `None` once both streams closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// The queued output lines, for scanners that want the raw receiver.
    pub fn output_mut(&mut self) -> &mut mpsc::Receiver<String> {
        &mut self.output
    }

    /// Take whatever output is queued right now without waiting.
    pub fn drain_output(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.output.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Read queued and in-flight lines until the streams close or no line
    /// arrives for `settle`. Meant for a child that has already exited.
    pub async fn collect_output(&mut self, settle: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = tokio::time::timeout(settle, self.output.recv()).await {
            lines.push(line);
        }
        lines
    }

    /// Exit status if the child already exited.
    pub fn try_status(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the child to exit.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the child to stop, then kill it if it is still running after
    /// `grace`.
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        request_stop(&mut self.child);
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(name = %self.name, status = ?status, "Process stopped");
                Ok(())
            }
            Err(_) => {
                warn!(name = %self.name, grace = ?grace, "Process ignored stop request, killing");
                force_kill(&mut self.child).await
            }
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // kill_on_drop only reaches the group leader
        if let Ok(None) = self.child.try_wait() {
            kill_group(&self.child);
        }
    }
}

async fn pump_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c: char| c == '\n' || c == '\r')
                    .to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Output stream failed");
                break;
            }
        }
    }
}

async fn relay_lines(
    mut lines: mpsc::UnboundedReceiver<String>,
    mut log: File,
    out: mpsc::Sender<String>,
) {
    let mut logging = true;
    while let Some(line) = lines.recv().await {
        if logging {
            let written: io::Result<()> = async {
                log.write_all(line.as_bytes()).await?;
                log.write_all(b"\n").await?;
                log.flush().await
            }
            .await;
            if let Err(e) = written {
                warn!(error = %e, "Could not write process log, continuing without it");
                logging = false;
            }
        }
        // Full or closed queue: the line is still in the log file.
        let _ = out.try_send(line);
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: signalling the process group of a child we spawned and
        // have not reaped yet.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: see request_stop
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

async fn force_kill(child: &mut Child) -> io::Result<()> {
    kill_group(child);
    match child.kill().await {
        Ok(()) => Ok(()),
        // Already gone between the group kill and here
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    async fn collect_all(process: &mut ManagedProcess) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = process.next_line().await {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn relays_stdout_and_stderr_to_queue_and_log() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("nested").join("child.log");

        let mut process = ManagedProcess::spawn("echo", shell("echo hello; echo oops >&2"), &log)
            .await
            .unwrap();
        let lines = collect_all(&mut process).await;

        assert!(lines.contains(&"hello".to_string()));
        assert!(lines.contains(&"oops".to_string()));

        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("hello\n"));
        assert!(logged.contains("oops\n"));
    }

    #[tokio::test]
    async fn log_is_appended_across_runs() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("child.log");

        for word in ["first", "second"] {
            let mut process = ManagedProcess::spawn("echo", shell(&format!("echo {word}")), &log)
                .await
                .unwrap();
            collect_all(&mut process).await;
        }

        let logged = std::fs::read_to_string(&log).unwrap();
        assert_eq!(logged, "first\nsecond\n");
    }

    #[tokio::test]
    async fn log_keeps_every_line_when_queue_overflows() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("seq.log");
        let total = OUTPUT_BUFFER * 3;

        let mut process = ManagedProcess::spawn("seq", shell(&format!("seq 1 {total}")), &log)
            .await
            .unwrap();
        process.wait().await.unwrap();
        let received = collect_all(&mut process).await;

        assert!(received.len() <= total);
        let logged = std::fs::read_to_string(&log).unwrap();
        assert_eq!(logged.lines().count(), total);
    }

    #[tokio::test]
    async fn terminate_stops_long_running_child() {
        let temp = TempDir::new().unwrap();
        let mut process = ManagedProcess::spawn("sleeper", shell("sleep 30"), temp.path().join("s.log"))
            .await
            .unwrap();
        assert!(process.try_status().unwrap().is_none());

        process.terminate(Duration::from_secs(2)).await.unwrap();
        assert!(process.try_status().unwrap().is_some());
    }

    #[tokio::test]
    async fn terminate_kills_child_ignoring_sigterm() {
        let temp = TempDir::new().unwrap();
        let mut process = ManagedProcess::spawn(
            "stubborn",
            shell("trap '' TERM; sleep 30"),
            temp.path().join("s.log"),
        )
        .await
        .unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        process.terminate(Duration::from_millis(200)).await.unwrap();
        let status = process.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn drain_output_returns_queued_lines_without_blocking() {
        let temp = TempDir::new().unwrap();
        let mut process = ManagedProcess::spawn("echo", shell("echo a; echo b"), temp.path().join("d.log"))
            .await
            .unwrap();
        process.wait().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let lines = process.drain_output();
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        assert!(process.drain_output().is_empty());
    }

    #[tokio::test]
    async fn collect_output_stops_when_streams_close() {
        let temp = TempDir::new().unwrap();
        let mut process = ManagedProcess::spawn("echo", shell("echo x; exit 2"), temp.path().join("c.log"))
            .await
            .unwrap();
        let status = process.wait().await.unwrap();
        assert_eq!(status.code(), Some(2));

        let lines = process.collect_output(Duration::from_secs(5)).await;
        assert_eq!(lines, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn terminate_after_exit_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let mut process = ManagedProcess::spawn("true", shell("true"), temp.path().join("t.log"))
            .await
            .unwrap();
        process.wait().await.unwrap();
        process.terminate(Duration::from_millis(10)).await.unwrap();
    }
}
