//! Supervision of long-lived worker processes.
//!
//! A [`Supervisor`] spawns one command with stdout/stderr piped. Two pump
//! threads forward output lines to a single monitor thread, which appends them
//! to a timestamped log file, matches the readiness and callback patterns and
//! reports readiness over a channel the caller blocks on.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::config::{InstanceConfig, WorkerConfig};

/// Invoked with each output line matching the callback pattern.
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Invoked once when the supervised process closes its output.
pub type ExitCallback = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle contract the world bridge needs from a supervised process.
pub trait WorkerProcess {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn is_running(&mut self) -> bool;
    fn ready_line(&self) -> Option<&str>;
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Names the log subdirectory and the monitor thread.
    pub name: String,
    pub command: Vec<String>,
    pub ready_pattern: String,
    pub callback_pattern: Option<String>,
    pub log_dir: PathBuf,
    pub ready_timeout: Option<Duration>,
    pub stop_grace: Duration,
}

impl SupervisorConfig {
    pub fn for_worker(cfg: &WorkerConfig, log_dir: &Path) -> Self {
        Self {
            name: "mineflayer".to_string(),
            command: cfg.command.clone(),
            ready_pattern: cfg.ready_pattern.clone(),
            callback_pattern: cfg.callback_pattern.clone(),
            log_dir: log_dir.to_path_buf(),
            ready_timeout: (cfg.ready_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.ready_timeout_secs)),
            stop_grace: Duration::from_secs(cfg.stop_grace_secs),
        }
    }

    pub fn for_instance(cfg: &InstanceConfig, worker: &WorkerConfig, log_dir: &Path) -> Self {
        Self {
            name: "minecraft".to_string(),
            command: cfg.command.clone(),
            ready_pattern: cfg.ready_pattern.clone(),
            callback_pattern: None,
            log_dir: log_dir.to_path_buf(),
            ready_timeout: None,
            stop_grace: Duration::from_secs(worker.stop_grace_secs),
        }
    }
}

enum Readiness {
    Ready(String),
    Exited,
}

pub struct Supervisor {
    config: SupervisorConfig,
    ready_re: Regex,
    callback_re: Option<Regex>,
    on_line: Option<LineCallback>,
    on_exit: Option<ExitCallback>,
    child: Option<Child>,
    threads: Vec<JoinHandle<()>>,
    ready_line: Option<String>,
    log_path: Option<PathBuf>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        if config.command.is_empty() {
            bail!("{}: command must be non-empty", config.name);
        }
        let ready_re = Regex::new(&config.ready_pattern)
            .with_context(|| format!("{}: ready pattern", config.name))?;
        let callback_re = config
            .callback_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("{}: callback pattern", config.name))?;
        Ok(Self {
            config,
            ready_re,
            callback_re,
            on_line: None,
            on_exit: None,
            child: None,
            threads: Vec::new(),
            ready_line: None,
            log_path: None,
        })
    }

    /// Register the callback for lines matching the callback pattern.
    pub fn on_line(mut self, callback: LineCallback) -> Self {
        self.on_line = Some(callback);
        self
    }

    pub fn on_exit(mut self, callback: ExitCallback) -> Self {
        self.on_exit = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Log file of the most recent start.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    #[instrument(skip_all, fields(worker = %self.config.name))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("{} is already running", self.config.name);
        }
        self.threads.clear();
        self.ready_line = None;

        let log_path = self.open_log_path()?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("open worker log {}", log_path.display()))?;
        self.log_path = Some(log_path);

        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        info!(command = ?self.config.command, "starting worker");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(err = %e, "failed to spawn worker");
                return Err(e).with_context(|| format!("spawn {}", self.config.name));
            }
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;

        let (line_tx, line_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        self.threads.push(spawn_pump(stdout, line_tx.clone()));
        self.threads.push(spawn_pump(stderr, line_tx));

        let monitor = Monitor {
            name: self.config.name.clone(),
            log: BufWriter::new(log),
            ready_re: self.ready_re.clone(),
            callback_re: self.callback_re.clone(),
            on_line: self.on_line.clone(),
            on_exit: self.on_exit.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("{}-monitor", self.config.name))
            .spawn(move || monitor.run(line_rx, ready_tx))
            .context("spawn monitor thread")?;
        self.threads.push(handle);
        self.child = Some(child);

        self.await_ready(ready_rx)
    }

    fn await_ready(&mut self, ready_rx: Receiver<Readiness>) -> Result<()> {
        let outcome = match self.config.ready_timeout {
            Some(timeout) => ready_rx.recv_timeout(timeout),
            None => ready_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match outcome {
            Ok(Readiness::Ready(line)) => {
                info!(line = %line, "worker ready");
                self.ready_line = Some(line);
                Ok(())
            }
            Ok(Readiness::Exited) | Err(RecvTimeoutError::Disconnected) => {
                warn!("worker closed its output before becoming ready");
                self.reap()?;
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                let timeout = self.config.ready_timeout.unwrap_or_default();
                warn!(timeout_secs = timeout.as_secs(), "worker not ready in time, stopping");
                self.stop()?;
                Err(anyhow!(
                    "{} not ready after {}s",
                    self.config.name,
                    timeout.as_secs()
                ))
            }
        }
    }

    fn open_log_path(&self) -> Result<PathBuf> {
        let dir = self.config.log_dir.join(&self.config.name);
        fs::create_dir_all(&dir).with_context(|| format!("create log dir {}", dir.display()))?;
        Ok(dir.join(format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"))))
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | None => false,
            Some(Err(e)) => {
                warn!(err = %e, "failed to poll worker");
                false
            }
        }
    }

    pub fn ready_line(&self) -> Option<&str> {
        self.ready_line.as_deref()
    }

    /// Request termination, wait out the grace period, then kill. No-op when not running.
    #[instrument(skip_all, fields(worker = %self.config.name))]
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait().context("poll worker")?.is_none() {
            info!("stopping worker");
            request_termination(&mut child)?;
            match child
                .wait_timeout(self.config.stop_grace)
                .context("wait for worker")?
            {
                Some(status) => debug!(exit_code = ?status.code(), "worker exited"),
                None => {
                    warn!(
                        grace_secs = self.config.stop_grace.as_secs(),
                        "worker ignored termination, killing"
                    );
                    child.kill().context("kill worker")?;
                    child.wait().context("wait worker after kill")?;
                }
            }
        }
        // Output threads exit once every holder of the pipes is gone.
        self.threads.clear();
        Ok(())
    }

    /// Collect a process whose output already ended.
    fn reap(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        match child
            .wait_timeout(self.config.stop_grace)
            .context("wait for worker")?
        {
            Some(status) => {
                debug!(exit_code = ?status.code(), "worker exited");
                self.child = None;
                self.join_threads();
                Ok(())
            }
            None => self.stop(),
        }
    }

    fn join_threads(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("worker output thread panicked");
            }
        }
    }
}

impl WorkerProcess for Supervisor {
    fn start(&mut self) -> Result<()> {
        Supervisor::start(self)
    }

    fn stop(&mut self) -> Result<()> {
        Supervisor::stop(self)
    }

    fn is_running(&mut self) -> bool {
        Supervisor::is_running(self)
    }

    fn ready_line(&self) -> Option<&str> {
        Supervisor::ready_line(self)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(worker = %self.config.name, err = %e, "failed to stop worker on drop");
        }
    }
}

/// Ask the child to exit with SIGTERM, killing it if the signal cannot be sent.
#[cfg(unix)]
fn request_termination(child: &mut Child) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id()).context("worker pid out of range")?;
    if let Err(errno) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, err = %errno, "SIGTERM failed, killing");
        child.kill().context("kill worker")?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> Result<()> {
    child.kill().context("kill worker")
}

fn spawn_pump<R: Read + Send + 'static>(reader: R, lines: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if lines.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(err = %e, "failed to read worker output");
                    break;
                }
            }
        }
    })
}

struct Monitor {
    name: String,
    log: BufWriter<File>,
    ready_re: Regex,
    callback_re: Option<Regex>,
    on_line: Option<LineCallback>,
    on_exit: Option<ExitCallback>,
}

impl Monitor {
    fn run(mut self, lines: Receiver<String>, ready: Sender<Readiness>) {
        let mut ready = Some(ready);
        for line in lines {
            self.record(&line);
            if ready.is_some() && self.ready_re.is_match(&line) {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Readiness::Ready(line.clone()));
                }
            }
            if let (Some(re), Some(callback)) = (&self.callback_re, &self.on_line) {
                if re.is_match(&line) {
                    callback(&line);
                }
            }
        }
        if let Some(tx) = ready.take() {
            warn!(worker = %self.name, "worker failed to start");
            let _ = tx.send(Readiness::Exited);
        }
        debug!(worker = %self.name, "worker output closed");
        if let Some(callback) = &self.on_exit {
            callback();
        }
    }

    fn record(&mut self, line: &str) {
        debug!(worker = %self.name, "{line}");
        let stamped = format!(
            "{} - {} - {line}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            self.name
        );
        if let Err(e) = self.log.write_all(stamped.as_bytes()) {
            warn!(err = %e, "failed to write worker log");
        } else if let Err(e) = self.log.flush() {
            warn!(err = %e, "failed to flush worker log");
        }
    }
}
