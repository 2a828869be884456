//! Process supervisor tests against small `sh` scripts.
#![cfg(unix)]

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use voyage::io::process::{Supervisor, SupervisorConfig, WorkerProcess};

fn config(dir: &std::path::Path, script: &str) -> SupervisorConfig {
    SupervisorConfig {
        name: "worker".to_string(),
        command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        ready_pattern: r"Server started on port (\d+)".to_string(),
        callback_pattern: Some("^event:".to_string()),
        log_dir: dir.to_path_buf(),
        ready_timeout: Some(Duration::from_secs(5)),
        stop_grace: Duration::from_secs(2),
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn start_returns_after_ready_line() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut worker = Supervisor::new(config(
        temp.path(),
        "echo booting; echo 'Server started on port 3000'; exec sleep 30",
    ))
    .expect("supervisor");

    worker.start().expect("start");
    assert!(worker.is_running());
    assert_eq!(worker.ready_line(), Some("Server started on port 3000"));
    assert!(worker.start().is_err(), "second start while running");

    worker.stop().expect("stop");
    assert!(!worker.is_running());
}

#[test]
fn readiness_may_come_from_stderr() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut worker = Supervisor::new(config(
        temp.path(),
        "echo 'Server started on port 3001' >&2; exec sleep 30",
    ))
    .expect("supervisor");
    worker.start().expect("start");
    assert_eq!(worker.ready_line(), Some("Server started on port 3001"));
    worker.stop().expect("stop");
}

/// Verifies an early exit is reported as not running rather than an error.
#[test]
fn early_exit_leaves_worker_stopped() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&exits);
    let mut worker = Supervisor::new(config(temp.path(), "echo 'fatal: no world'; exit 1"))
        .expect("supervisor")
        .on_exit(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

    worker.start().expect("start returns");
    assert!(!worker.is_running());
    assert_eq!(worker.ready_line(), None);
    assert!(wait_for(|| exits.load(Ordering::SeqCst) == 1));
}

#[test]
fn ready_timeout_stops_the_process() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = config(temp.path(), "echo still loading; exec sleep 30");
    cfg.ready_timeout = Some(Duration::from_millis(300));
    let mut worker = Supervisor::new(cfg).expect("supervisor");

    let err = worker.start().expect_err("timeout");
    assert!(err.to_string().contains("not ready"));
    assert!(!worker.is_running());
}

#[test]
fn matching_lines_invoke_callback() {
    let temp = tempfile::tempdir().expect("tempdir");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let mut worker = Supervisor::new(config(
        temp.path(),
        "echo 'Server started on port 3000'; echo 'event: a'; echo 'other'; echo 'event: b'; exec sleep 30",
    ))
    .expect("supervisor")
    .on_line(Arc::new(move |_line: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    worker.start().expect("start");
    assert!(wait_for(|| hits.load(Ordering::SeqCst) == 2));
    worker.stop().expect("stop");
}

/// Verifies stop delivers SIGTERM so the worker can shut down on its own.
#[test]
fn stop_sends_sigterm_before_killing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let marker = temp.path().join("terminated");
    let script = format!(
        "trap 'echo bye > {}; exit 0' TERM; echo 'Server started on port 3000'; while true; do sleep 0.1; done",
        marker.display()
    );
    let mut worker = Supervisor::new(config(temp.path(), &script)).expect("supervisor");
    worker.start().expect("start");

    let started = Instant::now();
    worker.stop().expect("stop");
    assert!(!worker.is_running());
    assert!(started.elapsed() < Duration::from_secs(2), "worker was killed after the grace period");
    assert_eq!(fs::read_to_string(&marker).expect("marker").trim(), "bye");
}

#[test]
fn stop_without_start_is_a_no_op() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut worker = Supervisor::new(config(temp.path(), "exec sleep 30")).expect("supervisor");
    worker.stop().expect("stop");
    WorkerProcess::stop(&mut worker).expect("stop again");
}

#[test]
fn output_is_logged_with_timestamp_and_name() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut worker = Supervisor::new(config(
        temp.path(),
        "echo hello; echo 'Server started on port 3000'; exec sleep 30",
    ))
    .expect("supervisor");
    worker.start().expect("start");
    let log_path = worker.log_path().expect("log path").to_path_buf();
    worker.stop().expect("stop");

    assert!(log_path.starts_with(temp.path().join("worker")));
    let log = fs::read_to_string(&log_path).expect("read log");
    let first = log.lines().next().expect("first line");
    assert!(first.ends_with(" - worker - hello"), "{first}");
    assert!(log.contains(" - worker - Server started on port 3000"));
}

#[test]
fn invalid_ready_pattern_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = config(temp.path(), "true");
    cfg.ready_pattern = "(".to_string();
    assert!(Supervisor::new(cfg).is_err());
}
