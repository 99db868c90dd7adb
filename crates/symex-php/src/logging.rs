//! Run log for symbolic execution
//!
//! Records which units were entered and left, parse results, recoverable
//! problems and timing, so a run over legacy code can be followed after
//! the fact. Nothing is written unless a log file was opened.
//!
//! Lines are collected per run on the executing thread and written to the
//! file as one block when the run finishes, so roots executed in parallel
//! never interleave.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use symex_core::{CompletionError, Flow};

/// Open log file shared by every run in the process
static SINK: Mutex<Option<LogSink>> = Mutex::new(None);

thread_local! {
    /// The run executing on this thread, when logging is on
    static CURRENT: RefCell<Option<RunLog>> = const { RefCell::new(None) };
}

/// Destination file for finished runs
struct LogSink {
    file: File,
}

impl LogSink {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    fn write_block(&mut self, lines: &[String]) -> std::io::Result<()> {
        let mut block = String::new();
        for line in lines {
            block.push_str(line);
            block.push('\n');
        }
        self.file.write_all(block.as_bytes())?;
        self.file.flush()
    }
}

/// Timestamped lines of one run, in the order they were recorded
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, message: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.lines.push(format!("[{}] {}", timestamp, message));
    }

    pub fn section(&mut self, title: &str) {
        let separator = "=".repeat(60);
        self.line(&separator);
        self.line(title);
        self.line(&separator);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Open the log file, defaulting to a timestamped file in /tmp
pub fn init_logger(log_path: Option<&Path>) -> std::io::Result<PathBuf> {
    let path = log_path.map(Path::to_path_buf).unwrap_or_else(|| {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(format!("/tmp/symex-{}.log", timestamp))
    });

    let sink = LogSink::open(&path)?;
    if let Ok(mut guard) = SINK.lock() {
        *guard = Some(sink);
    }
    Ok(path)
}

/// Close the log file; runs finishing afterwards are not recorded
pub fn shutdown_logger() {
    if let Ok(mut guard) = SINK.lock() {
        *guard = None;
    }
}

fn sink_open() -> bool {
    SINK.lock().map(|guard| guard.is_some()).unwrap_or(false)
}

/// Whether the run on this thread is being recorded
pub fn is_enabled() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

fn with_run(f: impl FnOnce(&mut RunLog)) {
    CURRENT.with(|current| {
        if let Some(run) = current.borrow_mut().as_mut() {
            f(run);
        }
    });
}

pub fn log(message: &str) {
    with_run(|run| run.line(message));
}

/// Start recording a run on this thread
pub fn log_run_start(root: &Path) {
    if !sink_open() {
        return;
    }
    let mut run = RunLog::new();
    run.section("SYMBOLIC EXECUTION");
    run.line(&format!("Root unit: {}", root.display()));
    CURRENT.with(|current| *current.borrow_mut() = Some(run));
}

pub fn log_unit_enter(path: &Path, depth: usize) {
    if !is_enabled() {
        return;
    }
    log(&format!("{}> {}", "  ".repeat(depth), path.display()));
}

pub fn log_unit_exit(path: &Path, depth: usize, flow: &Flow) {
    if !is_enabled() {
        return;
    }
    let marker = if flow.is_exit() {
        " (exit)".to_string()
    } else {
        match flow.exit_condition() {
            condition if condition.is_false() => String::new(),
            condition => format!(" (exit if {})", condition),
        }
    };
    log(&format!("{}< {}{}", "  ".repeat(depth), path.display(), marker));
}

pub fn log_unit_parsed(path: &Path, result: Result<usize, &str>) {
    match result {
        Ok(statements) => log(&format!(
            "Parsed {} ({} statements)",
            path.display(),
            statements
        )),
        Err(message) => log(&format!("FAILED to parse {}: {}", path.display(), message)),
    }
}

pub fn log_completion_error(error: &CompletionError) {
    log(&format!("  {}", error));
}

/// Close the run on this thread and append it to the log file
pub fn log_run_finished(root: &Path, elapsed: Duration, units: usize, errors: usize) {
    let Some(mut run) = CURRENT.with(|current| current.borrow_mut().take()) else {
        return;
    };
    run.section("RUN COMPLETE");
    run.line(&format!("Root unit: {}", root.display()));
    run.line(&format!("Units parsed: {}", units));
    run.line(&format!("Completion errors: {}", errors));
    run.line(&format!("Elapsed: {:.3}s", elapsed.as_secs_f64()));

    if let Ok(mut guard) = SINK.lock() {
        if let Some(sink) = guard.as_mut() {
            let _ = sink.write_block(run.lines());
        }
    }
}
