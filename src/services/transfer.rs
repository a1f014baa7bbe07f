use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tracing::{info, warn};

use crate::error::TransferError;

/// Copy leaves sources in place; move removes them on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

impl TransferMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Copy => "COPY",
            Self::Move => "MOVE",
        }
    }
}

/// Structured progress vs raw log lines from the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Progress,
    Log,
}

impl OutputMode {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Progress => "--progress",
            Self::Log => "--verbose-log",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Progress => "PROGRESS",
            Self::Log => "LOG",
        }
    }
}

/// Attached jobs block command dispatch until exit; detached jobs run in
/// the background with their output appended to the job log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Attached,
    Detached,
}

impl RunMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Attached => "ATTACHED",
            Self::Detached => "DETACHED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Succeeded,
    Failed(i32),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Parsed progress snapshot from the tool's machine-readable stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressInfo {
    pub transferred: u64,
    pub total: Option<u64>,
    pub percent: Option<u8>,
    pub current_file: Option<String>,
}

/// Event from a job's reader threads to the main loop.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Line(String),
    Progress(ProgressInfo),
}

/// A confirmed transfer ready to launch.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub run_mode: RunMode,
    pub output_mode: OutputMode,
}

/// The destination must not be one of the sources or live inside one,
/// otherwise the tool would copy/move a tree into itself.
pub fn validate_target(sources: &[PathBuf], destination: &Path) -> Result<(), TransferError> {
    if sources.is_empty() {
        return Err(TransferError::NoSources);
    }
    for source in sources {
        if destination == source || destination.starts_with(source) {
            return Err(TransferError::InvalidTarget {
                source_path: source.clone(),
                dest: destination.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// `<tool> {copy|move} <sources...> <destination> [--progress|--verbose-log]`
pub fn build_args(request: &TransferRequest) -> Vec<String> {
    let mut args = Vec::with_capacity(request.sources.len() + 3);
    args.push(request.mode.as_arg().to_string());
    for source in &request.sources {
        args.push(source.display().to_string());
    }
    args.push(request.destination.display().to_string());
    args.push(request.output_mode.as_flag().to_string());
    args
}

/// One launched copy/move process. Attached and detached jobs share the
/// lifecycle; they differ only in where output goes and who waits.
#[derive(Debug)]
pub struct TransferJob {
    pub request: TransferRequest,
    pub state: JobState,
    pub progress: ProgressInfo,
    child: Option<Child>,
    events: Option<Receiver<TransferEvent>>,
}

impl TransferJob {
    /// Spawn the external tool for `request`. Attached jobs stream their
    /// output back over a channel; detached jobs append to `detached_log`.
    pub fn launch(
        tool: &str,
        request: TransferRequest,
        detached_log: &Path,
    ) -> Result<Self, TransferError> {
        let args = build_args(&request);
        info!(tool, ?args, run_mode = request.run_mode.label(), "launching transfer");

        let mut command = Command::new(tool);
        command.args(&args).stdin(Stdio::null());

        let (child, events) = match request.run_mode {
            RunMode::Attached => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
                let mut child = spawn(command, tool)?;

                let (tx, rx) = mpsc::channel();
                if let Some(stdout) = child.stdout.take() {
                    spawn_reader(stdout, tx.clone(), request.output_mode);
                }
                if let Some(stderr) = child.stderr.take() {
                    spawn_reader(stderr, tx, request.output_mode);
                }
                (child, Some(rx))
            }
            RunMode::Detached => {
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(detached_log)
                    .map_err(|e| TransferError::LaunchFailed {
                        tool: tool.to_string(),
                        source: e,
                    })?;
                let log_err = log.try_clone().map_err(|e| TransferError::LaunchFailed {
                    tool: tool.to_string(),
                    source: e,
                })?;
                command.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
                (spawn(command, tool)?, None)
            }
        };

        Ok(Self {
            request,
            state: JobState::Running,
            progress: ProgressInfo::default(),
            child: Some(child),
            events,
        })
    }

    /// Drain any pending output events, folding progress snapshots into
    /// `self.progress`. Raw lines are returned for the output pane.
    pub fn drain_output(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(rx) = &self.events {
            while let Ok(event) = rx.try_recv() {
                match event {
                    TransferEvent::Line(line) => lines.push(line),
                    TransferEvent::Progress(info) => self.progress = info,
                }
            }
        }
        lines
    }

    /// Check whether the process has exited and update the job state.
    /// Returns true when the state changed to a terminal one.
    pub fn poll(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.state = match status.code() {
                    Some(0) => JobState::Succeeded,
                    Some(code) => JobState::Failed(code),
                    // Killed by signal: treat as operator cancellation
                    None => JobState::Cancelled,
                };
                info!(state = ?self.state, "transfer finished");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to poll transfer process");
                false
            }
        }
    }

    /// Forward a termination signal to the external process. Partial
    /// transfers are left as-is; the tool's own semantics apply. The job
    /// stays `Running` until `poll` observes the signal death, so the
    /// normal reap path runs.
    pub fn cancel(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };

        #[cfg(unix)]
        {
            let pid = child.id() as libc::pid_t;
            #[allow(unsafe_code)]
            let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
            if rc != 0 {
                let _ = child.kill();
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.kill();
        }

        info!("transfer cancel requested by operator");
    }

    /// Collect the tail of the output once the process has exited,
    /// blocking until the reader threads hit end-of-stream and drop their
    /// channel senders. Must only be called after `poll` reported a
    /// terminal state, otherwise this would stall on a live process.
    pub fn drain_remaining(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(rx) = self.events.take() {
            for event in rx.iter() {
                match event {
                    TransferEvent::Line(line) => lines.push(line),
                    TransferEvent::Progress(info) => self.progress = info,
                }
            }
        }
        lines
    }

    /// Release the process handle once the terminal state has been seen.
    pub fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        self.events = None;
    }
}

fn spawn(mut command: Command, tool: &str) -> Result<Child, TransferError> {
    command.spawn().map_err(|e| TransferError::LaunchFailed {
        tool: tool.to_string(),
        source: e,
    })
}

/// Read a process stream line by line, forwarding each as an event.
/// Progress mode additionally parses rclone-style stat lines; carriage
/// returns from in-place progress redrawing are treated as line breaks.
fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    tx: Sender<TransferEvent>,
    output_mode: OutputMode,
) {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            for segment in line.split('\r') {
                let segment = segment.trim_end();
                if segment.is_empty() {
                    continue;
                }
                let event = match output_mode {
                    OutputMode::Progress => match parse_progress_line(segment) {
                        Some(update) => TransferEvent::Progress(update),
                        None => TransferEvent::Line(segment.to_string()),
                    },
                    OutputMode::Log => TransferEvent::Line(segment.to_string()),
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
        }
    });
}

/// Parse one line of the tool's progress stream.
///
/// Recognized shapes (rclone's `--progress` output):
///   `Transferred:   1.234 MiB / 10 MiB, 12%, 1.2 MiB/s, ETA 7s`
///   ` * some/file.bin: 45% /1.2MiB, 300KiB/s, 2s`
pub fn parse_progress_line(line: &str) -> Option<ProgressInfo> {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix("Transferred:") {
        let mut parts = rest.split(',');
        let amounts = parts.next()?;
        let (done, total) = amounts.split_once('/')?;
        let transferred = parse_size(done.trim())?;
        let total = parse_size(total.trim());
        let percent = parts
            .next()
            .and_then(|p| p.trim().strip_suffix('%'))
            .and_then(|p| p.trim().parse::<u8>().ok());
        return Some(ProgressInfo {
            transferred,
            total,
            percent,
            current_file: None,
        });
    }

    if let Some(rest) = trimmed.strip_prefix('*') {
        let (name, stats) = rest.split_once(':')?;
        let percent = stats
            .trim()
            .split(|c| c == '%' || c == ' ')
            .find(|s| !s.is_empty())
            .and_then(|p| p.parse::<u8>().ok());
        return Some(ProgressInfo {
            transferred: 0,
            total: None,
            percent,
            current_file: Some(name.trim().to_string()),
        });
    }

    None
}

/// Parse a size token such as `120 B`, `1.234 KiB` or `10 MiB` into bytes.
fn parse_size(token: &str) -> Option<u64> {
    let mut split = token.split_whitespace();
    let value: f64 = split.next()?.parse().ok()?;
    let multiplier: f64 = match split.next().unwrap_or("B") {
        "B" | "Byte" | "Bytes" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}
