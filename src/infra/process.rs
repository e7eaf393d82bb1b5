//! External process execution
//!
//! Runs build tools as child processes, keeping only the trailing lines of
//! their combined stdout/stderr. Children are killed when the returned future
//! is dropped, so wrapping a call in `tokio::time::timeout` terminates the
//! tool on expiry.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::ProcessError;

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Invocation of `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and output excerpt of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Whether the process exited successfully
    pub success: bool,
    /// Exit code, `None` if terminated by a signal
    pub status: Option<i32>,
    /// Last lines of combined output, oldest first
    pub tail: Vec<String>,
}

/// Bounded buffer keeping the most recent lines
#[derive(Debug)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl TailBuffer {
    /// Buffer keeping at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Add a line, evicting the oldest when full
    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Retained lines, oldest first
    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Run `spec` in `cwd` and capture the last `tail_lines` lines of output
pub async fn run_captured(
    spec: &CommandSpec,
    cwd: &Path,
    tail_lines: usize,
) -> Result<CapturedOutput, ProcessError> {
    tracing::debug!(cwd = %cwd.display(), "Running: {spec}");

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProcessError::Spawn {
            program: spec.program.clone(),
            error: e.to_string(),
        })?;

    let tail = Mutex::new(TailBuffer::new(tail_lines));
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (out_result, err_result, status) = tokio::join!(
        drain(stdout, &tail),
        drain(stderr, &tail),
        child.wait()
    );

    let io_error = |e: std::io::Error| ProcessError::Io {
        program: spec.program.clone(),
        error: e.to_string(),
    };
    out_result.map_err(io_error)?;
    err_result.map_err(io_error)?;
    let status = status.map_err(io_error)?;

    let tail = tail
        .into_inner()
        .map(TailBuffer::into_lines)
        .unwrap_or_default();

    Ok(CapturedOutput {
        success: status.success(),
        status: status.code(),
        tail,
    })
}

/// Read a stream to the end, pushing each line into `tail`
async fn drain<R>(reader: Option<R>, tail: &Mutex<TailBuffer>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        // Tool output is not guaranteed to be UTF-8
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        tracing::trace!("{line}");
        if let Ok(mut tail) = tail.lock() {
            tail.push(line);
        }
    }
    Ok(())
}
