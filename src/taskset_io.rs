//! Taskset file I/O: JSON via `serde_json` and a plain tuple-literal text
//! format, one task per line, matching the teacher's `taskset_serde` module.

use crate::prelude::*;
use crate::task::parse_time_span;

pub mod prelude {
    pub use super::{TasksetFileType, TasksetParseError, parse_taskset, render_trace};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TasksetFileType {
    Auto,
    Json,
    Plain,
}

#[derive(Debug)]
pub enum TasksetParseError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Plain(String),
}

impl std::fmt::Display for TasksetParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "taskset parse error: ")?;
        match self {
            TasksetParseError::Io(error) => write!(f, "io: {error}"),
            TasksetParseError::Json(error) => write!(f, "json: {error}"),
            TasksetParseError::Plain(error) => write!(f, "plain: {error}"),
        }
    }
}

impl std::error::Error for TasksetParseError {}

impl From<std::io::Error> for TasksetParseError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TasksetParseError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Reads and parses a taskset file, dispatching on `typ` or (when `Auto`)
/// on the file extension — `.json` for JSON, anything else for the plain
/// tuple-literal format.
pub fn parse_taskset(path: &str, typ: TasksetFileType) -> Result<Vec<Task>, TasksetParseError> {
    let extension = if typ == TasksetFileType::Auto {
        if path.ends_with(".json") {
            TasksetFileType::Json
        } else {
            TasksetFileType::Plain
        }
    } else {
        typ
    };

    let data = std::fs::read_to_string(path)?;

    match extension {
        TasksetFileType::Auto => unreachable!("Auto is resolved above"),
        TasksetFileType::Json => Ok(serde_json::from_str(&data)?),
        TasksetFileType::Plain => plain_deserialize_taskset(&data),
    }
}

fn plain_deserialize_taskset(data: &str) -> Result<Vec<Task>, TasksetParseError> {
    data.trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(plain_deserialize_task)
        .collect()
}

/// Parses one `(phase, period, cost, relative_deadline, id)` tuple-literal
/// line. `period`/`relative_deadline` accept `inf` for +infinity; `id` may
/// be omitted, in which case the tuple has 4 fields.
fn plain_deserialize_task(line: &str) -> Result<Task, TasksetParseError> {
    let trimmed = line.trim().trim_start_matches('(').trim_end_matches(')');
    let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();

    if fields.len() != 4 && fields.len() != 5 {
        return Err(TasksetParseError::Plain(format!(
            "expected 4 or 5 fields (phase, period, cost, relative_deadline[, id]), got {}",
            fields.len()
        )));
    }

    let phase: u64 = fields[0]
        .parse()
        .map_err(|err| TasksetParseError::Plain(format!("field 'phase': {err}")))?;
    let period = parse_time_span(fields[1]).map_err(TasksetParseError::Plain)?;
    let cost: u64 = fields[2]
        .parse()
        .map_err(|err| TasksetParseError::Plain(format!("field 'cost': {err}")))?;
    let relative_deadline = parse_time_span(fields[3]).map_err(TasksetParseError::Plain)?;
    let id = fields
        .get(4)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|err| TasksetParseError::Plain(format!("field 'id': {err}")))
        })
        .transpose()?;

    Task::new(phase, period, cost, Some(relative_deadline), id)
        .map_err(|err| TasksetParseError::Plain(err.to_string()))
}

/// Renders a trace in the human-readable format of spec §6: one
/// `ScheduledSegment` `Display` per line.
pub fn render_trace(trace: &Trace) -> String {
    trace.to_string()
}
