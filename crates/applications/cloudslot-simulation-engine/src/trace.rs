//! Cluster trace ingestion
//!
//! Reads `task_events` records of the Google cluster trace and condenses
//! them into one summary per task:
//! - first submission (priority, scheduling class, time)
//! - last schedule time and finish time
//! - whether the task was ever resubmitted
//!
//! Only tasks that were submitted during the monitoring window, scheduled,
//! finished and never resubmitted are kept.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};

/// Trace event kinds, in the order of their numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Submit,
    Schedule,
    Evict,
    Fail,
    Finish,
    Kill,
    Lost,
    UpdatePending,
    UpdateRunning,
}

impl EventType {
    const ALL: [EventType; 9] = [
        EventType::Submit,
        EventType::Schedule,
        EventType::Evict,
        EventType::Fail,
        EventType::Finish,
        EventType::Kill,
        EventType::Lost,
        EventType::UpdatePending,
        EventType::UpdateRunning,
    ];

    pub fn from_code(code: usize) -> Option<EventType> {
        Self::ALL.get(code).copied()
    }
}

/// A task is identified by its job and its index inside the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub job_id: u64,
    pub task_index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    /// Microseconds since the start of the trace
    pub timestamp: i64,
    pub id: TaskId,
    pub event_type: EventType,
    pub scheduling_class: usize,
    pub priority: i32,
}

fn field<T: FromStr>(fields: &[&str], index: usize, name: &str) -> std::result::Result<T, String> {
    let raw = fields
        .get(index)
        .ok_or_else(|| format!("missing field {} ({})", index, name))?;
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid {} '{}'", name, raw))
}

impl TaskEvent {
    /// Parse one comma-separated `task_events` record
    pub fn from_csv_line(line: &str) -> std::result::Result<TaskEvent, String> {
        let fields: Vec<&str> = line.split(',').collect();
        let code: usize = field(&fields, 5, "event type")?;
        Ok(TaskEvent {
            timestamp: field(&fields, 0, "timestamp")?,
            id: TaskId {
                job_id: field(&fields, 2, "job id")?,
                task_index: field(&fields, 3, "task index")?,
            },
            event_type: EventType::from_code(code)
                .ok_or_else(|| format!("unknown event type {}", code))?,
            scheduling_class: field(&fields, 7, "scheduling class")?,
            priority: field(&fields, 8, "priority")?,
        })
    }
}

/// Everything the input generator needs to know about one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEventsSummary {
    pub priority: i32,
    pub scheduling_class: usize,
    pub first_submission_time: i64,
    pub last_schedule_time: Option<i64>,
    pub finish_time: Option<i64>,
    pub was_resubmitted: bool,
}

impl TaskEventsSummary {
    fn submitted(event: &TaskEvent) -> Self {
        TaskEventsSummary {
            priority: event.priority,
            scheduling_class: event.scheduling_class,
            first_submission_time: event.timestamp,
            last_schedule_time: None,
            finish_time: None,
            was_resubmitted: false,
        }
    }

    /// Time between the last schedule and the finish, if both happened
    pub fn run_time(&self) -> Option<i64> {
        Some(self.finish_time? - self.last_schedule_time?)
    }
}

/// Condense events into the summaries of usable tasks.
///
/// The result is ordered by first submission time, then task id.
pub fn summarize<I>(events: I) -> Vec<TaskEventsSummary>
where
    I: IntoIterator<Item = TaskEvent>,
{
    let mut summaries: HashMap<TaskId, TaskEventsSummary> = HashMap::new();

    for event in events {
        match event.event_type {
            EventType::Submit => {
                summaries
                    .entry(event.id)
                    .and_modify(|summary| summary.was_resubmitted = true)
                    .or_insert_with(|| TaskEventsSummary::submitted(&event));
            }
            EventType::Finish => {
                if let Some(summary) = summaries.get_mut(&event.id) {
                    summary.finish_time = Some(event.timestamp);
                }
            }
            EventType::Schedule => {
                if let Some(summary) = summaries.get_mut(&event.id) {
                    summary.last_schedule_time = Some(event.timestamp);
                }
            }
            _ => {}
        }
    }

    info!(tasks = summaries.len(), "Total number of tasks");
    summaries.retain(|_, summary| summary.first_submission_time > 0);
    info!(tasks = summaries.len(), "Tasks submitted after the trace start");
    // Some tasks finish without ever being scheduled
    summaries.retain(|_, summary| summary.last_schedule_time.is_some() && summary.finish_time.is_some());
    info!(tasks = summaries.len(), "Tasks that finished");
    summaries.retain(|_, summary| !summary.was_resubmitted);
    info!(tasks = summaries.len(), "Tasks that were not resubmitted");

    let mut kept: Vec<(TaskId, TaskEventsSummary)> = summaries.into_iter().collect();
    kept.sort_by_key(|(id, summary)| (summary.first_submission_time, *id));
    kept.into_iter().map(|(_, summary)| summary).collect()
}

/// Parse every non-empty line of a `task_events` CSV stream
pub fn read_events<R: BufRead>(reader: R) -> Result<Vec<TaskEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event =
            TaskEvent::from_csv_line(&line).map_err(|reason| EngineError::trace(index + 1, reason))?;
        events.push(event);
    }
    Ok(events)
}

pub fn write_summaries(path: &Path, summaries: &[TaskEventsSummary]) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, summaries)?;
    info!(path = %path.display(), count = summaries.len(), "Summaries written");
    Ok(())
}

pub fn read_summaries(path: &Path) -> Result<Vec<TaskEventsSummary>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
