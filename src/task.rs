//! Periodic task model: tasks, their released jobs, and task systems.

use std::cell::Cell;
use std::rc::Rc;

use crate::prelude::*;

pub mod prelude {
    pub use super::{Job, Task, TaskSystem, TimeSpan};
}

/// An integer point in simulated time, or +infinity.
///
/// Tasks may have an infinite period (one-shot jobs); a task's relative
/// deadline may independently be infinite. [`Task::new`] enforces that both
/// are never infinite at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeSpan {
    Finite(u64),
    Infinite,
}

impl TimeSpan {
    pub fn finite(self) -> Option<u64> {
        match self {
            TimeSpan::Finite(v) => Some(v),
            TimeSpan::Infinite => None,
        }
    }

    pub fn is_infinite(self) -> bool {
        matches!(self, TimeSpan::Infinite)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            TimeSpan::Finite(v) => v as f64,
            TimeSpan::Infinite => f64::INFINITY,
        }
    }

    /// Adds a finite offset, saturating to infinity.
    pub fn saturating_add(self, offset: u64) -> TimeSpan {
        match self {
            TimeSpan::Finite(v) => TimeSpan::Finite(v + offset),
            TimeSpan::Infinite => TimeSpan::Infinite,
        }
    }

    /// Is `t` strictly past this span, treated as an absolute deadline?
    pub fn exceeded_by(self, t: u64) -> bool {
        match self {
            TimeSpan::Finite(d) => t > d,
            TimeSpan::Infinite => false,
        }
    }
}

impl From<u64> for TimeSpan {
    fn from(value: u64) -> Self {
        TimeSpan::Finite(value)
    }
}

impl std::fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSpan::Finite(v) => write!(f, "{v}"),
            TimeSpan::Infinite => write!(f, "inf"),
        }
    }
}

impl serde::Serialize for TimeSpan {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for TimeSpan {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_time_span(raw.trim()).map_err(serde::de::Error::custom)
    }
}

pub fn parse_time_span(raw: &str) -> Result<TimeSpan, String> {
    match raw {
        "inf" | "Inf" | "INF" | "infinite" => Ok(TimeSpan::Infinite),
        value => value
            .parse::<u64>()
            .map(TimeSpan::Finite)
            .map_err(|err| format!("invalid time span '{value}': {err}")),
    }
}

/// An immutable periodic (or one-shot) task.
///
/// Constructed once via [`Task::new`], which enforces every invariant of the
/// task model; never mutated afterwards.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub phase: u64,
    pub period: TimeSpan,
    pub cost: u64,
    pub relative_deadline: TimeSpan,
    pub id: Option<u64>,
}

impl Task {
    /// Builds a task, defaulting `relative_deadline` to `period` when absent.
    ///
    /// Fails with [`SimError::InvalidTask`] on a non-positive/missing period
    /// or cost, a non-positive relative deadline, or an infinite period
    /// paired with an infinite relative deadline.
    pub fn new(
        phase: u64,
        period: TimeSpan,
        cost: u64,
        relative_deadline: Option<TimeSpan>,
        id: Option<u64>,
    ) -> Result<Self, SimError> {
        let relative_deadline = relative_deadline.unwrap_or(period);

        match period {
            TimeSpan::Finite(0) => {
                return Err(SimError::invalid_task("task period must be positive"));
            }
            _ => {}
        }
        if cost == 0 {
            return Err(SimError::invalid_task("task cost must be positive"));
        }
        if let TimeSpan::Finite(0) = relative_deadline {
            return Err(SimError::invalid_task(
                "task relative deadline must be positive",
            ));
        }
        if period.is_infinite() && relative_deadline.is_infinite() {
            return Err(SimError::invalid_task(
                "a one-shot task (infinite period) cannot have an infinite relative deadline",
            ));
        }

        Ok(Self {
            phase,
            period,
            cost,
            relative_deadline,
            id,
        })
    }

    pub fn utilization(&self) -> f64 {
        self.cost as f64 / self.period.as_f64()
    }

    pub fn density(&self) -> f64 {
        self.cost as f64 / self.relative_deadline.as_f64()
    }

    pub fn has_implicit_deadline(&self) -> bool {
        self.relative_deadline == self.period
    }

    /// Returns the jobs this task releases up to (and including) `final_time`.
    pub fn generate_jobs(&self, final_time: u64, task: &Rc<Task>) -> Vec<Rc<Job>> {
        match self.period {
            TimeSpan::Infinite => {
                if self.phase <= final_time {
                    vec![Job::new(
                        self.phase,
                        self.cost,
                        self.relative_deadline.saturating_add(self.phase),
                        Rc::clone(task),
                    )]
                } else {
                    Vec::new()
                }
            }
            TimeSpan::Finite(period) => {
                if self.phase > final_time {
                    return Vec::new();
                }
                let num_releases = (final_time - self.phase) / period + 1;
                (0..num_releases)
                    .map(|k| {
                        let release = self.phase + k * period;
                        let deadline = self.relative_deadline.saturating_add(release);
                        Job::new(release, self.cost, deadline, Rc::clone(task))
                    })
                    .collect()
            }
        }
    }

    /// Rescales `cost` to `max(1, floor(weight * cost))`, used by the
    /// breakdown-density search. All other fields are preserved unchanged,
    /// so the result is still a valid task.
    pub fn rescaled(&self, weight: f64) -> Task {
        let cost = (1u64).max((weight * self.cost as f64).floor() as u64);
        Task {
            phase: self.phase,
            period: self.period,
            cost,
            relative_deadline: self.relative_deadline,
            id: self.id,
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id_string = match self.id {
            Some(id) => format!("{id} "),
            None => String::new(),
        };

        if self.phase != 0 {
            write!(
                f,
                "Task {id_string}(phi={}, T={}, C={}, D={})",
                self.phase, self.period, self.cost, self.relative_deadline
            )
        } else if self.period == self.relative_deadline {
            write!(f, "Task {id_string}(T={}, C={})", self.period, self.cost)
        } else {
            write!(
                f,
                "Task {id_string}(T={}, C={}, D={})",
                self.period, self.cost, self.relative_deadline
            )
        }
    }
}

/// A single release of a [`Task`].
///
/// `remaining_cost`/`remaining_overhead`/`started` use interior mutability:
/// a job is shared (via `Rc`) between the scheduler's released-job set and
/// the trace segments that record its execution, and only the owning
/// [`Processor`](crate::processor::Processor) ever mutates this state.
#[derive(Debug)]
pub struct Job {
    pub release: u64,
    pub cost: u64,
    pub deadline: TimeSpan,
    pub task: Rc<Task>,
    remaining_cost: Cell<f64>,
    remaining_overhead: Cell<f64>,
    started: Cell<bool>,
}

impl Job {
    pub fn new(release: u64, cost: u64, deadline: TimeSpan, task: Rc<Task>) -> Rc<Job> {
        Rc::new(Job {
            release,
            cost,
            deadline,
            task,
            remaining_cost: Cell::new(cost as f64),
            remaining_overhead: Cell::new(0.0),
            started: Cell::new(false),
        })
    }

    pub fn remaining_cost(&self) -> f64 {
        self.remaining_cost.get()
    }

    pub fn remaining_overhead(&self) -> f64 {
        self.remaining_overhead.get()
    }

    pub fn started(&self) -> bool {
        self.started.get()
    }

    pub fn has_completed(&self) -> bool {
        self.remaining_cost.get() <= 0.0
    }

    pub(crate) fn add_overhead(&self, amount: f64) {
        self.remaining_overhead.set(self.remaining_overhead.get() + amount);
    }

    /// Executes one tick at `execution_rate`: overhead drains at full speed
    /// before any billable cost is consumed. Always marks the job started.
    pub(crate) fn tick(&self, execution_rate: f64) {
        self.started.set(true);
        if self.remaining_overhead.get() > 0.0 {
            self.remaining_overhead.set(self.remaining_overhead.get() - 1.0);
        } else {
            self.remaining_cost.set(self.remaining_cost.get() - execution_rate);
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Job (release={}, cost={}, deadline={}) from {}",
            self.release, self.cost, self.deadline, self.task
        )
    }
}

/// An ordered collection of tasks with a cached hyperperiod.
#[derive(Clone, Debug)]
pub struct TaskSystem {
    pub tasks: Vec<Rc<Task>>,
    hyperperiod: u64,
}

impl TaskSystem {
    pub fn new(tasks: Vec<Task>) -> TaskSystem {
        Self::from_rc(tasks.into_iter().map(Rc::new).collect())
    }

    fn from_rc(tasks: Vec<Rc<Task>>) -> TaskSystem {
        let hyperperiod = compute_hyperperiod(&tasks);
        TaskSystem { tasks, hyperperiod }
    }

    pub fn utilization(&self) -> f64 {
        self.tasks.iter().map(|t| t.utilization()).sum()
    }

    pub fn density(&self) -> f64 {
        self.tasks.iter().map(|t| t.density()).sum()
    }

    pub fn hyperperiod(&self) -> u64 {
        self.hyperperiod
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn generate_jobs(&self, final_time: u64) -> Vec<Rc<Job>> {
        self.tasks
            .iter()
            .flat_map(|task| task.generate_jobs(final_time, task))
            .collect()
    }

    /// Returns a copy of this system with every task's cost scaled to
    /// `max(1, floor(weight * cost))`. Periods are unchanged, so the
    /// hyperperiod is reused rather than recomputed.
    pub fn rescaled(&self, weight: f64) -> TaskSystem {
        let tasks = self
            .tasks
            .iter()
            .map(|t| Rc::new(t.rescaled(weight)))
            .collect();
        TaskSystem {
            tasks,
            hyperperiod: self.hyperperiod,
        }
    }
}

impl std::fmt::Display for TaskSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Task System with {} tasks, hyperperiod={}",
            self.tasks.len(),
            self.hyperperiod
        )?;
        for task in &self.tasks {
            write!(f, "\n  {task}")?;
        }
        Ok(())
    }
}

fn compute_hyperperiod(tasks: &[Rc<Task>]) -> u64 {
    if tasks.is_empty() {
        return 0;
    }
    tasks
        .iter()
        .filter_map(|task| task.period.finite())
        .fold(1, |lcm, period| num::integer::lcm(lcm, period))
}
