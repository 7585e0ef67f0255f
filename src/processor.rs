//! The processor state machine: local clock, trace buffer, nonpreemptive
//! overhead accounting, and the cache-warmup execution-rate curve.

use std::rc::Rc;

use crate::prelude::*;

pub mod prelude {
    pub use super::{Processor, ProcessorParams, ScheduledSegment, Trace};
}

/// Fixed per-processor parameters (spec §3/§6).
#[derive(Clone, Copy, Debug)]
pub struct ProcessorParams {
    pub schedule_cost: u64,
    pub dispatch_cost: u64,
    pub preemption_cost: u64,
    /// `None` disables the cache-warmup curve (`execution_rate` stays 1).
    pub cache_warmup_time: Option<u64>,
    pub warm_cache_rate: f64,
}

impl Default for ProcessorParams {
    fn default() -> Self {
        Self {
            schedule_cost: 0,
            dispatch_cost: 0,
            preemption_cost: 0,
            cache_warmup_time: None,
            warm_cache_rate: 1.0,
        }
    }
}

/// A half-open `[start, end)` interval of one processor's trace.
///
/// Segments are coalesced on append: a new 1-tick slot for the same job
/// extends the previous segment's `end` rather than appending.
#[derive(Clone, Debug)]
pub struct ScheduledSegment {
    pub start: u64,
    pub end: u64,
    pub job: Rc<Job>,
    pub job_completed: bool,
}

impl std::fmt::Display for ScheduledSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} executing in [{}, {}]", self.job, self.start, self.end)
    }
}

/// The ordered sequence of [`ScheduledSegment`]s produced by one processor.
///
/// Equality is structural on `(start, end, task)` — same task identity, not
/// same job identity — so traces built from independently-regenerated jobs
/// of the same task system still compare equal.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    pub segments: Vec<ScheduledSegment>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_tick(&mut self, time: u64, job: Rc<Job>) {
        if let Some(last) = self.segments.last_mut() {
            if Rc::ptr_eq(&last.job, &job) && last.end == time {
                last.end = time + 1;
                return;
            }
        }
        self.segments.push(ScheduledSegment {
            start: time,
            end: time + 1,
            job,
            job_completed: false,
        });
    }

    fn mark_last_completed(&mut self) {
        if let Some(last) = self.segments.last_mut() {
            last.job_completed = true;
        }
    }

    fn clear(&mut self) {
        self.segments.clear();
    }
}

impl PartialEq for Trace {
    fn eq(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(other.segments.iter()).all(|(a, b)| {
                a.start == b.start && a.end == b.end && Rc::ptr_eq(&a.job.task, &b.job.task)
            })
    }
}

impl std::fmt::Display for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Owns a local clock, trace buffer, overhead parameters, and the current
/// cache-warmup execution rate.
pub struct Processor {
    pub time: u64,
    pub trace: Trace,
    pub execution_rate: f64,
    params: ProcessorParams,
}

impl Processor {
    pub fn new(params: ProcessorParams) -> Self {
        Self {
            time: 0,
            trace: Trace::new(),
            execution_rate: 1.0,
            params,
        }
    }

    pub fn warm_cache_rate(&self) -> f64 {
        self.params.warm_cache_rate
    }

    pub fn cache_warmup_time(&self) -> Option<u64> {
        self.params.cache_warmup_time
    }

    /// The job executed in the just-finished tick, or `None` if the
    /// processor idled through it.
    pub fn last_job_scheduled(&self) -> Option<Rc<Job>> {
        self.trace
            .segments
            .last()
            .filter(|segment| segment.end == self.time)
            .map(|segment| Rc::clone(&segment.job))
    }

    /// Advances the processor by one time unit executing `job`.
    ///
    /// Implements the six steps of spec §4.3: context-switch detection and
    /// overhead accrual, trace append (coalescing), clock advance,
    /// execution accounting, cache-warmup rate update, and completion
    /// marking.
    pub fn schedule_job(&mut self, job: Rc<Job>) {
        let last = self.last_job_scheduled();
        let switched = match &last {
            Some(previous) => !Rc::ptr_eq(previous, &job),
            None => true,
        };

        if switched {
            self.execution_rate = 1.0;
            let overhead = if !job.started() {
                self.params.schedule_cost + self.params.dispatch_cost
            } else if last.is_none() {
                self.params.dispatch_cost + self.params.preemption_cost
            } else {
                self.params.dispatch_cost + 2 * self.params.preemption_cost
            };
            job.add_overhead(overhead as f64);
        }

        self.trace.push_tick(self.time, Rc::clone(&job));
        self.time += 1;

        job.tick(self.execution_rate);

        if job.remaining_overhead() <= 0.0 {
            if let Some(warmup_time) = self.params.cache_warmup_time {
                let delta = (self.params.warm_cache_rate - 1.0) / warmup_time as f64;
                self.execution_rate += delta;
                self.execution_rate = if self.params.warm_cache_rate >= 1.0 {
                    self.execution_rate.min(self.params.warm_cache_rate)
                } else {
                    self.execution_rate.max(self.params.warm_cache_rate)
                };
            }
        }

        if job.has_completed() {
            self.trace.mark_last_completed();
        }
    }

    /// Advances the clock to `t` without appending to the trace.
    ///
    /// Precondition: `t >= self.time`.
    pub fn idle_until(&mut self, t: u64) {
        assert!(t >= self.time, "cannot idle backwards: {t} < {}", self.time);
        self.time = t;
    }

    pub fn reset(&mut self) {
        self.trace.clear();
        self.time = 0;
        self.execution_rate = 1.0;
    }
}
