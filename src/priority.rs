//! Time-dependent priority functions.
//!
//! A priority is `(job, t) -> real`; smaller means higher priority. Base
//! policies ([`BasePriority`]) compose with two orthogonal wrappers —
//! overhead-first and nonpreemptive — via [`PriorityPolicy`], matching the
//! "tagged-variant base policy plus a small decorator pipeline" shape rather
//! than a `dyn Fn` chain, so policies stay `Copy` and serializable for the
//! CLI registry.

use crate::prelude::*;

pub mod prelude {
    pub use super::{BasePriority, PriorityPolicy};
}

const TOLERANCE: f64 = 1e-10;
const PFAIR_EPSILON: f64 = 1e-7;

/// Is `candidate` strictly higher priority than `incumbent`, with the
/// `1e-10` tolerance that absorbs floating-point drift from the variable
/// execution rate? Ties (within tolerance) favor the incumbent.
pub fn strictly_better(candidate: f64, incumbent: f64) -> bool {
    candidate + TOLERANCE < incumbent
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BasePriority {
    #[value(name = "rm")]
    Rm,
    #[value(name = "dm")]
    Dm,
    #[value(name = "static")]
    Static,
    #[value(name = "edf")]
    Edf,
    #[value(name = "llf")]
    Llf,
    #[value(name = "pfair")]
    Pfair,
}

/// A base policy plus the overhead-first / nonpreemptive wrappers.
///
/// Construct via [`PriorityPolicy::new`] or one of the registry
/// constructors ([`PriorityPolicy::rm`], [`PriorityPolicy::np_edf`], ...)
/// matching spec §6's identifiers. Fields are private so the
/// Pfair-plus-overhead-first invariant enforced by [`PriorityPolicy::new`]
/// can't be bypassed by a struct literal.
#[derive(Clone, Copy, Debug)]
pub struct PriorityPolicy {
    base: BasePriority,
    overhead_first: bool,
    nonpreemptive: bool,
}

impl PriorityPolicy {
    pub fn new(
        base: BasePriority,
        overhead_first: bool,
        nonpreemptive: bool,
    ) -> Result<Self, SimError> {
        if base == BasePriority::Pfair && overhead_first {
            return Err(SimError::unsupported_config(
                "Pfair priority cannot be combined with the overhead-first wrapper",
            ));
        }
        Ok(Self {
            base,
            overhead_first,
            nonpreemptive,
        })
    }

    fn overhead_first_wrapped(base: BasePriority) -> Self {
        Self {
            base,
            overhead_first: true,
            nonpreemptive: false,
        }
    }

    pub fn rm() -> Self {
        Self::overhead_first_wrapped(BasePriority::Rm)
    }

    pub fn dm() -> Self {
        Self::overhead_first_wrapped(BasePriority::Dm)
    }

    pub fn static_priority() -> Self {
        Self::overhead_first_wrapped(BasePriority::Static)
    }

    pub fn edf() -> Self {
        Self::overhead_first_wrapped(BasePriority::Edf)
    }

    pub fn llf() -> Self {
        Self::overhead_first_wrapped(BasePriority::Llf)
    }

    pub fn pfair() -> Self {
        Self {
            base: BasePriority::Pfair,
            overhead_first: false,
            nonpreemptive: false,
        }
    }

    /// Wraps `self` in the nonpreemptive variant (the `NP_*` registry
    /// identifiers), pinning the CPU to a job once it has begun billable
    /// execution.
    pub fn nonpreemptive(mut self) -> Self {
        self.nonpreemptive = true;
        self
    }

    /// The base policy this value wraps.
    pub fn base(&self) -> BasePriority {
        self.base
    }

    pub fn is_overhead_first(&self) -> bool {
        self.overhead_first
    }

    pub fn is_nonpreemptive(&self) -> bool {
        self.nonpreemptive
    }

    /// Evaluates this policy for `job` at time `t`.
    ///
    /// Wrapper order mirrors the original composition
    /// (`make_nonpreemptive(handle_overhead(base))`): the nonpreemptive
    /// check runs first (outermost), then overhead-first, then the base
    /// policy.
    pub fn evaluate(&self, job: &Job, t: u64) -> Result<f64, SimError> {
        if self.nonpreemptive && job.remaining_cost() < job.cost as f64 {
            return Ok(f64::NEG_INFINITY);
        }
        if self.overhead_first && job.remaining_overhead() > 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        self.base_priority(job, t)
    }

    fn base_priority(&self, job: &Job, t: u64) -> Result<f64, SimError> {
        match self.base {
            BasePriority::Rm => Ok(job.task.period.as_f64()),
            BasePriority::Dm => Ok(job.task.relative_deadline.as_f64()),
            BasePriority::Static => job
                .task
                .id
                .map(|id| id as f64)
                .ok_or_else(|| SimError::missing_id(format!("{} has no id", job.task))),
            BasePriority::Edf => Ok(job.deadline.as_f64() - t as f64),
            BasePriority::Llf => Ok(job.deadline.as_f64() - t as f64 - job.remaining_cost()),
            BasePriority::Pfair => pfair_priority(job, t),
        }
    }
}

/// The Pfair quantum-based priority of §4.2.
///
/// Requires no pending overhead (the subtask index is only well-defined
/// once overhead has drained); fails with [`SimError::UnsupportedConfig`]
/// otherwise.
fn pfair_priority(job: &Job, t: u64) -> Result<f64, SimError> {
    if job.remaining_overhead() > 0.0 {
        return Err(SimError::unsupported_config(
            "Pfair priority cannot evaluate a job with pending overhead",
        ));
    }

    let deadline = job.deadline.as_f64();
    if job.remaining_cost() == deadline - t as f64 {
        return Ok(f64::NEG_INFINITY);
    }

    let task = &job.task;
    let k = job.cost as f64 - job.remaining_cost() + 1.0;
    let w = (task.cost as f64 / task.period.as_f64())
        .max(task.cost as f64 / task.relative_deadline.as_f64());

    let k_over_w = k / w;
    let pseudo_deadline = task.phase as f64 + k_over_w.ceil();
    let successor_bit = k_over_w.ceil() - k_over_w.floor();

    let group_deadline = if w == 1.0 {
        task.phase as f64 + task.relative_deadline.as_f64()
    } else {
        let scaled = (k_over_w.ceil() * (1.0 - w)).ceil();
        task.phase as f64 + (scaled / (1.0 - w)).ceil()
    };

    Ok(pseudo_deadline - successor_bit / 2.0 - PFAIR_EPSILON * group_deadline)
}
