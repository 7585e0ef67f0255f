//! Error taxonomy for the simulation core.
//!
//! Scheduling a deadline miss is not an error — [`generate_schedule`] returns
//! `schedulable = false` with the partial trace for inspection. `SimError`
//! covers only the fatal conditions of spec §7: invalid task parameters,
//! static priority on an id-less task, and unsupported priority/processor
//! combinations.
//!
//! [`generate_schedule`]: crate::scheduler::Scheduler::generate_schedule

#[derive(Debug)]
pub enum SimError {
    InvalidTask(anyhow::Error),
    MissingId(anyhow::Error),
    UnsupportedConfig(anyhow::Error),
    NonConverged,
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTask(error) => write!(f, "invalid task: {error}"),
            Self::MissingId(error) => write!(f, "missing task id: {error}"),
            Self::UnsupportedConfig(error) => write!(f, "unsupported configuration: {error}"),
            Self::NonConverged => write!(f, "breakdown-density search did not converge"),
        }
    }
}

impl std::error::Error for SimError {}

impl SimError {
    pub fn invalid_task(reason: impl std::fmt::Display) -> Self {
        Self::InvalidTask(anyhow::format_err!("{reason}"))
    }

    pub fn missing_id(reason: impl std::fmt::Display) -> Self {
        Self::MissingId(anyhow::format_err!("{reason}"))
    }

    pub fn unsupported_config(reason: impl std::fmt::Display) -> Self {
        Self::UnsupportedConfig(anyhow::format_err!("{reason}"))
    }
}
