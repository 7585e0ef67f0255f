pub mod prelude {
    pub use super::Args;
}

const DEFAULT_AFTER_HELP: &str = "Refer to the crate's documentation for further help";

#[derive(clap::Parser, Debug)]
#[command(after_help=DEFAULT_AFTER_HELP)]
pub struct Args {
    /// Quiet mode / Exit code as schedulability result
    ///
    /// When enabled, a zero exit code means schedulable, a one means a
    /// deadline was missed, any other code means that an error has happened.
    #[arg(short = 'q', default_value = "false", action = clap::ArgAction::SetTrue)]
    pub quiet: bool,

    #[command(flatten, next_help_heading = "Scheduling Policy")]
    pub policy: PolicyArgs,

    #[command(flatten, next_help_heading = "Processor Model")]
    pub processor: ProcessorArgs,

    #[command(flatten, next_help_heading = "Taskset Specification")]
    pub taskset: TasksetArgs,

    #[command(flatten, next_help_heading = "Breakdown Density Search")]
    pub breakdown: BreakdownArgs,
}

#[derive(clap::Args, Debug)]
pub struct PolicyArgs {
    /// Scheduling policy registry identifier
    #[arg(short = 'a', long = "algorithm", value_name = "IDENTIFIER")]
    pub algorithm: RegistryIdentifier,

    /// Number of processors
    #[arg(short = 'n', long = "cpus", value_name = "# CPUs", default_value = "1")]
    pub num_processors: u64,

    /// Overrides the computed simulation horizon
    #[arg(long = "final-time", value_name = "TICKS")]
    pub final_time: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RegistryIdentifier {
    #[value(name = "G-EDF")]
    GEdf,
    #[value(name = "G-LLF")]
    GLlf,
    #[value(name = "G-RM")]
    GRm,
    #[value(name = "G-DM")]
    GDm,
    #[value(name = "GR-EDF")]
    GrEdf,
    #[value(name = "GR-LLF")]
    GrLlf,
    #[value(name = "GR-RM")]
    GrRm,
    #[value(name = "GR-DM")]
    GrDm,
    #[value(name = "G-NP_EDF")]
    GNpEdf,
    #[value(name = "G-NP_LLF")]
    GNpLlf,
    #[value(name = "G-NP_RM")]
    GNpRm,
    #[value(name = "G-NP_DM")]
    GNpDm,
}

impl RegistryIdentifier {
    /// Resolves this identifier into a `(priority policy, restrict_migration)`
    /// pair per spec §6: `G-*` allows migration, `GR-*` restricts it, and
    /// `G-NP_*` wraps the base policy nonpreemptive while still migrating.
    pub fn resolve(self) -> (rtsim_core::prelude::PriorityPolicy, bool) {
        use rtsim_core::prelude::PriorityPolicy as P;
        use RegistryIdentifier::*;

        match self {
            GEdf => (P::edf(), false),
            GLlf => (P::llf(), false),
            GRm => (P::rm(), false),
            GDm => (P::dm(), false),
            GrEdf => (P::edf(), true),
            GrLlf => (P::llf(), true),
            GrRm => (P::rm(), true),
            GrDm => (P::dm(), true),
            GNpEdf => (P::edf().nonpreemptive(), false),
            GNpLlf => (P::llf().nonpreemptive(), false),
            GNpRm => (P::rm().nonpreemptive(), false),
            GNpDm => (P::dm().nonpreemptive(), false),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ProcessorArgs {
    /// Nonpreemptive scheduling overhead charged on first dispatch
    #[arg(long = "schedule-cost", value_name = "TICKS", default_value = "0")]
    pub schedule_cost: u64,

    /// Nonpreemptive overhead charged on every dispatch
    #[arg(long = "dispatch-cost", value_name = "TICKS", default_value = "0")]
    pub dispatch_cost: u64,

    /// Nonpreemptive overhead charged per preemption/resume transition
    #[arg(long = "preemption-cost", value_name = "TICKS", default_value = "0")]
    pub preemption_cost: u64,

    /// Ticks to reach the warm cache execution rate; omit to disable warmup
    #[arg(long = "cache-warmup-time", value_name = "TICKS")]
    pub cache_warmup_time: Option<u64>,

    /// Steady-state execution rate once the cache is warm
    #[arg(long = "warm-cache-rate", value_name = "RATE", default_value = "1.0")]
    pub warm_cache_rate: f64,
}

#[derive(clap::Args, Debug)]
pub struct TasksetArgs {
    /// Taskset data file
    #[arg(short = 'i', value_name = "TASKSET FILE")]
    pub taskset_file: String,

    /// Taskset file type
    #[arg(value_enum, short = 'f', long = "format", value_name = "FORMAT", default_value = "auto")]
    pub taskset_file_ty: rtsim_core::prelude::TasksetFileType,
}

#[derive(clap::Args, Debug)]
pub struct BreakdownArgs {
    /// Run the breakdown-density search instead of a single schedule
    #[arg(long = "breakdown-density", default_value = "false", action = clap::ArgAction::SetTrue)]
    pub enabled: bool,

    /// Density convergence tolerance for the breakdown-density search
    #[arg(long = "breakdown-tol", value_name = "TOL", default_value = "1e-3")]
    pub tol: f64,
}
