pub mod breakdown;
pub mod error;
pub mod priority;
pub mod processor;
pub mod scheduler;
pub mod task;
pub mod taskset_io;

pub mod prelude {
    pub use super::breakdown::prelude::*;
    pub use super::error::SimError;
    pub use super::priority::prelude::*;
    pub use super::processor::prelude::*;
    pub use super::scheduler::prelude::*;
    pub use super::task::prelude::*;
    pub use super::taskset_io::prelude::*;
}
