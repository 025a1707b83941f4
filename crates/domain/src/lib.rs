pub mod events;
pub mod group;
pub mod handler;
pub mod history;
pub mod task;

pub use digest_scheduler_core::{SchedulerError, SchedulerResult};
pub use events::*;
pub use group::*;
pub use handler::*;
pub use history::*;
pub use task::*;
