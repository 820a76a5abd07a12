pub mod ci;
pub mod feedback;
pub mod lock;
pub mod orchestrator;
pub mod types;

pub use lock::IssueLocks;
pub use orchestrator::Orchestrator;
