//! Job execution for Sweep.
//!
//! Handles one dequeued job at a time: prepares an ephemeral workspace,
//! provisions an isolated VM, runs the job's containerized and CLI steps
//! under a wall-clock deadline, and guarantees teardown and name-set
//! bookkeeping on every exit path.

pub mod config;
pub mod handler;
pub mod logger;
pub mod names;
pub mod scripts;
pub mod workspace;

pub use config::ExecutorConfig;
pub use handler::Handler;
pub use logger::JobLogger;
pub use names::NameSet;
