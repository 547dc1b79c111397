pub mod control;
pub mod detectors;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod store;
