pub mod detector;
pub mod orchestrator;
pub mod staging;
pub mod worker;
