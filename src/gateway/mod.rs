//! Gateway facade

mod builder;
mod facade;
mod task;

pub use builder::{Huginn, HuginnBuilder};
pub use facade::StudyGateway;
pub use task::GenerationTask;
