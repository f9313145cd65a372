pub mod generation;
pub mod relay;
pub mod tasks;
