//! Domain types and pure logic for the printforge generation service.
//!
//! Everything here is free of network I/O: job and status vocabulary,
//! the job state machine, stuck detection, polling configuration and
//! outcomes, result materialization, submission validation, and the
//! provider traits the pipeline is built against.

pub mod error;
pub mod job;
pub mod polling;
pub mod provider;
pub mod relay;
pub mod status;
pub mod stuck;
pub mod submission;
pub mod types;
