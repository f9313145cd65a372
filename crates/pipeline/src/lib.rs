//! Status polling for provider-hosted generation jobs.
//!
//! [`poller::Poller`] drives one [`session::PollSession`] from
//! submission to a terminal outcome. [`manager::GenerationManager`]
//! keeps exactly one live session per generation context and
//! broadcasts [`events::GenerationEvent`]s as sessions progress.

pub mod events;
pub mod manager;
pub mod poller;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
