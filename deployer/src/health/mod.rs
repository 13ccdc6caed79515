//! Health poller

pub mod cache;
pub mod local;
pub mod monitor;
pub mod pipeline;
pub mod query;
