//! Generic fan-out machinery shared by deployment and health runs
//!
//! A run starts one worker per host through the [`scheduler`], streams
//! progress over the [`channel`], and is observed by the [`poller`] until
//! every worker has finished.

pub mod channel;
pub mod context;
pub mod poller;
pub mod scheduler;
pub mod sink;
