//! homefleet library
//!
//! Concurrent provisioning of self-hosted services across a fleet of home
//! servers, plus a health monitor over the same fleet.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod fanout;
pub mod filesys;
pub mod health;
pub mod installers;
pub mod logs;
pub mod models;
pub mod remote;
pub mod server;
pub mod storage;
pub mod utils;
pub mod validation;
pub mod workers;
