//! Data models shared by deployment and health runs

pub mod event;
pub mod health;
pub mod host;
pub mod result;
