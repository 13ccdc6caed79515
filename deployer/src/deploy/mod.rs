//! Deployment module

pub mod aggregate;
pub mod fsm;
pub mod orchestrator;
pub mod pipeline;
