//! Persistent state under the storage layout

pub mod inventory;
pub mod layout;
pub mod settings;
