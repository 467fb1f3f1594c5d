//! CLI commands

pub mod export;
pub mod ping;
pub mod services;
pub mod sync;
