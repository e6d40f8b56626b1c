//! Artifacts runner — job orchestration for cooldown-gated game characters.

pub mod config;
pub mod error;
pub mod game;
pub mod jobs;
pub mod routes;
pub mod store;
pub mod worker;
