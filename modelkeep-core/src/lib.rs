//! modelkeep-core: keeps the best-scoring model per name, durably.
//!
//! `services` holds the store and the registry, `commands` the request-facing
//! facade and root initialization.

pub mod commands;
pub mod config;
pub mod services;
pub mod utils;
