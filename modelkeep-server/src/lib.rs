//! HTTP surface for modelkeep: routes, static assets and the worker pool.

pub mod assets;
pub mod routes;
pub mod server;

pub use routes::{Reply, route};
pub use server::{ServerHandle, start};
