// src/commands/mod.rs
pub mod init;
mod api;

pub use api::{Commands, MSG_NOT_HIGHER, MSG_SAVE_FAILED, MSG_SAVED, SaveRequest, SaveResponse};

pub use init::{InitReport, initialize, modelkeep_root};
