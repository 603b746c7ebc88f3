//! Notion REST client implementing [`tablesync_core::RemoteTableApi`].

mod client;
mod config;
mod error;
mod types;

pub use client::NotionClient;
pub use config::*;
pub use error::*;
pub use types::*;
