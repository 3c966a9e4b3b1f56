//! # SimplePage dservice CLI crate
//!
//! The `dservice` binary: HTTP surface, reconciler lifecycle, and operator
//! subcommands over the shared pin namespace.

pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod server;
pub mod state;

pub use commands::{run_indexer_data, run_list_command, valid_name, DataAction, ListAction};
pub use config::{NodeConfig, DEFAULT_MAX_UPLOAD_BYTES};
pub use error::ApiError;
pub use server::run_server;
pub use state::AppState;
