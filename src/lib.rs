//! Umbrella crate tying the dservice components together for the
//! workspace-level integration tests.

pub use spage_chain;
pub use spage_cli;
pub use spage_core;
pub use spage_store;
