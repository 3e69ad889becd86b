//! HTTP API module.
//!
//! Preview/commit endpoints, the jobs held between them, and the log stream.

pub mod jobs;
pub mod logs;
pub mod server;
pub mod types;

pub use jobs::{Discarded, ImportJob, JobStore};
pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
