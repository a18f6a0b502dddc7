//! Session management module.
//!
//! This module provides the appliance session handle, its connection state
//! machine, and the manager that keeps a single session active per process.

mod activity;
mod handle;
mod manager;
mod state;

pub use activity::{Activity, ActivityGuard};
pub use handle::{
    SessionHandle, SessionOptions, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_USERS_QUERY,
};
pub use manager::SessionManager;
pub use state::SessionState;
