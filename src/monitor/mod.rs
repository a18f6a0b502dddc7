//! Live monitoring of appliance status.
//!
//! A [`Monitor`] repeatedly sends one [`MonitorQuery`] on a fixed interval
//! and reports each fresh result as a [`MonitorEvent`]. Failed ticks are
//! reported and retried on the next tick.

mod job;
mod query;

pub use job::{Monitor, MonitorEvent, MonitorState, DEFAULT_INTERVAL};
pub use query::MonitorQuery;
