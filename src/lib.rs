//! telemetry-dash: data core of a personal vehicle telemetry dashboard.
//!
//! Builds the shared time window over trips and charging sessions, keeps
//! linked views in sync through a cross-filter engine, and reconciles table
//! edits back into the record store. Rendering and transport stay with the
//! host application.

pub mod api;
pub mod core;
pub mod error;
pub mod filter;
pub mod reconcile;
pub mod store;
pub mod telemetry;

pub use api::{Dashboard, DashboardConfig};
pub use error::{DashError, DashResult};
