//! Host-facing dashboard state: configuration, cached layout, event dispatch
//! into the cross-filter engine and the edit reconciler.

mod config;
mod dashboard;
mod detail;
mod json_contract;

pub use config::{CellDetailConfig, DashboardConfig};
pub use dashboard::{Dashboard, DashboardLayout, EditEvent};
pub use detail::{ActiveCell, CellDetail};
pub use json_contract::{
    DASHBOARD_SNAPSHOT_JSON_SCHEMA_V1, DashboardSnapshot, DashboardSnapshotJsonContractV1,
};
