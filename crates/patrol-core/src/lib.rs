//! Core runtime for the anti-piracy patrol product.
//!
//! This crate drives patrol tasks on a separate automation worker over its
//! HTTP API, mirrors their state and logs locally, manages the whitelist of
//! legitimate merchants and the device fleet, and keeps the ledger of filed
//! takedown reports. The HTTP surface for the operator GUI lives in the
//! `patrol-server` binary; evidence export lives in `patrol-export`.

mod runtime;

pub mod config;
pub mod devices;
pub mod ledger;
pub mod logs;
pub mod whitelist;
pub mod worker;

pub use config::CoreConfig;
pub use devices::{Device, DeviceError, DeviceRegistry, DeviceState};
pub use ledger::{LedgerError, ReportLedger, ReportRecord, ReportStatistics, ReportStatus};
pub use logs::{ActivityLog, LogEntry, LogKind};
pub use runtime::coordinator::{WatchConfig, WatchOutcome};
pub use runtime::session::{LaunchError, Orchestrator, SessionError, StartRequest};
pub use runtime::store::TaskStore;
pub use runtime::types::{
    DetectionResult, PatrolParams, PatrolResult, PatrolTask, Platform, TaskStatus,
};
pub use whitelist::{
    WhitelistEntry, WhitelistError, WhitelistField, WhitelistManager, WhitelistView,
};
