//! Declaration sources feeding the policy model.
//!
//! Two kinds of source produce endpoint and service records: watched
//! directories of JSON files, and a replicated local inventory of managed
//! objects. Both normalize into the `policy-model` types and drive the
//! managers through the same calls, so downstream consumers never know
//! which source produced a record. Malformed input is logged and dropped
//! without touching existing state.

mod droplog_source;
mod endpoint_source;
mod ep_file;
mod fs_watcher;
mod inventory;
mod service_source;

pub use droplog_source::FsDropLogConfigSource;
pub use endpoint_source::{FsEndpointSource, FsExternalEndpointSource};
pub use fs_watcher::{DirectoryHandler, FsWatcher};
pub use inventory::{
    InventoryEp, InventoryIface, InventoryIfaceKind, InventoryIp, InventoryIpKind,
    InventoryObserver, LocalInventory, ModelEndpointSource,
};
pub use service_source::FsServiceSource;

/// Why a source rejected an input.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}
