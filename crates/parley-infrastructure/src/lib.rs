pub mod config_loader;
pub mod http_backend;
pub mod json_snapshot_store;
pub mod paths;

pub use crate::config_loader::load_config;
pub use crate::http_backend::HttpBackendClient;
pub use crate::json_snapshot_store::JsonSnapshotStore;
pub use crate::paths::{ParleyPaths, PathError};
