//! Invocation options carried from the CLI into the engine.
//!
//! Everything is a plain value threaded explicitly; the engine keeps no
//! process-wide state.

use std::path::PathBuf;
use std::time::Duration;

/// Connection coordinates for one appliance.
#[derive(Clone, Debug)]
pub struct DeviceOptions {
    /// Base URL of the REST management interface.
    pub mgmt_url: String,
    pub user_name: String,
    pub user_password: String,
    /// Connection dial timeout.
    pub http_timeout: Duration,
}

/// Selection and pacing options shared by pull and push.
#[derive(Clone, Debug)]
pub struct SyncRequest {
    /// Appliance domain the sync targets.
    pub domain: String,
    /// Root of the local packages tree.
    pub project_dir: PathBuf,
    /// Required package tags (conjunction).
    pub pkg_tags: Vec<String>,
    /// Include patterns for object qualified names.
    pub objects: Vec<String>,
    /// Include patterns for filestore paths.
    pub files: Vec<String>,
    /// Exclude patterns for object qualified names.
    pub ignore_objects: Vec<String>,
    /// Exclude patterns for filestore paths.
    pub ignore_files: Vec<String>,
    /// Maximum concurrent transfers.
    pub parallel: usize,
}
