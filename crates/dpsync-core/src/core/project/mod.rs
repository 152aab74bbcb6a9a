//! The local project model: packages, enumeration, and persistence.

pub mod packages;
pub mod scan;

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::core::config::SyncRequest;
use packages::{filter_packages, load_packages, log_selection, Package};

/// Loads the project and applies the tag selection; at least one package
/// must remain for a sync to make sense.
pub fn select_packages(request: &SyncRequest) -> Result<Vec<Arc<Package>>> {
    let all = load_packages(&request.project_dir)?;
    let selected = filter_packages(&all, &request.pkg_tags);
    if selected.is_empty() {
        bail!("no packages selected");
    }
    log_selection(&selected);
    Ok(selected)
}
