//! Package discovery, tag selection and ownership probes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

/// A tagged, prioritized directory grouping a subset of configuration.
///
/// Created once during project scan and shared read-only from then on.
#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub dir: PathBuf,
    pub tags: Vec<String>,
    pub priority: u32,
}

impl Package {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PackageMetadata {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    priority: u32,
}

/// Loads every `<project_dir>/<pkg>/metadata.json` package, sorted by
/// strictly descending priority (ties keep directory-name order).
pub fn load_packages(project_dir: &Path) -> Result<Vec<Arc<Package>>> {
    let project_dir = project_dir
        .canonicalize()
        .with_context(|| format!("directory does not exist: {}", project_dir.display()))?;
    if !project_dir.is_dir() {
        bail!("not a directory: {}", project_dir.display());
    }

    let mut children: Vec<PathBuf> = fs::read_dir(&project_dir)
        .with_context(|| format!("failed to read {}", project_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    children.sort();

    let mut packages = Vec::new();
    for dir in children {
        let metadata_file = dir.join("metadata.json");
        if !metadata_file.is_file() {
            continue;
        }

        let raw = fs::read(&metadata_file)
            .with_context(|| format!("failed to read {}", metadata_file.display()))?;
        let metadata: PackageMetadata = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid package metadata: {}", metadata_file.display()))?;

        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("non-UTF-8 package name: {}", dir.display()))?
            .to_string();

        packages.push(Arc::new(Package {
            name,
            dir,
            tags: metadata.tags,
            priority: metadata.priority,
        }));
    }

    sort_by_priority(&mut packages);
    Ok(packages)
}

/// Retains the packages whose tag set is a superset of `tags`, sorted by
/// descending priority. An empty `tags` selects every package.
pub fn filter_packages(packages: &[Arc<Package>], tags: &[String]) -> Vec<Arc<Package>> {
    let mut selected: Vec<Arc<Package>> = packages
        .iter()
        .filter(|pkg| tags.iter().all(|tag| pkg.has_tag(tag)))
        .cloned()
        .collect();
    sort_by_priority(&mut selected);
    selected
}

fn sort_by_priority(packages: &mut [Arc<Package>]) {
    // stable sort: equal priorities keep their discovery order
    packages.sort_by(|a, b| b.priority.cmp(&a.priority));
}

/// The qualified name `<class>/<name>` of a configuration object.
pub fn object_qname(class: &str, name: &str) -> String {
    format!("{class}/{name}")
}

/// First package in (priority-sorted) order that holds `objects/<qname>.json`.
///
/// A directory at that path means the package layout is broken and is a hard
/// error; plain absence returns `None`.
pub fn package_of_object(
    packages: &[Arc<Package>],
    qname: &str,
) -> Result<Option<Arc<Package>>> {
    for pkg in packages {
        let file = pkg.dir.join("objects").join(format!("{qname}.json"));
        if !file.exists() {
            continue;
        }
        if file.is_dir() {
            bail!("invalid package, {} is a directory", file.display());
        }
        return Ok(Some(pkg.clone()));
    }
    Ok(None)
}

/// First package in (priority-sorted) order that holds `files/<path>`.
pub fn package_of_file(packages: &[Arc<Package>], path: &str) -> Result<Option<Arc<Package>>> {
    for pkg in packages {
        let file = pkg.dir.join("files").join(path);
        if !file.exists() {
            continue;
        }
        if file.is_dir() {
            bail!("invalid package, {} is a directory", file.display());
        }
        return Ok(Some(pkg.clone()));
    }
    Ok(None)
}

/// Logs the selected package set the way operators expect to read it.
pub fn log_selection(packages: &[Arc<Package>]) {
    info!("packages selected:");
    for pkg in packages {
        info!("  package: {} (priority {})", pkg.name, pkg.priority);
    }
}
