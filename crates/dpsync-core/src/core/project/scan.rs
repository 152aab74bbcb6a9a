//! Local project enumeration and the on-disk object/file formats.
//!
//! A package contributes two trees: `objects/<class>/<name>.json` holds one
//! configuration object per file, `files/<rel/path>` holds opaque filestore
//! content. Scanning composes the selected packages into a single namespace
//! where the highest-priority owner of a qualified name wins.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::core::project::packages::{object_qname, Package};
use crate::core::refs::extract_dependencies;

/// A configuration object discovered locally or listed remotely.
///
/// `data` and `depend` are read on first use and memoized; both stay unset
/// for the lifetime of objects that are only ever written (pull).
#[derive(Debug)]
pub struct ObjectInfo {
    pub name: String,
    pub class: String,
    pub package: Arc<Package>,
    pub file: PathBuf,
    data: OnceLock<Value>,
    depend: OnceLock<Vec<String>>,
}

impl ObjectInfo {
    pub fn local(class: String, name: String, package: Arc<Package>, file: PathBuf) -> Self {
        Self {
            name,
            class,
            package,
            file,
            data: OnceLock::new(),
            depend: OnceLock::new(),
        }
    }

    /// An object known only from a remote listing; it has no backing file
    /// until the pull pipeline saves it.
    pub fn remote(class: String, name: String, package: Arc<Package>) -> Self {
        Self::local(class, name, package, PathBuf::new())
    }

    pub fn qname(&self) -> String {
        object_qname(&self.class, &self.name)
    }

    /// The decoded object body, read from `file` on first access.
    pub fn data(&self) -> Result<&Value> {
        match self.data.get() {
            Some(value) => Ok(value),
            None => {
                let value = read_json_file(&self.file)?;
                Ok(self.data.get_or_init(|| value))
            }
        }
    }

    /// Outbound qualified-name dependencies of the object body.
    pub fn dependencies(&self) -> Result<&[String]> {
        match self.depend.get() {
            Some(depend) => Ok(depend),
            None => {
                let depend = extract_dependencies(self.data()?);
                Ok(self.depend.get_or_init(|| depend))
            }
        }
    }
}

/// A filestore entry discovered locally or remotely.
#[derive(Debug)]
pub struct FileInfo {
    /// Store-prefixed, forward-slash separated path (`local/a/b.xsl`).
    pub path: String,
    pub package: Arc<Package>,
    pub file: PathBuf,
    data: OnceLock<Vec<u8>>,
}

impl FileInfo {
    pub fn local(path: String, package: Arc<Package>, file: PathBuf) -> Self {
        Self {
            path,
            package,
            file,
            data: OnceLock::new(),
        }
    }

    pub fn remote(path: String, package: Arc<Package>) -> Self {
        Self::local(path, package, PathBuf::new())
    }

    /// The file content, read from disk on first access.
    pub fn data(&self) -> Result<&[u8]> {
        match self.data.get() {
            Some(data) => Ok(data),
            None => {
                let data = fs::read(&self.file)
                    .with_context(|| format!("failed to read {}", self.file.display()))?;
                Ok(self.data.get_or_init(|| data))
            }
        }
    }
}

/// True for dotfiles and dot-directories; hidden entries are never scanned.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Enumerates `objects/<class>/<name>.json` across the packages.
///
/// Packages are expected in priority order; the first package that
/// contributes a qualified name owns it, later copies are dropped with a
/// debug note. Layout violations (a class directory nested deeper, a file
/// directly under `objects/`, a non-`.json` object file) abort the scan.
pub fn scan_objects(packages: &[Arc<Package>]) -> Result<Vec<ObjectInfo>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut objects = Vec::new();

    for pkg in packages {
        let objects_dir = pkg.dir.join("objects");
        if !objects_dir.exists() {
            continue;
        }
        if !objects_dir.is_dir() {
            bail!("not a directory: {}", objects_dir.display());
        }

        let walker = WalkDir::new(&objects_dir)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

        for entry in walker {
            let entry = entry
                .with_context(|| format!("failed to scan {}", objects_dir.display()))?;
            let path = entry.path();

            if entry.file_type().is_dir() {
                match entry.depth() {
                    0 | 1 => continue,
                    _ => bail!("unexpected package directory: {}", path.display()),
                }
            }

            if entry.depth() != 2 {
                bail!("unexpected package file: {}", path.display());
            }

            let file_name = entry.file_name().to_string_lossy();
            let Some(name) = file_name.strip_suffix(".json") else {
                bail!(
                    "object file must have the 'json' extension: {}",
                    path.display()
                );
            };

            let class = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .with_context(|| format!("invalid object path: {}", path.display()))?;

            let info = ObjectInfo::local(
                class.to_string(),
                name.to_string(),
                pkg.clone(),
                path.to_path_buf(),
            );

            if seen.insert(info.qname()) {
                objects.push(info);
            } else {
                debug!("package object ignored: {} [{}]", info.qname(), pkg.name);
            }
        }
    }

    Ok(objects)
}

/// Enumerates `files/<rel/path>` across the packages, any depth, keyed by
/// the forward-slash relative path. Same precedence rules as objects.
pub fn scan_files(packages: &[Arc<Package>]) -> Result<Vec<FileInfo>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut files = Vec::new();

    for pkg in packages {
        let files_dir = pkg.dir.join("files");
        if !files_dir.exists() {
            continue;
        }
        if !files_dir.is_dir() {
            bail!("not a directory: {}", files_dir.display());
        }

        let walker = WalkDir::new(&files_dir)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));

        for entry in walker {
            let entry =
                entry.with_context(|| format!("failed to scan {}", files_dir.display()))?;
            if entry.file_type().is_dir() {
                continue;
            }
            if entry.depth() == 1 {
                bail!("unexpected package file: {}", entry.path().display());
            }

            let rel = relative_slash_path(&files_dir, entry.path())?;
            let info = FileInfo::local(rel, pkg.clone(), entry.path().to_path_buf());

            if seen.insert(info.path.clone()) {
                files.push(info);
            } else {
                debug!(
                    "package file ignored: {} [{}]",
                    entry.path().display(),
                    pkg.name
                );
            }
        }
    }

    Ok(files)
}

fn relative_slash_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("path escapes {}: {}", root.display(), path.display()))?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .with_context(|| format!("non-UTF-8 path: {}", path.display()))
        })
        .collect::<Result<_>>()?;
    Ok(parts.join("/"))
}

/// Reads and decodes a JSON document.
pub fn read_json_file(file: &Path) -> Result<Value> {
    if file.as_os_str().is_empty() {
        bail!("input file not specified");
    }
    let raw =
        fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("invalid JSON: {}", file.display()))
}

fn write_json_file(value: &Value, file: &Path) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to encode {}", file.display()))?;
    fs::write(file, encoded).with_context(|| format!("failed to write {}", file.display()))
}

/// Writes an object body to `<pkg_dir>/objects/<qname>.json`, creating
/// missing directories. Returns the path and whether the file is new.
pub fn save_object(pkg_dir: &Path, qname: &str, obj: &Value) -> Result<(PathBuf, bool)> {
    let file = pkg_dir.join("objects").join(format!("{qname}.json"));
    ensure_parent(&file)?;
    let newly_created = !file.exists();
    write_json_file(obj, &file)?;
    Ok((file, newly_created))
}

/// Writes filestore content to `<pkg_dir>/files/<path>`; see [`save_object`].
pub fn save_file(pkg_dir: &Path, path: &str, data: &[u8]) -> Result<(PathBuf, bool)> {
    let file = pkg_dir.join("files").join(path);
    ensure_parent(&file)?;
    let newly_created = !file.exists();
    fs::write(&file, data).with_context(|| format!("failed to write {}", file.display()))?;
    Ok((file, newly_created))
}

fn ensure_parent(file: &Path) -> Result<()> {
    let parent = file
        .parent()
        .with_context(|| format!("no parent directory: {}", file.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))
}
