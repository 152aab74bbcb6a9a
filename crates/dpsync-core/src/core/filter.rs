//! Include/exclude name filtering for objects and filestore paths.

use anyhow::{Context, Result};
use regex::Regex;

/// Compiled include/exclude predicate over item names.
///
/// Each pattern list is joined with `|` into a single alternation. An empty
/// list therefore compiles to the empty regex, which matches every string;
/// the CLI defaults keep both lists non-empty.
#[derive(Clone, Debug)]
pub struct NameFilter {
    include: Regex,
    exclude: Regex,
}

impl NameFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = compile_alternation(include).context("invalid include pattern")?;
        let exclude = compile_alternation(exclude).context("invalid exclude pattern")?;
        Ok(Self { include, exclude })
    }

    /// `include.matches(name) ∧ ¬exclude.matches(name)`.
    pub fn accepts(&self, name: &str) -> bool {
        self.include.is_match(name) && !self.exclude.is_match(name)
    }

    /// Whether a directory subtree should be pruned during a remote walk.
    ///
    /// Tests both `path` and `path + "/"` against the exclude alternation so
    /// exclude patterns may anchor at a directory boundary (`^local/tmp/`).
    pub fn prunes_dir(&self, path: &str) -> bool {
        self.exclude.is_match(path) || self.exclude.is_match(&format!("{path}/"))
    }
}

fn compile_alternation(patterns: &[String]) -> Result<Regex> {
    let joined = patterns.join("|");
    Regex::new(&joined).with_context(|| format!("bad regex: {joined:?}"))
}
