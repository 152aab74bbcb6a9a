//! Per-item result accounting and the aligned transfer report.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::sync::Semaphore;

/// Outcome of one transferred item.
///
/// `Error` until proven otherwise; a successful transfer becomes `New` when
/// the target did not previously exist and `Ok` when it did. `Success` is
/// the push-side catch-all for recognized-but-unclassified appliance
/// responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferResult {
    Error,
    Ok,
    New,
    Success,
}

impl TransferResult {
    fn as_str(self) -> &'static str {
        match self {
            TransferResult::Error => "ERROR",
            TransferResult::Ok => "OK",
            TransferResult::New => "NEW",
            TransferResult::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width of the longest result label, for right-alignment.
const RESULT_WIDTH: usize = 7;

/// What kind of item a report line describes.
#[derive(Clone, Copy, Debug)]
pub enum ItemKind {
    File,
    Object,
}

impl ItemKind {
    fn label(self) -> &'static str {
        match self {
            ItemKind::File => "FILE:",
            ItemKind::Object => "OBJECT:",
        }
    }
}

/// Column widths for one pipeline's report, computed before dispatch so
/// concurrent lines stay aligned.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReportLayout {
    pub name_width: usize,
    pub pkg_width: usize,
}

impl ReportLayout {
    pub fn fit_name(&mut self, name: &str) {
        self.name_width = self.name_width.max(name.len());
    }

    pub fn fit_package(&mut self, package: &str) {
        self.pkg_width = self.pkg_width.max(package.len());
    }

    fn line(
        &self,
        kind: ItemKind,
        name: &str,
        package: &str,
        result: TransferResult,
        elapsed: Duration,
    ) -> String {
        // the result column is right-aligned against the end of the widest
        // `[package]` bracket
        let result_width = (self.pkg_width + RESULT_WIDTH).saturating_sub(package.len());
        format!(
            "{kind} {name:<name_width$} [{package}] {result:>result_width$} [{elapsed}]",
            kind = kind.label(),
            name_width = self.name_width,
            result = result.as_str(),
            elapsed = format_elapsed(elapsed),
        )
    }
}

/// Emits exactly one report line per item, whatever the exit path.
///
/// Workers create the guard before touching the network and record the final
/// result on it; the line is printed on drop, so errors and panics still
/// report `ERROR` with the elapsed time.
pub struct ReportGuard {
    kind: ItemKind,
    name: String,
    package: String,
    layout: ReportLayout,
    result: TransferResult,
    start: Instant,
}

impl ReportGuard {
    pub fn new(kind: ItemKind, name: String, package: String, layout: ReportLayout) -> Self {
        Self {
            kind,
            name,
            package,
            layout,
            result: TransferResult::Error,
            start: Instant::now(),
        }
    }

    pub fn set_result(&mut self, result: TransferResult) {
        self.result = result;
    }

    /// The pull pipeline renames an item when the appliance reports a
    /// different object name than the status listing did.
    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Drop for ReportGuard {
    fn drop(&mut self) {
        println!(
            "{}",
            self.layout
                .line(self.kind, &self.name, &self.package, self.result, self.start.elapsed())
        );
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let truncated = Duration::from_millis(elapsed.as_millis() as u64);
    if truncated.is_zero() {
        "0s".to_string()
    } else {
        format!("{truncated:?}")
    }
}

/// Blocks until every outstanding worker has released its permit.
///
/// Acquiring the full capacity can only succeed once all in-flight tasks are
/// done; the permits are dropped immediately so a later pipeline can reuse
/// the gate.
pub async fn quiesce(semaphore: &Semaphore, capacity: u32) -> Result<()> {
    let _all = semaphore
        .acquire_many(capacity)
        .await
        .context("concurrency gate closed")?;
    Ok(())
}

/// Joint verdict of the file and object pipelines: both always run, and both
/// failure messages are reported together.
pub fn combine_outcomes(files: Result<()>, objects: Result<()>) -> Result<()> {
    match (files, objects) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
        (Err(files), Err(objects)) => bail!("{files:#}, {objects:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lines_align_across_items() {
        let mut layout = ReportLayout::default();
        for name in ["local/a.xsl", "local/deep/path.txt"] {
            layout.fit_name(name);
        }
        for pkg in ["base", "overlay"] {
            layout.fit_package(pkg);
        }

        let short = layout.line(
            ItemKind::File,
            "local/a.xsl",
            "base",
            TransferResult::Ok,
            Duration::from_millis(1234),
        );
        let long = layout.line(
            ItemKind::File,
            "local/deep/path.txt",
            "overlay",
            TransferResult::New,
            Duration::from_millis(80),
        );

        assert_eq!(short, "FILE: local/a.xsl         [base]         OK [1.234s]");
        assert_eq!(long, "FILE: local/deep/path.txt [overlay]     NEW [80ms]");
        // the result column ends at the same offset in both lines
        let end = |line: &str, result: &str| {
            line.find(result).map(|i| i + result.len()).expect("result present")
        };
        assert_eq!(end(&short, "OK"), end(&long, "NEW"));
    }

    #[test]
    fn elapsed_is_truncated_to_milliseconds() {
        assert_eq!(format_elapsed(Duration::from_micros(1_234_567)), "1.234s");
        assert_eq!(format_elapsed(Duration::from_micros(80)), "0s");
    }

    #[test]
    fn combine_outcomes_reports_both_failures() {
        let combined = combine_outcomes(
            Err(anyhow::anyhow!("failed to pull 2 files")),
            Err(anyhow::anyhow!("failed to pull 1 objects")),
        );
        let message = format!("{:#}", combined.expect_err("combined error"));
        assert_eq!(message, "failed to pull 2 files, failed to pull 1 objects");

        assert!(combine_outcomes(Ok(()), Ok(())).is_ok());
        assert!(combine_outcomes(Err(anyhow::anyhow!("x")), Ok(())).is_err());
    }

    #[tokio::test]
    async fn quiesce_waits_for_outstanding_permits() {
        use std::sync::Arc;

        let semaphore = Arc::new(Semaphore::new(2));
        let held = semaphore.clone().acquire_owned().await.expect("permit");

        let waiter = {
            let semaphore = semaphore.clone();
            tokio::spawn(async move { quiesce(&semaphore, 2).await })
        };
        // the barrier cannot pass while a permit is held
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.expect("join").expect("quiesce");

        // all permits are returned after the barrier
        assert_eq!(semaphore.available_permits(), 2);
    }
}
