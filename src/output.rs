//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! ```text
//! Generated all in 84ms
//!     Written: 12
//!     Unchanged: 30
//!     Removed: 1
//!     Uploads exported: 3
//!     Assets: copied (2 written, 0 removed)
//!     Deploy: pushed (Deployed to github)
//! ```

use crate::assets::AssetsOutcome;
use crate::deploy::{DeployOutcome, DeployStatus};
use crate::generate::RunReport;
use crate::types::GenerationRequest;

/// 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn assets_line(outcome: &AssetsOutcome) -> String {
    match outcome {
        AssetsOutcome::Copied { written, removed } => {
            format!("copied ({written} written, {removed} removed)")
        }
        AssetsOutcome::InPlace => "in place".to_string(),
        AssetsOutcome::Skipped => "skipped (missing, precompile disabled)".to_string(),
    }
}

fn deploy_status(status: DeployStatus) -> &'static str {
    match status {
        DeployStatus::Pushed => "pushed",
        DeployStatus::NoChanges => "no changes",
        DeployStatus::Local => "local",
        DeployStatus::Failed => "FAILED",
    }
}

// ============================================================================
// Generate
// ============================================================================

pub fn format_run_report(report: &RunReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Generated {} in {}ms",
        report.target, report.duration_ms
    )];
    lines.push(format!("{}Written: {}", indent(1), report.written));
    lines.push(format!("{}Unchanged: {}", indent(1), report.unchanged));
    if report.removed > 0 {
        lines.push(format!("{}Removed: {}", indent(1), report.removed));
    }
    if report.blobs_exported > 0 {
        let mut line = format!("{}Uploads exported: {}", indent(1), report.blobs_exported);
        if report.blobs_degraded > 0 {
            line.push_str(&format!(" ({} as original)", report.blobs_degraded));
        }
        lines.push(line);
    }
    if let Some(assets) = &report.assets {
        lines.push(format!("{}Assets: {}", indent(1), assets_line(assets)));
    }
    if let Some(deploy) = &report.deploy {
        lines.push(format!("{}Deploy: {}", indent(1), format_deploy_summary(deploy)));
    }
    lines
}

pub fn print_run_report(report: &RunReport) {
    for line in format_run_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Deploy
// ============================================================================

fn format_deploy_summary(outcome: &DeployOutcome) -> String {
    format!("{} ({})", deploy_status(outcome.status), outcome.message)
}

pub fn format_deploy_outcome(outcome: &DeployOutcome) -> Vec<String> {
    vec![format!("Deploy: {}", format_deploy_summary(outcome))]
}

pub fn print_deploy_outcome(outcome: &DeployOutcome) {
    for line in format_deploy_outcome(outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// Schedule
// ============================================================================

pub fn format_queued(request: &GenerationRequest) -> String {
    if request.debounce {
        format!(
            "Queued {} for {}",
            request.target,
            request.run_at.format("%H:%M:%S")
        )
    } else {
        format!("Queued {} now", request.target)
    }
}

/// Summary after the scheduler drained.
pub fn format_schedule_summary(queued: usize, reports: &[RunReport]) -> Vec<String> {
    let mut lines = vec![format!(
        "{} request(s) queued, {} run(s) executed",
        queued,
        reports.len()
    )];
    for report in reports {
        lines.extend(format_run_report(report).into_iter().map(|l| format!("{}{l}", indent(1))));
    }
    lines
}

pub fn print_schedule_summary(queued: usize, reports: &[RunReport]) {
    for line in format_schedule_summary(queued, reports) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Counts shown by `staticpress check`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentCounts {
    pub articles: usize,
    pub published_articles: usize,
    pub pages: usize,
    pub tags: usize,
    pub redirects: usize,
    pub blobs: usize,
}

pub fn format_check(counts: &ContentCounts) -> Vec<String> {
    vec![
        "Config OK".to_string(),
        "Content".to_string(),
        format!(
            "{}Articles: {} ({} published)",
            indent(1),
            counts.articles,
            counts.published_articles
        ),
        format!("{}Pages: {}", indent(1), counts.pages),
        format!("{}Tags: {}", indent(1), counts.tags),
        format!("{}Redirects: {}", indent(1), counts.redirects),
        format!("{}Blobs: {}", indent(1), counts.blobs),
    ]
}

pub fn print_check(counts: &ContentCounts) {
    for line in format_check(counts) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;
    use chrono::{TimeZone, Utc};

    fn report() -> RunReport {
        RunReport {
            target: Target::All,
            written: 3,
            unchanged: 7,
            removed: 0,
            blobs_exported: 0,
            blobs_degraded: 0,
            assets: None,
            deploy: None,
            duration_ms: 42,
        }
    }

    #[test]
    fn run_report_minimal() {
        assert_eq!(
            format_run_report(&report()),
            vec!["Generated all in 42ms", "    Written: 3", "    Unchanged: 7"]
        );
    }

    #[test]
    fn run_report_with_extras() {
        let mut r = report();
        r.target = Target::Article(5);
        r.removed = 2;
        r.blobs_exported = 1;
        r.assets = Some(AssetsOutcome::Copied { written: 1, removed: 0 });
        r.deploy = Some(DeployOutcome {
            success: true,
            message: "Deployed to github".into(),
            status: DeployStatus::Pushed,
        });
        let lines = format_run_report(&r);
        assert_eq!(lines[0], "Generated article:5 in 42ms");
        assert!(lines.contains(&"    Removed: 2".to_string()));
        assert!(lines.contains(&"    Uploads exported: 1".to_string()));

        r.blobs_exported = 3;
        r.blobs_degraded = 1;
        assert!(format_run_report(&r).contains(&"    Uploads exported: 3 (1 as original)".to_string()));
        assert!(lines.contains(&"    Assets: copied (1 written, 0 removed)".to_string()));
        assert_eq!(lines.last().unwrap(), "    Deploy: pushed (Deployed to github)");
    }

    #[test]
    fn failed_deploy_is_loud() {
        let outcome = DeployOutcome {
            success: false,
            message: "git push failed: [REDACTED]".into(),
            status: DeployStatus::Failed,
        };
        assert_eq!(
            format_deploy_outcome(&outcome),
            vec!["Deploy: FAILED (git push failed: [REDACTED])"]
        );
    }

    #[test]
    fn queued_line() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        let request = GenerationRequest {
            target: Target::Tag(3),
            requested_at: at,
            run_at: at + chrono::Duration::seconds(60),
            debounce: true,
        };
        assert_eq!(format_queued(&request), "Queued tag:3 for 10:31:00");
        let now = GenerationRequest {
            debounce: false,
            ..request
        };
        assert_eq!(format_queued(&now), "Queued tag:3 now");
    }

    #[test]
    fn schedule_summary_nests_reports() {
        let lines = format_schedule_summary(4, &[report()]);
        assert_eq!(lines[0], "4 request(s) queued, 1 run(s) executed");
        assert_eq!(lines[1], "    Generated all in 42ms");
        assert_eq!(lines[2], "        Written: 3");
    }

    #[test]
    fn check_lists_counts() {
        let counts = ContentCounts {
            articles: 3,
            published_articles: 2,
            ..Default::default()
        };
        let lines = format_check(&counts);
        assert_eq!(lines[2], "    Articles: 3 (2 published)");
    }
}
