//! Per-report entry point: prepare, dispatch, assemble, write.

use crate::analysis::{dispatch, dispatch_concurrent, DispatchOptions};
use crate::cli::OutputFormat;
use crate::dataset::Input;
use crate::domains::Domain;
use crate::models::{Report, ReportMetadata};
use crate::report::{self, Presentation};
use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Title used when a report entry does not name one.
pub const DEFAULT_TITLE: &str = "Report Analysis";

/// Settings shared by every report in a run.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub format: OutputFormat,
    pub presentation: Presentation,
    pub dispatch: DispatchOptions,
}

/// Prepare the dataset and run every analysis of `domain`, returning the
/// assembled report. Fails only when the input cannot be loaded.
pub async fn build_report(
    domain: Domain,
    input: Input,
    title: &str,
    options: &DispatchOptions,
) -> Result<Report> {
    let dataset = domain.prepare(input)?;
    let registry = domain.registry();
    let row_count = dataset.len();
    info!(
        "Running {} {} analyses over {} rows",
        registry.len(),
        domain,
        row_count
    );
    debug!("Columns: {:?}", dataset.column_names());

    let start = Instant::now();
    let sections = if options.concurrency <= 1 && options.timeout.is_none() {
        debug!("Dispatching sequentially");
        let sections = dispatch(&registry, &dataset);
        if let Some(ref pb) = options.progress {
            pb.inc(sections.len() as u64);
        }
        sections
    } else {
        debug!(
            "Dispatching on up to {} workers",
            options.concurrency.max(1)
        );
        dispatch_concurrent(&registry, Arc::new(dataset), options).await
    };

    let report = Report {
        metadata: ReportMetadata {
            title: title.to_string(),
            domain: domain.to_string(),
            generated_at: Utc::now(),
            row_count,
            duration_seconds: start.elapsed().as_secs_f64(),
        },
        sections,
    };

    let failed = report.failed_sections();
    if failed > 0 {
        warn!("{} of {} analyses failed", failed, report.sections.len());
    }

    Ok(report)
}

/// Generate one report and write it to `output`. Returns the written location.
pub async fn run_report(
    domain: Domain,
    input: Input,
    title: &str,
    output: &Path,
    options: &RunOptions,
) -> Result<PathBuf> {
    let report = build_report(domain, input, title, &options.dispatch).await?;
    let content = report::render(&report, options.format, &options.presentation)?;
    let written = report::write_report(&content, output)?;

    info!("Report saved to {}", written.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::models::AnalysisResult;

    const LEDGER_CSV: &str = "\
Ledger Entry ID,Event Type,Amount,Currency,Is Credit,Created At
le_1,payment,100,INR,True,2024-01-05 10:00:00
le_2,payment,50,INR,True,2024-01-20 12:00:00
le_3,refund,30,INR,False,2024-01-21 09:30:00
";

    fn write_csv(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("ledger.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_report_writes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), LEDGER_CSV);
        let output = dir.path().join("reports").join("ledger.md");

        let written = run_report(
            Domain::Ledger,
            Input::csv(&csv),
            "Account Summary",
            &output,
            &RunOptions::default(),
        )
        .await
        .unwrap();

        let markdown = std::fs::read_to_string(written).unwrap();
        assert!(markdown.starts_with("# Account Summary"));
        assert!(markdown.contains("**Dataset Summary:** 3 transactions analyzed"));
        assert!(markdown.contains("| Credits | 150.00 |"));
        // No Payout ID column in the file: that section fails, the rest render.
        assert!(markdown.contains("## Payout Analysis"));
        assert!(markdown.contains("*Error during analysis: missing column: 'Payout ID'*"));
        assert!(markdown.contains("## Reference Object Analysis"));
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), LEDGER_CSV);

        let sequential = build_report(
            Domain::Ledger,
            Input::csv(&csv),
            "T",
            &DispatchOptions::default(),
        )
        .await
        .unwrap();
        let concurrent = build_report(
            Domain::Ledger,
            Input::csv(&csv),
            "T",
            &DispatchOptions {
                concurrency: 4,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(sequential.sections, concurrent.sections);
        assert_eq!(sequential.failed_sections(), 1);
    }

    #[tokio::test]
    async fn test_missing_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), "Ledger Entry ID,Amount\nle_1,5\n");

        let err = build_report(Domain::Ledger, Input::csv(&csv), "T", &DispatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::MissingColumn { .. })
        ));
    }

    #[tokio::test]
    async fn test_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), LEDGER_CSV);
        let output = dir.path().join("ledger.json");
        let options = RunOptions {
            format: OutputFormat::Json,
            ..Default::default()
        };

        let written = run_report(Domain::Ledger, Input::csv(&csv), "T", &output, &options)
            .await
            .unwrap();
        let report: Report = serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(report.metadata.row_count, 3);
        assert!(matches!(report.sections[0].result, AnalysisResult::Table(_)));
    }

    #[tokio::test]
    async fn test_every_fixture_renders_without_failures() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");

        for domain in Domain::ALL {
            let csv = fixtures.join(format!("{}.csv", domain));
            let report = build_report(domain, Input::csv(&csv), "Fixture", &DispatchOptions::default())
                .await
                .unwrap();

            assert!(report.metadata.row_count > 0, "{} fixture is empty", domain);
            assert_eq!(report.sections.len(), domain.registry().len());
            assert_eq!(report.failed_sections(), 0, "{} had failing analyses", domain);
        }
    }
}
