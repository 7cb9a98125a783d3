//! Fault-isolated execution of a registry against one dataset.
//!
//! A failing analysis (an `Err` or a panic) becomes an error record in its
//! own section; the run always continues with the next analysis.

use crate::analysis::registry::{Analysis, Registry};
use crate::dataset::Dataset;
use crate::error::LedgerError;
use crate::models::{AnalysisResult, ReportSection};
use futures::future::join_all;
use indicatif::ProgressBar;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Options for concurrent dispatch.
#[derive(Clone, Default)]
pub struct DispatchOptions {
    /// Maximum analyses running at once.
    pub concurrency: usize,
    /// Per-analysis deadline. A timed-out analysis is reported as failed; its
    /// worker is detached rather than killed.
    pub timeout: Option<Duration>,
    /// Ticked once per finished analysis.
    pub progress: Option<ProgressBar>,
}

/// Run every analysis sequentially in registration order.
pub fn dispatch(registry: &Registry, dataset: &Dataset) -> Vec<ReportSection> {
    registry
        .iter()
        .map(|analysis| {
            debug!("Running analysis: {}", analysis.id);
            let outcome = catch_unwind(AssertUnwindSafe(|| analysis.run(dataset)));
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => failure(analysis.id, format!("{:#}", e)),
                Err(payload) => failure(analysis.id, panic_message(payload.as_ref())),
            };
            section(analysis, result)
        })
        .collect()
}

/// Run analyses on the blocking worker pool, at most `concurrency` at a time.
/// Sections are returned in registration order, not completion order.
pub async fn dispatch_concurrent(
    registry: &Registry,
    dataset: Arc<Dataset>,
    options: &DispatchOptions,
) -> Vec<ReportSection> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

    let tasks = registry.iter().map(|analysis| {
        let op = analysis.operation();
        let dataset = Arc::clone(&dataset);
        let semaphore = Arc::clone(&semaphore);
        let id = analysis.id;
        let timeout = options.timeout;
        let progress = options.progress.clone();

        async move {
            // The semaphore is never closed, so acquisition only fails on misuse.
            let _permit = semaphore.acquire_owned().await.ok();
            debug!("Running analysis: {}", id);

            let handle = tokio::task::spawn_blocking(move || op(dataset.as_ref()));
            let joined = match timeout {
                Some(limit) => match tokio::time::timeout(limit, handle).await {
                    Ok(joined) => Some(joined),
                    Err(_) => None,
                },
                None => Some(handle.await),
            };

            let result = match joined {
                Some(Ok(Ok(result))) => result,
                Some(Ok(Err(e))) => failure(id, format!("{:#}", e)),
                Some(Err(join_error)) => match join_error.try_into_panic() {
                    Ok(payload) => failure(id, panic_message(payload.as_ref())),
                    Err(join_error) => failure(id, join_error.to_string()),
                },
                None => failure(
                    id,
                    format!(
                        "timed out after {:.1}s",
                        timeout.unwrap_or_default().as_secs_f64()
                    ),
                ),
            };

            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        }
    });

    let results = join_all(tasks).await;

    registry
        .iter()
        .zip(results)
        .map(|(analysis, result)| section(analysis, result))
        .collect()
}

fn section(analysis: &Analysis, result: AnalysisResult) -> ReportSection {
    ReportSection {
        id: analysis.id.to_string(),
        title: analysis.title.clone(),
        description: analysis.description.clone(),
        result,
    }
}

/// Log the failure and turn it into an error record.
fn failure(id: &str, message: String) -> AnalysisResult {
    warn!(
        "{}",
        LedgerError::AnalysisFailure {
            id: id.to_string(),
            message: message.clone(),
        }
    );
    AnalysisResult::error(id, message)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
