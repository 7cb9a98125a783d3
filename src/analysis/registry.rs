//! Explicit, ordered registry of analysis operations.
//!
//! Each domain builds one [`Registry`] at startup. Registration order is the
//! section order of the final report.

use crate::dataset::Dataset;
use crate::models::AnalysisResult;
use std::fmt;
use std::sync::Arc;

/// Signature of an analysis operation. Fixed parameters (period, row limit)
/// are captured by the closure at registration.
pub type AnalysisFn = dyn Fn(&Dataset) -> anyhow::Result<AnalysisResult> + Send + Sync;

/// A named analysis with its presentation metadata.
#[derive(Clone)]
pub struct Analysis {
    pub id: &'static str,
    pub title: String,
    pub description: String,
    op: Arc<AnalysisFn>,
}

impl Analysis {
    pub fn run(&self, dataset: &Dataset) -> anyhow::Result<AnalysisResult> {
        (self.op)(dataset)
    }

    pub(crate) fn operation(&self) -> Arc<AnalysisFn> {
        Arc::clone(&self.op)
    }
}

impl fmt::Debug for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis")
            .field("id", &self.id)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

/// Description used when none is supplied at registration.
pub fn default_description(id: &str) -> String {
    format!("Analysis of {}.", id.replace('_', " ").to_lowercase())
}

/// Ordered collection of analyses for one domain.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    analyses: Vec<Analysis>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under a unique identifier.
    ///
    /// # Panics
    /// If `id` is already registered; registries are built from static code,
    /// so a duplicate is a programming error.
    pub fn register<F>(&mut self, id: &'static str, title: &str, op: F) -> &mut Analysis
    where
        F: Fn(&Dataset) -> anyhow::Result<AnalysisResult> + Send + Sync + 'static,
    {
        assert!(
            self.get(id).is_none(),
            "analysis '{}' registered twice",
            id
        );
        self.analyses.push(Analysis {
            id,
            title: title.to_string(),
            description: default_description(id),
            op: Arc::new(op),
        });
        let last = self.analyses.len() - 1;
        &mut self.analyses[last]
    }

    pub fn get(&self, id: &str) -> Option<&Analysis> {
        self.analyses.iter().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Analysis> {
        self.analyses.iter()
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    #[allow(dead_code)] // Used by tests
    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }
}

impl Analysis {
    /// Attach a one-line description.
    pub fn describe(&mut self, description: &str) -> &mut Self {
        self.description = description.to_string();
        self
    }
}
