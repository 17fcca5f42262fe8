use std::time::Duration;

use common::config::RetrievalSettings;

/// Knobs shared by every retrieval: how many records survive fusion, the RRF
/// smoothing constant, the per-adapter row limit and the per-adapter timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalDefaults {
    pub top_n: usize,
    pub rrf_k: usize,
    pub adapter_limit: usize,
    pub adapter_timeout: Duration,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

impl From<&RetrievalSettings> for RetrievalDefaults {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            top_n: settings.top_n,
            rrf_k: settings.rrf_k,
            adapter_limit: settings.adapter_limit,
            adapter_timeout: Duration::from_millis(settings.adapter_timeout_ms),
        }
    }
}
