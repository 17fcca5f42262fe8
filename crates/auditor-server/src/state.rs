use std::sync::Arc;

use common::AppConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::services::generation::{AnswerGenerator, ChatCompletionsClient};
use crate::services::retrieval::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub metrics: PrometheusHandle,
    pub api_token: Option<String>,
    pub orchestrator: Arc<Orchestrator>,
    pub generator: Option<Arc<dyn AnswerGenerator>>,
}

impl AppState {
    /// Installs the global Prometheus recorder; call once per process.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        let orchestrator = Orchestrator::from_config(config)?;
        let generator = match &config.generation {
            Some(settings) => Some(
                Arc::new(ChatCompletionsClient::from_settings(settings)?) as Arc<dyn AnswerGenerator>
            ),
            None => None,
        };
        Ok(Self {
            metrics: handle,
            api_token: config.server.api_token.clone(),
            orchestrator: Arc::new(orchestrator),
            generator,
        })
    }

    pub fn for_tests(orchestrator: Orchestrator) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            metrics: recorder.handle(),
            api_token: None,
            orchestrator: Arc::new(orchestrator),
            generator: None,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_api_token(mut self, token: &str) -> Self {
        self.api_token = Some(token.to_string());
        self
    }
}
