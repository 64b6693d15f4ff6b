//! Engine assembly
//!
//! Builds the immutable per-run stages from [`EngineSettings`] once:
//! schema, configuration layers and normalizer, completion service,
//! mapping registry, validator and session log. Configuration problems
//! surface here as [`MapperError::ConfigurationLoad`] before any record is
//! touched.
//!
//! # Example
//! ```rust,ignore
//! let settings = load_settings_or_default(resolve_settings_path(None).as_deref())?;
//! let engine = Engine::from_settings(&settings)?;
//! let processed = engine.process_record(record, Some(book_text)).await?;
//! let row = engine.export(&mut processed.record)?;
//! ```

use crate::completion::{
    AnthropicClient, CompletionProvider, CompletionService, PromptTemplates, ProviderHealth,
    RetryPolicy,
};
use crate::error::{MapperError, MapperResult};
use crate::layers::{load_configuration, LayerSet};
use crate::normalizer::FieldNameNormalizer;
use crate::record::MetadataRecord;
use crate::registry::MappingRegistry;
use crate::reporting::session_log::SessionLogWriter;
use crate::schema::FieldSchema;
use crate::validators::Validator;
use crate::workflow::{BatchOutcome, Pipeline, PipelineEvent, PipelineStages, ProcessedRecord, RecordJob};
use bookfeed_common::config::{resolve_api_key, EngineSettings};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Engine {
    settings: EngineSettings,
    schema: Arc<FieldSchema>,
    completion: Option<Arc<CompletionService>>,
    pipeline: Pipeline,
}

impl Engine {
    /// Assemble an engine from settings alone
    ///
    /// The generative provider is the Anthropic client when completion is
    /// enabled and an API key resolves; otherwise subjective fields use
    /// defaults and fallbacks.
    pub fn from_settings(settings: &EngineSettings) -> MapperResult<Self> {
        EngineBuilder::new(settings.clone()).build()
    }

    pub fn builder(settings: EngineSettings) -> EngineBuilder {
        EngineBuilder::new(settings)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn schema(&self) -> &Arc<FieldSchema> {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.pipeline.stages().registry
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.pipeline.stages().validator
    }

    /// Provider call statistics for this run, if completion is enabled
    pub fn provider_health(&self) -> Option<&Arc<ProviderHealth>> {
        self.completion.as_ref().map(|service| service.health())
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    pub async fn process_record(
        &self,
        record: MetadataRecord,
        context: Option<&str>,
    ) -> MapperResult<ProcessedRecord> {
        self.process_record_with_cancel(record, context, &CancellationToken::new())
            .await
    }

    pub async fn process_record_with_cancel(
        &self,
        record: MetadataRecord,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> MapperResult<ProcessedRecord> {
        let job = match context {
            Some(text) => RecordJob::new(record).with_context(text),
            None => RecordJob::new(record),
        };
        self.pipeline.process_record(0, job, cancel).await
    }

    pub async fn process_batch(
        &self,
        jobs: Vec<RecordJob>,
        cancel: CancellationToken,
    ) -> MapperResult<BatchOutcome> {
        self.pipeline.process_batch(jobs, cancel).await
    }

    /// Catalog header row in column order
    pub fn header_row(&self) -> Vec<String> {
        self.schema.columns().into_iter().map(str::to_string).collect()
    }

    /// Export a processed record as a catalog row, sealing it
    pub fn export(&self, record: &mut MetadataRecord) -> MapperResult<Vec<String>> {
        record.export_row(&self.schema)
    }
}

/// Engine assembly with injectable stages
///
/// Anything not supplied is built from the settings.
pub struct EngineBuilder {
    settings: EngineSettings,
    schema: Option<FieldSchema>,
    layers: Option<LayerSet>,
    provider: Option<Arc<dyn CompletionProvider>>,
    disable_completion: bool,
    retry_policy: Option<RetryPolicy>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            schema: None,
            layers: None,
            provider: None,
            disable_completion: false,
            retry_policy: None,
            event_tx: None,
        }
    }

    pub fn schema(mut self, schema: FieldSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Use already loaded layers instead of the configured layer files
    pub fn layers(mut self, layers: LayerSet) -> Self {
        self.layers = Some(layers);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Run without a generative provider even if one is configured
    pub fn without_completion(mut self) -> Self {
        self.disable_completion = true;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn build(self) -> MapperResult<Engine> {
        self.settings.validate()?;
        let settings = self.settings;

        let schema = match self.schema {
            Some(schema) => schema,
            None => match &settings.schema.path {
                Some(path) => FieldSchema::load(path)?,
                None => FieldSchema::builtin()?,
            },
        };
        let schema = Arc::new(schema);

        let (layers, normalizer) = match self.layers {
            Some(layers) => {
                let normalizer = FieldNameNormalizer::builder()
                    .canonical_names(schema.names())
                    .build();
                (layers, normalizer)
            }
            None => load_configuration(&settings.layers, schema.names())?,
        };
        let layers = Arc::new(layers);

        let provider = if self.disable_completion {
            None
        } else {
            match self.provider {
                Some(provider) => Some(provider),
                None => configured_provider(&settings)?,
            }
        };

        let completion = provider.map(|provider| {
            let policy = self
                .retry_policy
                .unwrap_or_else(|| RetryPolicy::from_config(&settings.completion));
            let prompts = PromptTemplates::builtin()
                .with_overrides(layers.prompt_overrides())
                .with_context_budget(settings.completion.context_char_budget);
            Arc::new(
                CompletionService::new(provider, schema.clone())
                    .with_policy(policy)
                    .with_prompts(prompts)
                    .with_health(Arc::new(ProviderHealth::new(
                        settings.completion.unreachable_abort_threshold,
                    )))
                    .with_max_tokens(settings.completion.max_tokens),
            )
        });

        let mut registry = MappingRegistry::new(schema.clone(), layers.clone(), Arc::new(normalizer))?;
        if let Some(service) = &completion {
            registry = registry.with_completion(
                service.clone(),
                settings.completion.max_concurrent_completions,
            );
        }

        let validator = Validator::new(
            schema.clone(),
            layers.computation().clone(),
            settings.validation.clone(),
        );

        let session_log = settings
            .logging
            .session_log
            .as_ref()
            .map(|path| Arc::new(SessionLogWriter::new(path.clone(), settings.logging.verbosity)));

        let stages = PipelineStages {
            registry: Arc::new(registry),
            validator: Arc::new(validator),
            session_log,
            max_parallel_records: settings.pipeline.max_parallel_records,
        };
        let pipeline = match self.event_tx {
            Some(tx) => Pipeline::with_events(stages, tx),
            None => Pipeline::new(stages),
        };

        info!(
            fields = schema.len(),
            layers = layers.layers().len(),
            completion = completion.is_some(),
            "Engine ready"
        );

        Ok(Engine {
            settings,
            schema,
            completion,
            pipeline,
        })
    }
}

/// Anthropic client when completion is enabled and a key resolves
fn configured_provider(settings: &EngineSettings) -> MapperResult<Option<Arc<dyn CompletionProvider>>> {
    if !settings.completion.enabled {
        info!("Generative completion disabled in settings");
        return Ok(None);
    }
    match resolve_api_key(None, &settings.completion) {
        Some((key, source)) => {
            info!(source = %source, model = %settings.completion.model, "Generative provider configured");
            let client = AnthropicClient::new(key, &settings.completion)?;
            Ok(Some(Arc::new(client)))
        }
        None => {
            warn!("No API key configured; subjective fields will use defaults and fallbacks");
            Ok(None)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("fields", &self.schema.len())
            .field("completion", &self.completion.is_some())
            .finish()
    }
}
