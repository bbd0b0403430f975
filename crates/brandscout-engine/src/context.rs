use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;

use brandscout_contracts::design::BrandQuery;

use crate::auth::{ServiceAccountKey, ServiceAccountTokenSource};
use crate::config::{BrandScoutConfig, GenerationBackend};
use crate::error::{AuthInitError, GenerationError};
use crate::mockup::{generate_mockup, GenerationOutcome};
use crate::providers::{
    DryrunProvider, GeminiImagenProvider, ImageProvider, ImageProviderRegistry,
    VertexImagenProvider,
};
use crate::scout::{scout, GoogleCustomSearch, ImageSearch, ScoutOutcome};

/// Process-wide handles to the external capabilities. Built once, then only read.
pub struct AppContext {
    search: Box<dyn ImageSearch>,
    generator: Option<Arc<dyn ImageProvider>>,
    unavailable_reason: String,
    init_warnings: Vec<AuthInitError>,
}

impl AppContext {
    /// Credential problems never fail initialization; they disable generation
    /// and are kept as warnings.
    pub fn initialize(config: &BrandScoutConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .build()
            .context("failed building HTTP client")?;

        let mut registry = ImageProviderRegistry::new();
        registry.register(DryrunProvider);
        let mut init_warnings = Vec::new();

        match config.backend {
            GenerationBackend::Vertex => match service_account_key(config) {
                Ok(key) => {
                    tracing::debug!(project_id = %key.project_id, "service account credential loaded");
                    registry.register(VertexImagenProvider::new(
                        ServiceAccountTokenSource::new(key, http.clone()),
                        &config.location,
                        &config.model,
                        config.generation_api_base(),
                        http.clone(),
                    ));
                }
                Err(err) => init_warnings.push(err),
            },
            GenerationBackend::Gemini => match config.secrets.imagen_api_key.as_deref() {
                Some(api_key) => registry.register(GeminiImagenProvider::new(
                    api_key,
                    &config.model,
                    config.generation_api_base(),
                    http.clone(),
                )),
                None => init_warnings.push(AuthInitError::MissingApiKey),
            },
            GenerationBackend::Dryrun => {}
        }

        for warning in &init_warnings {
            tracing::warn!(backend = %config.backend, error = %warning, "image generation disabled");
        }

        let generator = registry.get(config.backend.provider_name());
        let unavailable_reason = match init_warnings.first() {
            Some(err) => err.to_string(),
            None => format!("no provider registered for backend {}", config.backend),
        };
        let search = GoogleCustomSearch::new(
            &config.search_api_base,
            config.secrets.search_api_key.clone(),
            config.secrets.search_engine_id.clone(),
            http,
        );

        Ok(Self {
            search: Box::new(search),
            generator,
            unavailable_reason,
            init_warnings,
        })
    }

    /// Assembles a context from ready-made capabilities.
    pub fn from_parts(
        search: Box<dyn ImageSearch>,
        generator: Option<Arc<dyn ImageProvider>>,
    ) -> Self {
        Self {
            search,
            generator,
            unavailable_reason: "image generation is not configured".to_string(),
            init_warnings: Vec::new(),
        }
    }

    pub fn init_warnings(&self) -> &[AuthInitError] {
        &self.init_warnings
    }

    pub fn generation_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub fn generator_name(&self) -> Option<&str> {
        self.generator.as_deref().map(|provider| provider.name())
    }

    pub fn scout(&self, query: &BrandQuery) -> ScoutOutcome {
        scout(self.search.as_ref(), query)
    }

    pub fn generate(&self, query: &BrandQuery) -> GenerationOutcome {
        match self.generator.as_deref() {
            Some(provider) => generate_mockup(provider, query),
            None => GenerationOutcome::NoImage(GenerationError::Unavailable {
                reason: self.unavailable_reason.clone(),
            }),
        }
    }
}

/// The inline blob wins over the credential file.
fn service_account_key(config: &BrandScoutConfig) -> Result<ServiceAccountKey, AuthInitError> {
    if let Some(blob) = config.secrets.credential_blob.as_deref() {
        return ServiceAccountKey::from_json(blob);
    }
    let Some(path) = config.credential_file.as_deref() else {
        return Err(AuthInitError::MissingCredential);
    };
    let blob = fs::read_to_string(path).map_err(|source| AuthInitError::CredentialFile {
        path: path.to_path_buf(),
        source,
    })?;
    ServiceAccountKey::from_json(&blob)
}
