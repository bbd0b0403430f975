//! Secrets and generation settings.
//!
//! Values come from an optional TOML secrets file and are then overridden by
//! environment variables. The result is read-only for the rest of the process.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_SECRETS_PATH: &str = ".brandscout/secrets.toml";
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";
pub const DEFAULT_IMAGEN_MODEL: &str = "imagen-3.0-generate-001";
pub const DEFAULT_SEARCH_API_BASE: &str = "https://www.googleapis.com/customsearch/v1";

/// Which image provider, and so which authentication method, generation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    /// Vertex AI with a service-account credential.
    Vertex,
    /// Gemini API with an API key.
    Gemini,
    /// Offline placeholder backgrounds.
    Dryrun,
}

impl GenerationBackend {
    pub fn provider_name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Gemini => "gemini",
            Self::Dryrun => "dryrun",
        }
    }
}

impl fmt::Display for GenerationBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

impl FromStr for GenerationBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vertex" | "vertex-ai" | "vertexai" => Ok(Self::Vertex),
            "gemini" | "gemini-api" | "api-key" => Ok(Self::Gemini),
            "dryrun" | "dry-run" | "offline" => Ok(Self::Dryrun),
            other => Err(format!(
                "unknown generation backend '{other}' (expected vertex, gemini or dryrun)"
            )),
        }
    }
}

/// The recognized secret keys. TOML accepts both the snake_case names and
/// the upper-case names used by hosted secret stores.
#[derive(Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default, alias = "GOOGLE_KEY")]
    pub credential_blob: Option<String>,
    #[serde(default, alias = "SEARCH_KEY")]
    pub search_api_key: Option<String>,
    #[serde(default, alias = "SEARCH_ENGINE_ID")]
    pub search_engine_id: Option<String>,
    #[serde(default, alias = "GEMINI_API_KEY")]
    pub imagen_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |value: &Option<String>| if value.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("credential_blob", &mark(&self.credential_blob))
            .field("search_api_key", &mark(&self.search_api_key))
            .field("search_engine_id", &mark(&self.search_engine_id))
            .field("imagen_api_key", &mark(&self.imagen_api_key))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(flatten)]
    secrets: Secrets,
    #[serde(default)]
    generation: GenerationTable,
    #[serde(default)]
    search: SearchTable,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationTable {
    backend: Option<GenerationBackend>,
    location: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchTable {
    api_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrandScoutConfig {
    pub secrets: Secrets,
    pub backend: GenerationBackend,
    pub location: String,
    pub model: String,
    /// Service-account JSON file, read at context initialization when no blob is set.
    pub credential_file: Option<PathBuf>,
    pub vertex_api_base: Option<String>,
    pub imagen_api_base: Option<String>,
    pub search_api_base: String,
}

impl BrandScoutConfig {
    /// Reads the secrets file (explicit path, `BRANDSCOUT_SECRETS`, or the
    /// default location when it exists) and applies process environment
    /// overrides.
    pub fn load(secrets_path: Option<&Path>) -> Result<Self> {
        let path = secrets_path
            .map(Path::to_path_buf)
            .or_else(|| non_empty(env::var("BRANDSCOUT_SECRETS").ok()).map(PathBuf::from))
            .or_else(|| {
                let fallback = PathBuf::from(DEFAULT_SECRETS_PATH);
                fallback.exists().then_some(fallback)
            });
        let raw = match path {
            Some(path) => Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("failed reading secrets {}", path.display()))?,
            ),
            None => None,
        };
        Self::from_sources(raw.as_deref(), |key| env::var(key).ok())
    }

    /// Builds the configuration from secrets-file text and an environment lookup.
    pub fn from_sources(
        secrets_toml: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file: SecretsFile = match secrets_toml {
            Some(raw) => toml::from_str(raw).context("secrets file is not valid TOML")?,
            None => SecretsFile::default(),
        };

        let mut secrets = file.secrets;
        secrets.credential_blob =
            first_env(&lookup, &["GOOGLE_KEY"]).or(non_empty(secrets.credential_blob));
        let credential_file =
            first_env(&lookup, &["GOOGLE_APPLICATION_CREDENTIALS"]).map(PathBuf::from);
        secrets.search_api_key =
            first_env(&lookup, &["SEARCH_KEY"]).or(non_empty(secrets.search_api_key));
        secrets.search_engine_id =
            first_env(&lookup, &["SEARCH_ENGINE_ID"]).or(non_empty(secrets.search_engine_id));
        secrets.imagen_api_key = first_env(
            &lookup,
            &["IMAGEN_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"],
        )
        .or(non_empty(secrets.imagen_api_key));

        let backend = match first_env(&lookup, &["BRANDSCOUT_BACKEND"]) {
            Some(raw) => raw.parse::<GenerationBackend>().map_err(anyhow::Error::msg)?,
            None => file
                .generation
                .backend
                .unwrap_or_else(|| default_backend(&secrets, credential_file.is_some())),
        };
        let location = first_env(&lookup, &["VERTEX_LOCATION"])
            .or(non_empty(file.generation.location))
            .unwrap_or_else(|| DEFAULT_VERTEX_LOCATION.to_string());
        let model = first_env(&lookup, &["IMAGEN_MODEL"])
            .or(non_empty(file.generation.model))
            .unwrap_or_else(|| DEFAULT_IMAGEN_MODEL.to_string());
        let file_api_base = non_empty(file.generation.api_base);
        let vertex_api_base = first_env(&lookup, &["VERTEX_API_BASE"])
            .or_else(|| file_api_base.clone())
            .map(|value| value.trim_end_matches('/').to_string());
        let imagen_api_base = first_env(&lookup, &["IMAGEN_API_BASE"])
            .or(file_api_base)
            .map(|value| value.trim_end_matches('/').to_string());
        let search_api_base = first_env(&lookup, &["SEARCH_API_BASE"])
            .or(non_empty(file.search.api_base))
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SEARCH_API_BASE.to_string());

        Ok(Self {
            secrets,
            backend,
            location,
            model,
            credential_file,
            vertex_api_base,
            imagen_api_base,
            search_api_base,
        })
    }

    pub fn with_backend(mut self, backend: GenerationBackend) -> Self {
        self.backend = backend;
        self
    }

    /// API base override for the selected backend.
    pub fn generation_api_base(&self) -> Option<&str> {
        match self.backend {
            GenerationBackend::Vertex => self.vertex_api_base.as_deref(),
            GenerationBackend::Gemini => self.imagen_api_base.as_deref(),
            GenerationBackend::Dryrun => None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn default_backend(secrets: &Secrets, has_credential_file: bool) -> GenerationBackend {
    if secrets.credential_blob.is_some() || has_credential_file {
        GenerationBackend::Vertex
    } else if secrets.imagen_api_key.is_some() {
        GenerationBackend::Gemini
    } else {
        GenerationBackend::Vertex
    }
}

fn first_env(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty(lookup(*key)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
