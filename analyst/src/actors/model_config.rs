use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_MODEL_CATALOG_PATH: &str = "analyst/config/model-catalog.toml";
const BUILTIN_MODEL_CATALOG_TOML: &str = include_str!("../../config/model-catalog.example.toml");

/// Call sites that resolve a model through the registry.
pub const CALLSITE_SUPERVISOR: &str = "supervisor";
pub const CALLSITE_SEARCH: &str = "search";
pub const CALLSITE_DOC_ANALYST: &str = "doc_analyst";
pub const CALLSITE_RAG: &str = "rag";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("missing API key environment variable: {0}")]
    MissingApiKey(String),
    #[error("no fallback model available")]
    NoFallbackAvailable,
}

/// A model reachable through an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub headers: HashMap<String, String>,
    pub temperature: Option<f32>,
}

impl ModelConfig {
    pub fn api_key(&self) -> Result<String, ModelConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ModelConfigError::MissingApiKey(self.api_key_env.clone()))
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelResolutionSource {
    Request,
    Callsite,
    EnvDefault,
    Fallback,
}

impl ModelResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Callsite => "callsite",
            Self::EnvDefault => "env_default",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub config: ModelConfig,
    pub source: ModelResolutionSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResolutionContext {
    pub request_model: Option<String>,
    pub callsite_preference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    configs: HashMap<String, ModelConfig>,
    aliases: HashMap<String, String>,
    routing: ModelRoutingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelCatalog {
    pub default_model: Option<String>,
    pub allow_request_override: Option<bool>,
    pub allowed_models: Option<Vec<String>>,
    pub callsite_defaults: Option<HashMap<String, String>>,
    #[serde(default)]
    pub models: HashMap<String, ModelCatalogEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelCatalogEntry {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub aliases: Option<Vec<String>>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ModelRoutingConfig {
    default_model: Option<String>,
    allow_request_override: bool,
    allowed_models: Option<Vec<String>>,
    callsite_defaults: HashMap<String, String>,
}

type CatalogConfigs = (
    HashMap<String, ModelConfig>,
    HashMap<String, String>,
    ModelRoutingConfig,
);

impl ModelRegistry {
    /// Loads the catalog from disk, falling back to the built-in catalog.
    pub fn new() -> Self {
        let catalog = load_model_catalog();
        Self::from_catalog(&catalog).unwrap_or_else(|| {
            tracing::warn!("Falling back to built-in model catalog");
            Self::from_catalog(&built_in_model_catalog()).unwrap_or_else(|| {
                tracing::warn!("Built-in model catalog parse failed; registry will be empty");
                Self {
                    configs: HashMap::new(),
                    aliases: HashMap::new(),
                    routing: ModelRoutingConfig::default(),
                }
            })
        })
    }

    /// Builds a registry from an already parsed catalog. Returns `None` when
    /// the catalog has no usable models.
    pub fn from_catalog(catalog: &ModelCatalog) -> Option<Self> {
        let (configs, aliases, routing) = load_model_catalog_configs_from(catalog)?;
        Some(Self {
            configs,
            aliases,
            routing,
        })
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelConfig> {
        if let Some(canonical) = self.aliases.get(model_id) {
            return self.configs.get(canonical);
        }
        self.configs.get(model_id)
    }

    pub fn available_model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.configs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn resolve(
        &self,
        context: &ModelResolutionContext,
    ) -> Result<ResolvedModel, ModelConfigError> {
        if let Some(request_model) = context.request_model.as_ref() {
            let resolved = self
                .get(request_model)
                .cloned()
                .ok_or_else(|| ModelConfigError::UnknownModel(request_model.clone()))?;
            return Ok(ResolvedModel {
                config: resolved,
                source: ModelResolutionSource::Request,
            });
        }

        if let Some(callsite_model) = context.callsite_preference.as_ref() {
            if let Some(resolved) = self.get(callsite_model).cloned() {
                return Ok(ResolvedModel {
                    config: resolved,
                    source: ModelResolutionSource::Callsite,
                });
            }
        }

        if let Ok(default_model) = std::env::var("ANALYST_DEFAULT_MODEL") {
            if let Some(resolved) = self.get(&default_model).cloned() {
                return Ok(ResolvedModel {
                    config: resolved,
                    source: ModelResolutionSource::EnvDefault,
                });
            }
        }

        if let Some(config_default) = self.routing.default_model.as_ref() {
            if let Some(resolved) = self.get(config_default).cloned() {
                return Ok(ResolvedModel {
                    config: resolved,
                    source: ModelResolutionSource::Fallback,
                });
            }
        }

        self.available_model_ids()
            .into_iter()
            .find_map(|id| self.get(&id).cloned())
            .map(|config| ResolvedModel {
                config,
                source: ModelResolutionSource::Fallback,
            })
            .ok_or(ModelConfigError::NoFallbackAvailable)
    }

    pub fn default_model_for_callsite(&self, callsite: &str) -> Option<String> {
        self.routing
            .callsite_defaults
            .get(callsite)
            .and_then(|id| self.get(id))
            .map(|cfg| cfg.id.clone())
            .or_else(|| {
                self.routing
                    .default_model
                    .as_ref()
                    .and_then(|id| self.get(id))
                    .map(|cfg| cfg.id.clone())
            })
    }

    /// Resolves the model for a call site. An explicit request model wins only
    /// when the catalog allows overrides; the `ANALYST_DEFAULT_MODEL`
    /// environment variable beats the catalog's own defaults.
    pub fn resolve_for_callsite(
        &self,
        callsite: &str,
        request_model: Option<&str>,
    ) -> Result<ResolvedModel, ModelConfigError> {
        let scoped_request = if self.routing.allow_request_override {
            request_model.map(str::to_string)
        } else {
            None
        };

        let mut resolved = self.resolve(&ModelResolutionContext {
            request_model: scoped_request,
            callsite_preference: self.routing.callsite_defaults.get(callsite).cloned(),
        })?;

        if !self.is_allowed_model(&resolved.config.id) {
            let fallback = self
                .available_model_ids()
                .into_iter()
                .find(|candidate| self.is_allowed_model(candidate))
                .and_then(|candidate| self.get(&candidate).cloned())
                .ok_or(ModelConfigError::NoFallbackAvailable)?;
            resolved = ResolvedModel {
                config: fallback,
                source: ModelResolutionSource::Fallback,
            };
        }

        Ok(resolved)
    }

    fn is_allowed_model(&self, model_id: &str) -> bool {
        let allowlist_matches = |candidate: &str| {
            self.get(candidate)
                .map(|cfg| cfg.id == model_id)
                .unwrap_or(candidate == model_id)
        };
        self.routing
            .allowed_models
            .as_ref()
            .map(|models| models.iter().any(|m| allowlist_matches(m)))
            .unwrap_or(true)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_model_catalog() -> ModelCatalog {
    let explicit_path = std::env::var("ANALYST_MODEL_CATALOG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);

    let Some(path) = explicit_path.or_else(|| find_default_config_path(DEFAULT_MODEL_CATALOG_PATH))
    else {
        tracing::info!("No model catalog file found; using built-in defaults");
        return built_in_model_catalog();
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "Failed to load model catalog file; using built-in defaults"
            );
            return built_in_model_catalog();
        }
    };
    toml::from_str(&content).unwrap_or_else(|err| {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "Failed to parse model catalog TOML; using built-in defaults"
        );
        built_in_model_catalog()
    })
}

pub fn built_in_model_catalog() -> ModelCatalog {
    toml::from_str(BUILTIN_MODEL_CATALOG_TOML).unwrap_or_else(|err| {
        tracing::error!(error = %err, "Failed to parse built-in model catalog");
        ModelCatalog::default()
    })
}

fn find_default_config_path(relative_path: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;
    loop {
        let candidate = current.join(relative_path);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            break;
        }
    }
    None
}

fn load_model_catalog_configs_from(catalog: &ModelCatalog) -> Option<CatalogConfigs> {
    if catalog.models.is_empty() {
        return None;
    }

    let mut configs = HashMap::new();
    let mut aliases = HashMap::new();

    for (id, entry) in &catalog.models {
        let Some(config) = model_config_from_catalog_entry(id, entry) else {
            continue;
        };

        aliases.insert(config.id.clone(), config.id.clone());
        if let Some(extra_aliases) = entry.aliases.as_ref() {
            for alias in extra_aliases {
                aliases.insert(alias.clone(), config.id.clone());
            }
        }
        configs.insert(config.id.clone(), config);
    }

    if configs.is_empty() {
        return None;
    }

    let routing = ModelRoutingConfig {
        default_model: catalog.default_model.clone(),
        allow_request_override: catalog.allow_request_override.unwrap_or(true),
        allowed_models: catalog.allowed_models.clone(),
        callsite_defaults: catalog.callsite_defaults.clone().unwrap_or_default(),
    };

    Some((configs, aliases, routing))
}

fn model_config_from_catalog_entry(id: &str, entry: &ModelCatalogEntry) -> Option<ModelConfig> {
    let provider = entry.provider.as_deref().unwrap_or("openai-generic");
    if provider != "openai-generic" && provider != "openai" {
        tracing::warn!(
            model_id = %id,
            provider = %provider,
            "Skipping catalog model with unsupported provider"
        );
        return None;
    }
    let Some(model) = entry.model.as_deref() else {
        tracing::warn!(model_id = %id, "Skipping catalog model with missing model field");
        return None;
    };
    let Some(base_url) = entry.base_url.as_deref() else {
        tracing::warn!(model_id = %id, "Skipping catalog model with missing base_url");
        return None;
    };
    let Some(api_key_env) = entry.api_key_env.as_deref() else {
        tracing::warn!(model_id = %id, "Skipping catalog model with missing api_key_env");
        return None;
    };

    Some(ModelConfig {
        id: id.to_string(),
        name: entry.name.clone().unwrap_or_else(|| id.to_string()),
        model: model.to_string(),
        base_url: base_url.to_string(),
        api_key_env: api_key_env.to_string(),
        headers: entry.headers.clone().unwrap_or_default(),
        temperature: entry.temperature,
    })
}
