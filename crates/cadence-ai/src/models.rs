//! Model registry: a short list of models known to follow the step protocol.

use crate::{Model, Provider, ResponseFormat};

struct ModelEntry {
    id: &'static str,
    provider: Provider,
    response_format: ResponseFormat,
}

const MODEL_ENTRIES: &[ModelEntry] = &[
    ModelEntry {
        id: "gpt-4.1",
        provider: Provider::OpenAI,
        response_format: ResponseFormat::JsonSchema,
    },
    ModelEntry {
        id: "gpt-4.1-mini",
        provider: Provider::OpenAI,
        response_format: ResponseFormat::JsonSchema,
    },
    ModelEntry {
        id: "gpt-4o-mini",
        provider: Provider::OpenAI,
        response_format: ResponseFormat::JsonSchema,
    },
    ModelEntry {
        id: "gemma3:1b",
        provider: Provider::Ollama,
        response_format: ResponseFormat::JsonObject,
    },
    ModelEntry {
        id: "llama3.2",
        provider: Provider::Ollama,
        response_format: ResponseFormat::JsonObject,
    },
    ModelEntry {
        id: "llama-3.3-70b-versatile",
        provider: Provider::Groq,
        response_format: ResponseFormat::JsonObject,
    },
];

/// Model used when nothing is configured
pub const DEFAULT_MODEL_ID: &str = "gpt-4.1";

impl ModelEntry {
    fn to_model(&self) -> Model {
        Model {
            response_format: self.response_format,
            ..Model::new(self.provider, self.id)
        }
    }
}

/// Look up a model by provider and ID.
pub fn get_model(provider: Provider, id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id && e.provider == provider)
        .map(|e| e.to_model())
}

/// Look up a model by ID only (first match across all providers).
pub fn get_model_by_id(id: &str) -> Option<Model> {
    MODEL_ENTRIES
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.to_model())
}

/// Resolve a model: registry first, then a provider-default definition.
pub fn resolve(provider: Option<Provider>, id: &str) -> Model {
    match provider {
        Some(p) => get_model(p, id).unwrap_or_else(|| Model::new(p, id)),
        None => get_model_by_id(id).unwrap_or_else(|| Model::new(Provider::OpenAI, id)),
    }
}
