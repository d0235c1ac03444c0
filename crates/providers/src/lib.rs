//! External classifier providers for the optional fourth classification tier.
//!
//! A provider turns a description of one file into a verdict: a relative
//! destination folder, a numeric confidence in `[0, 1]` and a short
//! rationale. Callers treat any error as "no verdict".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod noop;
pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable")]
    Unavailable,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// What a provider gets to see about a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub path: String,
    pub file_name: String,
    pub extension: String,
    pub keywords: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub destination: String,
    pub confidence: f32,
    pub rationale: Option<String>,
}

#[async_trait::async_trait]
pub trait ExternalClassifier: Send + Sync {
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    classifiers: HashMap<String, Arc<dyn ExternalClassifier>>,
    pub preferred: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, name: &str, provider: Arc<dyn ExternalClassifier>) -> Self {
        self.classifiers.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred(mut self, name: &str) -> Self {
        self.preferred = Some(name.to_string());
        self
    }

    pub fn classifier(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn ExternalClassifier>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no classifier configured".into()))?;
        self.classifiers
            .get(&key)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop::NoopProvider;

    #[test]
    fn registry_resolves_preferred_provider() {
        let reg = ProviderRegistry::new()
            .with_classifier("noop", Arc::new(NoopProvider))
            .set_preferred("noop");
        assert!(reg.classifier(None).is_ok());
        assert!(matches!(
            reg.classifier(Some("missing")),
            Err(ProviderError::UnknownProvider(name)) if name == "missing"
        ));
    }

    #[test]
    fn registry_without_preference_is_an_error() {
        let reg = ProviderRegistry::new().with_classifier("noop", Arc::new(NoopProvider));
        assert!(reg.classifier(None).is_err());
    }
}
