use crate::{ClassifyRequest, ClassifyResponse, ExternalClassifier, ProviderError};

/// Stands in when no inference service is configured; never has a verdict.
#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl ExternalClassifier for NoopProvider {
    async fn classify(&self, _request: &ClassifyRequest) -> Result<ClassifyResponse, ProviderError> {
        Err(ProviderError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_is_always_unavailable() {
        let request = ClassifyRequest {
            path: "/photos/a.jpg".into(),
            file_name: "a.jpg".into(),
            extension: ".jpg".into(),
            keywords: vec![],
            description: String::new(),
        };
        let err = NoopProvider.classify(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable));
    }
}
