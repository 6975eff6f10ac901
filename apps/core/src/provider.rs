use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::api::PublicApi;
use crate::model::{ProviderMetadata, QueryInput, ResultEntry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub struct InitContext {
    pub metadata: ProviderMetadata,
    pub api: Arc<dyn PublicApi>,
}

pub trait Provider: Send + Sync {
    fn query(&self, query: &QueryInput) -> Vec<ResultEntry>;

    fn init(&self, _context: &InitContext) -> Result<(), ProviderError> {
        Ok(())
    }

    fn translated_title(&self) -> Option<String> {
        None
    }

    fn translated_description(&self) -> Option<String> {
        None
    }

    fn save(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct ProviderPair {
    pub metadata: ProviderMetadata,
    pub provider: Arc<dyn Provider>,
}

impl ProviderPair {
    pub fn new(metadata: ProviderMetadata, provider: Arc<dyn Provider>) -> Self {
        Self { metadata, provider }
    }

    pub fn summary(&self) -> ProviderSummary<'_> {
        ProviderSummary {
            translated_title: self
                .provider
                .translated_title()
                .unwrap_or_else(|| self.metadata.name.clone()),
            translated_description: self
                .provider
                .translated_description()
                .unwrap_or_else(|| self.metadata.description.clone()),
            metadata: &self.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProviderSummary<'a> {
    #[serde(flatten)]
    pub metadata: &'a ProviderMetadata,
    pub translated_title: String,
    pub translated_description: String,
}

impl fmt::Debug for ProviderPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderPair")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
