use reqwest::Client;
use thiserror::Error;

use crate::domain::TransferTarget;

use super::models::{ApiConfig, ResourceDescriptor};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Resource endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Thin client for the resource endpoint: turns a logical resource id into
/// the descriptor carrying its real file URL.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Fetch the descriptor for a logical resource.
    pub async fn fetch_resource(&self, resource_id: &str) -> Result<ResourceDescriptor> {
        let url = format!(
            "{}/resources/{}",
            self.config.base_url.trim_end_matches('/'),
            resource_id
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let descriptor: ResourceDescriptor = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))?;

        if descriptor.file_url.trim().is_empty() {
            return Err(ApiError::InvalidResponse("missing fileUrl".to_string()));
        }

        Ok(descriptor)
    }

    /// Resolve a resource id straight into a transfer target.
    pub async fn resolve_target(&self, resource_id: &str) -> Result<TransferTarget> {
        Ok(self.fetch_resource(resource_id).await?.into())
    }
}
