use serde::{Deserialize, Serialize};

use crate::domain::TransferTarget;

/// JSON description of a logical resource, as served by the resource
/// endpoint. `fileUrl` is the actual transfer target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileType", default)]
    pub file_type: Option<String>,
    #[serde(rename = "fileSize", default)]
    pub file_size: Option<u64>,
}

impl From<ResourceDescriptor> for TransferTarget {
    fn from(descriptor: ResourceDescriptor) -> Self {
        TransferTarget {
            url: descriptor.file_url,
            suggested_name: descriptor.file_name,
            declared_type: descriptor.file_type,
            declared_size: descriptor.file_size,
        }
    }
}

/// Configuration for the API client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
        }
    }
}
