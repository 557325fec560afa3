//! Object storage backends
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use async_trait::async_trait;
use cinder_config::ObjectStorageConfig;
use rusoto_core::{request::HttpClient, Region};
use rusoto_credential::StaticProvider;
use rusoto_s3::{PutObjectRequest, S3Client, S3};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Destination for published artifacts
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload one local file under `key`
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<()>;

    fn backend(&self) -> &str;
}

/// Object key for a published file: `video/{dir_name}/{file_name}`
pub fn object_key(dir_name: &str, file_name: &str) -> String {
    format!("video/{}/{}", dir_name, file_name)
}

/// MIME type by extension
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("mp4") => "video/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// S3-compatible object storage
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: &ObjectStorageConfig) -> Result<Self> {
        let credentials =
            StaticProvider::new_minimal(config.access_key.clone(), config.secret_key.clone());

        let region = Region::Custom {
            name: config
                .region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: normalize_endpoint(&config.endpoint),
        };

        info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "Creating S3 client"
        );

        let http_client = HttpClient::new()
            .map_err(|e| PipelineError::Upload(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: S3Client::new_with(http_client, credentials, region),
            bucket: config.bucket.clone(),
        })
    }
}

/// Endpoints without a scheme are assumed to be HTTPS
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<()> {
        let body = tokio::fs::read(local_path).await.map_err(|e| {
            PipelineError::Upload(format!("failed to read {}: {}", local_path.display(), e))
        })?;
        let size = body.len();

        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            body: Some(body.into()),
            content_type: Some(content_type_for(local_path).to_string()),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| PipelineError::Upload(format!("put {}: {}", key, e)))?;

        debug!(key = key, bytes = size, "Object uploaded");
        Ok(())
    }

    fn backend(&self) -> &str {
        "s3"
    }
}

/// Files stay where the pipeline wrote them
#[derive(Debug, Default)]
pub struct LocalObjectStore;

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<()> {
        debug!(key = key, path = %local_path.display(), "Local storage, nothing to upload");
        Ok(())
    }

    fn backend(&self) -> &str {
        "local"
    }
}
