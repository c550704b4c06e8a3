//! 影像存储客户端

use std::time::Duration;

use async_trait::async_trait;
use retina_core::{Result, RetinaError};
use tracing::{debug, warn};

/// 影像存储配置
#[derive(Debug, Clone)]
pub struct ImageStoreConfig {
    pub timeout: Duration,
}

impl Default for ImageStoreConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// 影像存储接口，不做缓存
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// 通过 HTTP GET 读取外部托管的影像
#[derive(Debug, Clone)]
pub struct HttpImageStore {
    client: reqwest::Client,
}

impl HttpImageStore {
    pub fn new(config: ImageStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RetinaError::Config(format!("Failed to build image store client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching exam image from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetinaError::Storage(format!("Failed to fetch image {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Image store responded with {} for {}", status, url);
            return Err(RetinaError::Storage(format!(
                "Image store responded with {} for {}",
                status, url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RetinaError::Storage(format!("Failed to read image {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use axum::{routing::get, Router};

    #[tokio::test]
    async fn test_fetch_returns_bytes() {
        let app = Router::new().route("/exam.png", get(|| async { vec![1u8, 2, 3, 4] }));
        let base = spawn_server(app).await;

        let store = HttpImageStore::new(ImageStoreConfig::default()).unwrap();
        let bytes = store.fetch(&format!("{}/exam.png", base)).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_missing_image_is_storage_error() {
        let base = spawn_server(Router::new()).await;

        let store = HttpImageStore::new(ImageStoreConfig::default()).unwrap();
        let err = store.fetch(&format!("{}/missing.png", base)).await.unwrap_err();
        assert!(matches!(err, RetinaError::Storage(_)));
    }
}
