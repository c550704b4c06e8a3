//! 推理服务客户端
//!
//! 单次请求、固定超时、不重试。非 2xx 响应和传输错误都映射为
//! `ServiceUnavailable`，并附带上游响应体便于排查。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use retina_core::{Prediction, Result, RetinaError};
use tracing::{debug, info, warn};

/// 推理服务配置
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ml-api:8000".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// 推理服务接口
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// 对暂存在本地的影像文件进行预测
    async fn predict(&self, image_path: &Path) -> Result<Prediction>;
}

/// 基于 HTTP multipart 上传的推理客户端
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpInferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RetinaError::Config(format!("Failed to build inference client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn predict_url(&self) -> String {
        format!("{}/predict", self.base_url)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn predict(&self, image_path: &Path) -> Result<Prediction> {
        let bytes = tokio::fs::read(image_path).await?;
        debug!("Uploading {} bytes from {}", bytes.len(), image_path.display());

        let part = Part::bytes(bytes)
            .file_name("exam_image.png")
            .mime_str("image/png")
            .map_err(|e| RetinaError::Internal(e.to_string()))?;
        let form = Form::new().part("image", part);

        let url = self.predict_url();
        info!("Sending image to inference service at {}", url);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("Inference request failed: {}", e);
                RetinaError::service_unavailable("Failed to connect to the analysis service", e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RetinaError::service_unavailable("Failed to read analysis service response", e.to_string())
        })?;

        if !status.is_success() {
            warn!("Inference service responded with {}", status);
            return Err(RetinaError::service_unavailable(
                format!("Analysis service responded with {}", status),
                body,
            ));
        }

        // 成功响应不是 JSON 时按空对象处理，概率取默认值
        let raw = serde_json::from_str(&body).unwrap_or_else(|_| serde_json::json!({}));
        let prediction = Prediction::from_json(raw);
        info!(
            "Inference finished: probability_dr={} probability_no_dr={}",
            prediction.probability_dr, prediction.probability_no_dr
        );
        Ok(prediction)
    }
}
