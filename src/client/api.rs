use reqwest::multipart::{Form, Part};
use std::time::Duration;

use super::{ClientError, SelectedImage};

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// HTTP client for the meme API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn generate(
        &self,
        image: &SelectedImage,
        top_text: &str,
        bottom_text: &str,
    ) -> Result<Vec<u8>, ClientError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.name.clone())
            .mime_str(&image.mime_type)?;
        let form = Form::new()
            .part("image", part)
            .text("topText", top_text.to_string())
            .text("bottomText", bottom_text.to_string());

        let response = self
            .http
            .post(self.url("/api/generate-meme"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::Generation { status, detail });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
