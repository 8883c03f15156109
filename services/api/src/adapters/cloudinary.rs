//! services/api/src/adapters/cloudinary.rs
//!
//! This module contains the adapter for the Cloudinary upload API.
//! It implements the `MediaStorageService` port from the `core` crate.
//!
//! Requests are signed: the parameters are sorted, joined as `k=v&k=v`, suffixed
//! with the API secret and hashed with SHA-256.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use lesson_core::domain::{AssetKind, AudioTransform, ImageTransform, StoredImage};
use lesson_core::ports::{MediaStorageService, PortError, PortResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::http;

const CLOUDINARY_BASE_URL: &str = "https://api.cloudinary.com/v1_1";

/// Account credentials, as shown on the Cloudinary console.
#[derive(Clone, Debug)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct CloudinaryAdapter {
    client: reqwest::Client,
    credentials: CloudinaryCredentials,
    base_url: String,
}

impl CloudinaryAdapter {
    pub fn new(credentials: CloudinaryCredentials) -> PortResult<Self> {
        Ok(Self {
            client: http::client(Duration::from_secs(60))?,
            credentials,
            base_url: CLOUDINARY_BASE_URL.to_string(),
        })
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url, self.credentials.cloud_name, resource_type, action
        )
    }

    /// Adds the timestamp, key and signature to `params` and posts them as a form.
    async fn signed_post<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        mut params: BTreeMap<&'static str, String>,
        file: Option<String>,
    ) -> PortResult<T> {
        params.insert("timestamp", Utc::now().timestamp().to_string());
        let signature = sign(&params, &self.credentials.api_secret);

        let mut form: Vec<(&str, String)> = params.into_iter().collect();
        form.push(("api_key", self.credentials.api_key.clone()));
        form.push(("signature", signature));
        form.push(("signature_algorithm", "sha256".to_string()));
        if let Some(file) = file {
            form.push(("file", file));
        }

        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(http::transport_error)?;

        if !response.status().is_success() {
            return Err(http::provider_error(response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

/// SHA-256 over the sorted `k=v` pairs followed by the secret, hex encoded.
fn sign(params: &BTreeMap<&'static str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn image_transformation(t: &ImageTransform) -> String {
    format!(
        "c_{},h_{},q_{},w_{}/f_{}",
        t.crop, t.height, t.quality, t.width, t.format
    )
}

fn audio_transformation(t: &AudioTransform) -> String {
    format!("ac_{},af_{},br_{}", t.codec, t.sample_rate, t.bit_rate)
}

fn resource_type(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Image => "image",
        // Cloudinary files audio under its video pipeline.
        AssetKind::Audio => "video",
    }
}

//=========================================================================================
// `MediaStorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl MediaStorageService for CloudinaryAdapter {
    async fn upload_image(
        &self,
        source_url: &str,
        folder: &str,
        transform: &ImageTransform,
    ) -> PortResult<StoredImage> {
        let mut params = BTreeMap::new();
        params.insert("folder", folder.to_string());
        params.insert("transformation", image_transformation(transform));

        let uploaded: UploadResponse = self
            .signed_post(
                &self.endpoint("image", "upload"),
                params,
                Some(source_url.to_string()),
            )
            .await?;
        debug!(public_id = %uploaded.public_id, "Image uploaded");

        Ok(StoredImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            width: uploaded.width.unwrap_or(transform.width),
            height: uploaded.height.unwrap_or(transform.height),
        })
    }

    async fn upload_audio(
        &self,
        audio: &[u8],
        folder: &str,
        public_id: &str,
        transform: &AudioTransform,
    ) -> PortResult<String> {
        if audio.is_empty() {
            return Err(PortError::InvalidInput("Empty audio buffer".to_string()));
        }
        let data_uri = format!("data:audio/mp3;base64,{}", STANDARD.encode(audio));

        let mut params = BTreeMap::new();
        params.insert("folder", folder.to_string());
        params.insert("public_id", public_id.to_string());
        params.insert("format", transform.codec.to_string());
        params.insert("transformation", audio_transformation(transform));

        let uploaded: UploadResponse = self
            .signed_post(
                &self.endpoint(resource_type(AssetKind::Audio), "upload"),
                params,
                Some(data_uri),
            )
            .await?;
        Ok(uploaded.secure_url)
    }

    async fn delete_asset(&self, public_id: &str, kind: AssetKind) -> PortResult<bool> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());

        let destroyed: DestroyResponse = self
            .signed_post(&self.endpoint(resource_type(kind), "destroy"), params, None)
            .await?;
        info!(public_id, result = %destroyed.result, "Asset destroy requested");
        Ok(destroyed.result == "ok")
    }
}
