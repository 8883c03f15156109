//! crates/lesson_core/src/store.rs
//!
//! Uploads images and synthesized audio to the media CDN.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{AssetKind, AudioTransform, ImageTransform, LessonImage, StoredImage};
use crate::error::LessonError;
use crate::ports::MediaStorageService;

pub const IMAGE_FOLDER: &str = "lessons";
pub const AUDIO_FOLDER: &str = "lessons/audio";

#[derive(Clone)]
pub struct MediaStore {
    storage: Arc<dyn MediaStorageService>,
    image_transform: ImageTransform,
    audio_transform: AudioTransform,
}

impl MediaStore {
    pub fn new(storage: Arc<dyn MediaStorageService>) -> Self {
        Self {
            storage,
            image_transform: ImageTransform::default(),
            audio_transform: AudioTransform::default(),
        }
    }

    /// Re-hosts `source_url` on the CDN as an 800x600 webp.
    pub async fn store_image(&self, source_url: &str) -> Result<StoredImage, LessonError> {
        self.storage
            .upload_image(source_url, IMAGE_FOLDER, &self.image_transform)
            .await
            .map_err(LessonError::Storage)
    }

    /// Uploads an mp3 buffer under `{name_hint}_{epoch millis}_{random}` and
    /// returns its URL. Two uploads never share a public id.
    pub async fn store_audio(&self, audio: &[u8], name_hint: &str) -> Result<String, LessonError> {
        let public_id = format!(
            "{}_{}_{}",
            name_hint,
            Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let url = self
            .storage
            .upload_audio(audio, AUDIO_FOLDER, &public_id, &self.audio_transform)
            .await
            .map_err(LessonError::Storage)?;
        info!(public_id = %public_id, "Audio uploaded");
        Ok(url)
    }

    /// Returns whether the CDN reported the asset as deleted. Errors count as `false`.
    pub async fn delete_asset(&self, public_id: &str, kind: AssetKind) -> bool {
        match self.storage.delete_asset(public_id, kind).await {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(public_id, error = %e, "Failed to delete asset");
                false
            }
        }
    }

    /// Uploads every image concurrently. A failed upload yields `None` at that
    /// position; the output always has the input's length.
    pub async fn optimize_many(&self, images: &[LessonImage]) -> Vec<Option<StoredImage>> {
        join_all(images.iter().map(|image| async move {
            match self.store_image(&image.url).await {
                Ok(stored) => Some(stored),
                Err(e) => {
                    warn!(title = %image.title, error = %e, "Image optimization failed");
                    None
                }
            }
        }))
        .await
    }

    /// Best-effort removal of audio files by URL. URLs that do not point into the
    /// audio folder are skipped.
    pub async fn delete_audio_files(&self, urls: &[String]) {
        let ids: Vec<String> = urls
            .iter()
            .filter_map(|url| audio_public_id_from_url(url))
            .collect();
        let results = join_all(ids.iter().map(|id| self.delete_asset(id, AssetKind::Audio))).await;
        info!(
            requested = urls.len(),
            deleted = results.iter().filter(|ok| **ok).count(),
            "Audio files removed"
        );
    }
}

/// `https://res.cloudinary.com/x/video/upload/v1/lessons/audio/intro_1.mp3`
/// → `lessons/audio/intro_1`.
pub fn audio_public_id_from_url(url: &str) -> Option<String> {
    let marker = format!("/{}/", AUDIO_FOLDER);
    let start = url.find(&marker)? + marker.len();
    let name: String = url[start..]
        .chars()
        .take_while(|c| *c != '.' && *c != '?')
        .collect();
    if name.is_empty() {
        return None;
    }
    Some(format!("{}/{}", AUDIO_FOLDER, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeStorage;

    #[test]
    fn extracts_audio_public_ids() {
        assert_eq!(
            audio_public_id_from_url(
                "https://res.cloudinary.com/demo/video/upload/v17/lessons/audio/intro_1700.mp3"
            )
            .as_deref(),
            Some("lessons/audio/intro_1700")
        );
        assert_eq!(audio_public_id_from_url("https://elsewhere/x.mp3"), None);
    }

    #[tokio::test]
    async fn audio_public_ids_carry_the_hint_and_a_timestamp() {
        let storage = Arc::new(FakeStorage::default());
        let store = MediaStore::new(storage.clone());

        let url = store.store_audio(b"mp3", "section_0_intro").await.unwrap();
        let uploads = storage.audio_uploads();
        assert_eq!(uploads.len(), 1);
        let (folder, public_id) = &uploads[0];
        assert_eq!(folder, AUDIO_FOLDER);
        let rest = public_id.strip_prefix("section_0_intro_").unwrap();
        let (millis, suffix) = rest.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 8);
        assert!(url.contains(public_id.as_str()));
    }

    #[tokio::test]
    async fn simultaneous_uploads_with_the_same_hint_get_distinct_ids() {
        let storage = Arc::new(FakeStorage::default());
        let store = MediaStore::new(storage.clone());

        let (first, second) = tokio::join!(
            store.store_audio(b"first-intro", "intro"),
            store.store_audio(b"second-intro", "intro")
        );
        assert_ne!(first.unwrap(), second.unwrap());
        let uploads = storage.audio_uploads();
        assert_ne!(uploads[0].1, uploads[1].1);
    }

    #[tokio::test]
    async fn optimize_many_is_positional_and_tolerates_failures() {
        let storage = Arc::new(FakeStorage::default().failing_on("https://img/bad.jpg"));
        let store = MediaStore::new(storage);
        let images: Vec<LessonImage> = ["https://img/a.jpg", "https://img/bad.jpg", "https://img/c.jpg"]
            .iter()
            .map(|url| LessonImage {
                url: url.to_string(),
                title: "t".to_string(),
                description: None,
            })
            .collect();

        let stored = store.optimize_many(&images).await;
        assert_eq!(stored.len(), 3);
        assert!(stored[0].as_ref().unwrap().url.ends_with("a.webp"));
        assert!(stored[1].is_none());
        assert!(stored[2].as_ref().unwrap().url.ends_with("c.webp"));
    }

    #[tokio::test]
    async fn delete_reports_false_on_error() {
        let storage = Arc::new(FakeStorage::default());
        let store = MediaStore::new(storage);
        assert!(store.delete_asset("lessons/known", AssetKind::Image).await);
        assert!(!store.delete_asset("missing/error", AssetKind::Image).await);
    }
}
