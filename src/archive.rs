use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::profile::UserProfile;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to serialize profile: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Object store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Object store rejected {key} with {status}: {body}")]
    Rejected {
        key: String,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where archived profiles end up.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ArchiveError>;
}

/// S3-style `PUT {endpoint}/{bucket}/{key}`.
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(client: Client, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self, body))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ArchiveError> {
        let mut request = self
            .client
            .put(self.object_url(bucket, key))
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiveError::Rejected {
                key: key.to_string(),
                status,
                body,
            });
        }
        Ok(())
    }
}

/// Writes objects under `<root>/<bucket>/` on the local disk.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ArchiveError> {
        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ArchiveError::Io {
                path: dir.clone(),
                source,
            })?;
        let path = dir.join(key);
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| ArchiveError::Io { path, source })
    }
}

/// `user_profile_<YYYYmmddHHMMSS>.json`
pub fn object_key<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("user_profile_{}.json", at.format("%Y%m%d%H%M%S"))
}

/// Serializes submitted profiles into a bucket, one object per submission.
#[derive(Clone)]
pub struct ProfileArchiver {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ProfileArchiver {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the key the profile was stored under.
    #[instrument(skip_all, fields(bucket = %self.bucket))]
    pub async fn archive(&self, profile: &UserProfile) -> Result<String, ArchiveError> {
        let key = object_key(&Local::now());
        let body = serde_json::to_vec(profile)?;
        match self
            .store
            .put_object(&self.bucket, &key, body, JSON_CONTENT_TYPE)
            .await
        {
            Ok(()) => {
                info!(%key, "Archived user profile");
                Ok(key)
            }
            Err(e) => {
                error!(%key, "Failed to archive user profile: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_object_key_format() {
        let at = Utc.with_ymd_and_hms(2024, 7, 3, 9, 5, 1).unwrap();
        assert_eq!(object_key(&at), "user_profile_20240703090501.json");
    }

    #[test]
    fn test_object_url_trims_trailing_slash() {
        let store = HttpObjectStore::new(Client::new(), "http://minio.local:9000/", None);
        assert_eq!(
            store.object_url("profiles", "user_profile_1.json"),
            "http://minio.local:9000/profiles/user_profile_1.json"
        );
    }
}
