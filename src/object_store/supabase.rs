use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};

use super::{validate_key, ObjectStore, ObjectStoreError};

/// Supabase Storage object store backend, authenticated with the project's service key.
pub struct SupabaseStore {
    base_url: Url,
    bucket: String,
    client: Client,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(url: &str, service_key: &str, bucket: &str) -> Result<Self, anyhow::Error> {
        let base_url = Url::parse(url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("SUPABASE_URL must be an absolute http(s) URL: {url}");
        }

        let client = Client::builder().build()?;

        Ok(Self {
            base_url,
            bucket: bucket.to_string(),
            client,
            service_key: service_key.to_string(),
        })
    }

    /// `{base}/storage/v1/object/{bucket}/{key...}` with every segment percent-encoded.
    fn object_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        validate_key(key)?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Backend("invalid base URL".to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "object", self.bucket.as_str()])
            .extend(key.split('/'));
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }
}

async fn backend_failure(action: &str, resp: reqwest::Response) -> ObjectStoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    ObjectStoreError::Backend(format!("Supabase {action} failed ({status}): {body}"))
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let url = self.object_url(key)?;

        let resp = self
            .authorized(self.client.post(url))
            .header("Content-Type", "application/octet-stream")
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(backend_failure("upload", resp).await);
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let url = self.object_url(key)?;

        let resp = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            return Err(backend_failure("download", resp).await);
        }

        resp.bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let url = self.object_url(key)?;

        let resp = self
            .authorized(self.client.delete(url))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(backend_failure("delete", resp).await);
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let url = self.object_url(key)?;

        let resp = self
            .authorized(self.client.head(url))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(false),
            _ => Err(backend_failure("lookup", resp).await),
        }
    }
}
