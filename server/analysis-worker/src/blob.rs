//! Blob storage of raw log files (S3-compatible via object_store).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;

use crate::config::S3Settings;
use crate::error::BlobError;

/// Raw object bytes, streamed in chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, BlobError>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn ping(&self) -> Result<(), BlobError>;

  async fn open(&self, bucket: &str, key: &str) -> Result<ByteStream, BlobError>;

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobError>;
}

/// One object_store client per bucket, created on first use and shared by all jobs.
pub struct S3BlobStore {
  settings: S3Settings,
  production: bool,
  default_bucket: String,
  clients: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3BlobStore {
  pub fn new(settings: S3Settings, production: bool, default_bucket: impl Into<String>) -> Self {
    Self {
      settings,
      production,
      default_bucket: default_bucket.into(),
      clients: Mutex::new(HashMap::new()),
    }
  }

  fn client(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, BlobError> {
    let mut clients = self
      .clients
      .lock()
      .map_err(|_| BlobError::Other("client cache poisoned".into()))?;
    if let Some(client) = clients.get(bucket) {
      return Ok(client.clone());
    }

    let mut builder = if self.production {
      AmazonS3Builder::from_env()
    } else {
      AmazonS3Builder::new()
    };
    builder = builder
      .with_bucket_name(bucket)
      .with_region(&self.settings.region);
    if let Some(endpoint) = &self.settings.endpoint {
      builder = builder
        .with_endpoint(endpoint)
        .with_allow_http(endpoint.starts_with("http://"))
        .with_virtual_hosted_style_request(false);
    }
    if let (Some(access), Some(secret)) = (&self.settings.access_key, &self.settings.secret_key) {
      builder = builder
        .with_access_key_id(access)
        .with_secret_access_key(secret);
    }

    let client: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
    clients.insert(bucket.to_string(), client.clone());
    Ok(client)
  }
}

fn not_found(err: object_store::Error, bucket: &str, key: &str) -> BlobError {
  match err {
    object_store::Error::NotFound { .. } => BlobError::NotFound {
      bucket: bucket.to_string(),
      key: key.to_string(),
    },
    other => BlobError::ObjectStore(other),
  }
}

#[async_trait]
impl BlobStore for S3BlobStore {
  /// Lists the default bucket's root; fails when the endpoint or credentials are bad.
  async fn ping(&self) -> Result<(), BlobError> {
    let client = self.client(&self.default_bucket)?;
    client.list_with_delimiter(None).await?;
    Ok(())
  }

  async fn open(&self, bucket: &str, key: &str) -> Result<ByteStream, BlobError> {
    let client = self.client(bucket)?;
    let result = client
      .get(&Path::from(key))
      .await
      .map_err(|e| not_found(e, bucket, key))?;
    Ok(result.into_stream().map_err(BlobError::from).boxed())
  }

  async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobError> {
    let client = self.client(bucket)?;
    client.delete(&Path::from(key)).await?;
    Ok(())
  }
}
