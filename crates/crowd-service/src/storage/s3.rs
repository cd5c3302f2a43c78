use super::{record_operation, ObjectStore, StorageError};
use crate::config::S3Settings;
use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::Builder as S3ConfigBuilder, error::DisplayErrorContext, primitives::ByteStream, Client,
};
use tracing::{debug, warn};

/// S3 (or MinIO) backed object store
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn connect(settings: &S3Settings) -> Self {
        let region = Region::new(settings.region.clone());
        let region_provider = RegionProviderChain::first_try(region.clone()).or_default_provider();
        let base = aws_config::defaults(BehaviorVersion::v2025_08_07())
            .region(region_provider)
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&base).region(region);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }
        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
            builder = builder.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }

        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let result = async {
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    let message = DisplayErrorContext(&e).to_string();
                    if e.into_service_error().is_no_such_key() {
                        StorageError::NotFound {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        }
                    } else {
                        StorageError::Backend(message)
                    }
                })?;

            let data = output
                .body
                .collect()
                .await
                .map_err(|e| StorageError::Backend(format!("failed to read object body: {}", e)))?;
            Ok::<_, StorageError>(data.into_bytes().to_vec())
        }
        .await;

        record_operation("get", &result);
        match &result {
            Ok(bytes) => debug!(bucket, key, bytes = bytes.len(), "downloaded object"),
            Err(e) => warn!(bucket, key, error = %e, "download failed"),
        }
        result
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = bytes.len();
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()));

        record_operation("put", &result);
        match &result {
            Ok(()) => debug!(bucket, key, bytes = size, "uploaded object"),
            Err(e) => warn!(bucket, key, error = %e, "upload failed"),
        }
        result
    }
}
