//! S3-backed [`ObjectStore`].

use super::{ObjectStore, ObjectStoreError, PutObject, PutReceipt};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use aws_sdk_s3::Client;
use tracing::debug;

/// Object store client for Amazon S3 and S3-compatible services.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from the default credential chain.
    ///
    /// A custom `endpoint` switches to path-style addressing, which is what
    /// localstack and minio expect.
    pub async fn connect(region: &str, endpoint: Option<&str>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            debug!(endpoint, "Using custom S3 endpoint");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::from_client(Client::from_conf(builder.build()))
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, request: PutObject) -> Result<PutReceipt, ObjectStoreError> {
        let mut put = self
            .client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .content_length(request.body.len() as i64)
            .content_type(request.content_type)
            .body(ByteStream::from(request.body));
        if request.server_side_encryption {
            put = put.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let output = put.send().await.map_err(|err| {
            if err.code() == Some("NoSuchBucket") {
                ObjectStoreError::NoSuchBucket(request.bucket.clone())
            } else {
                ObjectStoreError::Request(DisplayErrorContext(&err).to_string())
            }
        })?;

        Ok(PutReceipt {
            etag: output.e_tag().map(str::to_string),
        })
    }
}
