// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! S3 implementation of the storage port.
//!
//! Built on the `object_store` crate. Credentials are resolved the usual AWS
//! way (environment, profile, instance metadata); the bucket, region and an
//! optional S3-compatible endpoint come from the forwarder configuration.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore as _, PutOptions, PutPayload};
use tracing::debug;

use crate::constants::{OBJECT_CONTENT_ENCODING, OBJECT_CONTENT_TYPE};
use crate::errors::StorageError;
use crate::storage::ObjectStore;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// S3-compatible endpoint (MinIO, LocalStack). `None` targets AWS.
    pub endpoint: Option<String>,
}

#[derive(Debug)]
pub struct S3Store {
    store: AmazonS3,
    bucket: String,
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        Ok(Self {
            store: builder.build()?,
            bucket: config.bucket.clone(),
        })
    }

    fn put_options() -> PutOptions {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, OBJECT_CONTENT_TYPE.into());
        attributes.insert(Attribute::ContentEncoding, OBJECT_CONTENT_ENCODING.into());
        PutOptions {
            attributes,
            ..Default::default()
        }
    }
}

/// Converts a key to an object store path without any rewriting. A key that
/// would be stored under a different name is an error.
pub fn object_path(key: &str) -> Result<ObjectPath, StorageError> {
    let path = ObjectPath::parse(key)?;
    if path.as_ref() != key {
        return Err(StorageError::KeyRewritten {
            key: key.to_string(),
            stored: path.as_ref().to_string(),
        });
    }
    Ok(path)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        let path = object_path(key)?;
        let size = body.len();
        self.store
            .put_opts(&path, PutPayload::from(body), Self::put_options())
            .await?;
        debug!("Put {size} bytes to s3://{}/{path}", self.bucket);
        Ok(())
    }
}
