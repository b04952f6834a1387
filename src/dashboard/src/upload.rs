// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Storage of uploaded artifacts in the landing bucket.
//!
//! Artifacts land under `src/` keyed by their capture time, where the ingest
//! pipes pick them up.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info};

use crate::now::{EpochMillis, NowFn};

/// Failure to store an artifact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UploadError {
    pub message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> UploadError {
        UploadError {
            message: message.into(),
        }
    }
}

/// An object store that accepts whole objects.
#[async_trait]
pub trait ObjectStore: fmt::Debug + Send + Sync {
    /// Stores `body` at `key`, replacing anything already there.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), UploadError>;
}

/// An [`ObjectStore`] backed by an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Returns a store for `bucket`.
    ///
    /// Credentials come from the standard AWS provider chain. The region does
    /// too, unless `region` overrides it.
    pub async fn new(bucket: String, region: Option<String>) -> S3ObjectStore {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let client = S3Client::new(&loader.load().await);
        S3ObjectStore { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), UploadError> {
        let len = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| UploadError::new(DisplayErrorContext(&err).to_string()))?;
        debug!("s3 PutObject done {}b s3://{}/{}", len, self.bucket, key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemObjectStoreCore {
    objects: BTreeMap<String, (Bytes, String)>,
    fail_with: Option<String>,
}

/// An in-memory [`ObjectStore`].
#[derive(Debug, Clone, Default)]
pub struct MemObjectStore {
    core: Arc<Mutex<MemObjectStoreCore>>,
}

impl MemObjectStore {
    pub fn new() -> MemObjectStore {
        MemObjectStore::default()
    }

    /// Makes every subsequent put fail with `message`.
    pub fn fail_with(&self, message: &str) {
        self.core.lock().expect("lock poisoned").fail_with = Some(message.to_string());
    }

    /// Returns the stored objects as `key -> (body, content type)`.
    pub fn objects(&self) -> BTreeMap<String, (Bytes, String)> {
        self.core.lock().expect("lock poisoned").objects.clone()
    }
}

#[async_trait]
impl ObjectStore for MemObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), UploadError> {
        let mut core = self.core.lock().expect("lock poisoned");
        if let Some(message) = &core.fail_with {
            return Err(UploadError::new(message.clone()));
        }
        core.objects
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct UploadArtifact {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Stores artifacts under time-derived keys.
#[derive(Debug, Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    now: NowFn,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, now: NowFn) -> Uploader {
        Uploader { store, now }
    }

    /// Stores `artifact` and returns the key it was stored under.
    pub async fn upload(&self, artifact: UploadArtifact) -> Result<String, UploadError> {
        let key = object_key(self.now.now(), &artifact.filename);
        self.store
            .put(&key, artifact.data, &artifact.content_type)
            .await?;
        info!("uploaded {}", key);
        Ok(key)
    }
}

/// Returns the key for a file named `filename` captured at `captured_at`.
///
/// The filename is used verbatim.
pub fn object_key(captured_at: EpochMillis, filename: &str) -> String {
    format!("src/{captured_at}_{filename}")
}

#[cfg(test)]
mod tests {
    use crate::now::now_fixed;

    use super::*;

    fn artifact(filename: &str) -> UploadArtifact {
        UploadArtifact {
            filename: filename.into(),
            content_type: "text/csv".into(),
            data: Bytes::from_static(b"claim_id,amount\n1,100\n"),
        }
    }

    #[tokio::test]
    async fn test_upload_key() {
        let store = MemObjectStore::new();
        let uploader = Uploader::new(Arc::new(store.clone()), now_fixed(1_700_000_000_000));
        let key = uploader.upload(artifact("report.csv")).await.unwrap();
        assert_eq!(key, "src/1700000000000_report.csv");

        let objects = store.objects();
        let (body, content_type) = &objects[&key];
        assert_eq!(body.as_ref(), b"claim_id,amount\n1,100\n");
        assert_eq!(content_type, "text/csv");
    }

    #[test]
    fn test_keys_differ_by_capture_time() {
        assert_ne!(object_key(1, "a.csv"), object_key(2, "a.csv"));
        assert_eq!(object_key(5, "my file.csv"), "src/5_my file.csv");
    }

    #[tokio::test]
    async fn test_store_failure() {
        let store = MemObjectStore::new();
        store.fail_with("AccessDenied");
        let uploader = Uploader::new(Arc::new(store.clone()), now_fixed(0));
        let err = uploader.upload(artifact("report.csv")).await.unwrap_err();
        assert_eq!(err, UploadError::new("AccessDenied"));
        assert!(store.objects().is_empty());
    }
}
