//! [`GcsService`] over Cloud Storage via the `object_store` crate.

use crate::error::{FluentError, Result};
use crate::service::GcsService;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::Path;

/// Builds one store per bucket on demand; credentials come from the standard
/// `GOOGLE_*` environment unless a key path is given.
pub struct GcsBackend {
    service_account_path: Option<String>,
}

impl GcsBackend {
    pub fn from_env() -> Self {
        Self {
            service_account_path: None,
        }
    }

    pub fn from_service_account_path(path: impl Into<String>) -> Self {
        Self {
            service_account_path: Some(path.into()),
        }
    }

    fn store(&self, bucket: &str) -> Result<GoogleCloudStorage> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(path) = &self.service_account_path {
            builder = builder.with_service_account_path(path);
        }
        builder
            .build()
            .map_err(|e| FluentError::Service(e.to_string()))
    }
}

#[async_trait]
impl GcsService for GcsBackend {
    async fn upload_file(&self, bucket: &str, object: &str, local: &Path) -> Result<()> {
        let store = self.store(bucket)?;
        let bytes = tokio::fs::read(local).await?;
        store
            .put(&ObjectPath::from(object), PutPayload::from(bytes))
            .await
            .map_err(|e| FluentError::Service(e.to_string()))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<String>> {
        let store = self.store(bucket)?;
        let prefix_path = ObjectPath::from(prefix);

        if delimiter.is_some() {
            let listing = store
                .list_with_delimiter(Some(&prefix_path))
                .await
                .map_err(|e| FluentError::Service(e.to_string()))?;
            let mut names: Vec<String> = listing
                .objects
                .into_iter()
                .map(|meta| meta.location.to_string())
                .collect();
            // Directory-like prefixes keep their trailing separator so the
            // caller can tell them apart from plain objects.
            names.extend(
                listing
                    .common_prefixes
                    .into_iter()
                    .map(|p| format!("{p}/")),
            );
            names.sort();
            Ok(names)
        } else {
            let names: Vec<String> = store
                .list(Some(&prefix_path))
                .map_ok(|meta| meta.location.to_string())
                .try_collect()
                .await
                .map_err(|e| FluentError::Service(e.to_string()))?;
            Ok(names)
        }
    }

    async fn download_object(&self, bucket: &str, object: &str, local: &Path) -> Result<()> {
        let store = self.store(bucket)?;
        let bytes = store
            .get(&ObjectPath::from(object))
            .await
            .map_err(|e| FluentError::Service(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| FluentError::Service(e.to_string()))?;
        tokio::fs::write(local, &bytes).await?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, objects: &[String]) -> Result<()> {
        let store = self.store(bucket)?;
        let locations = stream::iter(
            objects
                .iter()
                .map(|name| Ok(ObjectPath::from(name.as_str()))),
        )
        .boxed();
        store
            .delete_stream(locations)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| FluentError::Service(e.to_string()))?;
        Ok(())
    }
}
