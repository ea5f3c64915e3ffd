//! Fluent Cloud Storage builder.
//!
//! Resolves a local file or directory into a concrete file list, then moves
//! those files to or from a bucket prefix through the service layer.

use crate::error::{FluentError, Result};
use crate::service::GcsService;
use crate::validate::GCS_SCHEME;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Gcs {
    project: String,
    service: Arc<dyn GcsService>,
    local: Option<PathBuf>,
    local_files: Option<Vec<PathBuf>>,
    bucket: Option<String>,
    prefix: Option<String>,
}

impl Gcs {
    pub fn new(project: impl Into<String>, service: Arc<dyn GcsService>) -> Result<Self> {
        let project = project.into();
        if project.is_empty() {
            return Err(FluentError::Validation(
                "project id must be provided".to_string(),
            ));
        }
        Ok(Self {
            project,
            service,
            local: None,
            local_files: None,
            bucket: None,
            prefix: None,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Local source/target: a single file, or a directory whose regular
    /// files (non-recursive) become the resolved list.
    pub fn local(self, path: impl AsRef<Path>) -> Result<Self> {
        self.resolve_local(path.as_ref(), None)
    }

    /// Like [`Gcs::local`], keeping only directory entries whose name ends
    /// with `suffix`.
    pub fn local_with_suffix(self, path: impl AsRef<Path>, suffix: &str) -> Result<Self> {
        self.resolve_local(path.as_ref(), Some(suffix))
    }

    fn resolve_local(mut self, path: &Path, suffix: Option<&str>) -> Result<Self> {
        let files = if path.is_file() {
            vec![path.to_path_buf()]
        } else if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if let Some(suffix) = suffix {
                    if !entry.file_name().to_string_lossy().ends_with(suffix) {
                        continue;
                    }
                }
                files.push(entry.path());
            }
            files.sort();
            files
        } else {
            return Err(FluentError::Validation(format!(
                "{} is not a dir nor a file",
                path.display()
            )));
        };

        self.local = Some(path.to_path_buf());
        self.local_files = Some(files);
        Ok(self)
    }

    /// Bucket name; a leading `gs://` is stripped.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        self.bucket = Some(
            bucket
                .strip_prefix(GCS_SCHEME)
                .map(|b| b.to_string())
                .unwrap_or(bucket),
        );
        self
    }

    /// Object prefix, stored verbatim (no trailing separator expected).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// String-keyed setter dispatch; unknown keys are logged and ignored.
    pub fn apply(self, key: &str, value: &str) -> Result<Self> {
        match key {
            "local" => self.local(value),
            "bucket" => Ok(self.bucket(value)),
            "prefix" => Ok(self.prefix(value)),
            other => {
                warn!("ignored setting `{other}`");
                Ok(self)
            }
        }
    }

    pub fn local_files(&self) -> Option<&[PathBuf]> {
        self.local_files.as_deref()
    }

    fn require_bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| FluentError::Validation("bucket must be specified".to_string()))
    }

    fn require_prefix(&self) -> Result<&str> {
        self.prefix
            .as_deref()
            .ok_or_else(|| FluentError::Validation("prefix must be specified".to_string()))
    }

    /// Upload every resolved local file to `{prefix}/{basename}`. Files with
    /// the same basename overwrite each other at the destination.
    pub async fn upload(&self) -> Result<()> {
        let bucket = self.require_bucket()?;
        let prefix = self.require_prefix()?;
        let files = self.local_files.as_deref().ok_or_else(|| {
            FluentError::Validation(".local() must be called before upload".to_string())
        })?;

        for file in files {
            let basename = file_basename(file)?;
            let object = format!("{prefix}/{basename}");
            info!(
                "uploading {} to {GCS_SCHEME}{bucket}/{object}",
                file.display()
            );
            self.service.upload_file(bucket, &object, file).await?;
        }
        Ok(())
    }

    /// Download everything directly under the prefix into the local
    /// directory, flattening object names to their basename. Directory-like
    /// entries are skipped.
    pub async fn download(&self) -> Result<()> {
        let bucket = self.require_bucket()?;
        let prefix = self.require_prefix()?;
        let local = self.local.as_deref().ok_or_else(|| {
            FluentError::Validation(".local() must be called before download".to_string())
        })?;
        if !local.is_dir() {
            return Err(FluentError::Validation(format!(
                "{} must be a dir for download",
                local.display()
            )));
        }

        let objects = self.service.list_objects(bucket, prefix, Some("/")).await?;
        for name in objects {
            if name.ends_with('/') {
                warn!("skipped the blob {name}, which is a directory");
                continue;
            }
            let basename = name.rsplit('/').next().unwrap_or(&name);
            let destination = local.join(basename);
            info!("downloading {name} to {}", destination.display());
            self.service
                .download_object(bucket, &name, &destination)
                .await?;
        }
        Ok(())
    }

    /// Delete every object under the prefix in one batched service call.
    pub async fn delete(&self) -> Result<()> {
        let bucket = self.require_bucket()?;
        let prefix = self
            .prefix
            .as_deref()
            .ok_or_else(|| FluentError::Validation("prefix must be specified for delete".to_string()))?;

        let objects = self.service.list_objects(bucket, prefix, None).await?;
        for name in &objects {
            warn!("deleting {GCS_SCHEME}{bucket}/{name}");
        }
        self.service.delete_objects(bucket, &objects).await
    }
}

fn file_basename(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            FluentError::Validation(format!("{} has no file name", path.display()))
        })
}

impl std::fmt::Debug for Gcs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gcs")
            .field("project", &self.project)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{GcsCall, MockGcsService};
    use std::fs::File;
    use std::io::Write;

    fn gcs(service: Arc<MockGcsService>) -> Gcs {
        Gcs::new("here-is-project-id", service).unwrap()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        writeln!(f, "x").unwrap();
        path
    }

    #[test]
    fn test_local_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "data.json");
        let g = gcs(Arc::new(MockGcsService::new())).local(&file).unwrap();
        assert_eq!(g.local_files().unwrap(), &[file]);
    }

    #[test]
    fn test_local_directory_with_suffix_filter() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            touch(dir.path(), &format!("part-{i}.json"));
        }
        for i in 0..5 {
            touch(dir.path(), &format!("part-{i}.csv"));
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "deep.json");

        let service = Arc::new(MockGcsService::new());
        let g = gcs(service.clone())
            .local_with_suffix(dir.path(), ".json")
            .unwrap();
        assert_eq!(g.local_files().unwrap().len(), 10);

        let g = gcs(service).local(dir.path()).unwrap();
        assert_eq!(g.local_files().unwrap().len(), 15);
    }

    #[test]
    fn test_local_recomputes_on_each_call() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        touch(dir_a.path(), "a.json");
        let b = touch(dir_b.path(), "b.json");

        let g = gcs(Arc::new(MockGcsService::new()))
            .local(dir_a.path())
            .unwrap()
            .local(dir_b.path())
            .unwrap();
        assert_eq!(g.local_files().unwrap(), &[b]);
    }

    #[test]
    fn test_local_rejects_missing_path() {
        let err = gcs(Arc::new(MockGcsService::new()))
            .local("/no/such/path")
            .unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
    }

    #[test]
    fn test_bucket_strips_scheme() {
        let service = Arc::new(MockGcsService::new());
        let g = gcs(service.clone()).bucket("gs://my-bucket");
        assert_eq!(g.bucket.as_deref(), Some("my-bucket"));
        let g = gcs(service).bucket("my-bucket");
        assert_eq!(g.bucket.as_deref(), Some("my-bucket"));
    }

    #[tokio::test]
    async fn test_upload_places_files_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "data.json");

        let service = Arc::new(MockGcsService::new());
        gcs(service.clone())
            .local(&file)
            .unwrap()
            .bucket("gs://my-bucket")
            .prefix("stage/2024")
            .upload()
            .await
            .unwrap();

        assert_eq!(
            service.calls(),
            vec![GcsCall::Upload {
                bucket: "my-bucket".to_string(),
                object: "stage/2024/data.json".to_string(),
                local: file,
            }]
        );
    }

    #[tokio::test]
    async fn test_upload_requires_configuration() {
        let service = Arc::new(MockGcsService::new());
        let err = gcs(service.clone()).upload().await.unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_download_skips_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockGcsService::new().with_objects(&[
            "stage/a.json",
            "stage/sub/",
            "stage/b.json",
        ]));

        gcs(service.clone())
            .local(dir.path())
            .unwrap()
            .bucket("my-bucket")
            .prefix("stage")
            .download()
            .await
            .unwrap();

        let calls = service.calls();
        assert_eq!(
            calls[0],
            GcsCall::List {
                bucket: "my-bucket".to_string(),
                prefix: "stage".to_string(),
                delimiter: Some("/".to_string()),
            }
        );
        let downloads: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                GcsCall::Download { object, local, .. } => Some((object.clone(), local.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            downloads,
            vec![
                ("stage/a.json".to_string(), dir.path().join("a.json")),
                ("stage/b.json".to_string(), dir.path().join("b.json")),
            ]
        );
    }

    #[tokio::test]
    async fn test_download_requires_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "data.json");
        let err = gcs(Arc::new(MockGcsService::new()))
            .local(&file)
            .unwrap()
            .bucket("my-bucket")
            .prefix("stage")
            .download()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be a dir"));
    }

    #[tokio::test]
    async fn test_delete_requires_prefix() {
        let err = gcs(Arc::new(MockGcsService::new()))
            .bucket("my-bucket")
            .delete()
            .await
            .unwrap_err();
        assert!(matches!(err, FluentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_batches_everything_under_prefix() {
        let service = Arc::new(MockGcsService::new().with_objects(&[
            "stage/a.json",
            "stage/sub/deep.json",
            "other/keep.json",
        ]));

        gcs(service.clone())
            .bucket("my-bucket")
            .prefix("stage")
            .delete()
            .await
            .unwrap();

        let calls = service.calls();
        assert_eq!(
            calls[1],
            GcsCall::DeleteBatch {
                bucket: "my-bucket".to_string(),
                objects: vec![
                    "stage/a.json".to_string(),
                    "stage/sub/deep.json".to_string(),
                ],
            }
        );
    }

    #[test]
    fn test_apply_dispatch() {
        let g = gcs(Arc::new(MockGcsService::new()))
            .apply("bucket", "gs://my-bucket")
            .unwrap()
            .apply("prefix", "stage")
            .unwrap()
            .apply("ignore", "ignored")
            .unwrap();
        assert_eq!(g.bucket.as_deref(), Some("my-bucket"));
        assert_eq!(g.prefix.as_deref(), Some("stage"));
    }
}
