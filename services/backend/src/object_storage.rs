use crate::config::{normalize_env_value, EnvSnapshot, StorageConfig};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

/// Host serving publicly readable objects
pub const PUBLIC_HOST: &str = "https://storage.googleapis.com";

/// Object name prefix used when `GCS_PREFIX` is unset
pub const DEFAULT_PREFIX: &str = "app_data";

/// Errors raised while publishing files
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to upload '{key}': {message}")]
    Upload { key: String, message: String },
}

/// Destination for published objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` and make it publicly readable
    async fn put_public_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// [`ObjectStore`] backed by the S3 API, pointed at the GCS
/// interoperability endpoint by default
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new client from the storage configuration
    pub async fn new(config: &StorageConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let s3_config = S3ConfigBuilder::from(&aws_config)
            .endpoint_url(&config.endpoint_url)
            .force_path_style(config.force_path_style)
            .build();

        info!(
            endpoint = %config.endpoint_url,
            region = %config.region,
            "Object store client initialized"
        );

        Self {
            client: S3Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_public_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

/// Uploads files from the application data directory to a public bucket
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    bucket: Option<String>,
    prefix: String,
    app_data_directory: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, env: &EnvSnapshot) -> Self {
        Self {
            store,
            bucket: normalize_env_value(env.gcs_bucket.as_deref()),
            prefix: normalize_env_value(env.gcs_prefix.as_deref())
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            app_data_directory: env.app_data_directory(),
        }
    }

    /// Configured bucket, if publishing is enabled
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    pub fn app_data_directory(&self) -> &str {
        &self.app_data_directory
    }

    /// Upload `local_path` if a bucket is configured.
    ///
    /// Returns the public URL of the object, or `None` when publishing is
    /// disabled. The object name is `<prefix>/<relative>`, where `relative`
    /// defaults to the path below the app data directory.
    #[instrument(skip(self), fields(local_path = %local_path.display()))]
    pub async fn maybe_upload_file(
        &self,
        local_path: &Path,
        relative_path: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        let Some(bucket) = self.bucket.as_deref() else {
            debug!("No bucket configured, skipping upload");
            return Ok(None);
        };

        let relative = match relative_path {
            Some(relative) => relative.to_string(),
            None => derive_relative_path(&local_path.to_string_lossy(), &self.app_data_directory),
        };
        let key = object_name(&self.prefix, &relative);

        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| StorageError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;
        let size_bytes = body.len();

        self.store
            .put_public_object(bucket, &key, body, content_type_for(&key))
            .await?;

        metrics::counter!("storage.objects.published").increment(1);
        info!(bucket = %bucket, key = %key, size_bytes = size_bytes, "Object published");

        Ok(Some(public_url(bucket, &key)))
    }
}

/// Backslashes become `/` and leading slashes are removed
pub fn normalize_object_name(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Path of `local_path` below `app_data_directory`, or its file name when
/// it lives elsewhere
pub fn derive_relative_path(local_path: &str, app_data_directory: &str) -> String {
    let relative = match local_path.strip_prefix(app_data_directory) {
        Some(rest) => rest.to_string(),
        None => Path::new(local_path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    normalize_object_name(&relative)
}

/// `prefix` and `relative` joined posix-style; an absolute `relative` is
/// still placed under the prefix
pub fn object_name(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches(['/', '\\']);
    if prefix.is_empty() {
        return normalize_object_name(relative);
    }
    normalize_object_name(&format!("{prefix}/{}", relative.trim_start_matches(['/', '\\'])))
}

pub fn public_url(bucket: &str, object_name: &str) -> String {
    format!("{PUBLIC_HOST}/{bucket}/{object_name}")
}

/// Get content type for an exported file
fn content_type_for(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pdf" => "application/pdf",
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "html" => "text/html",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_for(dir: &Path, bucket: Option<&str>) -> EnvSnapshot {
        EnvSnapshot {
            app_data_directory: Some(dir.to_string_lossy().into_owned()),
            gcs_bucket: bucket.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_object_name() {
        assert_eq!(normalize_object_name("/exports/deck.pptx"), "exports/deck.pptx");
        assert_eq!(normalize_object_name("\\images\\a.png"), "images/a.png");
        assert_eq!(normalize_object_name("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn test_derive_relative_path() {
        assert_eq!(
            derive_relative_path("/tmp/presenton/exports/deck.pptx", "/tmp/presenton"),
            "exports/deck.pptx"
        );
        assert_eq!(
            derive_relative_path("/var/other/deck.pdf", "/tmp/presenton"),
            "deck.pdf"
        );
    }

    #[test]
    fn test_object_name_and_public_url() {
        assert_eq!(object_name("app_data", "exports/deck.pptx"), "app_data/exports/deck.pptx");
        assert_eq!(object_name("/shared/", "/a.png"), "shared/a.png");
        assert_eq!(object_name("", "a.png"), "a.png");
        assert_eq!(
            public_url("decks", "app_data/a.png"),
            "https://storage.googleapis.com/decks/app_data/a.png"
        );
    }

    #[test]
    fn test_absolute_relative_path_stays_under_prefix() {
        assert_eq!(
            object_name("app_data", "/exports/deck.pdf"),
            "app_data/exports/deck.pdf"
        );
        assert_eq!(
            object_name("app_data", "\\exports\\deck.pdf"),
            "app_data/exports/deck.pdf"
        );
    }

    #[test]
    fn test_get_content_type() {
        assert_eq!(
            content_type_for("a/deck.PPTX"),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        );
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upload_skipped_without_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MockObjectStore::new();
        store.expect_put_public_object().times(0);

        let publisher = Publisher::new(Arc::new(store), &env_for(dir.path(), Some(" 'none' ")));
        let result = publisher
            .maybe_upload_file(&dir.path().join("missing.pdf"), None)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(publisher.bucket(), None);
    }

    #[tokio::test]
    async fn test_upload_file_below_app_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("exports")).unwrap();
        let file = dir.path().join("exports").join("deck.pdf");
        std::fs::write(&file, b"%PDF-1.7").unwrap();

        let mut store = MockObjectStore::new();
        store
            .expect_put_public_object()
            .withf(|bucket: &str, key: &str, body: &Vec<u8>, content_type: &str| {
                bucket == "decks"
                    && key == "app_data/exports/deck.pdf"
                    && body.as_slice() == b"%PDF-1.7"
                    && content_type == "application/pdf"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let publisher = Publisher::new(Arc::new(store), &env_for(dir.path(), Some("decks")));
        let url = publisher.maybe_upload_file(&file, None).await.unwrap();

        assert_eq!(
            url.as_deref(),
            Some("https://storage.googleapis.com/decks/app_data/exports/deck.pdf")
        );
    }

    #[tokio::test]
    async fn test_upload_with_explicit_relative_path_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cover.png");
        std::fs::write(&file, [0u8; 4]).unwrap();

        let mut store = MockObjectStore::new();
        store
            .expect_put_public_object()
            .withf(|_: &str, key: &str, _: &Vec<u8>, _: &str| key == "shared/images/cover.png")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut env = env_for(dir.path(), Some("decks"));
        env.gcs_prefix = Some("\"shared\"".to_string());
        let publisher = Publisher::new(Arc::new(store), &env);

        let url = publisher
            .maybe_upload_file(&file, Some("images/cover.png"))
            .await
            .unwrap();
        assert_eq!(
            url.as_deref(),
            Some("https://storage.googleapis.com/decks/shared/images/cover.png")
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MockObjectStore::new();
        store.expect_put_public_object().times(0);

        let publisher = Publisher::new(Arc::new(store), &env_for(dir.path(), Some("decks")));
        let result = publisher
            .maybe_upload_file(&dir.path().join("gone.pptx"), None)
            .await;

        assert!(matches!(result, Err(StorageError::Read { .. })));
    }

    #[tokio::test]
    async fn test_upload_error_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("deck.pptx");
        std::fs::write(&file, b"pk").unwrap();

        let mut store = MockObjectStore::new();
        store.expect_put_public_object().returning(|_, key, _, _| {
            Err(StorageError::Upload {
                key: key.to_string(),
                message: "access denied".to_string(),
            })
        });

        let publisher = Publisher::new(Arc::new(store), &env_for(dir.path(), Some("decks")));
        let error = publisher.maybe_upload_file(&file, None).await.unwrap_err();

        assert!(error.to_string().contains("access denied"));
    }
}
