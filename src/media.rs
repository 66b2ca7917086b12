//! Media Delegate: hands uploaded files to durable storage and probes video
//! durations.
//!
//! Storage goes through [`MediaBackend`]. Without Cloudinary credentials the
//! assets are written to local disk and served by `/media/...`.

use std::{
    fs,
    io::{self, BufReader},
    path::{Component, Path, PathBuf},
    process::Command,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::config::CloudinaryCredentials;
use crate::error::ApiError;

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Thumbnail,
    Avatar,
    CoverImage,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Video,
        MediaKind::Thumbnail,
        MediaKind::Avatar,
        MediaKind::CoverImage,
    ];

    /// Directory segment used on disk and in `/media/{kind}/...` URLs.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Thumbnail => "thumbnails",
            Self::Avatar => "avatars",
            Self::CoverImage => "covers",
        }
    }

    pub fn from_dir_name(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == value)
    }

    fn resource_type(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Thumbnail | Self::Avatar | Self::CoverImage => "image",
        }
    }
}

/// A stored asset: the public URL plus the id needed to delete it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: String,
}

/// Blocking storage backend. Calls are moved onto the blocking pool by
/// [`MediaDelegate`].
pub trait MediaBackend: Send + Sync {
    fn upload(&self, path: &Path, kind: MediaKind) -> Result<UploadedAsset>;
    fn remove(&self, public_id: &str, kind: MediaKind) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Disk storage under `root/{kind}/{blake3 prefix}-{uuid}.{ext}`. Every
/// upload gets its own file, so removing one record's asset never touches
/// another's.
#[derive(Debug, Clone)]
pub struct LocalMediaBackend {
    root: PathBuf,
    public_url: String,
}

impl LocalMediaBackend {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Result<Self> {
        let root = root.into();
        for kind in MediaKind::ALL {
            let dir = root.join(kind.dir_name());
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating media directory {}", dir.display()))?;
        }
        Ok(Self {
            root,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Maps a public id back onto disk, refusing anything that could escape
    /// the media root.
    fn resolve(&self, public_id: &str, kind: MediaKind) -> Result<PathBuf> {
        let relative = Path::new(public_id);
        let mut components = relative.components();
        let (Some(Component::Normal(dir)), Some(Component::Normal(_)), None) =
            (components.next(), components.next(), components.next())
        else {
            bail!("malformed local media id {public_id:?}");
        };
        if dir != kind.dir_name() {
            bail!("media id {public_id:?} does not belong to {}", kind.dir_name());
        }
        Ok(self.root.join(relative))
    }
}

impl MediaBackend for LocalMediaBackend {
    fn upload(&self, path: &Path, kind: MediaKind) -> Result<UploadedAsset> {
        let file = fs::File::open(path)
            .with_context(|| format!("opening upload {}", path.display()))?;
        let mut hasher = blake3::Hasher::new();
        io::copy(&mut BufReader::new(file), &mut hasher)
            .with_context(|| format!("hashing upload {}", path.display()))?;
        let digest = hasher.finalize().to_hex();

        let file_name = format!(
            "{}-{}.{}",
            &digest[..16],
            Uuid::new_v4().simple(),
            file_extension(path)
        );
        let public_id = format!("{}/{}", kind.dir_name(), file_name);
        let target = self.root.join(&public_id);
        fs::copy(path, &target)
            .with_context(|| format!("copying upload into {}", target.display()))?;

        Ok(UploadedAsset {
            url: format!("{}/media/{}", self.public_url, public_id),
            public_id,
        })
    }

    fn remove(&self, public_id: &str, kind: MediaKind) -> Result<()> {
        let target = self.resolve(public_id, kind)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", target.display())),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Lowercase alphanumeric extension of `path`, `bin` when there is none.
fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

/// Signed uploads against the Cloudinary REST API.
#[derive(Debug, Clone)]
pub struct CloudinaryBackend {
    credentials: CloudinaryCredentials,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryUpload {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryDestroy {
    result: String,
}

impl CloudinaryBackend {
    pub fn new(credentials: CloudinaryCredentials) -> Self {
        Self {
            credentials,
            endpoint: CLOUDINARY_API.to_string(),
        }
    }

    fn url(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.endpoint, self.credentials.cloud_name, resource_type, action
        )
    }

    /// Sorted `key=value` pairs joined by `&`, followed by the API secret.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        sign_params(params, &self.credentials.api_secret)
    }
}

fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{joined}{secret}").as_bytes()))
}

impl MediaBackend for CloudinaryBackend {
    fn upload(&self, path: &Path, kind: MediaKind) -> Result<UploadedAsset> {
        let bytes = fs::read(path).with_context(|| format!("reading upload {}", path.display()))?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let data_uri = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("timestamp", &timestamp)]);

        let response: CloudinaryUpload = ureq::post(&self.url(kind.resource_type(), "upload"))
            .send_json(json!({
                "file": data_uri,
                "api_key": self.credentials.api_key,
                "timestamp": timestamp,
                "signature": signature,
                "signature_algorithm": "sha256",
            }))
            .map_err(|err| anyhow!("cloudinary upload failed: {err}"))?
            .into_json()
            .context("decoding cloudinary upload response")?;

        Ok(UploadedAsset {
            url: response.secure_url,
            public_id: response.public_id,
        })
    }

    fn remove(&self, public_id: &str, kind: MediaKind) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);

        let response: CloudinaryDestroy = ureq::post(&self.url(kind.resource_type(), "destroy"))
            .send_json(json!({
                "public_id": public_id,
                "api_key": self.credentials.api_key,
                "timestamp": timestamp,
                "signature": signature,
                "signature_algorithm": "sha256",
            }))
            .map_err(|err| anyhow!("cloudinary destroy failed: {err}"))?
            .into_json()
            .context("decoding cloudinary destroy response")?;

        if response.result != "ok" && response.result != "not found" {
            bail!("cloudinary refused to destroy {public_id}: {}", response.result);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}

/// Async front for the storage backend plus the duration probe.
#[derive(Clone)]
pub struct MediaDelegate {
    backend: Arc<dyn MediaBackend>,
    ffprobe: PathBuf,
}

impl MediaDelegate {
    pub fn new(backend: Arc<dyn MediaBackend>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            ffprobe: ffprobe.into(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Stores the file. Failures are logged and reported as `None`; callers
    /// decide which error to surface.
    pub async fn upload(&self, path: &Path, kind: MediaKind) -> Option<UploadedAsset> {
        let backend = Arc::clone(&self.backend);
        let path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || backend.upload(&path, kind)).await;
        match result {
            Ok(Ok(asset)) => {
                tracing::info!(kind = kind.dir_name(), public_id = %asset.public_id, "stored media");
                Some(asset)
            }
            Ok(Err(err)) => {
                tracing::warn!(kind = kind.dir_name(), error = %format!("{err:#}"), "media upload failed");
                None
            }
            Err(err) => {
                tracing::warn!(kind = kind.dir_name(), error = %err, "media upload task panicked");
                None
            }
        }
    }

    /// Best-effort delete; failures are only logged.
    pub async fn remove(&self, public_id: &str, kind: MediaKind) {
        let backend = Arc::clone(&self.backend);
        let id = public_id.to_string();
        let result = tokio::task::spawn_blocking(move || backend.remove(&id, kind)).await;
        match result {
            Ok(Ok(())) => tracing::info!(kind = kind.dir_name(), public_id, "removed media"),
            Ok(Err(err)) => {
                tracing::warn!(kind = kind.dir_name(), public_id, error = %format!("{err:#}"), "media removal failed")
            }
            Err(err) => {
                tracing::warn!(kind = kind.dir_name(), public_id, error = %err, "media removal task panicked")
            }
        }
    }

    /// Whole seconds of playable media, floored. Zero, missing or unparsable
    /// durations are `UnreadableMedia`.
    pub async fn probe_duration(&self, path: &Path) -> Result<u64, ApiError> {
        let ffprobe = self.ffprobe.clone();
        let path = path.to_path_buf();
        let output = tokio::task::spawn_blocking(move || {
            Command::new(&ffprobe)
                .args([
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ])
                .arg(&path)
                .output()
                .with_context(|| format!("running {}", ffprobe.display()))
        })
        .await
        .map_err(|err| ApiError::internal(format!("duration probe task panicked: {err}")))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApiError::UnreadableMedia(format!(
                "Could not extract video duration: {}",
                stderr.trim()
            )));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| ApiError::UnreadableMedia("Could not extract video duration".into()))
    }
}

fn parse_duration(raw: &str) -> Option<u64> {
    let seconds: f64 = raw.lines().next()?.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    (whole >= 1.0).then_some(whole as u64)
}

/// A multipart file buffered on local disk. The file is deleted when the
/// value is dropped, on success and failure paths alike.
#[derive(Debug)]
pub struct TempAsset {
    file: NamedTempFile,
    original_name: Option<String>,
}

impl TempAsset {
    /// Creates an empty temp file in `dir`, keeping the extension of the
    /// client-side file name.
    pub fn create(dir: &Path, original_name: Option<&str>) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating upload directory {}", dir.display()))?;
        let suffix = original_name
            .map(|name| format!(".{}", file_extension(Path::new(name))))
            .unwrap_or_default();
        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        Ok(Self {
            file,
            original_name: original_name.map(str::to_string),
        })
    }

    /// Async writer positioned at the start of the temp file. Take one
    /// writer per upload and stream every chunk through it.
    pub fn writer(&self) -> Result<tokio::fs::File> {
        let handle = self.file.reopen().context("reopening temp upload")?;
        Ok(tokio::fs::File::from_std(handle))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn len(&self) -> u64 {
        fs::metadata(self.path()).map(|meta| meta.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
