//! Weights store: ordered search roots, local cache, and mirror downloads.

use super::WeightsError;
use futures::StreamExt;
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Environment variable naming an extra search root, or a mirror base URL
/// when the value starts with http(s).
pub const WEIGHTS_DIR_ENV: &str = "CLIPSIEVE_WEIGHTS_DIR";
const WEIGHTS_DIR_ENV_ALT: &str = "CLIPSIEVE_WEIGHTS_PATH";

/// Bearer token for the weights mirror.
pub const WEIGHTS_TOKEN_ENV: &str = "CLIPSIEVE_WEIGHTS_TOKEN";

/// Response header a mirror may set to pin the payload digest.
const DIGEST_HEADER: &str = "x-weights-sha256";

/// Weight names are bare file names. A separator or leading dot would let
/// a name escape the search roots when joined onto them.
static WEIGHT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// A resolved weights file.
#[derive(Debug, Clone)]
pub struct ModelWeights {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: Option<String>,
}

/// Locates weights files across an ordered list of roots, a local cache
/// directory, and an optional HTTP mirror.
pub struct WeightsStore {
    roots: RwLock<Vec<PathBuf>>,
    cache_dir: PathBuf,
    mirror: Option<Url>,
    resolved: Mutex<LruCache<String, Arc<ModelWeights>>>,
}

impl WeightsStore {
    pub fn new() -> Self {
        Self {
            roots: RwLock::new(Vec::new()),
            cache_dir: PathBuf::from("models").join("weights"),
            mirror: None,
            resolved: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(100).expect("nonzero cache capacity"),
            )),
        }
    }

    /// Set the directory downloaded weights are cached in.
    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the mirror base URL downloads fall back to.
    pub fn with_mirror(mut self, mirror: Url) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Insert a search root at the front of the list unless it is already
    /// present anywhere in it. Present means the list stays exactly as it
    /// was, including order.
    pub fn ensure_root(&self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        let mut roots = match self.roots.write() {
            Ok(roots) => roots,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !roots.iter().any(|r| r == root) {
            roots.insert(0, root.to_path_buf());
        }
    }

    /// Snapshot of the explicit search roots, front first.
    pub fn search_roots(&self) -> Vec<PathBuf> {
        match self.roots.read() {
            Ok(roots) => roots.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The stock weight names the console offers.
    pub fn known_model_names() -> Vec<&'static str> {
        vec![
            "yolov8n.pt",
            "yolov8s.pt",
            "yolov8m.pt",
            "yolov8l.pt",
            "yolov8x.pt",
            "yolo11n.pt",
            "yolo11s.pt",
            "yolo11m.pt",
            "yolo11l.pt",
            "yolo11x.pt",
        ]
    }

    /// Candidate file paths for a name, in resolution order.
    fn candidate_paths(&self, name: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for root in self.search_roots() {
            candidates.push(root.join(name));
            candidates.push(root.join("models").join("weights").join(name));
        }
        if let Some(env_root) = env_dir() {
            candidates.push(env_root.join(name));
            candidates.push(env_root.join("models").join("weights").join(name));
        }
        candidates.push(self.cache_dir.join(name));
        candidates
    }

    /// Resolve a weights file by name. Order: resolved-handle cache, local
    /// candidates, mirror download. Misses produce a NotFound whose hint
    /// lists the searched locations.
    pub async fn resolve(&self, name: &str) -> Result<Arc<ModelWeights>, WeightsError> {
        if name.is_empty() {
            return Err(WeightsError::NotFound {
                name: name.to_string(),
                hint: Some("weights name must not be empty".to_string()),
            });
        }
        if !WEIGHT_NAME.is_match(name) {
            return Err(WeightsError::NotFound {
                name: name.to_string(),
                hint: Some("weights names are bare file names like 'yolo11n.pt'".to_string()),
            });
        }

        {
            let mut cache = self.resolved.lock().map_err(|e| {
                WeightsError::Internal(format!(
                    "Failed to acquire cache lock while resolving '{}': {}",
                    name, e
                ))
            })?;
            if let Some(weights) = cache.get(name) {
                return Ok(Arc::clone(weights));
            }
        }

        let candidates = self.candidate_paths(name);
        for candidate in &candidates {
            if candidate.is_file() {
                let weights = Arc::new(load_local(name, candidate).await?);
                self.remember(name, Arc::clone(&weights))?;
                tracing::info!(name = %name, path = %candidate.display(), "resolved weights locally");
                return Ok(weights);
            }
        }

        if let Some(mirror) = self.mirror.clone().or_else(env_mirror) {
            let weights = Arc::new(self.download(&mirror, name).await?);
            self.remember(name, Arc::clone(&weights))?;
            return Ok(weights);
        }

        let searched: Vec<String> = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Err(WeightsError::NotFound {
            name: name.to_string(),
            hint: Some(format!(
                "searched: {}; set {} to a weights directory or mirror URL",
                searched.join(", "),
                WEIGHTS_DIR_ENV
            )),
        })
    }

    fn remember(&self, name: &str, weights: Arc<ModelWeights>) -> Result<(), WeightsError> {
        let mut cache = self.resolved.lock().map_err(|e| {
            WeightsError::Internal(format!(
                "Failed to acquire cache lock while caching '{}': {}",
                name, e
            ))
        })?;
        cache.put(name.to_string(), weights);
        Ok(())
    }

    /// Download a weights file from the mirror into the cache directory.
    /// Streams to a partial file, verifies the digest when the mirror pins
    /// one, then renames into place.
    async fn download(&self, mirror: &Url, name: &str) -> Result<ModelWeights, WeightsError> {
        let base = mirror.as_str();
        let url = if base.ends_with('/') {
            format!("{}{}", base, name)
        } else {
            format!("{}/{}", base, name)
        };

        tracing::info!(name = %name, url = %url, "downloading weights from mirror");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| WeightsError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let mut request = client.get(&url);
        if let Some(token) = mirror_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| WeightsError::Download {
            url: url.clone(),
            reason: format!("HTTP request failed: {}", e),
            hint: Some("Check your network connection and the mirror URL.".to_string()),
        })?;

        if !response.status().is_success() {
            return Err(WeightsError::Download {
                url: url.clone(),
                reason: format!("HTTP {}", response.status()),
                hint: Some(
                    "Verify the weights name and your mirror token if the mirror requires one."
                        .to_string(),
                ),
            });
        }

        let pinned_digest = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase());

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| WeightsError::LoadError {
                path: self.cache_dir.display().to_string(),
                reason: format!("Failed to create cache directory: {}", e),
            })?;

        let partial = self
            .cache_dir
            .join(format!("{}.partial-{}", name, uuid::Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| WeightsError::LoadError {
                path: partial.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut hasher = Sha256::new();
        let mut size_bytes: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WeightsError::Download {
                url: url.clone(),
                reason: format!("Failed to read bytes: {}", e),
                hint: None,
            })?;
            hasher.update(&chunk);
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| WeightsError::LoadError {
                    path: partial.display().to_string(),
                    reason: e.to_string(),
                })?;
        }
        file.flush().await.map_err(|e| WeightsError::LoadError {
            path: partial.display().to_string(),
            reason: e.to_string(),
        })?;
        drop(file);

        if size_bytes == 0 {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(WeightsError::Download {
                url,
                reason: "mirror returned an empty payload".to_string(),
                hint: None,
            });
        }

        let actual_digest = format!("{:x}", hasher.finalize());
        if let Some(expected) = &pinned_digest {
            if expected != &actual_digest {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(WeightsError::ChecksumMismatch {
                    name: name.to_string(),
                    expected: expected.clone(),
                    actual: actual_digest,
                });
            }
        }

        let final_path = self.cache_dir.join(name);
        tokio::fs::rename(&partial, &final_path)
            .await
            .map_err(|e| WeightsError::LoadError {
                path: final_path.display().to_string(),
                reason: format!("Failed to move downloaded weights into place: {}", e),
            })?;

        // Record the digest so later local loads can report it.
        let sidecar = self.cache_dir.join(format!("{}.sha256", name));
        if let Err(e) = tokio::fs::write(&sidecar, format!("{}\n", actual_digest)).await {
            tracing::debug!(path = %sidecar.display(), "could not write digest sidecar: {}", e);
        }

        tracing::info!(name = %name, path = %final_path.display(), size_bytes, "weights downloaded");

        Ok(ModelWeights {
            name: name.to_string(),
            path: final_path,
            size_bytes,
            sha256: Some(actual_digest),
        })
    }
}

impl Default for WeightsStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read size and any recorded digest for a local weights file.
async fn load_local(name: &str, path: &Path) -> Result<ModelWeights, WeightsError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| WeightsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let sidecar = sidecar_path(path);
    let sha256 = match tokio::fs::read_to_string(&sidecar).await {
        Ok(content) => {
            let digest = content.split_whitespace().next().unwrap_or("").to_string();
            if digest.is_empty() {
                None
            } else {
                Some(digest)
            }
        }
        Err(_) => None,
    };

    Ok(ModelWeights {
        name: name.to_string(),
        path: path.to_path_buf(),
        size_bytes: meta.len(),
        sha256,
    })
}

fn sidecar_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.sha256", file_name))
}

fn env_dir() -> Option<PathBuf> {
    let value = std::env::var(WEIGHTS_DIR_ENV)
        .or_else(|_| std::env::var(WEIGHTS_DIR_ENV_ALT))
        .ok()?;
    if value.starts_with("http://") || value.starts_with("https://") {
        return None;
    }
    Some(PathBuf::from(value))
}

fn env_mirror() -> Option<Url> {
    let value = std::env::var(WEIGHTS_DIR_ENV)
        .or_else(|_| std::env::var(WEIGHTS_DIR_ENV_ALT))
        .ok()?;
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return None;
    }
    match Url::parse(&value) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!("ignoring unparseable mirror URL in {}: {}", WEIGHTS_DIR_ENV, e);
            None
        }
    }
}

fn mirror_token() -> Option<String> {
    if let Ok(token) = std::env::var(WEIGHTS_TOKEN_ENV) {
        if !token.is_empty() {
            return Some(token);
        }
    }
    let entry = keyring::Entry::new("clipsieve", "weights-mirror").ok()?;
    entry.get_password().ok()
}
