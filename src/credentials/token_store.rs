use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::types::TokenStoreConfig;
use crate::credentials::credential::{Credential, StoredCredential};
use crate::error::{ApiError, ApiResult};

/// Durable home of the live credential.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// `Ok(None)` when nothing is stored anywhere.
    async fn load(&self) -> ApiResult<Option<Credential>>;
    /// Readers never observe a half written pair.
    async fn save(&self, credential: &Credential) -> ApiResult<()>;
    fn describe(&self) -> String;
}

/// JSON file with an environment-variable fallback for the first start.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    access_token_env: String,
    refresh_token_env: String,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(
        path: impl Into<PathBuf>,
        access_token_env: impl Into<String>,
        refresh_token_env: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            access_token_env: access_token_env.into(),
            refresh_token_env: refresh_token_env.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(cfg: &TokenStoreConfig) -> Self {
        Self::new(&cfg.path, &cfg.access_token_env, &cfg.refresh_token_env)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_env(&self) -> Option<Credential> {
        let access = std::env::var(&self.access_token_env).ok()?;
        let refresh = std::env::var(&self.refresh_token_env).ok()?;
        if access.trim().is_empty() || refresh.trim().is_empty() {
            return None;
        }
        info!(
            "credential loaded from env '{}'/'{}'",
            self.access_token_env, self.refresh_token_env
        );
        Some(Credential::new(access.trim(), refresh.trim()))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credentials".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> ApiResult<Option<Credential>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let stored: StoredCredential = serde_json::from_str(&content).map_err(|e| {
                    ApiError::Storage(format!(
                        "credential file '{}' is corrupt: {}",
                        self.path.display(),
                        e
                    ))
                })?;
                debug!(
                    "credential loaded from '{}', updated at {}",
                    self.path.display(),
                    stored.updated_at
                );
                return Ok(Some(stored.credential));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("credential file '{}' not found", self.path.display());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.load_from_env())
    }

    async fn save(&self, credential: &Credential) -> ApiResult<()> {
        let _guard = self.write_lock.lock().await;
        let content = serde_json::to_vec_pretty(&StoredCredential::now(credential.clone()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // write tmp -> fsync -> rename, the tmp file never outlives a failed save
        let tmp = self.tmp_path();
        let written = match write_private(&tmp, &content).await {
            Ok(()) => fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("credential write into '{}' failed: {}", self.path.display(), e);
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("leftover '{}' could not be removed: {}", tmp.display(), cleanup);
                }
            }
            return Err(e.into());
        }
        info!("credential persisted to '{}'", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

/// Process-local store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Option<Credential>>,
}

impl MemoryTokenStore {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            inner: RwLock::new(credential),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> ApiResult<Option<Credential>> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, credential: &Credential) -> ApiResult<()> {
        *self.inner.write().await = Some(credential.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}
