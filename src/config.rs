use thiserror::Error;

use crate::crypto::EncryptionKey;

/// Minimum length of `SESSION_SECRET` in bytes.
const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    /// Server key that seals per-file keys at rest. Keys are stored unsealed without it.
    pub master_key: Option<EncryptionKey>,
    /// Enables test-only routes like session issuance. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_seconds: u64,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Supabase,
}

#[derive(Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// Project URL (required when backend is supabase)
    pub supabase_url: Option<String>,
    /// Service role key (required when backend is supabase)
    pub supabase_service_key: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("bucket", &self.bucket)
            .field("local_storage_path", &self.local_storage_path)
            .field("supabase_url", &self.supabase_url)
            .finish_non_exhaustive()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_seconds: 30 * 24 * 60 * 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket: "user-files".to_string(),
            local_storage_path: "./files".to_string(),
            supabase_url: None,
            supabase_service_key: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string());

        let test_mode = lookup("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size =
            parse_var(&lookup, "MAX_UPLOAD_SIZE")?.unwrap_or(50 * 1024 * 1024); // 50MB

        let backend = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => StorageBackend::Local,
            "supabase" => StorageBackend::Supabase,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown STORAGE_BACKEND '{other}' (expected local or supabase)"
                )))
            }
        };

        let storage = StorageConfig {
            backend,
            bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| "user-files".to_string()),
            local_storage_path: lookup("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| "./files".to_string()),
            supabase_url: lookup("SUPABASE_URL"),
            supabase_service_key: lookup("SUPABASE_SERVICE_KEY"),
        };

        let secret = match lookup("SESSION_SECRET") {
            Some(secret) => secret,
            None if test_mode => {
                tracing::warn!("SESSION_SECRET not set; using a random secret for this test run");
                EncryptionKey::generate()
                    .map_err(|e| ConfigError::ValidationError(e.to_string()))?
                    .to_base64()
            }
            None => String::new(),
        };

        let ttl_seconds = parse_var(&lookup, "SESSION_TTL_SECONDS")?
            .unwrap_or_else(|| SessionConfig::default().ttl_seconds);

        let master_key = lookup("MASTER_KEY")
            .map(|encoded| {
                EncryptionKey::from_base64(&encoded).map_err(|e| {
                    ConfigError::ValidationError(format!("MASTER_KEY is not a valid key: {e}"))
                })
            })
            .transpose()?;

        let config = Config {
            server: ServerConfig {
                bind_address,
                data_dir,
            },
            session: SessionConfig {
                secret,
                ttl_seconds,
            },
            storage,
            master_key,
            test_mode,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::ValidationError(format!(
                "SESSION_SECRET must be at least {MIN_SESSION_SECRET_LEN} bytes"
            )));
        }

        if self.session.ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "SESSION_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Supabase
            && (self.storage.supabase_url.is_none() || self.storage.supabase_service_key.is_none())
        {
            return Err(ConfigError::ValidationError(
                "SUPABASE_URL and SUPABASE_SERVICE_KEY are required when STORAGE_BACKEND=supabase"
                    .to_string(),
            ));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "STORAGE_BUCKET cannot be empty".to_string(),
            ));
        }

        if self.master_key.is_none() {
            tracing::warn!(
                "MASTER_KEY is not set. Per-file encryption keys will be stored unsealed \
                 next to the file metadata."
            );
        }

        Ok(())
    }
}

/// Parse an optional numeric variable. A value that is set but unparseable is an error.
fn parse_var<F>(lookup: &F, name: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("{name} must be a whole number, got '{raw}'"))
            })
        })
        .transpose()
}
