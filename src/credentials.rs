//! Provider API key storage.
//!
//! Keys live in a small TOML file next to the config file. Environment
//! variables (`OPENAI_API_KEY`, `GEMINI_API_KEY`) shadow the stored values.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::Provider;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to read credentials file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse credentials file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to write credentials file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode credentials: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Read/write access to one secret per provider.
pub trait CredentialStore: Send + Sync {
    /// Returns the saved key, if any. Blank keys count as absent.
    fn key(&self, provider: Provider) -> Option<String>;

    /// Saves a trimmed key; an empty value removes it.
    fn set_key(&self, provider: Provider, value: &str) -> Result<(), CredentialError>;

    fn has_key(&self, provider: Provider) -> bool {
        self.key(provider).is_some()
    }
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Keys held in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: Mutex<HashMap<Provider, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, provider: Provider, value: &str) -> Self {
        if let Some(value) = normalize(value) {
            self.keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(provider, value);
        }
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn key(&self, provider: Provider) -> Option<String> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider)
            .cloned()
    }

    fn set_key(&self, provider: Provider, value: &str) -> Result<(), CredentialError> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        match normalize(value) {
            Some(value) => keys.insert(provider, value),
            None => keys.remove(&provider),
        };
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    keys: BTreeMap<String, String>,
}

/// Keys persisted in `credentials.toml`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CredentialsFile, CredentialError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(CredentialsFile::default());
            }
            Err(source) => {
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        toml::from_str(&raw).map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, file: &CredentialsFile) -> Result<(), CredentialError> {
        let encoded = toml::to_string(file)?;
        let write_err = |source| CredentialError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut handle = options.open(&self.path).map_err(write_err)?;
        handle.write_all(encoded.as_bytes()).map_err(write_err)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn key(&self, provider: Provider) -> Option<String> {
        match self.load() {
            Ok(file) => file
                .keys
                .get(provider.as_str())
                .and_then(|value| normalize(value)),
            Err(err) => {
                debug!(error = %err, "credentials file unreadable");
                None
            }
        }
    }

    fn set_key(&self, provider: Provider, value: &str) -> Result<(), CredentialError> {
        let mut file = self.load()?;
        match normalize(value) {
            Some(value) => file.keys.insert(provider.as_str().to_string(), value),
            None => file.keys.remove(provider.as_str()),
        };
        self.save(&file)
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lets provider environment variables shadow an inner store.
pub struct EnvOverride<S> {
    inner: S,
    lookup: EnvLookup,
}

impl<S: CredentialStore> EnvOverride<S> {
    pub fn new(inner: S) -> Self {
        Self::with_lookup(inner, |name| env::var(name).ok())
    }

    pub fn with_lookup(
        inner: S,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            lookup: Box::new(lookup),
        }
    }

    /// Whether the environment currently supplies the key.
    pub fn from_env(&self, provider: Provider) -> bool {
        (self.lookup)(provider.api_key_env())
            .and_then(|value| normalize(&value))
            .is_some()
    }
}

impl<S: CredentialStore> CredentialStore for EnvOverride<S> {
    fn key(&self, provider: Provider) -> Option<String> {
        (self.lookup)(provider.api_key_env())
            .and_then(|value| normalize(&value))
            .or_else(|| self.inner.key(provider))
    }

    fn set_key(&self, provider: Provider, value: &str) -> Result<(), CredentialError> {
        self.inner.set_key(provider, value)
    }
}
