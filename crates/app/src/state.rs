use std::path::{Path, PathBuf};
use std::{fs, str::FromStr};

use common::crypto::{KeyError, KeyPair, PrivateKey};
use common::federated::{FederatedSettings, SettingsError};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

pub const APP_NAME: &str = "vaultshare";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const PUBLIC_KEY_FILE_NAME: &str = "key.pub.pem";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily-rolling log files. No file logging when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub federated: FederatedSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            federated: FederatedSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, StateError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn validate(&self) -> Result<(), StateError> {
        self.level_filter()?;
        self.federated.validate()?;
        Ok(())
    }

    /// The stored config, or the defaults when no state directory exists yet
    ///
    /// Any other failure, such as an unreadable or invalid config file, is
    ///  returned rather than papered over.
    pub fn load_or_default(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        match AppState::load(custom_path) {
            Ok(state) => Ok(state.config),
            Err(StateError::NotInitialized) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.vaultshare)
    pub state_dir: PathBuf,
    /// Path to the private key PEM file
    pub key_path: PathBuf,
    /// Path to the public key PEM file
    pub public_key_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.vaultshare)
    pub fn state_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Create the state directory with a fresh key pair and config
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;
        if state_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        config.validate()?;

        fs::create_dir_all(&state_dir)?;

        let keys = KeyPair::generate()?;
        let key_path = state_dir.join(KEY_FILE_NAME);
        let public_key_path = state_dir.join(PUBLIC_KEY_FILE_NAME);
        write_key_pair(&keys, &key_path, &public_key_path)?;

        let config_path = state_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        tracing::info!(
            state_dir = %state_dir.display(),
            fingerprint = %keys.public().fingerprint(),
            "initialized state directory"
        );

        Ok(Self {
            state_dir,
            key_path,
            public_key_path,
            config_path,
            config,
        })
    }

    /// Load existing state
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let state_dir = Self::state_dir(custom_path)?;
        if !state_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = state_dir.join(KEY_FILE_NAME);
        let public_key_path = state_dir.join(PUBLIC_KEY_FILE_NAME);
        let config_path = state_dir.join(CONFIG_FILE_NAME);

        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        config.validate()?;

        Ok(Self {
            state_dir,
            key_path,
            public_key_path,
            config_path,
            config,
        })
    }

    /// Load the key pair from the private key file
    pub fn load_keys(&self) -> Result<KeyPair, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        Ok(KeyPair::from(PrivateKey::from_pem(&pem)?))
    }
}

/// Write a key pair as PKCS#8 and SPKI PEM files
pub fn write_key_pair(keys: &KeyPair, private_path: &Path, public_path: &Path) -> Result<(), StateError> {
    fs::write(private_path, keys.private().to_pem()?)?;
    restrict_permissions(private_path)?;
    fs::write(public_path, keys.public().to_pem()?)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StateError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StateError> {
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("vaultshare directory not initialized. Run 'vaultshare init' first")]
    NotInitialized,

    #[error("vaultshare directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid federated settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");

        let state = AppState::init(Some(path.clone()), None).unwrap();
        assert!(state.key_path.exists());
        assert!(state.public_key_path.exists());

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config, AppConfig::default());
        let keys = loaded.load_keys().unwrap();
        let public_pem = fs::read_to_string(&loaded.public_key_path).unwrap();
        assert_eq!(keys.public().to_pem().unwrap(), public_pem);

        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");

        // nothing there yet
        assert_eq!(
            AppConfig::load_or_default(Some(path.clone())).unwrap(),
            AppConfig::default()
        );

        let state = AppState::init(Some(path.clone()), None).unwrap();
        fs::write(&state.config_path, "log_level = \"loud\"\n").unwrap();
        assert!(matches!(
            AppConfig::load_or_default(Some(path.clone())),
            Err(StateError::InvalidLogLevel(level)) if level == "loud"
        ));

        fs::write(&state.config_path, "log_level = [not toml").unwrap();
        assert!(matches!(
            AppConfig::load_or_default(Some(path.clone())),
            Err(StateError::TomlDe(_))
        ));

        fs::write(&state.config_path, "[federated]\nmin_clients_for_round = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_or_default(Some(path)),
            Err(StateError::Settings(SettingsError::NoClients))
        ));
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            log_level = "debug"

            [federated]
            max_rounds = 5
            strategy = "mean"
            "#,
        )
        .unwrap();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::DEBUG);
        assert_eq!(config.federated.max_rounds, 5);
        assert_eq!(config.federated.num_features, 10);
        assert!(config.log_dir.is_none());

        let empty: AppConfig = toml::from_str("").unwrap();
        assert_eq!(empty, AppConfig::default());

        let bad = AppConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(StateError::InvalidLogLevel(_))));
    }
}
