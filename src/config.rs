use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::llm::{Provider, ProviderSettings};
use crate::session::{SessionOptions, VoiceSettings};

const APP_DIR: &str = "kidtutor";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub provider: Option<String>,
    pub age: Option<String>,
    pub openai_model: Option<String>,
    pub gemini_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<u64>,
    pub voice_rate: Option<f32>,
    pub voice_pitch: Option<f32>,
    pub locale: Option<String>,
    pub discard_stale_replies: Option<bool>,
    pub output: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot resolve config path: set KT_CONFIG or HOME/XDG_CONFIG_HOME.")]
    NoPath,
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Config file '{}' does not contain a [profiles] section.", .path.display())]
    MissingProfiles { path: PathBuf },
    #[error("Profile '{name}' not found in config file '{}'.", .path.display())]
    ProfileNotFound { name: String, path: PathBuf },
    #[error("Invalid {source_name} '{value}'. Supported values: {expected}.")]
    InvalidValue {
        source_name: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Values given on the command line; they beat environment and profile.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub profile: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub age: Option<String>,
    pub timeout: Option<u64>,
    pub output: Option<String>,
    pub voice_rate: Option<f32>,
    pub voice_pitch: Option<f32>,
    pub discard_stale_replies: bool,
}

/// Effective settings after merging CLI, environment, profile and defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub provider: Provider,
    pub providers: ProviderSettings,
    pub age: String,
    pub voice: VoiceSettings,
    pub session: SessionOptions,
    pub output: OutputMode,
}

/// Resolves settings from the real environment and config file.
pub fn resolve(cli: &CliOverrides) -> Result<Resolved, ConfigError> {
    let profile = match cli.profile.as_deref() {
        Some(name) => load_profile(name)?,
        None => ProfileConfig::default(),
    };
    resolve_with(cli, &profile, |name| env::var(name).ok())
}

pub fn resolve_with(
    cli: &CliOverrides,
    profile: &ProfileConfig,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Resolved, ConfigError> {
    let env_value = |name: &str| {
        env_lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let provider = if let Some(value) = &cli.provider {
        parse_provider(value, "provider")?
    } else if let Some(value) = env_value("KT_PROVIDER") {
        parse_provider(&value, "KT_PROVIDER")?
    } else if let Some(value) = &profile.provider {
        parse_provider(value, "profile provider")?
    } else {
        Provider::Gemini
    };

    let mut providers = ProviderSettings::default();
    if let Some(model) = &profile.openai_model {
        providers.openai_model = model.clone();
    }
    if let Some(model) = &profile.gemini_model {
        providers.gemini_model = model.clone();
    }
    if let Some(model) = cli.model.clone().or_else(|| env_value("KT_MODEL")) {
        providers.set_model(provider, model);
    }
    if let Some(url) = env_value("KT_OPENAI_BASE_URL").or_else(|| profile.openai_base_url.clone()) {
        providers.openai_base_url = url;
    }
    if let Some(url) = env_value("KT_GEMINI_BASE_URL").or_else(|| profile.gemini_base_url.clone()) {
        providers.gemini_base_url = url;
    }
    if let Some(max_tokens) = profile.max_tokens {
        providers.max_tokens = max_tokens;
    }
    providers.timeout_secs = match cli.timeout {
        Some(timeout) => Some(timeout),
        None => match env_value("KT_TIMEOUT") {
            Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                source_name: "KT_TIMEOUT".to_string(),
                value: raw.clone(),
                expected: "a whole number of seconds",
            })?),
            None => profile.timeout,
        },
    };

    let age = cli
        .age
        .clone()
        .or_else(|| env_value("KT_AGE"))
        .or_else(|| profile.age.clone())
        .unwrap_or_default();

    let voice = VoiceSettings::new(
        cli.voice_rate.or(profile.voice_rate).unwrap_or(0.5),
        cli.voice_pitch.or(profile.voice_pitch).unwrap_or(1.0),
    );

    let mut session = SessionOptions::default();
    if let Some(locale) = &profile.locale {
        session.locale = locale.clone();
    }
    session.discard_stale_replies =
        cli.discard_stale_replies || profile.discard_stale_replies.unwrap_or(false);

    let output = match (&cli.output, &profile.output) {
        (Some(value), _) => parse_output(value, "output")?,
        (None, Some(value)) => parse_output(value, "profile output")?,
        (None, None) => OutputMode::Text,
    };

    Ok(Resolved {
        provider,
        providers,
        age: age.trim().to_string(),
        voice,
        session,
        output,
    })
}

fn parse_provider(value: &str, source_name: &str) -> Result<Provider, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        source_name: source_name.to_string(),
        value: value.to_string(),
        expected: "openai, gemini",
    })
}

fn parse_output(value: &str, source_name: &str) -> Result<OutputMode, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        source_name: source_name.to_string(),
        value: value.to_string(),
        expected: "text, json",
    })
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, ConfigError> {
    let path = config_path()?;
    let config = read_config(&path)?;

    let profiles = config
        .profiles
        .ok_or_else(|| ConfigError::MissingProfiles { path: path.clone() })?;

    profiles
        .get(name)
        .cloned()
        .ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.to_string(),
            path,
        })
}

/// Parses the config file and, when given, checks that `profile` resolves.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, ConfigError> {
    let path = config_path()?;
    read_config(&path)?;

    if let Some(name) = profile {
        let cli = CliOverrides {
            profile: Some(name.to_string()),
            ..CliOverrides::default()
        };
        resolve_with(&cli, &load_profile(name)?, |_| None)?;
    }

    Ok(path)
}

fn read_config(path: &PathBuf) -> Result<ConfigFile, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = non_empty_env("KT_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    Ok(app_dir()?.join("config.toml"))
}

pub fn credentials_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = non_empty_env("KT_CREDENTIALS") {
        return Ok(PathBuf::from(path));
    }
    Ok(app_dir()?.join("credentials.toml"))
}

fn app_dir() -> Result<PathBuf, ConfigError> {
    if let Some(xdg) = non_empty_env("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }

    let home = non_empty_env("HOME").ok_or(ConfigError::NoPath)?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{CliOverrides, ConfigError, OutputMode, ProfileConfig, resolve_with};
    use crate::llm::Provider;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn defaults_apply_without_any_input() {
        let resolved =
            resolve_with(&CliOverrides::default(), &ProfileConfig::default(), env_of(&[])).unwrap();
        assert_eq!(resolved.provider, Provider::Gemini);
        assert_eq!(resolved.providers.gemini_model, "gemini-2.5-flash");
        assert_eq!(resolved.providers.openai_model, "gpt-4.1-mini");
        assert_eq!(resolved.providers.max_tokens, 300);
        assert_eq!(resolved.providers.timeout_secs, None);
        assert_eq!(resolved.output, OutputMode::Text);
        assert_eq!(resolved.session.locale, "en-US");
        assert!(!resolved.session.discard_stale_replies);
    }

    #[test]
    fn cli_beats_env_beats_profile() {
        let profile = ProfileConfig {
            provider: Some("openai".to_string()),
            age: Some("7".to_string()),
            timeout: Some(5),
            ..ProfileConfig::default()
        };
        let env = env_of(&[("KT_PROVIDER", "gemini"), ("KT_AGE", "8"), ("KT_TIMEOUT", "21")]);

        let from_env = resolve_with(&CliOverrides::default(), &profile, &env).unwrap();
        assert_eq!(from_env.provider, Provider::Gemini);
        assert_eq!(from_env.age, "8");
        assert_eq!(from_env.providers.timeout_secs, Some(21));

        let cli = CliOverrides {
            provider: Some("openai".to_string()),
            age: Some("10".to_string()),
            timeout: Some(33),
            ..CliOverrides::default()
        };
        let from_cli = resolve_with(&cli, &profile, &env).unwrap();
        assert_eq!(from_cli.provider, Provider::Openai);
        assert_eq!(from_cli.age, "10");
        assert_eq!(from_cli.providers.timeout_secs, Some(33));
    }

    #[test]
    fn model_override_targets_selected_provider() {
        let cli = CliOverrides {
            provider: Some("openai".to_string()),
            model: Some("gpt-4o".to_string()),
            ..CliOverrides::default()
        };
        let resolved = resolve_with(&cli, &ProfileConfig::default(), env_of(&[])).unwrap();
        assert_eq!(resolved.providers.openai_model, "gpt-4o");
        assert_eq!(resolved.providers.gemini_model, "gemini-2.5-flash");
    }

    #[test]
    fn invalid_env_provider_is_named_in_error() {
        let err = resolve_with(
            &CliOverrides::default(),
            &ProfileConfig::default(),
            env_of(&[("KT_PROVIDER", "bad")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid KT_PROVIDER 'bad'. Supported values: openai, gemini."
        );
    }

    #[test]
    fn voice_values_from_profile_are_clamped() {
        let profile = ProfileConfig {
            voice_rate: Some(4.0),
            voice_pitch: Some(0.75),
            ..ProfileConfig::default()
        };
        let resolved = resolve_with(&CliOverrides::default(), &profile, env_of(&[])).unwrap();
        assert_eq!(resolved.voice.rate(), 1.0);
        assert_eq!(resolved.voice.pitch(), 0.75);
    }
}
