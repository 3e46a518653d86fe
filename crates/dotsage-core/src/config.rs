// Configuration loading and parsing (dotsage.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing config file {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid TOML in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("bad value for `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("cannot seed config/ from defaults/: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Fully assembled configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub questions: QuestionsConfig,
    pub credentials: CredentialsConfig,
}

/// Raw deserialization target for dotsage.toml.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    server: ServerConfig,
    feed: FeedConfig,
    database: DatabaseConfig,
    llm: LlmConfig,
    questions: QuestionsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin of the public frontend, used to build share links.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionsConfig {
    /// How many ledger records the explore view considers.
    pub recent_limit: u32,
    /// How many ledger records analytics and profiles aggregate over.
    pub analytics_limit: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub groq_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/dotsage.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not consult the environment and does not copy defaults. Prefer
/// `load_config()` for the full startup behaviour.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- dotsage.toml (required) ---
    let main_path = config_dir.join("dotsage.toml");
    let main_text = read_file(&main_path)?;
    let file: ConfigFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        server: file.server,
        feed: file.feed,
        database: file.database,
        llm: file.llm,
        questions: file.questions,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Apply environment overrides on top of file configuration.
///
/// Recognised keys: `GROQ_API_KEY`, `PORT`, `DOTSAGE_FEED_PORT`,
/// `DOTSAGE_DB_PATH`. `lookup` is `std::env::var(..).ok()` in production;
/// tests pass a map.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("GROQ_API_KEY").filter(|k| !k.trim().is_empty()) {
        config.credentials.groq_api_key = Some(key.trim().to_string());
    }
    if let Some(port) = lookup("PORT") {
        config.server.port = parse_port("PORT", &port)?;
    }
    if let Some(port) = lookup("DOTSAGE_FEED_PORT") {
        config.feed.port = parse_port("DOTSAGE_FEED_PORT", &port)?;
    }
    if let Some(path) = lookup("DOTSAGE_DB_PATH").filter(|p| !p.is_empty()) {
        config.database.path = path;
    }

    validate(&config)?;
    Ok(config)
}

/// Seed `config/` from the shipped `defaults/`, never overwriting a file the
/// operator already has. `.example` templates stay behind. Returns the paths
/// that were created.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(Vec::new());
        }
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no defaults/ or config/ directory under {}; start dotsage from the workspace root",
                base_dir.display()
            ),
        });
    }

    let seed_err = |what: String| ConfigError::DefaultsCopyError { message: what };

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| seed_err(format!("cannot create {}: {e}", config_dir.display())))?;
    let entries = std::fs::read_dir(&defaults_dir)
        .map_err(|e| seed_err(format!("cannot list {}: {e}", defaults_dir.display())))?;

    let mut seeded = Vec::new();
    for entry in entries {
        let source = entry
            .map_err(|e| seed_err(format!("cannot list {}: {e}", defaults_dir.display())))?
            .path();
        let Some(name) = source.file_name().filter(|_| source.is_file()) else {
            continue;
        };
        if name.to_string_lossy().ends_with(".example") {
            continue;
        }

        let target = config_dir.join(name);
        if seed_file(&source, &target)
            .map_err(|e| seed_err(format!("cannot seed {}: {e}", target.display())))?
        {
            seeded.push(target);
        }
    }

    Ok(seeded)
}

/// Copy `source` to `target` unless `target` already exists. Returns whether
/// a copy was made.
fn seed_file(source: &Path, target: &Path) -> std::io::Result<bool> {
    use std::io::Write;

    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };
    dest.write_all(&std::fs::read(source)?)?;
    Ok(true)
}

/// Load config relative to the current working directory: copy defaults,
/// read the files, then apply environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    let config = load_config_from(&cwd)?;
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_port(field: &str, raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::ValidationError {
            field: field.to_string(),
            message: format!("invalid port `{raw}`: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.feed.port != 0 && config.feed.port == config.server.port {
        return Err(ConfigError::ValidationError {
            field: "feed.port".into(),
            message: format!("must differ from server.port ({})", config.server.port),
        });
    }

    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    let temp = config.llm.temperature;
    if !(0.0..=2.0).contains(&temp) {
        return Err(ConfigError::ValidationError {
            field: "llm.temperature".into(),
            message: format!("must be between 0.0 and 2.0 inclusive, got {temp}"),
        });
    }

    if config.llm.max_tokens == 0 {
        return Err(ConfigError::ValidationError {
            field: "llm.max_tokens".into(),
            message: "must be > 0".into(),
        });
    }

    let limits: &[(&str, u32)] = &[
        ("questions.recent_limit", config.questions.recent_limit),
        ("questions.analytics_limit", config.questions.analytics_limit),
    ];
    for (name, val) in limits {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
