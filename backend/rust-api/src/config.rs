use serde::Deserialize;
use std::env;

const DEFAULT_MODEL_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CLOSED_RETENTION_SECS: u64 = 15 * 60;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub model_api_url: String,
    pub model_api_timeout_ms: u64,
    pub store_backend: StoreBackend,
    pub problems_seed_path: Option<String>,
    pub write_async: bool,
    pub bind_addr: String,
    pub sweep_interval_secs: u64,
    pub closed_retention_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "mathtutor".to_string(),
            model_api_url: "http://localhost:8000".to_string(),
            model_api_timeout_ms: DEFAULT_MODEL_TIMEOUT_MS,
            store_backend: StoreBackend::Mongo,
            problems_seed_path: None,
            write_async: true,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            closed_retention_secs: DEFAULT_CLOSED_RETENTION_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + APP__* overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Self::from_settings(&settings)
    }

    fn from_settings(settings: &config::Config) -> Result<Self, config::ConfigError> {
        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let model_api_url = settings
            .get_string("model_api.url")
            .or_else(|_| env::var("MODEL_API_URL"))
            .unwrap_or(defaults.model_api_url);

        let model_api_timeout_ms = match settings.get_int("model_api.timeout_ms") {
            Ok(value) => u64::try_from(value).map_err(|_| {
                config::ConfigError::Message(format!(
                    "model_api.timeout_ms must be positive, got {value}"
                ))
            })?,
            Err(_) => env::var("MODEL_API_TIMEOUT_MS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.model_api_timeout_ms),
        };

        let store_backend = match settings
            .get_string("store.backend")
            .or_else(|_| env::var("STORE_BACKEND"))
        {
            Ok(value) => value.parse().map_err(config::ConfigError::Message)?,
            Err(_) => defaults.store_backend,
        };

        let problems_seed_path = settings
            .get_string("store.problems_seed_path")
            .or_else(|_| env::var("PROBLEMS_SEED_PATH"))
            .ok();

        let write_async = settings
            .get_bool("persistence.write_async")
            .unwrap_or(defaults.write_async);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let sweep_interval_secs =
            seconds(settings, "registry.sweep_interval_secs", defaults.sweep_interval_secs)?;
        let closed_retention_secs = seconds(
            settings,
            "registry.closed_retention_secs",
            defaults.closed_retention_secs,
        )?;
        let idle_timeout_secs =
            seconds(settings, "registry.idle_timeout_secs", defaults.idle_timeout_secs)?;
        if sweep_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "registry.sweep_interval_secs must be positive".to_string(),
            ));
        }

        if store_backend == StoreBackend::Memory && problems_seed_path.is_none() {
            eprintln!("WARNING: in-memory store without problems_seed_path serves no problems");
        }

        Ok(Config {
            mongo_uri,
            mongo_database,
            model_api_url,
            model_api_timeout_ms,
            store_backend,
            problems_seed_path,
            write_async,
            bind_addr,
            sweep_interval_secs,
            closed_retention_secs,
            idle_timeout_secs,
        })
    }
}

fn seconds(settings: &config::Config, key: &str, default: u64) -> Result<u64, config::ConfigError> {
    match settings.get_int(key) {
        Ok(value) => u64::try_from(value).map_err(|_| {
            config::ConfigError::Message(format!("{key} must not be negative, got {value}"))
        }),
        Err(_) => Ok(default),
    }
}
