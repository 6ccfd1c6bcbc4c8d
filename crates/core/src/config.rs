use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync_engine::SyncEngineConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub crm: OauthServiceConfig,
    pub accounting: OauthServiceConfig,
    pub company: CompanyConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

/// OAuth client settings for one external service. The authorize/token/API
/// endpoints default to the provider's account domain and can be overridden
/// for sandboxes and tests.
#[derive(Clone, Debug)]
pub struct OauthServiceConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub redirect_uri: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub scope: String,
    /// Organization selector required by the accounting service; unused for
    /// the CRM.
    pub organization_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CompanyConfig {
    pub name: String,
    /// Seller GST identifier used for every B2B estimate.
    pub gstin: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub max_attempts: u32,
    pub base_retry_delay_secs: i64,
    pub max_retry_delay_secs: i64,
    pub claim_timeout_secs: i64,
    pub dispatch_batch_size: u32,
    pub inventory_batch_size: u32,
    pub http_timeout_secs: u64,
}

impl SyncConfig {
    pub fn engine_config(&self) -> SyncEngineConfig {
        SyncEngineConfig {
            default_max_attempts: self.max_attempts,
            base_retry_delay_secs: self.base_retry_delay_secs,
            max_retry_delay_secs: self.max_retry_delay_secs,
            claim_timeout_secs: self.claim_timeout_secs,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    crm: FileOauthService,
    #[serde(default)]
    accounting: FileOauthService,
    #[serde(default)]
    company: FileCompany,
    #[serde(default)]
    sync: FileSync,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServer {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct FileOauthService {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    authorize_url: Option<String>,
    token_url: Option<String>,
    api_base_url: Option<String>,
    scope: Option<String>,
    organization_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileCompany {
    name: Option<String>,
    gstin: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSync {
    max_attempts: Option<u32>,
    base_retry_delay_secs: Option<i64>,
    max_retry_delay_secs: Option<i64>,
    claim_timeout_secs: Option<i64>,
    dispatch_batch_size: Option<u32>,
    inventory_batch_size: Option<u32>,
    http_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

const DEFAULT_CRM_AUTHORIZE_URL: &str = "https://accounts.zoho.com/oauth/v2/auth";
const DEFAULT_CRM_TOKEN_URL: &str = "https://accounts.zoho.com/oauth/v2/token";
const DEFAULT_CRM_API_BASE_URL: &str = "https://www.zohoapis.com/crm/v2";
const DEFAULT_CRM_SCOPE: &str = "ZohoCRM.modules.ALL";
const DEFAULT_ACCOUNTING_API_BASE_URL: &str = "https://www.zohoapis.com/books/v3";
const DEFAULT_ACCOUNTING_SCOPE: &str = "ZohoBooks.fullaccess.all";

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let file = Self::read_file(&options)?;

        let database = DatabaseConfig {
            url: env_string("KIRANA_DATABASE_URL")
                .or(file.database.url)
                .unwrap_or_else(|| "sqlite://kirana.db".to_string()),
            max_connections: file.database.max_connections.unwrap_or(5),
            timeout_secs: file.database.timeout_secs.unwrap_or(30),
        };

        let server = ServerConfig {
            bind_address: env_string("KIRANA_SERVER_BIND_ADDRESS")
                .or(file.server.bind_address)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env_parsed("KIRANA_SERVER_PORT")?.or(file.server.port).unwrap_or(8300),
        };

        let crm = oauth_service(
            file.crm,
            "KIRANA_CRM",
            DEFAULT_CRM_AUTHORIZE_URL,
            DEFAULT_CRM_TOKEN_URL,
            DEFAULT_CRM_API_BASE_URL,
            DEFAULT_CRM_SCOPE,
        )?;
        let accounting = oauth_service(
            file.accounting,
            "KIRANA_ACCOUNTING",
            DEFAULT_CRM_AUTHORIZE_URL,
            DEFAULT_CRM_TOKEN_URL,
            DEFAULT_ACCOUNTING_API_BASE_URL,
            DEFAULT_ACCOUNTING_SCOPE,
        )?;

        let company = CompanyConfig {
            name: env_string("KIRANA_COMPANY_NAME")
                .or(file.company.name)
                .unwrap_or_else(|| "Kirana Storefront".to_string()),
            gstin: env_string("KIRANA_COMPANY_GSTIN").or(file.company.gstin),
        };

        let sync = SyncConfig {
            max_attempts: env_parsed("KIRANA_SYNC_MAX_ATTEMPTS")?
                .or(file.sync.max_attempts)
                .unwrap_or(5),
            base_retry_delay_secs: env_parsed("KIRANA_SYNC_BASE_RETRY_DELAY_SECS")?
                .or(file.sync.base_retry_delay_secs)
                .unwrap_or(300),
            max_retry_delay_secs: env_parsed("KIRANA_SYNC_MAX_RETRY_DELAY_SECS")?
                .or(file.sync.max_retry_delay_secs)
                .unwrap_or(86_400),
            claim_timeout_secs: file.sync.claim_timeout_secs.unwrap_or(600),
            dispatch_batch_size: env_parsed("KIRANA_SYNC_DISPATCH_BATCH_SIZE")?
                .or(file.sync.dispatch_batch_size)
                .unwrap_or(25),
            inventory_batch_size: env_parsed("KIRANA_SYNC_INVENTORY_BATCH_SIZE")?
                .or(file.sync.inventory_batch_size)
                .unwrap_or(50),
            http_timeout_secs: env_parsed("KIRANA_HTTP_TIMEOUT_SECS")?
                .or(file.sync.http_timeout_secs)
                .unwrap_or(30),
        };

        let logging = LoggingConfig {
            level: env_string("KIRANA_LOG_LEVEL")
                .or(file.logging.level)
                .unwrap_or_else(|| "info".to_string()),
            format: match env_string("KIRANA_LOG_FORMAT") {
                Some(raw) => parse_log_format(&raw)?,
                None => file.logging.format.unwrap_or(LogFormat::Compact),
            },
        };

        let config = Self { database, server, crm, accounting, company, sync, logging };
        config.validate()?;
        Ok(config)
    }

    fn read_file(options: &LoadOptions) -> Result<FileConfig, ConfigError> {
        let path = match &options.config_path {
            Some(path) => path.clone(),
            None => match env_string("KIRANA_CONFIG_PATH") {
                Some(path) => PathBuf::from(path),
                None => return Ok(FileConfig::default()),
            },
        };

        if !path.exists() {
            if options.require_file {
                return Err(ConfigError::MissingConfigFile(path));
            }
            return Ok(FileConfig::default());
        }

        let raw = fs::read_to_string(&path)
            .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::ParseFile { path, source })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.sync.max_attempts == 0 {
            problems.push("sync.max_attempts must be at least 1".to_string());
        }
        if self.sync.base_retry_delay_secs < 0 {
            problems.push("sync.base_retry_delay_secs must be non-negative".to_string());
        }
        if self.sync.max_retry_delay_secs < self.sync.base_retry_delay_secs {
            problems.push(
                "sync.max_retry_delay_secs must be at least sync.base_retry_delay_secs"
                    .to_string(),
            );
        }
        if self.sync.dispatch_batch_size == 0 {
            problems.push("sync.dispatch_batch_size must be at least 1".to_string());
        }
        for (section, service) in [("crm", &self.crm), ("accounting", &self.accounting)] {
            if service.client_id.is_some() != service.client_secret.is_some() {
                problems.push(format!(
                    "{section}.client_id and {section}.client_secret must be set together"
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems.join("; ")))
        }
    }
}

fn oauth_service(
    file: FileOauthService,
    env_prefix: &str,
    default_authorize_url: &str,
    default_token_url: &str,
    default_api_base_url: &str,
    default_scope: &str,
) -> Result<OauthServiceConfig, ConfigError> {
    Ok(OauthServiceConfig {
        client_id: env_string(&format!("{env_prefix}_CLIENT_ID")).or(file.client_id),
        client_secret: env_string(&format!("{env_prefix}_CLIENT_SECRET"))
            .or(file.client_secret)
            .map(SecretString::from),
        redirect_uri: env_string(&format!("{env_prefix}_REDIRECT_URI")).or(file.redirect_uri),
        authorize_url: file.authorize_url.unwrap_or_else(|| default_authorize_url.to_string()),
        token_url: file.token_url.unwrap_or_else(|| default_token_url.to_string()),
        api_base_url: env_string(&format!("{env_prefix}_API_BASE_URL"))
            .or(file.api_base_url)
            .unwrap_or_else(|| default_api_base_url.to_string()),
        scope: file.scope.unwrap_or_else(|| default_scope.to_string()),
        organization_id: env_string(&format!("{env_prefix}_ORGANIZATION_ID"))
            .or(file.organization_id),
    })
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value }),
        None => Ok(None),
    }
}

fn parse_log_format(raw: &str) -> Result<LogFormat, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "compact" => Ok(LogFormat::Compact),
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: "KIRANA_LOG_FORMAT".to_string(),
            value: raw.to_string(),
        }),
    }
}
