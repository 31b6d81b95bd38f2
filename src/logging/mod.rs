// Logging bootstrap.
// Installs console, file and webhook sinks, each with its own level threshold.

pub mod call;
pub mod webhook;

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use crate::cache::store;
use crate::config::{Settings, keys};
use crate::error::{DevtilsError, Result};

pub use call::log_call;
pub use webhook::{LogRecord, WebhookLayer, WebhookTarget};

/// Default directory for the log file.
pub const DEFAULT_LOG_FOLDER: &str = "./Assets/logs/";

/// Default `User-Agent` for webhook delivery.
pub const DEFAULT_AGENT: &str = "LoggerBot";

/// Sinks and thresholds for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base folder; the log file is `<folder>/logs/logs.txt`.
    pub folder: PathBuf,
    pub agent: String,
    pub stream_level: LevelFilter,
    pub file_level: LevelFilter,
    pub discord_level: LevelFilter,
    pub discord_webhook: Option<String>,
    pub telegram_level: LevelFilter,
    pub telegram_token: Option<String>,
    pub telegram_chat: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from(DEFAULT_LOG_FOLDER),
            agent: DEFAULT_AGENT.to_string(),
            stream_level: LevelFilter::DEBUG,
            file_level: LevelFilter::ERROR,
            discord_level: LevelFilter::ERROR,
            discord_webhook: None,
            telegram_level: LevelFilter::ERROR,
            telegram_token: None,
            telegram_chat: None,
        }
    }
}

impl LogConfig {
    /// Resolve every logging setting, falling back to the defaults above.
    ///
    /// Unparseable level names keep the default level.
    pub fn from_settings(settings: &Settings) -> Self {
        let defaults = Self::default();
        let level = |key: &str, default: &str, fallback: LevelFilter| {
            parse_level(&settings.get(key, default.to_string())).unwrap_or(fallback)
        };
        let optional = |key: &str| {
            settings
                .get::<Option<String>>(key, None)
                .filter(|value| !value.trim().is_empty())
        };

        Self {
            folder: PathBuf::from(settings.get(keys::LOG_FOLDER, DEFAULT_LOG_FOLDER.to_string())),
            agent: settings.get(keys::LOG_AGENT, DEFAULT_AGENT.to_string()),
            stream_level: level(keys::LOG_LEVEL_STREAM, "DEBUG", defaults.stream_level),
            file_level: level(keys::LOG_LEVEL_FILE, "ERROR", defaults.file_level),
            discord_level: level(keys::LOG_LEVEL_DISCORD, "ERROR", defaults.discord_level),
            discord_webhook: optional(keys::LOG_WEBHOOK_DISCORD),
            telegram_level: level(keys::LOG_LEVEL_TELEGRAM, "ERROR", defaults.telegram_level),
            telegram_token: optional(keys::LOG_TELEGRAM_TOKEN),
            telegram_chat: optional(keys::LOG_TELEGRAM_CHAT),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.folder.join("logs")
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir().join("logs.txt")
    }

    fn discord_target(&self) -> Result<Option<WebhookTarget>> {
        self.discord_webhook
            .as_deref()
            .map(WebhookTarget::discord)
            .transpose()
    }

    fn telegram_target(&self) -> Result<Option<WebhookTarget>> {
        match (&self.telegram_token, &self.telegram_chat) {
            (Some(token), Some(chat)) => WebhookTarget::telegram(token, chat).map(Some),
            _ => Ok(None),
        }
    }
}

/// Parse a level name, accepting the usual Python spellings.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(LevelFilter::TRACE),
        "DEBUG" => Some(LevelFilter::DEBUG),
        "INFO" | "NOTICE" | "SUCCESS" => Some(LevelFilter::INFO),
        "WARN" | "WARNING" => Some(LevelFilter::WARN),
        "ERROR" | "CRITICAL" | "FATAL" => Some(LevelFilter::ERROR),
        "OFF" => Some(LevelFilter::OFF),
        "NOTSET" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

/// Install the global subscriber.
///
/// The console sink honours `RUST_LOG` when it is set. Fails if a global
/// subscriber is already installed or the log file cannot be opened.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    store::ensure_dir(&config.log_dir())?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_file_path())?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(config.stream_level.into()));

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(config.file_level);

    let discord = config
        .discord_target()?
        .map(|target| WebhookLayer::new(target, &config.agent))
        .transpose()?
        .map(|layer| layer.with_filter(config.discord_level));

    let telegram = config
        .telegram_target()?
        .map(|target| WebhookLayer::new(target, &config.agent))
        .transpose()?
        .map(|layer| layer.with_filter(config.telegram_level));

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(discord)
        .with(telegram)
        .try_init()
        .map_err(|e| DevtilsError::Logging(e.to_string()))?;

    info!(
        log_file = %config.log_file_path().display(),
        discord = config.discord_webhook.is_some(),
        telegram = config.telegram_token.is_some(),
        "Logger set up"
    );

    Ok(())
}
