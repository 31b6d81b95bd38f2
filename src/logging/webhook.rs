// Webhook logging sinks.
// Formats log events for Discord and Telegram and posts them from a background thread.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::error::{DevtilsError, Result};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);
/// Records waiting for delivery; newer records are dropped once it is full.
const QUEUE_CAPACITY: usize = 256;

/// Targets whose events are never forwarded, so delivery cannot feed back into itself.
const IGNORED_TARGET_PREFIXES: [&str; 4] = ["reqwest", "hyper", "h2", "rustls"];

/// Where webhook log messages are posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTarget {
    Discord { url: String },
    Telegram { token: String, chat_id: String },
}

impl WebhookTarget {
    pub fn discord(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(DevtilsError::Config(
                "Discord webhook URL must not be empty".to_string(),
            ));
        }
        Ok(Self::Discord { url })
    }

    pub fn telegram(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let chat_id = chat_id.into();
        if token.trim().is_empty() || chat_id.trim().is_empty() {
            return Err(DevtilsError::Config(
                "Telegram bot token and chat id must not be empty".to_string(),
            ));
        }
        Ok(Self::Telegram { token, chat_id })
    }

    /// URL the payload is posted to.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Discord { url } => url.clone(),
            Self::Telegram { token, .. } => format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, token),
        }
    }

    /// JSON body for one log record.
    pub fn payload(&self, record: &LogRecord) -> Value {
        match self {
            Self::Discord { .. } => json!({
                "embeds": [{
                    "type": "rich",
                    "description": record.message,
                    "color": discord_color(&record.level),
                    "timestamp": record.timestamp.to_rfc3339(),
                    "footer": { "text": format!("{} in {}", record.level, record.target) },
                }]
            }),
            Self::Telegram { chat_id, .. } => json!({
                "chat_id": chat_id,
                "text": format!("{} in {}: {}", record.level, record.target, record.message),
            }),
        }
    }
}

/// Embed colour for a level.
pub fn discord_color(level: &Level) -> u32 {
    match *level {
        Level::ERROR => 0xd10909,
        Level::WARN => 0xb76b0d,
        Level::INFO => 0x0867af,
        Level::DEBUG => 0x676a6c,
        _ => 0x181c20,
    }
}

/// A log event captured for delivery.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A tracing Layer that forwards events to a webhook.
///
/// Events are queued on a bounded channel and posted by a dedicated thread,
/// so the logging call never waits on the network. Records arriving while
/// the queue is full are dropped, as are delivery failures.
pub struct WebhookLayer {
    sender: SyncSender<LogRecord>,
}

impl WebhookLayer {
    /// Start the delivery thread for `target`.
    ///
    /// `agent` becomes the `User-Agent` header; an empty agent falls back to
    /// the host name.
    pub fn new(target: WebhookTarget, agent: &str) -> Result<Self> {
        let agent = if agent.trim().is_empty() {
            host_name()
        } else {
            agent.to_string()
        };

        let (sender, receiver) = mpsc::sync_channel(QUEUE_CAPACITY);
        thread::Builder::new()
            .name("devtils-webhook".to_string())
            .spawn(move || deliver_loop(target, agent, receiver))?;

        Ok(Self { sender })
    }

    /// Layer that hands records to `sender` instead of posting them.
    pub fn with_sender(sender: SyncSender<LogRecord>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for WebhookLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let target = meta.target();

        if IGNORED_TARGET_PREFIXES
            .iter()
            .any(|prefix| target.starts_with(prefix))
        {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let _ = self.sender.try_send(LogRecord {
            level: *meta.level(),
            target: target.to_string(),
            message: visitor.finish(),
            timestamp: Utc::now(),
        });
    }
}

/// Collects the `message` field plus any other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

fn deliver_loop(target: WebhookTarget, agent: String, receiver: Receiver<LogRecord>) {
    let Ok(client) = build_client(&agent) else {
        return;
    };
    let endpoint = target.endpoint();

    while let Ok(record) = receiver.recv() {
        // No retry: a lost message is preferable to a stalled logger
        let _ = client.post(&endpoint).json(&target.payload(&record)).send();
    }
}

fn build_client(agent: &str) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(agent).map_err(|e| DevtilsError::Config(e.to_string()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let client = Client::builder()
        .default_headers(headers)
        .timeout(DELIVERY_TIMEOUT)
        .build()?;
    Ok(client)
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "devtils".to_string())
}
