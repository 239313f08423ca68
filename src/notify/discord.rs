use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{NotificationSink, NotifyError};
use crate::config::Config;
use crate::constants::{
    truncate_chars, DEFAULT_RETRY_AFTER_SECS, EMBED_FOOTER, EMBED_PREVIEW_CHARS,
    NEW_REPLY_COLOR, NEW_THREAD_COLOR,
};
use crate::reconcile::NewItem;
use crate::snapshot::{PostSummary, ThreadSummary};

/// Delivery tuning for a webhook.
#[derive(Debug, Clone)]
pub struct NotifierOptions {
    /// Bound on a single HTTP request.
    pub timeout: Duration,
    /// Pause after this many successful sends.
    pub batch_size: usize,
    pub batch_pause: Duration,
    /// Longest `retry_after` honoured before giving up with `RateLimited`.
    pub max_retry_wait: Duration,
}

impl NotifierOptions {
    /// Options from the process configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.notify_timeout,
            batch_size: config.notify_batch_size,
            batch_pause: config.notify_batch_pause,
            ..Self::default()
        }
    }

    /// Longest a single `send` can take: the batch pause, the first request,
    /// the longest honoured rate-limit wait and the retried request.
    #[must_use]
    pub fn max_send_duration(&self) -> Duration {
        self.batch_pause + self.timeout + self.max_retry_wait + self.timeout + SEND_SLACK
    }
}

/// Headroom for connection setup and scheduling beyond the request timeouts.
const SEND_SLACK: Duration = Duration::from_secs(1);

impl Default for NotifierOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            batch_size: 4,
            batch_pause: Duration::from_secs(2),
            max_retry_wait: Duration::from_secs(30),
        }
    }
}

/// Discord webhook sink.
///
/// One notifier should be shared by every monitor posting to the same
/// webhook so that pacing applies across them.
pub struct DiscordNotifier {
    http: Client,
    webhook_url: String,
    options: NotifierOptions,
    delivered: AtomicUsize,
}

impl DiscordNotifier {
    /// Create a notifier for `webhook_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(webhook_url: &str, options: NotifierOptions) -> Result<Self, NotifyError> {
        let http = Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
            options,
            delivered: AtomicUsize::new(0),
        })
    }

    /// Number of embeds accepted by the webhook so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    async fn pace(&self) {
        let delivered = self.delivered();
        let batch = self.options.batch_size.max(1);
        if delivered > 0 && delivered % batch == 0 && !self.options.batch_pause.is_zero() {
            debug!(
                delivered,
                pause_ms = self.options.batch_pause.as_millis(),
                "Pausing to respect webhook rate limits"
            );
            sleep(self.options.batch_pause).await;
        }
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response, NotifyError> {
        Ok(self.http.post(&self.webhook_url).json(payload).send().await?)
    }
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn send(&self, monitor_name: &str, item: &NewItem) -> Result<(), NotifyError> {
        let payload = build_payload(monitor_name, item);
        self.pace().await;

        let mut response = self.post(&payload).await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_secs(response).await;
            if retry_after > self.options.max_retry_wait.as_secs_f64() {
                return Err(NotifyError::RateLimited {
                    retry_after_secs: retry_after,
                });
            }
            warn!(item = %item.id(), retry_after, "Webhook rate limit hit, waiting before retry");
            sleep(Duration::from_secs_f64(retry_after)).await;

            response = self.post(&payload).await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(NotifyError::RateLimited {
                    retry_after_secs: retry_after_secs(response).await,
                });
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!(
                "webhook returned {status}: {}",
                truncate_chars(body.trim(), 200)
            )));
        }

        self.delivered.fetch_add(1, Ordering::Relaxed);
        debug!(item = %item.id(), kind = ?item.kind(), "Notification delivered");
        Ok(())
    }
}

/// Seconds to wait as requested by a 429 response.
async fn retry_after_secs(response: reqwest::Response) -> f64 {
    let header = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());

    let body = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("retry_after").and_then(Value::as_f64));

    body.or(header)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Webhook body announcing `item`.
#[must_use]
pub fn build_payload(monitor_name: &str, item: &NewItem) -> Value {
    let embed = match item {
        NewItem::Thread(thread) => thread_embed(monitor_name, thread),
        NewItem::Post(post) => reply_embed(monitor_name, post),
    };
    json!({ "embeds": [embed] })
}

fn thread_embed(monitor_name: &str, thread: &ThreadSummary) -> Value {
    let mut fields = vec![field("Author", &thread.author_name)];
    if let Some(created_at) = thread.created_at {
        fields.push(field(
            "Created",
            &created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        ));
    }

    json!({
        "title": format!("🆕 New Thread in {monitor_name}"),
        "description": format!("**{}**", thread.title),
        "color": NEW_THREAD_COLOR,
        "url": thread.url,
        "fields": fields,
        "footer": { "text": EMBED_FOOTER },
    })
}

fn reply_embed(monitor_name: &str, post: &PostSummary) -> Value {
    let preview = if post.body_preview.is_empty() {
        "*No content preview available*".to_string()
    } else {
        truncate_chars(&post.body_preview, EMBED_PREVIEW_CHARS)
    };

    let mut fields = vec![field("Author", &post.author_name)];
    if let Some(posted_at) = &post.posted_at {
        fields.push(field("Posted", posted_at));
    }

    json!({
        "title": format!("New Reply in {monitor_name}"),
        "description": preview,
        "color": NEW_REPLY_COLOR,
        "url": post.url,
        "fields": fields,
        "footer": { "text": EMBED_FOOTER },
    })
}

fn field(name: &str, value: &str) -> Value {
    json!({ "name": name, "value": value, "inline": true })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(body: &str) -> PostSummary {
        PostSummary {
            post_id: "p12".to_string(),
            author_name: "Lyra".to_string(),
            body_preview: body.to_string(),
            url: "https://rol.foroactivo.com/t31-x#p12".to_string(),
            posted_at: Some("Hoy a las 10:31".to_string()),
        }
    }

    #[test]
    fn test_thread_payload() {
        let thread = ThreadSummary {
            thread_id: "t45".to_string(),
            title: "La torre".to_string(),
            author_name: "Kael".to_string(),
            url: "https://rol.foroactivo.com/t45-la-torre".to_string(),
            is_pinned: false,
            created_at: None,
        };
        let payload = build_payload("Rol general", &NewItem::Thread(thread));
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "🆕 New Thread in Rol general");
        assert_eq!(embed["description"], "**La torre**");
        assert_eq!(embed["color"], NEW_THREAD_COLOR);
        assert_eq!(embed["fields"].as_array().unwrap().len(), 1);
        assert_eq!(embed["footer"]["text"], EMBED_FOOTER);
    }

    #[test]
    fn test_reply_payload_truncates_preview() {
        let payload = build_payload("Hilo", &NewItem::Post(post(&"x".repeat(300))));
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "New Reply in Hilo");
        let description = embed["description"].as_str().unwrap();
        assert_eq!(description.chars().count(), EMBED_PREVIEW_CHARS + 3);
        assert_eq!(embed["fields"][1]["name"], "Posted");
    }

    #[test]
    fn test_send_budget_covers_rate_limit_wait() {
        let options = NotifierOptions::from_config(&Config::for_testing());
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(options.max_send_duration() > options.max_retry_wait + options.timeout * 2);
    }

    #[test]
    fn test_reply_payload_without_body() {
        let payload = build_payload("Hilo", &NewItem::Post(post("")));
        assert_eq!(
            payload["embeds"][0]["description"],
            "*No content preview available*"
        );
    }
}
