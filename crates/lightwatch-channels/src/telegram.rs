//! Telegram Bot channel — message sending via the Bot API.

use std::time::Duration;

use async_trait::async_trait;
use lightwatch_core::config::TelegramConfig;
use lightwatch_core::error::{Result, WatchError};
use lightwatch_core::subscription::SubscriberId;
use lightwatch_core::traits::Messenger;
use serde::Deserialize;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Descriptions Telegram returns (with 400) for chats that are gone for good.
const GONE_CHAT_MARKERS: [&str; 3] = ["chat not found", "user is deactivated", "bot was kicked"];

/// Sends plain-text messages to private chats.
pub struct TelegramMessenger {
    api_base: String,
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramMessenger {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(WatchError::Config("telegram.bot_token is not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WatchError::Messaging(format!("HTTP client: {e}")))?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Get bot info; used at startup to check the token.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| WatchError::Messaging(format!("getMe failed: {}", e.without_url())))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| WatchError::Messaging(format!("Invalid getMe response: {e}")))?;
        if !body.ok {
            return Err(WatchError::Messaging(format!(
                "getMe rejected: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| WatchError::Messaging("No bot info".into()))
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_message(&self, recipient: SubscriberId, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": recipient,
            "text": text,
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WatchError::DeadlineExceeded
                } else {
                    // without_url keeps the bot token out of the logs
                    WatchError::Messaging(format!("sendMessage failed: {}", e.without_url()))
                }
            })?;

        let status = response.status().as_u16();
        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| WatchError::Messaging(format!("Invalid send response ({status}): {e}")))?;

        check_send_result(status, &result)?;
        tracing::debug!(recipient, "Telegram message delivered");
        Ok(())
    }
}

/// Map a sendMessage reply to the delivery outcome.
fn check_send_result<T>(status: u16, reply: &TelegramApiResponse<T>) -> Result<()> {
    if reply.ok {
        return Ok(());
    }
    let code = reply.error_code.unwrap_or(status);
    let description = reply.description.clone().unwrap_or_default();

    if code == 403 {
        return Err(WatchError::RecipientBlocked);
    }
    let lowered = description.to_lowercase();
    if code == 400 && GONE_CHAT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(WatchError::RecipientBlocked);
    }
    if let Some(retry_after) = reply.parameters.as_ref().and_then(|p| p.retry_after) {
        return Err(WatchError::Messaging(format!(
            "Rate limited, retry after {retry_after}s"
        )));
    }
    Err(WatchError::Messaging(format!("Send failed ({code}): {description}")))
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(json: &str) -> TelegramApiResponse<serde_json::Value> {
        serde_json::from_str(json).unwrap()
    }

    fn config(token: &str, api_base: &str) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.into(),
            api_base: api_base.into(),
        }
    }

    #[test]
    fn test_ok_reply() {
        let r = reply(r#"{"ok":true,"result":{"message_id":1}}"#);
        assert!(check_send_result(200, &r).is_ok());
    }

    #[test]
    fn test_blocked_by_user() {
        let r = reply(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        );
        assert!(matches!(
            check_send_result(403, &r),
            Err(WatchError::RecipientBlocked)
        ));
    }

    #[test]
    fn test_chat_not_found_counts_as_blocked() {
        let r = reply(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#);
        assert!(matches!(
            check_send_result(400, &r),
            Err(WatchError::RecipientBlocked)
        ));
    }

    #[test]
    fn test_other_failures_are_transient() {
        let r = reply(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":7}}"#,
        );
        match check_send_result(429, &r) {
            Err(WatchError::Messaging(msg)) => assert!(msg.contains("7s")),
            other => panic!("unexpected: {other:?}"),
        }

        let r = reply(r#"{"ok":false,"description":"Bad Request: message text is empty"}"#);
        assert!(matches!(check_send_result(400, &r), Err(WatchError::Messaging(_))));
    }

    #[test]
    fn test_missing_token_rejected() {
        assert!(matches!(
            TelegramMessenger::new(&config("  ", "https://api.telegram.org")),
            Err(WatchError::Config(_))
        ));
    }

    #[test]
    fn test_api_url() {
        let messenger = TelegramMessenger::new(&config("123:abc", "http://localhost:8081/")).unwrap();
        assert_eq!(
            messenger.api_url("sendMessage"),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transient() {
        let messenger = TelegramMessenger::new(&config("123:abc", "http://127.0.0.1:9")).unwrap();
        let err = messenger.send_message(42, "hello").await.unwrap_err();
        assert!(matches!(err, WatchError::Messaging(_)));
        assert!(!err.to_string().contains("123:abc"));
    }
}
