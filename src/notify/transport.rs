// src/notify/transport.rs

use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use log::error;
use url::Url;

use super::message::{WebhookMessage, WebhookResponse};

/// Outbound channel for progress messages.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Posts `message` and returns the id of the created message.
    async fn send(&self, message: &WebhookMessage) -> anyhow::Result<String>;

    async fn edit(&self, message_id: &str, message: &WebhookMessage) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct WebhookClient {
    agent: ureq::Agent,
    webhook_url: String,
}

impl WebhookClient {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            webhook_url: webhook_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn post(&self, message: &WebhookMessage) -> anyhow::Result<String> {
        let resp = self
            .agent
            .post(&self.webhook_url)
            .query("wait", "true")
            .send_json(message);
        let resp = check(resp, "webhook")?;

        let reply: WebhookResponse = resp
            .into_json()
            .context("unable to decode webhook response body")?;
        Ok(reply.id)
    }

    fn patch(&self, message_id: &str, message: &WebhookMessage) -> anyhow::Result<()> {
        let url = edit_url(&self.webhook_url, message_id)?;
        let resp = self.agent.patch(url.as_str()).send_json(message);
        check(resp, "webhook edit")?;
        Ok(())
    }
}

/// `{webhook}/messages/{id}`, keeping any query of the webhook url.
fn edit_url(webhook_url: &str, message_id: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(webhook_url)
        .with_context(|| format!("invalid webhook url {:?}", webhook_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("webhook url {:?} cannot carry a path", webhook_url))?
        .pop_if_empty()
        .push("messages")
        .push(message_id);
    Ok(url)
}

fn check(resp: Result<ureq::Response, ureq::Error>, what: &str) -> anyhow::Result<ureq::Response> {
    match resp {
        Ok(resp) => Ok(resp),
        Err(ureq::Error::Status(status, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            error!("[notify] unexpected response status from {}: {} {}", what, status, body);
            bail!("unexpected response status from {}: {}", what, status)
        }
        Err(e) => Err(e).with_context(|| format!("error sending {} request", what)),
    }
}

#[async_trait]
impl MessageTransport for WebhookClient {
    async fn send(&self, message: &WebhookMessage) -> anyhow::Result<String> {
        let client = self.clone();
        let message = message.clone();
        tokio::task::spawn_blocking(move || client.post(&message))
            .await
            .context("webhook task panicked")?
    }

    async fn edit(&self, message_id: &str, message: &WebhookMessage) -> anyhow::Result<()> {
        let client = self.clone();
        let message_id = message_id.to_string();
        let message = message.clone();
        tokio::task::spawn_blocking(move || client.patch(&message_id, &message))
            .await
            .context("webhook edit task panicked")?
    }
}
