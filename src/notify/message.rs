// src/notify/message.rs - Discord-style webhook payloads

use serde::{Deserialize, Serialize};

/// Fixed content type of every embed.
pub const EMBED_TYPE_RICH: &str = "rich";

pub const COLOR_RECORD_START: u32 = 0x0099FF;
pub const COLOR_RECORD_READY: u32 = 0x00FF99;
pub const COLOR_UPLOAD_COMPLETE: u32 = 0x99FF00;
pub const COLOR_ALERT: u32 = 0xFF0099;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub embeds: Vec<MessageEmbed>,
}

impl WebhookMessage {
    pub fn single(embed: MessageEmbed) -> Self {
        Self {
            embeds: vec![embed],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEmbed {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub timestamp: String,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MessageImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: false,
        }
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }
}

/// Reply of a webhook execution with `wait=true`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookResponse {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub webhook_id: String,
}
