// src/live.rs - live room metadata lookup

use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use log::error;
use serde::Deserialize;

pub const DEFAULT_LIVE_API: &str = "https://api.live.bilibili.com";

/// Images of a live room, fetched after the fact to enrich messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveInfo {
    pub avatar_url: String,
    pub cover_url: String,
    pub keyframe_url: String,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn live_info(&self, room_id: u64) -> anyhow::Result<LiveInfo>;
}

#[derive(Deserialize)]
struct RoomInfoResponse {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<RoomInfoData>,
}

#[derive(Deserialize)]
struct RoomInfoData {
    room_info: RoomInfo,
    anchor_info: AnchorInfo,
}

#[derive(Deserialize)]
struct RoomInfo {
    #[serde(default)]
    cover: String,
    #[serde(default)]
    keyframe: String,
}

#[derive(Deserialize)]
struct AnchorInfo {
    base_info: AnchorBaseInfo,
}

#[derive(Deserialize)]
struct AnchorBaseInfo {
    #[serde(default)]
    face: String,
}

impl RoomInfoResponse {
    fn into_live_info(self, room_id: u64) -> anyhow::Result<LiveInfo> {
        if self.code != 0 {
            bail!(
                "room info for {} rejected: code {} ({})",
                room_id,
                self.code,
                self.message
            );
        }
        let data = self
            .data
            .ok_or_else(|| anyhow!("room info for {} has no data", room_id))?;

        Ok(LiveInfo {
            avatar_url: data.anchor_info.base_info.face,
            cover_url: data.room_info.cover,
            keyframe_url: data.room_info.keyframe,
        })
    }
}

#[derive(Clone)]
pub struct LiveClient {
    agent: ureq::Agent,
    api_base: String,
}

impl LiveClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn fetch(&self, room_id: u64) -> anyhow::Result<LiveInfo> {
        let url = format!("{}/xlive/web-room/v1/index/getInfoByRoom", self.api_base);
        let resp = match self
            .agent
            .get(&url)
            .query("room_id", &room_id.to_string())
            .call()
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                error!("[live] unexpected response for room {}: {} {}", room_id, status, body);
                bail!("unexpected response from room info endpoint: {}", status);
            }
            Err(e) => return Err(e).context("error requesting room info endpoint"),
        };

        let decoded: RoomInfoResponse = resp
            .into_json()
            .context("unable to decode room info response")?;
        decoded.into_live_info(room_id)
    }
}

#[async_trait]
impl MetadataSource for LiveClient {
    async fn live_info(&self, room_id: u64) -> anyhow::Result<LiveInfo> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.fetch(room_id))
            .await
            .context("room info task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_room_info() {
        let raw = r#"{
            "code": 0,
            "message": "0",
            "data": {
                "room_info": {"room_id": 1, "cover": "https://i0/cover.jpg", "keyframe": "https://i0/kf.jpg"},
                "anchor_info": {"base_info": {"uname": "someone", "face": "https://i0/face.jpg"}}
            }
        }"#;
        let resp: RoomInfoResponse = serde_json::from_str(raw).expect("decode");
        let info = resp.into_live_info(1).expect("info");

        assert_eq!(info.avatar_url, "https://i0/face.jpg");
        assert_eq!(info.cover_url, "https://i0/cover.jpg");
        assert_eq!(info.keyframe_url, "https://i0/kf.jpg");
    }

    #[test]
    fn test_non_zero_code_is_an_error() {
        let resp: RoomInfoResponse =
            serde_json::from_str(r#"{"code": 19002000, "message": "no room", "data": null}"#)
                .expect("decode");
        let err = resp.into_live_info(7).expect_err("rejected");
        assert!(err.to_string().contains("19002000"));
    }
}
