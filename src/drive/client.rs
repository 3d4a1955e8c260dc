// src/drive/client.rs - blocking REST client, driven from tokio via spawn_blocking

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use log::{debug, error};
use serde::Deserialize;

use super::{FOLDER_MIME_TYPE, ProgressFn, Quota, RemoteObject, RemoteStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct DriveClient {
    agent: ureq::Agent,
    api_base: String,
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    storage_quota: Quota,
}

#[derive(Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RemoteObject>,
}

/// Files directly under `parent`, folders excluded.
fn listing_query(parent: &str) -> String {
    format!(
        "'{}' in parents and mimeType != '{}' and trashed = false",
        parent.replace('\\', "\\\\").replace('\'', "\\'"),
        FOLDER_MIME_TYPE
    )
}

impl DriveClient {
    pub fn new(api_base: impl Into<String>, access_token: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build();

        Self {
            agent,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    fn get_quota(&self) -> anyhow::Result<Quota> {
        let resp = self
            .agent
            .get(&format!("{}/about", self.api_base))
            .set("Authorization", &self.bearer())
            .query("fields", "storageQuota")
            .call()
            .map_err(|e| status_error("unable to get drive usage", e))?;

        let about: AboutResponse = resp.into_json().context("unable to decode drive usage")?;
        Ok(about.storage_quota)
    }

    fn list(&self, parent: &str, page_size: usize) -> anyhow::Result<Vec<RemoteObject>> {
        let resp = self
            .agent
            .get(&format!("{}/files", self.api_base))
            .set("Authorization", &self.bearer())
            .query("parent", parent)
            .query("q", &listing_query(parent))
            .query("orderBy", "modifiedTime")
            .query("pageSize", &page_size.to_string())
            .query("fields", "files(id,name,size,modifiedTime,mimeType)")
            .call()
            .map_err(|e| status_error("unable to list drive files", e))?;

        let listing: FileListResponse = resp.into_json().context("unable to decode drive listing")?;
        Ok(listing.files)
    }

    fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.agent
            .delete(&format!("{}/files/{}", self.api_base, id))
            .set("Authorization", &self.bearer())
            .call()
            .map_err(|e| status_error("unable to delete drive file", e))?;
        Ok(())
    }

    fn upload(
        &self,
        parent: &str,
        name: &str,
        content: File,
        size: u64,
        progress: ProgressFn,
    ) -> anyhow::Result<RemoteObject> {
        let body = ProgressReader {
            inner: BufReader::new(content),
            sent: 0,
            total: size,
            progress,
        };

        let resp = self
            .agent
            .post(&format!("{}/files", self.api_base))
            .set("Authorization", &self.bearer())
            .set("Content-Type", "application/octet-stream")
            .set("Content-Length", &size.to_string())
            .query("parent", parent)
            .query("name", name)
            .query("uploadType", "media")
            .send(body)
            .map_err(|e| status_error("unable to upload file", e))?;

        resp.into_json().context("unable to decode upload response")
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn quota(&self) -> anyhow::Result<Quota> {
        let client = self.clone();
        blocking(move || client.get_quota()).await
    }

    async fn list_oldest(
        &self,
        parent: &str,
        page_size: usize,
    ) -> anyhow::Result<Vec<RemoteObject>> {
        let client = self.clone();
        let parent = parent.to_string();
        blocking(move || client.list(&parent, page_size)).await
    }

    async fn delete_object(&self, id: &str) -> anyhow::Result<()> {
        let client = self.clone();
        let id = id.to_string();
        blocking(move || client.delete(&id)).await
    }

    async fn create_file(
        &self,
        parent: &str,
        name: &str,
        content: File,
        size: u64,
        progress: ProgressFn,
    ) -> anyhow::Result<RemoteObject> {
        let client = self.clone();
        let parent = parent.to_string();
        let name = name.to_string();
        blocking(move || client.upload(&parent, &name, content, size, progress)).await
    }
}

async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("drive request task panicked")?
}

fn status_error(context: &str, err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            error!("[drive] {}: status {} body {}", context, status, body);
            anyhow!("{}: unexpected status {}", context, status)
        }
        other => anyhow::Error::new(other).context(context.to_string()),
    }
}

struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    progress: ProgressFn,
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sent += n as u64;
            (self.progress)(self.sent, self.total);
        } else {
            debug!("[drive] upload body drained at {} bytes", self.sent);
        }
        Ok(n)
    }
}
