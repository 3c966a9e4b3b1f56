//! Kubo HTTP API client for archive, block, and pin operations

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client};
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::cid_utils::{parse_cid, Cid, CidCodec};
use crate::error::{Result, StoreError};
use crate::{DirEntry, EntryKind, PageStore, PinEntry};

/// Configuration for the Kubo connection
#[derive(Clone, Debug)]
pub struct IpfsConfig {
    /// Kubo API URL (e.g., "http://localhost:5001")
    pub api_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl IpfsConfig {
    /// Create with a custom API URL
    pub fn with_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }
}

/// Kubo-backed page store
#[derive(Clone)]
pub struct IpfsStore {
    client: Client,
    config: IpfsConfig,
}

impl IpfsStore {
    /// Create a new store client. Does not touch the network; call
    /// [`PageStore::health_check`] to verify the daemon is reachable.
    pub fn new(config: IpfsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create from URL string
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(IpfsConfig::with_url(url))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{path}", self.config.api_url)
    }

    async fn api_error(response: reqwest::Response, what: &str) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StoreError::IpfsApi(format!("{what} failed ({status}): {body}"))
    }
}

#[async_trait]
impl PageStore for IpfsStore {
    async fn health_check(&self) -> Result<()> {
        let response = self.client.post(self.endpoint("id")).send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response, "health check").await);
        }
        Ok(())
    }

    #[instrument(skip(self, archive), fields(size = archive.len()))]
    async fn import_archive(&self, archive: Bytes) -> Result<Cid> {
        let part = multipart::Part::bytes(archive.to_vec())
            .file_name("archive.car")
            .mime_str("application/vnd.ipld.car")
            .map_err(|e| StoreError::IpfsApi(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint("dag/import?pin-roots=false"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::InvalidArchive(body));
        }

        // dag/import streams one JSON object per line; each imported root
        // appears as {"Root":{"Cid":{"/":...}}}. The last root wins.
        let body = response.text().await?;
        let mut root = None;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let event: DagImportEvent = serde_json::from_str(line)?;
            if let Some(r) = event.root {
                root = Some(parse_cid(&r.cid.value)?);
            }
        }
        root.ok_or_else(|| StoreError::InvalidArchive("no roots imported".to_string()))
    }

    #[instrument(skip(self))]
    async fn export_archive(&self, root: &Cid) -> Result<Bytes> {
        let response = self
            .client
            .post(self.endpoint(&format!("dag/export?arg={root}")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response, "dag export").await);
        }
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self))]
    async fn get_block(&self, cid: &Cid) -> Result<Bytes> {
        let response = self
            .client
            .post(self.endpoint(&format!("block/get?arg={cid}")))
            .send()
            .await?;
        if !response.status().is_success() {
            if response.status().as_u16() == 404 {
                return Err(StoreError::NotFound(*cid));
            }
            return Err(Self::api_error(response, "block get").await);
        }
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_block(&self, data: &[u8], codec: CidCodec) -> Result<Cid> {
        let part = multipart::Part::bytes(data.to_vec())
            .file_name("data")
            .mime_str("application/octet-stream")
            .map_err(|e| StoreError::IpfsApi(e.to_string()))?;
        let form = multipart::Form::new().part("data", part);

        let response = self
            .client
            .post(self.endpoint(&format!(
                "block/put?cid-codec={}&mhtype=sha2-256",
                codec.name()
            )))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response, "block put").await);
        }

        let result: BlockPutResponse = response.json().await.map_err(StoreError::from)?;
        parse_cid(&result.key)
    }

    async fn remove_block(&self, cid: &Cid) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("block/rm?arg={cid}&force=true")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response, "block rm").await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_children(&self, cid: &Cid) -> Result<Vec<DirEntry>> {
        let response = self
            .client
            .post(self.endpoint(&format!("ls?arg={cid}&resolve-type=true")))
            .send()
            .await?;
        if !response.status().is_success() {
            if response.status().as_u16() == 404 {
                return Err(StoreError::NotFound(*cid));
            }
            return Err(Self::api_error(response, "ls").await);
        }

        let result: LsResponse = response.json().await.map_err(StoreError::from)?;
        let mut entries = Vec::new();
        for object in result.objects {
            for link in object.links {
                entries.push(DirEntry {
                    name: link.name,
                    cid: parse_cid(&link.hash)?,
                    // unixfs type 1 is a directory, everything else serves as a file
                    kind: if link.entry_type == 1 {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    },
                });
            }
        }
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn pin_add(&self, cid: &Cid, label: &str, recursive: bool) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!(
                "pin/add?arg={cid}&recursive={recursive}&name={}",
                urlencoding::encode(label)
            )))
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::PinFailed(body));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn pin_remove(&self, cid: &Cid, label: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("pin/rm?arg={cid}")))
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            // removing an absent pin is a no-op, matching idempotency rules
            if body.contains("not pinned") {
                return Ok(());
            }
            return Err(StoreError::PinFailed(body));
        }
        Ok(())
    }

    async fn pin_list(&self, label_prefix: &str) -> Result<Vec<PinEntry>> {
        let response = self
            .client
            .post(self.endpoint("pin/ls?type=all&names=true"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response, "pin ls").await);
        }

        let result: PinLsResponse = response.json().await.map_err(StoreError::from)?;
        let mut entries = Vec::new();
        for (cid_str, info) in result.keys {
            let label = info.name.unwrap_or_default();
            if label.starts_with(label_prefix) {
                entries.push(PinEntry {
                    cid: parse_cid(&cid_str)?,
                    label,
                });
            }
        }
        Ok(entries)
    }

    async fn pins_by_cid(&self, cid: &Cid) -> Result<Vec<PinEntry>> {
        let response = self
            .client
            .post(self.endpoint(&format!("pin/ls?arg={cid}&type=all&names=true")))
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("not pinned") {
                return Ok(Vec::new());
            }
            return Err(StoreError::IpfsApi(format!("pin ls failed: {body}")));
        }

        let result: PinLsResponse = response.json().await.map_err(StoreError::from)?;
        let mut entries = Vec::new();
        for (cid_str, info) in result.keys {
            entries.push(PinEntry {
                cid: parse_cid(&cid_str)?,
                label: info.name.unwrap_or_default(),
            });
        }
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn enumerate_descendants(&self, cid: &Cid) -> Result<HashSet<Cid>> {
        let response = self
            .client
            .post(self.endpoint(&format!("refs?arg={cid}&recursive=true&unique=true")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response, "refs").await);
        }

        let mut cids = HashSet::from([*cid]);
        let body = response.text().await?;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let entry: RefsEntry = serde_json::from_str(line)?;
            if !entry.err.is_empty() {
                warn!(cid = %cid, error = %entry.err, "refs enumeration reported an error");
                continue;
            }
            cids.insert(parse_cid(&entry.reference)?);
        }
        Ok(cids)
    }
}

/// One line of the /api/v0/dag/import response stream
#[derive(Debug, Deserialize)]
struct DagImportEvent {
    #[serde(rename = "Root")]
    root: Option<DagImportRoot>,
}

#[derive(Debug, Deserialize)]
struct DagImportRoot {
    #[serde(rename = "Cid")]
    cid: DagCid,
}

#[derive(Debug, Deserialize)]
struct DagCid {
    #[serde(rename = "/")]
    value: String,
}

/// Response from /api/v0/block/put
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockPutResponse {
    key: String,
}

/// Response from /api/v0/ls
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsResponse {
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsObject {
    #[serde(default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsLink {
    name: String,
    hash: String,
    #[serde(rename = "Type")]
    entry_type: u8,
}

/// Response from /api/v0/pin/ls
#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: std::collections::HashMap<String, PinInfo>,
}

#[derive(Debug, Deserialize)]
struct PinInfo {
    #[serde(rename = "Name", default)]
    name: Option<String>,
}

/// One line of the /api/v0/refs response stream
#[derive(Debug, Deserialize)]
struct RefsEntry {
    #[serde(rename = "Ref")]
    reference: String,
    #[serde(rename = "Err", default)]
    err: String,
}
