//! Object storage for the uploaded `raw_data/` tree.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Object listing kept next to a run's uploads so the next run can delete
/// exactly what this one uploaded.
pub const MANIFEST: &str = "manifest.json";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Delete every object under `prefix` left by a previous run.
    async fn clear_prefix(&self, prefix: &str) -> Result<usize>;

    async fn put_file(&self, local: &Path, key: &str) -> Result<()>;

    /// Called once after the last upload of a run.
    async fn finish(&self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}

// ── Directory bucket ──────────────────────────────────────────────────────────

/// Bucket mirrored into `<root>/<name>/`.
pub struct DirBucket {
    base: PathBuf,
}

impl DirBucket {
    pub fn new(root: &Path, name: &str) -> Self {
        Self { base: root.join(name) }
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        key.split('/').filter(|s| !s.is_empty()).fold(self.base.clone(), |p, s| p.join(s))
    }
}

#[async_trait]
impl ObjectStore for DirBucket {
    async fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        let dir = self.object_path(prefix);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(0);
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Could not clear {:?}", dir))?;
        Ok(1)
    }

    async fn put_file(&self, local: &Path, key: &str) -> Result<()> {
        let dest = self.object_path(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, &dest)
            .await
            .with_context(|| format!("Could not copy {:?} to {:?}", local, dest))?;
        debug!("put {}", key);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.base.display())
    }
}

// ── HTTP bucket ───────────────────────────────────────────────────────────────

/// Keys uploaded since the last `clear_prefix`, and where their manifest lives.
#[derive(Debug, Default)]
struct UploadLog {
    manifest_key: Option<String>,
    keys: Vec<String>,
}

impl UploadLog {
    /// Start a new run under `prefix`, forgetting earlier runs' keys.
    fn begin(&mut self, prefix: &str) {
        self.manifest_key = Some(HttpBucket::manifest_key(prefix));
        self.keys.clear();
    }

    /// Note an upload; returns the manifest key and its new body.
    fn record(&mut self, key: &str) -> Result<Option<(String, Vec<u8>)>> {
        if !self.keys.iter().any(|k| k == key) {
            self.keys.push(key.to_string());
        }
        match &self.manifest_key {
            Some(manifest_key) => Ok(Some((manifest_key.clone(), serde_json::to_vec(&self.keys)?))),
            None => Ok(None),
        }
    }
}

/// S3-style path addressing over plain HTTP: `PUT/GET/DELETE
/// <endpoint>/<bucket>/<key>`. The manifest is rewritten after every upload,
/// so a run that stops early still leaves a complete listing for the next
/// run to clear.
pub struct HttpBucket {
    client: reqwest::Client,
    endpoint: String,
    name: String,
    log: Mutex<UploadLog>,
}

impl HttpBucket {
    pub fn new(client: reqwest::Client, endpoint: &str, name: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            name: name.to_string(),
            log: Mutex::new(UploadLog::default()),
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.name, key.trim_start_matches('/'))
    }

    fn manifest_key(prefix: &str) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), MANIFEST)
    }

    fn log(&self) -> Result<std::sync::MutexGuard<'_, UploadLog>> {
        self.log.lock().map_err(|_| anyhow!("upload log poisoned"))
    }

    async fn put(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        let resp = self
            .client
            .put(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("PUT {} failed", key))?;
        if !resp.status().is_success() {
            return Err(anyhow!("PUT {} → HTTP {}", key, resp.status()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let resp = self.client.delete(self.object_url(key)).send().await?;
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            return Err(anyhow!("DELETE {} → HTTP {}", key, status));
        }
        Ok(())
    }
}

fn content_type(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("json") => "application/json",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStore for HttpBucket {
    async fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        self.log()?.begin(prefix);

        let manifest_key = Self::manifest_key(prefix);
        let resp = self.client.get(self.object_url(&manifest_key)).send().await?;
        if resp.status().as_u16() == 404 {
            debug!("No previous manifest under {}", prefix);
            return Ok(0);
        }
        if !resp.status().is_success() {
            return Err(anyhow!("GET {} → HTTP {}", manifest_key, resp.status()));
        }

        let keys: Vec<String> = resp.json().await.context("Unreadable bucket manifest")?;
        for key in &keys {
            self.delete(key).await?;
        }
        self.delete(&manifest_key).await?;
        Ok(keys.len())
    }

    async fn put_file(&self, local: &Path, key: &str) -> Result<()> {
        let body = tokio::fs::read(local)
            .await
            .with_context(|| format!("Could not read {:?}", local))?;
        self.put(key, content_type(key), body).await?;

        let manifest = self.log()?.record(key)?;
        match manifest {
            Some((manifest_key, body)) => self
                .put(&manifest_key, "application/json", body)
                .await
                .context("Manifest update failed; next run cannot clear this object"),
            None => {
                warn!("{} uploaded before the prefix was cleared; not tracked", key);
                Ok(())
            }
        }
    }

    async fn finish(&self, _prefix: &str) -> Result<()> {
        let log = self.log()?;
        if let Some(manifest_key) = &log.manifest_key {
            info!("{} objects recorded in {}", log.keys.len(), manifest_key);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("http:{}/{}", self.endpoint, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

    /// Minimal object store speaking HTTP/1.1 PUT/GET/DELETE on loopback.
    async fn object_server() -> (String, Objects) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let objects: Objects = Arc::default();

        let store = objects.clone();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                tokio::spawn(serve(sock, store.clone()));
            }
        });
        (endpoint, objects)
    }

    async fn serve(sock: TcpStream, objects: Objects) {
        let mut reader = BufReader::new(sock);
        loop {
            let mut request = String::new();
            if reader.read_line(&mut request).await.unwrap_or(0) == 0 {
                return;
            }
            let mut parts = request.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let path = parts.next().unwrap_or_default().to_string();

            let mut len = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).await.unwrap_or(0) == 0 {
                    return;
                }
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        len = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0; len];
            reader.read_exact(&mut body).await.unwrap();

            let (status, payload) = {
                let mut objects = objects.lock().unwrap();
                match (method.as_str(), objects.contains_key(&path)) {
                    ("PUT", _) => {
                        objects.insert(path, body);
                        ("200 OK", Vec::new())
                    }
                    ("GET", true) => ("200 OK", objects[&path].clone()),
                    ("DELETE", true) => {
                        objects.remove(&path);
                        ("200 OK", Vec::new())
                    }
                    _ => ("404 Not Found", Vec::new()),
                }
            };
            let head = format!("HTTP/1.1 {}\r\ncontent-length: {}\r\n\r\n", status, payload.len());
            let sock = reader.get_mut();
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(&payload).await.unwrap();
        }
    }

    fn http_bucket(endpoint: &str) -> HttpBucket {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpBucket::new(client, endpoint, "gpubucket")
    }

    fn manifest(objects: &Objects) -> Vec<String> {
        let objects = objects.lock().unwrap();
        serde_json::from_slice(&objects["/gpubucket/raw_data/manifest.json"]).unwrap()
    }

    #[tokio::test]
    async fn test_interrupted_run_is_cleared_by_the_next() {
        let (endpoint, objects) = object_server().await;
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("data.json");
        std::fs::write(&local, b"{}").unwrap();

        // first run stops after two uploads, before `finish`
        let first = http_bucket(&endpoint);
        assert_eq!(first.clear_prefix("raw_data").await.unwrap(), 0);
        first.put_file(&local, "raw_data/K1/data.json").await.unwrap();
        first.put_file(&local, "raw_data/K1/images/K1.jpg").await.unwrap();
        assert_eq!(manifest(&objects), vec!["raw_data/K1/data.json", "raw_data/K1/images/K1.jpg"]);

        let second = http_bucket(&endpoint);
        assert_eq!(second.clear_prefix("raw_data").await.unwrap(), 2);
        assert!(objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reused_bucket_lists_only_the_current_run() {
        let (endpoint, objects) = object_server().await;
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("data.json");
        std::fs::write(&local, b"{}").unwrap();

        let bucket = http_bucket(&endpoint);
        bucket.clear_prefix("raw_data").await.unwrap();
        bucket.put_file(&local, "raw_data/K1/data.json").await.unwrap();
        bucket.finish("raw_data").await.unwrap();

        assert_eq!(bucket.clear_prefix("raw_data").await.unwrap(), 1);
        bucket.put_file(&local, "raw_data/K2/data.json").await.unwrap();
        assert_eq!(manifest(&objects), vec!["raw_data/K2/data.json"]);
        assert!(!objects.lock().unwrap().contains_key("/gpubucket/raw_data/K1/data.json"));
    }

    #[test]
    fn test_upload_log_dedupes_and_restarts() {
        let mut log = UploadLog::default();
        assert!(log.record("raw_data/early.json").unwrap().is_none());

        log.begin("raw_data");
        log.record("raw_data/a.json").unwrap();
        let (key, body) = log.record("raw_data/a.json").unwrap().unwrap();
        assert_eq!(key, "raw_data/manifest.json");
        assert_eq!(body, br#"["raw_data/a.json"]"#.to_vec());

        log.begin("raw_data");
        let (_, body) = log.record("raw_data/b.json").unwrap().unwrap();
        assert_eq!(body, br#"["raw_data/b.json"]"#.to_vec());
    }

    #[tokio::test]
    async fn test_dir_bucket_put_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("data.json");
        std::fs::write(&local, b"{}").unwrap();

        let bucket = DirBucket::new(&tmp.path().join("store"), "gpubucket");
        bucket.put_file(&local, "raw_data/SKU1/data.json").await.unwrap();
        let object = tmp.path().join("store/gpubucket/raw_data/SKU1/data.json");
        assert!(object.is_file());

        assert_eq!(bucket.clear_prefix("raw_data").await.unwrap(), 1);
        assert!(!object.exists());
        assert_eq!(bucket.clear_prefix("raw_data").await.unwrap(), 0);
    }

    #[test]
    fn test_http_bucket_addressing() {
        let bucket = HttpBucket::new(reqwest::Client::new(), "http://localhost:9000/", "gpubucket");
        assert_eq!(
            bucket.object_url("raw_data/SKU1/images/SKU1.jpg"),
            "http://localhost:9000/gpubucket/raw_data/SKU1/images/SKU1.jpg"
        );
        assert_eq!(HttpBucket::manifest_key("raw_data/"), "raw_data/manifest.json");
        assert_eq!(content_type("raw_data/raw_data.json"), "application/json");
        assert_eq!(content_type("x/images/a.jpg"), "image/jpeg");
    }
}
