//! Typed façade over the appliance REST management API.
//!
//! Every operation parses the response body as JSON and turns a status of
//! 300 or above into a typed [`HttpResponseError`] carrying that body, so
//! callers can branch on status without string matching while still
//! reporting `HTTP response error: <status>`.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::trace;
use url::Url;

use crate::core::config::DeviceOptions;
use crate::core::json::{as_list, string_at, value_at};

/// A non-2xx management response, with whatever body the appliance returned.
#[derive(Debug, thiserror::Error)]
#[error("HTTP response error: {status}")]
pub struct HttpResponseError {
    pub status: StatusCode,
    pub body: Value,
}

impl HttpResponseError {
    /// The HTTP status behind `err`, when it is a management response error.
    pub fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
        err.downcast_ref::<Self>().map(|e| e.status)
    }

    /// The response body behind `err`, when it is a management response error.
    pub fn body_of(err: &anyhow::Error) -> Option<&Value> {
        err.downcast_ref::<Self>().map(|e| &e.body)
    }
}

/// Directory callback verdict for [`DeviceClient::walk_filestore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkDecision {
    Descend,
    Skip,
}

/// HTTP client plus connection coordinates for one appliance.
///
/// TLS verification is disabled: the fleet runs on self-signed certificates.
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    user_name: String,
    user_password: String,
}

impl DeviceClient {
    pub fn new(options: &DeviceOptions) -> Result<Self> {
        let base_url = Url::parse(&options.mgmt_url)
            .with_context(|| format!("invalid management URL: {}", options.mgmt_url))?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(options.http_timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            user_name: options.user_name.clone(),
            user_password: options.user_password.clone(),
        })
    }

    fn mgmt_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid management path: {path}"))
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.mgmt_url(path)?;
        trace!("{method} {url}");

        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .basic_auth(&self.user_name, Some(&self.user_password));
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))?;
        let status = response.status();
        let raw = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response from {url}"))?;
        let parsed: Value = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid JSON response from {url}"))?;
        trace!("{method} {url} -> {status}");

        if status.as_u16() >= 300 {
            return Err(HttpResponseError {
                status,
                body: parsed,
            }
            .into());
        }
        Ok(parsed)
    }

    /// All object classes the appliance knows, from the `_links` of the
    /// configuration root (the `self` link is not a class).
    pub async fn list_classes(&self) -> Result<Vec<String>> {
        let body = self.request(Method::GET, "/mgmt/config/", None).await?;
        let links = value_at(&body, &["_links".into()])
            .and_then(Value::as_object)
            .context("missing '_links' in configuration root")?;

        let mut classes: Vec<String> = links
            .keys()
            .filter(|key| key.as_str() != "self")
            .cloned()
            .collect();
        classes.sort();
        Ok(classes)
    }

    /// One named object of a class, unwrapped from its class key.
    pub async fn get_object(&self, domain: &str, class: &str, name: &str) -> Result<Value> {
        let body = self
            .request(Method::GET, &format!("/mgmt/config/{domain}/{class}/{name}"), None)
            .await?;
        unwrap_class(&body, class)
    }

    /// The instance of a class that has no named instances. Used as the
    /// fallback when the named GET comes back 404.
    pub async fn get_singleton(&self, domain: &str, class: &str) -> Result<Value> {
        let body = self
            .request(Method::GET, &format!("/mgmt/config/{domain}/{class}"), None)
            .await?;
        unwrap_class(&body, class)
    }

    /// All objects of a class, normalized to a list.
    pub async fn list_objects(&self, domain: &str, class: &str) -> Result<Vec<Value>> {
        let body = self
            .request(Method::GET, &format!("/mgmt/config/{domain}/{class}"), None)
            .await?;
        Ok(as_list(value_at(&body, &[class.into()]))
            .into_iter()
            .cloned()
            .collect())
    }

    /// Creates or updates an object under its class and `name` attribute.
    pub async fn put_object(&self, domain: &str, class: &str, obj: &Value) -> Result<Value> {
        let name = string_at(obj, &["name".into()])
            .context("object has no 'name' attribute")?
            .to_string();
        self.request(
            Method::PUT,
            &format!("/mgmt/config/{domain}/{class}/{name}"),
            Some(json!({ class: obj })),
        )
        .await
    }

    /// Top-level filestore names with their trailing `:` stripped
    /// (`local:` → `local`).
    pub async fn list_stores(&self, domain: &str) -> Result<Vec<String>> {
        let body = self
            .request(Method::GET, &format!("/mgmt/filestore/{domain}"), None)
            .await?;
        let locations = as_list(value_at(&body, &["filestore".into(), "location".into()]));

        let mut stores = Vec::with_capacity(locations.len());
        for location in locations {
            let name = string_at(location, &["name".into()])
                .context("missing 'name' in filestore location")?;
            stores.push(name.trim_end_matches(':').to_string());
        }
        Ok(stores)
    }

    /// Subdirectories and files at a filestore path, each normalized to a
    /// list of entry mappings.
    pub async fn ls(&self, domain: &str, path: &str) -> Result<(Vec<Value>, Vec<Value>)> {
        let body = self
            .request(Method::GET, &format!("/mgmt/filestore/{domain}/{path}"), None)
            .await?;
        let dirs = as_list(value_at(
            &body,
            &["filestore".into(), "location".into(), "directory".into()],
        ))
        .into_iter()
        .cloned()
        .collect();
        let files = as_list(value_at(
            &body,
            &["filestore".into(), "location".into(), "file".into()],
        ))
        .into_iter()
        .cloned()
        .collect();
        Ok((dirs, files))
    }

    /// Raw content of a filestore file.
    pub async fn get_file(&self, domain: &str, path: &str) -> Result<Vec<u8>> {
        let body = self
            .request(Method::GET, &format!("/mgmt/filestore/{domain}/{path}"), None)
            .await?;
        let encoded = string_at(&body, &["file".into()])
            .with_context(|| format!("missing 'file' content for {path}"))?;
        BASE64_STANDARD
            .decode(encoded)
            .with_context(|| format!("invalid base64 content for {path}"))
    }

    /// Creates or updates a filestore file, ensuring its parent directories
    /// exist first.
    pub async fn put_file(&self, domain: &str, path: &str, data: &[u8]) -> Result<Value> {
        if let Some(parent) = parent_path(path) {
            self.create_directories(domain, parent).await?;
        }
        self.request(
            Method::PUT,
            &format!("/mgmt/filestore/{domain}/{path}"),
            Some(json!({
                "file": {
                    "name": base_name(path),
                    "content": BASE64_STANDARD.encode(data),
                }
            })),
        )
        .await
    }

    /// Whether a filestore path is an existing directory; 404 means no.
    pub async fn is_directory(&self, domain: &str, path: &str) -> Result<bool> {
        match self
            .request(Method::GET, &format!("/mgmt/filestore/{domain}/{path}"), None)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if HttpResponseError::status_of(&err) == Some(StatusCode::NOT_FOUND) => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Creates a filestore directory and any missing parents. A 409 from the
    /// appliance means the directory already exists and is not an error.
    pub async fn create_directories(&self, domain: &str, path: &str) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = path;
        loop {
            if self.is_directory(domain, current).await? {
                break;
            }
            missing.push(current);
            match parent_path(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }

        for dir in missing.into_iter().rev() {
            let outcome = self
                .request(
                    Method::PUT,
                    &format!("/mgmt/filestore/{domain}/{dir}"),
                    Some(json!({"directory": {"name": base_name(dir)}})),
                )
                .await;
            match outcome {
                Ok(_) => {}
                Err(err)
                    if HttpResponseError::status_of(&err) == Some(StatusCode::CONFLICT) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Raw payload of a status provider.
    pub async fn status(&self, domain: &str, provider: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/mgmt/status/{domain}/{provider}"), None)
            .await
    }

    /// Depth-first traversal of the filestore under `root`.
    ///
    /// `on_dir` is consulted for the root and every subdirectory before it is
    /// entered; [`WalkDecision::Skip`] prunes that subtree (for the root, the
    /// whole walk) without error. `on_file` sees the full store-prefixed
    /// path, the modification stamp, and the size, which arrives as a JSON
    /// number and is truncated to an unsigned integer. Either callback may
    /// abort the walk by returning an error.
    pub async fn walk_filestore(
        &self,
        domain: &str,
        root: &str,
        on_dir: &mut (dyn FnMut(&str) -> Result<WalkDecision> + Send),
        on_file: &mut (dyn FnMut(&str, &str, u64) -> Result<()> + Send),
    ) -> Result<()> {
        if on_dir(root)? == WalkDecision::Skip {
            return Ok(());
        }

        let mut stack = vec![root.to_string()];
        while let Some(dir) = stack.pop() {
            let (dirs, files) = self.ls(domain, &dir).await?;

            for file in &files {
                let name = string_at(file, &["name".into()])
                    .with_context(|| format!("missing 'name' in filestore file under {dir}"))?;
                let modified = string_at(file, &["modified".into()]).unwrap_or_default();
                let size = value_at(file, &["size".into()])
                    .and_then(Value::as_f64)
                    .unwrap_or_default() as u64;
                on_file(&format!("{dir}/{name}"), modified, size)?;
            }

            let mut descend = Vec::new();
            for entry in &dirs {
                let name = string_at(entry, &["name".into()]).with_context(|| {
                    format!("missing 'name' in filestore directory under {dir}")
                })?;
                // directory names can come back absolute-looking
                let name = name.rsplit('/').next().unwrap_or(name);
                let sub = format!("{dir}/{name}");
                if on_dir(&sub)? == WalkDecision::Descend {
                    descend.push(sub);
                }
            }
            // LIFO stack: reverse to keep listing order
            for sub in descend.into_iter().rev() {
                stack.push(sub);
            }
        }
        Ok(())
    }
}

fn unwrap_class(body: &Value, class: &str) -> Result<Value> {
    value_at(body, &[class.into()])
        .cloned()
        .with_context(|| format!("missing '{class}' in response"))
}

fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
