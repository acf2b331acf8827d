// Shared HTTP client utilities
//
// Network failures here are transient by definition: every helper logs
// and returns an empty result instead of propagating, so a flaky remote
// never takes a listing or an install down with an error it cannot act on.

use log::warn;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// User-Agent string for all HTTP requests
const USER_AGENT: &str = concat!("cadpm/", env!("CARGO_PKG_VERSION"));

/// Fixed per-request timeout. Network calls report failure instead of
/// hanging indefinitely.
const TIMEOUT: Duration = Duration::from_secs(30);

static PROXY: OnceLock<Option<String>> = OnceLock::new();
static CLIENT: OnceLock<Client> = OnceLock::new();

/// Install the proxy configuration before the first request. Later calls
/// are ignored; the client is built once.
pub fn configure_proxy(proxy: Option<String>) {
    let _ = PROXY.set(proxy);
}

/// Shared HTTP client with User-Agent, timeout and optional proxy.
pub fn client() -> &'static Client {
    CLIENT.get_or_init(|| {
        let mut builder = Client::builder().user_agent(USER_AGENT).timeout(TIMEOUT);
        if let Some(Some(proxy_url)) = PROXY.get() {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(err) => warn!("Ignoring invalid proxy '{}': {}", proxy_url, err),
            }
        }
        builder.build().expect("Failed to create HTTP client")
    })
}

async fn get_checked(url: &str) -> Option<Response> {
    match client().get(url).send().await {
        Ok(response) if response.status().is_success() => Some(response),
        Ok(response) => {
            warn!("GET {} failed: HTTP {}", url, response.status());
            None
        }
        Err(err) => {
            warn!("GET {} failed: {}", url, err);
            None
        }
    }
}

/// Fetch a text resource. None on any network or HTTP failure.
pub async fn get_text(url: &str) -> Option<String> {
    let response = get_checked(url).await?;
    match response.text().await {
        Ok(text) => Some(text),
        Err(err) => {
            warn!("GET {} body read failed: {}", url, err);
            None
        }
    }
}

/// Fetch and deserialize a JSON resource. None on failure, including
/// malformed bodies.
pub async fn fetch_json<T: DeserializeOwned>(url: &str) -> Option<T> {
    let response = get_checked(url).await?;
    match response.json().await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("GET {} JSON decode failed: {}", url, err);
            None
        }
    }
}

/// Download a resource to a local file. Returns whether the download
/// completed; a partial file is removed.
pub async fn download(url: &str, path: &Path) -> bool {
    let Some(response) = get_checked(url).await else {
        return false;
    };
    match response.bytes().await {
        Ok(bytes) => {
            if let Some(parent) = path.parent() {
                if std::fs::create_dir_all(parent).is_err() {
                    return false;
                }
            }
            match std::fs::write(path, &bytes) {
                Ok(()) => true,
                Err(err) => {
                    warn!("Writing {} failed: {}", path.display(), err);
                    let _ = std::fs::remove_file(path);
                    false
                }
            }
        }
        Err(err) => {
            warn!("GET {} body read failed: {}", url, err);
            false
        }
    }
}
