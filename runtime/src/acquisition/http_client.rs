// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Async HTTP client wrapping reqwest.
//!
//! Not a browser, just HTTP requests with a browser-like identity and
//! relaxed TLS verification. `Content-Encoding: gzip` replies are decoded
//! by reqwest; bodies that are themselves gzip files are left for callers
//! to sniff. No automatic retry.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL};
use std::time::Duration;

/// User agent presented on every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/121.0.0.0 Safari/537.36";

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header, if any.
    pub content_type: Option<String>,
    /// Response body after transfer decoding.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client shared by the retrieval cache and the snapshot renderer.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new HTTP client with the standard browser identity.
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .gzip(true)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Perform a single GET request, whatever the status code.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let r = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let content_type = r
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = r
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?
            .to_vec();

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            content_type,
            body,
        })
    }

    /// GET that treats any non-2xx status as an error.
    pub async fn get_ok(&self, url: &str) -> Result<HttpResponse> {
        let resp = self.get(url).await?;
        if !resp.is_success() {
            anyhow::bail!("GET {url} returned HTTP {}", resp.status);
        }
        Ok(resp)
    }
}
