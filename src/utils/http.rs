// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, FetchError, Result};
use crate::models::CrawlerConfig;
use crate::proxy::ProxyIdentity;

/// Create a configured asynchronous HTTP client, optionally egressing
/// through `proxy`.
pub fn create_async_client(
    config: &CrawlerConfig,
    proxy: Option<&ProxyIdentity>,
) -> Result<reqwest::Client> {
    create_client_with_timeout(
        config,
        proxy,
        Duration::from_secs(config.request_timeout_secs),
    )
}

/// Like [`create_async_client`] with an explicit request timeout.
pub fn create_client_with_timeout(
    config: &CrawlerConfig,
    proxy: Option<&ProxyIdentity>,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(timeout);

    if let Some(identity) = proxy {
        let mut reqwest_proxy = reqwest::Proxy::all(identity.url())
            .map_err(|e| AppError::proxy(format!("{}: {e}", identity.id())))?;
        if let Some(creds) = &identity.credentials {
            reqwest_proxy = reqwest_proxy.basic_auth(&creds.username, &creds.password);
        }
        builder = builder.proxy(reqwest_proxy);
    }

    Ok(builder.build()?)
}

/// Clients for one fetcher. The direct client is built once and shared by
/// every attempt; a proxied client is built per identity in use.
#[derive(Debug, Clone)]
pub struct HttpClients {
    config: CrawlerConfig,
    direct: reqwest::Client,
}

impl HttpClients {
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let direct = create_async_client(&config, None)?;
        Ok(Self { config, direct })
    }

    /// Client for one attempt. The direct client is a cheap handle clone.
    pub fn client_for(&self, proxy: Option<&ProxyIdentity>) -> Result<reqwest::Client> {
        match proxy {
            None => Ok(self.direct.clone()),
            Some(_) => create_async_client(&self.config, proxy),
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.config.max_body_bytes
    }
}

/// GET a URL and return status code and body. Bodies larger than
/// `max_bytes` are rejected without being buffered in full.
pub async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    via_proxy: bool,
    max_bytes: usize,
) -> std::result::Result<(u16, String), FetchError> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_transport_error(&e, via_proxy))?;
    let status = response.status().as_u16();

    if response
        .content_length()
        .is_some_and(|len| len > max_bytes as u64)
    {
        return Err(body_too_large(max_bytes));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_transport_error(&e, via_proxy))?
    {
        append_capped(&mut body, &chunk, max_bytes)?;
    }
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}

fn append_capped(
    body: &mut Vec<u8>,
    chunk: &[u8],
    max_bytes: usize,
) -> std::result::Result<(), FetchError> {
    if body.len() + chunk.len() > max_bytes {
        return Err(body_too_large(max_bytes));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

fn body_too_large(max_bytes: usize) -> FetchError {
    FetchError::unavailable(format!("response body exceeds {max_bytes} bytes"))
}

/// Map a reqwest transport failure onto the fetch error taxonomy.
///
/// Connection failures through a proxy count as blocks so the identity gets
/// rotated; without a proxy there is nothing to rotate.
pub fn classify_transport_error(err: &reqwest::Error, via_proxy: bool) -> FetchError {
    if err.is_timeout() {
        FetchError::timeout(err.to_string())
    } else if err.is_connect() && via_proxy {
        FetchError::blocked(format!("proxy connection failed: {err}"))
    } else if err.is_decode() || err.is_body() {
        FetchError::parse(err.to_string())
    } else {
        FetchError::unavailable(err.to_string())
    }
}
