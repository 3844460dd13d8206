// src/proxy/source.rs

//! Providers of proxy candidates.

use async_trait::async_trait;

use super::ProxyIdentity;
use crate::error::Result;
use crate::models::ProxySourceConfig;

/// Something that can list egress identities: a static list, a provider
/// API, a rotating residential gateway.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Group name the identities are filed under.
    fn name(&self) -> &str;

    /// List candidate identities, optionally restricted to a region.
    async fn list_candidates(&self, region: Option<&str>) -> Result<Vec<ProxyIdentity>>;
}

/// A fixed list of proxies from configuration.
#[derive(Debug, Clone)]
pub struct StaticProxySource {
    name: String,
    proxies: Vec<ProxyIdentity>,
}

impl StaticProxySource {
    pub fn new(name: impl Into<String>, proxies: Vec<ProxyIdentity>) -> Self {
        Self {
            name: name.into(),
            proxies,
        }
    }

    /// Build from a `[[proxy.sources]]` entry. Fails on the first malformed URL.
    pub fn from_config(config: &ProxySourceConfig) -> Result<Self> {
        let proxies = config
            .urls
            .iter()
            .map(|raw| {
                let identity = ProxyIdentity::parse(raw)?;
                Ok(match &config.region {
                    Some(region) => identity.with_region(region),
                    None => identity,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(&config.name, proxies))
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_candidates(&self, region: Option<&str>) -> Result<Vec<ProxyIdentity>> {
        let wanted = region.map(|r| r.trim().to_lowercase());
        Ok(self
            .proxies
            .iter()
            .filter(|p| match &wanted {
                Some(r) => p.region.as_deref() == Some(r.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }
}
