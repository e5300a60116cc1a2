use reqwest::Proxy;

use crate::error::ProvisError;

/// Proxy scheme selector
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    /// HTTP proxy
    Http,
    /// HTTPS proxy
    Https,
    /// SOCKS5 proxy
    Socks5,
    /// All protocols proxy (use this for general-purpose proxies)
    All,
}

/// Proxy authentication credentials
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    /// Username for proxy authentication
    pub username: String,
    /// Password for proxy authentication
    pub password: String,
}

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    /// Type of proxy (HTTP, HTTPS, SOCKS5)
    pub proxy_type: ProxyType,
    /// Authentication for the proxy (optional)
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    /// Convert this configuration into a reqwest proxy
    pub fn to_proxy(&self) -> Result<Proxy, ProvisError> {
        let invalid = |e: reqwest::Error| ProvisError::ProxyError(format!("{}: {e}", self.url));

        let mut proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(&self.url).map_err(invalid)?,
            ProxyType::Https => Proxy::https(&self.url).map_err(invalid)?,
            ProxyType::Socks5 => {
                // SOCKS5 URLs need the scheme spelled out for reqwest
                let url = if self.url.starts_with("socks5://") {
                    self.url.clone()
                } else {
                    format!("socks5://{}", self.url)
                };
                Proxy::all(&url).map_err(invalid)?
            }
            ProxyType::All => Proxy::all(&self.url).map_err(invalid)?,
        };

        if let Some(auth) = &self.auth {
            proxy = proxy.basic_auth(&auth.username, &auth.password);
        }

        Ok(proxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_scheme_is_prefixed() {
        let config = ProxyConfig {
            url: "proxy.example.com:1080".to_string(),
            proxy_type: ProxyType::Socks5,
            auth: None,
        };
        assert!(config.to_proxy().is_ok());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = ProxyConfig {
            url: "http://".to_string(),
            proxy_type: ProxyType::Http,
            auth: None,
        };
        match config.to_proxy() {
            Err(ProvisError::ProxyError(_)) => {}
            other => panic!("expected proxy error, got {other:?}"),
        }
    }
}
