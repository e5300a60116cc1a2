//! # Builder for DownloadConfig
//!
//! This module provides a builder pattern implementation for creating and customizing
//! DownloadConfig instances with a fluent API.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use provis_engine::DownloadConfig;
//! use provis_engine::proxy::{ProxyAuth, ProxyConfig, ProxyType};
//!
//! // Create a config with the builder
//! let config = DownloadConfig::builder()
//!     .with_timeout(Duration::from_secs(600))
//!     .with_connect_timeout(Duration::from_secs(15))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .with_follow_redirects(true)
//!     .build();
//!
//! // Or with an explicit proxy configuration
//! let config_with_proxy = DownloadConfig::builder()
//!     .with_proxy(ProxyConfig {
//!         url: "http://proxy.example.com:8080".to_string(),
//!         proxy_type: ProxyType::Http,
//!         auth: Some(ProxyAuth {
//!             username: "user".to_string(),
//!             password: "pass".to_string(),
//!         }),
//!     })
//!     .build();
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::{DownloadConfig, proxy::ProxyConfig};

/// Builder for creating DownloadConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct DownloadConfigBuilder {
    /// Internal config being built
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: DownloadConfig::default(),
        }
    }

    /// Set the overall timeout for the entire HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read timeout (maximum time between receiving data chunks)
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Set all HTTP headers, replacing any existing headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Set the proxy configuration
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self.config.use_system_proxy = false; // Explicit proxy overrides system proxy
        self
    }

    /// Set whether to use system proxy settings if available
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        // Only set system proxy if no explicit proxy is configured
        if self.config.proxy.is_none() {
            self.config.use_system_proxy = use_system_proxy;
        }
        self
    }

    /// Build the DownloadConfig instance
    pub fn build(self) -> DownloadConfig {
        self.config
    }
}

impl Default for DownloadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
