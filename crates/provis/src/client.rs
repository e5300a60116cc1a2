use reqwest::Client;
use tracing::{debug, info};

use crate::{config::DownloadConfig, error::ProvisError};

/// Create a configured HTTP client for portal requests
pub fn create_client(config: &DownloadConfig) -> Result<Client, ProvisError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5) // Allow multiple connections to same host
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    // Set up proxy configuration
    if let Some(proxy_config) = &config.proxy {
        // Explicit proxy configuration takes precedence
        let proxy = proxy_config.to_proxy()?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy for transfers");
    } else if config.use_system_proxy {
        // reqwest applies system proxy settings unless no_proxy() is called
        info!("Using system proxy settings for transfers");
    } else {
        // Explicitly disable proxy
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for transfers");
    }

    client_builder.build().map_err(ProvisError::from)
}
