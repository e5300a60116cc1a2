use std::{sync::Arc, time::Duration};

use clap::Parser;
use error::AppError;
use indicatif::MultiProgress;
use mimalloc::MiMalloc;
use provis_engine::{
    CacheStatus, DownloadConfig, ItemCache, ItemSource, PortalClient, PortalConfig, Provisioner,
    ProxyAuth, ProxyConfig, ProxyType, StaticCredential,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod error;
mod utils;

use cli::{CliArgs, Command};
use utils::parse_headers;
use utils::progress::ProgressManager;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(if e.is_cancelled() { 130 } else { 1 });
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging; RUST_LOG overrides the verbosity flag
    let default_directives = if args.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    // Keep the appender guard alive for the lifetime of the program
    let _log_guard = match &args.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| AppError::InvalidInput(format!("Invalid log file: {path:?}")))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(MakeWriterExt::and(std::io::stderr, writer))
                .with_ansi(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| AppError::Initialization(e.to_string()))?;
            Some(guard)
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| AppError::Initialization(e.to_string()))?;
            None
        }
    };

    // Handle proxy configuration
    let (proxy_config, use_system_proxy) = if args.no_proxy {
        // No proxy flag overrides everything else
        info!("All proxy settings disabled (--no-proxy flag)");
        (None, false)
    } else if let Some(proxy_url) = args.proxy.as_ref() {
        let proxy_type = match args.proxy_type.as_str() {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks5" => ProxyType::Socks5,
            _ => {
                return Err(AppError::InvalidInput(format!(
                    "Invalid proxy type: '{}'",
                    args.proxy_type
                )));
            }
        };

        let auth = if let (Some(username), Some(password)) = (&args.proxy_user, &args.proxy_pass) {
            Some(ProxyAuth {
                username: username.clone(),
                password: password.clone(),
            })
        } else {
            None
        };

        info!(
            proxy_url = %proxy_url,
            proxy_type = ?proxy_type,
            has_auth = auth.is_some(),
            "Using explicit proxy configuration for downloads"
        );

        (
            Some(ProxyConfig {
                url: proxy_url.clone(),
                proxy_type,
                auth,
            }),
            false,
        )
    } else {
        (None, args.use_system_proxy)
    };

    // Create the transport configuration
    let download_config = {
        let mut builder = DownloadConfig::builder()
            .with_timeout(Duration::from_secs(args.timeout))
            .with_connect_timeout(Duration::from_secs(args.connect_timeout))
            .with_read_timeout(Duration::from_secs(args.read_timeout));

        for (name, value) in parse_headers(&args.headers).iter() {
            if let Ok(value) = value.to_str() {
                builder = builder.with_header(name.as_str(), value);
            }
        }

        if let Some(proxy) = proxy_config {
            builder = builder.with_proxy(proxy);
        } else {
            builder = builder.with_system_proxy(use_system_proxy);
        }
        builder.build()
    };

    // Create the portal client
    let portal_config = PortalConfig {
        base: download_config,
        url: args.portal.clone(),
    };
    let mut portal = PortalClient::with_config(portal_config)?;
    if let Some(token) = &args.token {
        portal = portal.with_credentials(Arc::new(StaticCredential::new(token.clone())));
    }

    // Create the provisioner over the cache root
    let cache = match &args.cache_dir {
        Some(dir) => ItemCache::new(dir.clone()),
        None => ItemCache::at_default_root(),
    };
    info!(cache_root = ?cache.root(), portal = %args.portal, "Provisioner ready");
    let provisioner = Provisioner::with_cache(portal, cache);

    // Wire Ctrl-C to the shared cancellation token
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, cancelling outstanding downloads");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Command::Fetch { items } => {
            let multi = MultiProgress::new();
            let progress_manager = if args.show_progress {
                ProgressManager::new(multi)
            } else {
                ProgressManager::new_disabled(multi)
            };

            provisioner
                .ensure_present_with_progress(
                    &items,
                    cancel,
                    Some(Arc::new(move |event| {
                        progress_manager.handle_event(event);
                    })),
                )
                .await?;
            info!(count = items.len(), "All requested items are cached");
        }
        Command::Status { items } => {
            for item_id in &items {
                let line = match provisioner.source().resolve(item_id).await {
                    Ok(item) => provisioner
                        .cache()
                        .status(&item.id, item.modified)
                        .await?
                        .to_string(),
                    Err(e) => {
                        // Metadata lookup failed; a cached copy still counts
                        if provisioner.cache().has_marker(item_id).await? {
                            warn!(item_id = %item_id, error = %e, "Metadata lookup failed");
                            CacheStatus::Fresh.to_string() + " (metadata unavailable)"
                        } else {
                            format!("error ({e})")
                        }
                    }
                };
                println!("{item_id}\t{line}");
            }
        }
        Command::Path { item, parts } => {
            println!("{}", provisioner.local_path(&item, parts).display());
        }
    }

    Ok(())
}
