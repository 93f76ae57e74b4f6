//! nuggan - an on-the-fly image proxy.
//!
//! This binary wires the configuration, the image library and one of the
//! transports together.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nuggan::{
    config::{
        Cli, Command, DecodeConfig, EncodeConfig, LambdaConfig, ScaleDownConfig, ServeConfig,
    },
    create_router, run_transform, FetchedMedia, FileFetcher, HttpFetcher, ImageLibrary,
    ImageService, LambdaAdapter, MediaFetcher, ProxyConfig, RouterConfig, TransformParams,
    UrlCodec,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Encode(config) => run_encode(config),
        Command::Decode(config) => run_decode(config),
        Command::ScaleDown(config) => run_scale_down(config).await,
        Command::Lambda(config) => run_lambda(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let proxy = match ProxyConfig::load(&config.config) {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_banner();

    info!("Configuration:");
    info!("  Config file: {}", config.config.display());
    info!("  Route prefix: {}", proxy.route_path());
    info!("  URL groups: {}", proxy.grouped_base_urls.len());
    info!("  Strict mode: {}", proxy.strict);
    if let Some(ref cache_control) = proxy.cache_control {
        info!("  Cache-Control: {}", cache_control);
    }
    info!(
        "  Fetch: {}s timeout, {}MB max",
        config.fetch_timeout,
        config.max_source_bytes / (1024 * 1024)
    );

    let library = match ImageLibrary::startup() {
        Ok(library) => Arc::new(library),
        Err(e) => {
            error!("Image library error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let fetcher = match HttpFetcher::new(config.fetch_timeout(), config.max_source_bytes) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("HTTP client error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let route_path = proxy.route_path();
    let service = ImageService::new(proxy, fetcher, Arc::clone(&library));
    let router = create_router(service, RouterConfig::new().with_tracing(!config.no_tracing));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl -I http://{}{}/0/0/-/-/320/-/-/<token>", addr, route_path);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // The router (and every service clone) is gone once serve returns
    drop(library);

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("███╗   ██╗██╗   ██╗ ██████╗  ██████╗  █████╗ ███╗   ██╗");
    info!("████╗  ██║██║   ██║██╔════╝ ██╔════╝ ██╔══██╗████╗  ██║");
    info!("██╔██╗ ██║██║   ██║██║  ███╗██║  ███╗███████║██╔██╗ ██║");
    info!("██║╚██╗██║██║   ██║██║   ██║██║   ██║██╔══██║██║╚██╗██║");
    info!("██║ ╚████║╚██████╔╝╚██████╔╝╚██████╔╝██║  ██║██║ ╚████║");
    info!("╚═╝  ╚═══╝ ╚═════╝  ╚═════╝  ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═══╝");
    info!("");
    info!("                        v{}", version);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "nuggan=debug,tower_http=debug"
    } else {
        "nuggan=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Encode / Decode Commands
// =============================================================================

fn load_codec(path: &std::path::Path) -> Result<UrlCodec, ExitCode> {
    ProxyConfig::load(path)
        .map(|config| UrlCodec::from_config(&config))
        .map_err(|e| {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        })
}

fn run_encode(config: EncodeConfig) -> ExitCode {
    let codec = match load_codec(&config.config) {
        Ok(codec) => codec,
        Err(code) => return code,
    };

    println!("{}", codec.encode(&config.url));
    ExitCode::SUCCESS
}

fn run_decode(config: DecodeConfig) -> ExitCode {
    let codec = match load_codec(&config.config) {
        Ok(codec) => codec,
        Err(code) => return code,
    };

    match codec.decode(&config.token) {
        Ok(url) => {
            println!("{}", url);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Scale-Down Command
// =============================================================================

async fn run_scale_down(config: ScaleDownConfig) -> ExitCode {
    init_logging(false);

    let library = match ImageLibrary::startup() {
        Ok(library) => library,
        Err(e) => {
            error!("Image library error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let media = match fetch_input(&config.input).await {
        Ok(media) => media,
        Err(message) => {
            error!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    if !media.status.is_success() {
        error!(
            "Fails to fetch image from {}: {}",
            config.input, media.status
        );
        return ExitCode::FAILURE;
    }

    let source = match media.into_bytes().await {
        Ok(source) => source,
        Err(e) => {
            error!("Fails to read image from {}: {}", config.input, e);
            return ExitCode::FAILURE;
        }
    };

    let params = TransformParams::resize(config.width, Some(config.height));
    let output = match run_transform(&library, &source, &params) {
        Ok(output) => output,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &output.data).await {
        error!("Fails to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "{} scaled down at {} x {} to {}",
        config.input,
        config.width,
        config.height,
        config.output.display()
    );
    ExitCode::SUCCESS
}

async fn fetch_input(url: &str) -> Result<FetchedMedia, String> {
    let fetched = if FileFetcher::handles(url) {
        FileFetcher::new().fetch(url).await
    } else {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(nuggan::config::DEFAULT_FETCH_TIMEOUT_SECS),
            nuggan::config::DEFAULT_MAX_SOURCE_BYTES,
        )
        .map_err(|e| e.to_string())?;
        fetcher.fetch(url).await
    };

    fetched.map_err(|e| format!("Fails to fetch image from {}: {}", url, e))
}

// =============================================================================
// Lambda Command
// =============================================================================

async fn run_lambda(config: LambdaConfig) -> ExitCode {
    init_logging(false);

    let proxy = match ProxyConfig::load(&config.config) {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let library = match ImageLibrary::startup() {
        Ok(library) => Arc::new(library),
        Err(e) => {
            error!("Image library error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let fetcher = match HttpFetcher::new(
        Duration::from_secs(config.fetch_timeout),
        config.max_source_bytes,
    ) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("HTTP client error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let route_prefix = proxy.route_prefix.clone();
    let adapter = LambdaAdapter::new(ImageService::new(proxy, fetcher, library), &route_prefix);

    info!("Waiting for Lambda events under /{}/", route_prefix);
    if let Err(e) = adapter.run().await {
        error!("Lambda runtime error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
