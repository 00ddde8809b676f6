//! tunnel-driver-dns - toy servers on top of the DNS tunnel driver
//!
//! Runs an echo, discard or chargen service over DNS. These exist to show the
//! sink contract end to end; anything that asks gets an answer, so don't run
//! them anywhere that matters.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tunnel_driver_dns::name_budget::DEFAULT_MAX_SUBDOMAIN_LENGTH;
use tunnel_driver_dns::sinks::{ChargenSink, DiscardResponse, DiscardSink, EchoOptions, EchoSink};
use tunnel_driver_dns::{Codec, Driver, DriverConfig, RouteConfig, RouteKind, SinkHandle};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("TUNNEL_DNS_BUILD_DATE"),
    ", commit ",
    env!("TUNNEL_DNS_GIT_HASH"),
    ")"
);

#[derive(Parser)]
#[command(name = "tunnel-driver-dns")]
#[command(version = VERSION)]
#[command(about = "Echo, discard and chargen services over DNS", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace); wins over --verbose
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(flatten)]
    listen: ListenArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the configuration file
#[derive(Args, Debug, Default)]
struct ListenArgs {
    /// The ip address to listen on
    #[arg(long, global = true)]
    host: Option<String>,

    /// The port to listen on
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Upstream DNS server for requests that aren't ours (host or host:port)
    #[arg(long, global = true)]
    passthrough: Option<String>,

    /// How long to wait for the passthrough server (e.g. "500ms", "3s")
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    passthrough_timeout: Option<Duration>,

    /// The tags (prefixes) to use, comma-separated
    #[arg(long, value_delimiter = ',', global = true)]
    tags: Vec<String>,

    /// The domains to use, comma-separated
    #[arg(long, value_delimiter = ',', global = true)]
    domains: Vec<String>,

    /// Codec for the tags and domains given here ('hex' or 'base32')
    #[arg(long, global = true)]
    codec: Option<Codec>,

    /// Longest run of encoded characters between dots in replies (1-63)
    #[arg(long, global = true)]
    max_subdomain_length: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send back whatever comes in
    Echo {
        /// Reverse the echoed data
        #[arg(long)]
        reverse: bool,

        /// Upcase the echoed data
        #[arg(long)]
        upcase: bool,

        /// Downcase the echoed data (with --upcase: random case)
        #[arg(long)]
        downcase: bool,

        /// ROT13 the echoed data
        #[arg(long)]
        rot13: bool,
    },

    /// Log whatever comes in and reply with nothing useful
    Discard {
        /// How to respond: blank, nil, error or critical
        #[arg(long, default_value = "blank")]
        response: DiscardResponse,

        /// The text to use for the error or critical error
        #[arg(long, default_value = "Exception!!!")]
        error_text: String,
    },

    /// Reply with as many random characters as fit
    Chargen {
        /// Send back binary data instead of just text
        #[arg(long)]
        binary: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let level = match cli.log_level.as_deref() {
        Some(level) => level
            .parse::<log::LevelFilter>()
            .map_err(|_| anyhow!("Unknown log level: {}", level))?,
        None if cli.verbose => log::LevelFilter::Debug,
        None => log::LevelFilter::Info,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = load_config(cli.config.as_deref(), &cli.listen)?;

    let sink: SinkHandle = match cli.command {
        Commands::Echo {
            reverse,
            upcase,
            downcase,
            rot13,
        } => Arc::new(EchoSink::new(EchoOptions {
            reverse,
            upcase,
            downcase,
            rot13,
        })),
        Commands::Discard {
            response,
            error_text,
        } => Arc::new(DiscardSink::new(response, &error_text)),
        Commands::Chargen { binary } => Arc::new(ChargenSink::new(binary)),
    };

    run(&config, sink).await
}

/// Read the config file (if any) and lay the command line over it
fn load_config(path: Option<&Path>, args: &ListenArgs) -> Result<DriverConfig> {
    let mut config = match path {
        Some(path) => DriverConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DriverConfig::default(),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(passthrough) = &args.passthrough {
        config.passthrough = Some(passthrough.clone());
    }
    if let Some(wait) = args.passthrough_timeout {
        config.passthrough_timeout = wait;
    }

    let codec = args.codec.unwrap_or_default();
    let max_subdomain_length = args
        .max_subdomain_length
        .unwrap_or(DEFAULT_MAX_SUBDOMAIN_LENGTH);

    let cli_routes = args
        .tags
        .iter()
        .map(|tag| (RouteKind::Tag, tag))
        .chain(args.domains.iter().map(|domain| (RouteKind::Domain, domain)))
        .map(|(kind, affix)| (kind, affix.trim()))
        .filter(|(_, affix)| !affix.is_empty())
        .map(|(kind, affix)| RouteConfig {
            kind,
            affix: affix.to_string(),
            codec,
            max_subdomain_length,
        });
    config.routes.extend(cli_routes);

    if config.routes.is_empty() {
        bail!("You need to specify either a tag or a domain!");
    }
    config.validate()?;

    Ok(config)
}

async fn run(config: &DriverConfig, sink: SinkHandle) -> Result<()> {
    let driver = Driver::new(config).context("Invalid driver configuration")?;

    for route in &config.routes {
        driver
            .add_route(route, Arc::clone(&sink))
            .with_context(|| format!("Couldn't listen on {} '{}'", route.kind, route.affix))?;
    }

    driver
        .start()
        .await
        .with_context(|| format!("Couldn't listen on {}:{}", config.host, config.port))?;

    tokio::select! {
        _ = driver.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            driver.stop().await?;
        }
    }

    Ok(())
}
