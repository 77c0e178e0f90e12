//! RUDT CLI
//!
//! Inspect, export and apply transport channel configuration.

mod report;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rudt_transport::{
    ChannelKind, ChannelSettings, NativeOption, OptionStore, SocketHandle,
    TransportChannelConfig, UdpSocketHandle, UdtChannel,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// RUDT - reliable UDP transport channel configuration
#[derive(Parser)]
#[command(name = "rudt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Channel settings file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged option map
    Show,

    /// Create a UDP socket and apply the channel config to it
    Apply {
        /// Local address to bind after applying
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print the default settings as TOML
    Defaults,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Show => show(&settings),
        Commands::Apply { bind } => apply(&settings, bind.as_deref()),
        Commands::Defaults => {
            print!("{}", ChannelSettings::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<ChannelSettings> {
    match path {
        Some(path) => {
            debug!("Loading settings from {}", path.display());
            ChannelSettings::load(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))
        }
        None => Ok(ChannelSettings::default()),
    }
}

fn show(settings: &ChannelSettings) -> anyhow::Result<()> {
    let config = TransportChannelConfig::detached();
    settings.apply_to(&config)?;
    print!("{}", report::render_options(&config.options()));
    Ok(())
}

fn apply(settings: &ChannelSettings, bind: Option<&str>) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .unwrap_or("0.0.0.0:0")
        .parse()
        .context("invalid bind address")?;

    let socket = UdpSocketHandle::for_addr(&addr)?;
    let channel = UdtChannel::with_settings(ChannelKind::ByteAcceptor, socket, settings)
        .context("failed to construct channel")?;
    info!("Applied config to {} channel", channel.kind());

    if bind.is_some() {
        channel.socket().bind(addr)?;
        println!("Bound to {}", channel.socket().local_addr()?);
    }

    let socket = channel.socket();
    println!("SO_REUSEADDR: {}", socket.reuse_address()?);
    match socket.so_linger()? {
        Some(linger) => println!("SO_LINGER: {}s", linger.as_secs()),
        None => println!("SO_LINGER: off"),
    }
    let readings: Vec<_> = NativeOption::ALL
        .iter()
        .map(|&option| (option, socket.option(option)))
        .collect();
    print!("{}", report::render_native(&readings));

    Ok(())
}
