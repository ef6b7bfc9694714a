//! CLI for the traceroute substrate.

mod runner;

use clap::{Parser, Subcommand};
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use traceroute_core::types::DEFAULT_MAX_HOPS;
use traceroute_core::ListenerConfig;
use traceroute_plugins::{PluginRegistry, PluginSet};

/// Traceroute - hop table reduction and reply listening.
#[derive(Parser, Debug)]
#[command(name = "traceroute")]
#[command(version)]
#[command(about = "Traceroute - hop table reduction and reply listening")]
pub struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reduce a preliminary hop table to the route actually walked.
    Reduce {
        /// JSON hop table to read, or `-` for stdin.
        #[arg(short, long)]
        input: PathBuf,

        /// Destination address of the trace.
        #[arg(short, long)]
        destination: IpAddr,

        /// Highest hop index to keep.
        #[arg(short = 'm', long = "max-hops", default_value_t = DEFAULT_MAX_HOPS)]
        max_hops: u16,

        /// Comma-separated list of plugins to run over the table.
        #[arg(long, default_value = "")]
        plugins: String,

        /// JSON parameters handed to every plugin constructor.
        #[arg(long = "plugin-params", default_value = "null")]
        plugin_params: String,
    },

    /// Listen for datagrams on a UDP socket and log them.
    Listen {
        /// Local address to bind.
        #[arg(short, long)]
        bind: SocketAddr,

        /// Stop after this many datagrams.
        #[arg(short, long)]
        count: Option<usize>,

        /// Read deadline in milliseconds.
        #[arg(long = "read-timeout", default_value = "2000")]
        read_timeout: u64,
    },
}

fn read_input(path: &Path) -> Result<String, String> {
    if path.as_os_str() == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        return Ok(input);
    }
    std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

fn load_plugins(enabled: &str, params: &str) -> Result<PluginSet, String> {
    let params: serde_json::Value =
        serde_json::from_str(params).map_err(|e| format!("Invalid plugin parameters: {}", e))?;
    let registry = PluginRegistry::builtin();
    Ok(PluginSet::new(registry.create_plugins(enabled, &params)))
}

async fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Reduce {
            input,
            destination,
            max_hops,
            plugins,
            plugin_params,
        } => {
            let input = read_input(&input)?;
            let plugins = load_plugins(&plugins, &plugin_params)?;
            tracing::debug!(plugins = ?plugins, "Loaded plugins");

            let route = runner::run_reduce(&input, destination, max_hops, &plugins)
                .map_err(|e| format!("Reduction failed: {}", e))?;
            let json = serde_json::to_string_pretty(&route)
                .map_err(|e| format!("Failed to serialize results: {}", e))?;
            println!("{}", json);
            Ok(())
        }
        Command::Listen {
            bind,
            count,
            read_timeout,
        } => {
            let config = ListenerConfig {
                read_timeout: Duration::from_millis(read_timeout),
                ..Default::default()
            };
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            let received = runner::run_listen(bind, count, config, shutdown)
                .await
                .map_err(|e| format!("Listener failed: {}", e))?;
            tracing::info!(received = received, "Listener finished");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if args.verbose { "debug" } else { "info" })
        .with_writer(std::io::stderr)
        .init();

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
