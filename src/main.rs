//! # host-remap
//!
//! Command-line front end for the remapping connector.
//!
//! ```bash
//! # Show where hostnames would be sent
//! host-remap -m api.example.com=staging.example.com resolve api.example.com
//!
//! # Fetch through the remapping connector
//! host-remap -c remap.yaml fetch https://api.example.com/health
//!
//! # Same request, bypassing the connector
//! host-remap -c remap.yaml fetch --bypass https://api.example.com/health
//!
//! # Poll every 5s; edits to remap.yaml apply to the next request
//! host-remap -c remap.yaml fetch --every 5 https://api.example.com/health
//! ```

use bytes::Bytes;
use clap::{Parser, Subcommand};
use host_remap::config::{AppConfig, ConfigManager};
use host_remap::{
    hijack_global_agent, install_global_remapping, logging, opt_out, Client, DefaultTransport,
    HostHeaderPolicy, RemapError, RemappingConnector, StaticTable,
};
use http::Request;
use http_body_util::{BodyExt, Full};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Send outbound HTTP(S) connections for one hostname to another.
#[derive(Parser, Debug)]
#[command(name = "host-remap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "HOST_REMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Extra mapping FROM=TO, applied over the config file (repeatable)
    #[arg(short = 'm', long = "map", value_name = "FROM=TO", value_parser = parse_mapping)]
    maps: Vec<(String, String)>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace, -vvvv trace+deps)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective hostname for each HOST
    Resolve {
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// GET a URL through the remapping connector
    Fetch {
        url: String,

        /// Skip the connector for this request
        #[arg(long)]
        bypass: bool,

        /// Keep the original Host header and SNI
        #[arg(long)]
        preserve_host: bool,

        /// Repeat every N seconds, reloading the config on change
        #[arg(long, value_name = "SECONDS")]
        every: Option<u64>,
    },
}

impl Args {
    fn log_level(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }
        match self.verbose {
            0 => None,
            1 => Some("info"),
            2 => Some("debug"),
            _ => Some("trace"),
        }
    }

    fn trace_deps(&self) -> bool {
        self.verbose >= 4
    }
}

fn parse_mapping(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((from, to)) if !from.is_empty() => Ok((from.to_string(), to.to_string())),
        _ => Err(format!("expected FROM=TO, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, manager) = load_config(&args);

    let _log_guard = match logging::init_logging(&config.logging, args.log_level(), args.trace_deps())
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mappings = config.domain_mappings.len() + args.maps.len(),
        "Starting host-remap"
    );

    if let Err(e) = run(&args, config, manager).await {
        error!(error = %e, "host-remap failed");
        std::process::exit(1);
    }
}

async fn run(args: &Args, config: AppConfig, manager: Option<ConfigManager>) -> host_remap::Result<()> {
    let table = domain_table(&config, &args.maps);

    match &args.command {
        Command::Resolve { hosts } => {
            let connector = RemappingConnector::with_mapping(table);
            for host in hosts {
                println!("{} -> {}", host, connector.resolve(host));
            }
            Ok(())
        }
        Command::Fetch {
            url,
            bypass,
            preserve_host,
            every,
        } => {
            let policy = if *preserve_host {
                HostHeaderPolicy::Preserve
            } else {
                config.connector.host_header
            };
            let timeout = config.connector.connect_timeout();
            let transport = Arc::new(DefaultTransport::new().with_connect_timeout(timeout));

            install_global_remapping(
                RemappingConnector::new()
                    .with_policy(policy)
                    .with_transport(transport.clone()),
            );
            hijack_global_agent(table);

            let client = Client::builder().transport(transport).build();

            let Some(secs) = every else {
                return fetch(&client, url, *bypass).await;
            };

            if let Some(manager) = manager {
                spawn_reloader(manager, args.maps.clone());
            }
            let mut interval = tokio::time::interval(Duration::from_secs((*secs).max(1)));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = fetch(&client, url, *bypass).await {
                            warn!(error = %e, "Request failed");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn fetch(client: &Client, url: &str, bypass: bool) -> host_remap::Result<()> {
    let mut req = Request::get(url)
        .body(Full::new(Bytes::new()))
        .map_err(|e| RemapError::invalid_request(e.to_string()))?;
    if bypass {
        opt_out(&mut req);
    }

    let response = client.request(req).await?;
    println!("{:?} {}", response.version(), response.status());
    for (name, value) in response.headers() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();

    let body = response.into_body().collect().await?.to_bytes();
    println!("{}", String::from_utf8_lossy(&body));
    Ok(())
}

/// Config mappings with command-line overrides on top.
fn domain_table(config: &AppConfig, overrides: &[(String, String)]) -> StaticTable {
    let mut table = config.build_domain_table();
    for (from, to) in overrides {
        table.insert(from.clone(), to.clone());
    }
    table
}

/// Re-applies the mapping to the global connector whenever the config file
/// changes. Last write wins.
fn spawn_reloader(manager: ConfigManager, overrides: Vec<(String, String)>) {
    match manager.start_watcher() {
        Ok(mut rx) => {
            tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    let table = domain_table(&manager.get(), &overrides);
                    info!(entries = table.len(), "Applying reloaded domain mappings");
                    hijack_global_agent(table);
                }
            });
        }
        Err(e) => error!(error = %e, "Failed to start config watcher"),
    }
}

/// Loads the configuration file, falling back to defaults.
fn load_config(args: &Args) -> (AppConfig, Option<ConfigManager>) {
    let config_path = args.config.clone().or_else(|| {
        ["./host-remap.yaml", "./host-remap.yml", "/etc/host-remap/config.yaml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    });

    let Some(path) = config_path else {
        return (AppConfig::default(), None);
    };

    match ConfigManager::new(&path) {
        Ok(manager) => (manager.get(), Some(manager)),
        Err(e) => {
            eprintln!("Warning: failed to load config from {:?}: {}", path, e);
            eprintln!("Using default configuration");
            (AppConfig::default(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use host_remap::MappingSource;

    #[test]
    fn test_parse_mapping() {
        assert_eq!(
            parse_mapping("a.example=b.example").unwrap(),
            ("a.example".to_string(), "b.example".to_string())
        );
        assert!(parse_mapping("a.example").is_err());
        assert!(parse_mapping("=b.example").is_err());
    }

    #[test]
    fn test_overrides_win_over_config() {
        let config = AppConfig {
            domain_mappings: vec![host_remap::DomainMapping::new("a.example", "b.example")],
            ..Default::default()
        };
        let table = domain_table(&config, &[("a.example".into(), "c.example".into())]);
        assert_eq!(table.lookup("a.example").as_deref(), Some("c.example"));
    }

    #[test]
    fn test_verbosity_levels() {
        let args = Args::parse_from(["host-remap", "-vv", "resolve", "a.example"]);
        assert_eq!(args.log_level(), Some("debug"));
        assert!(!args.trace_deps());

        let args = Args::parse_from(["host-remap", "resolve", "-q", "a.example"]);
        assert_eq!(args.log_level(), Some("error"));
    }
}
