use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sluice_rest::{RestClient, TunnelRequest, VerboseCodec, DEFAULT_REST_URL};

mod config;
mod metadata;

use config::FileConfig;

/// Sluice - create, query, and supervise remotely provisioned tunnels
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Control-plane client for remote tunnels")]
struct Cli {
    /// Account username (or SAUCE_USERNAME)
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// API key (or SAUCE_ACCESS_KEY)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Connect to the REST API at an alternative URL
    #[arg(short = 'x', long)]
    rest_url: Option<String>,

    /// Log every request and response document
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a tunnel and supervise it until it terminates
    Create(CreateArgs),

    /// Shut down a tunnel by id
    Shutdown {
        /// Tunnel id (not tunnel name)
        id: String,

        /// Let in-flight jobs finish before terminating
        #[arg(long)]
        wait_for_jobs: bool,
    },

    /// Print a tunnel's effective status
    Status {
        /// Tunnel id (not tunnel name)
        id: String,
    },

    /// Print the host serving a running tunnel
    #[command(name = "kgp_host")]
    KgpHost {
        /// Tunnel id (not tunnel name)
        id: String,
    },

    /// Print ids of tunnels matching a name or a set of domains
    Find {
        /// Tunnel name to match; takes precedence over domains
        #[arg(short = 'i', long, default_value = "")]
        tunnel_identifier: String,

        /// Comma-separated domains to match when no name is given
        #[arg(short = 't', long, value_delimiter = ',')]
        tunnel_domains: Vec<String>,
    },

    /// Print all tunnel ids for the account
    List,

    /// Send a single liveness heartbeat
    Ping {
        /// Tunnel id (not tunnel name)
        id: String,

        /// Report the local client as connected
        #[arg(short, long)]
        connected: bool,

        /// Seconds since the connection state last changed
        #[arg(short = 'd', long, default_value_t = 0)]
        seconds: u64,
    },

    /// Send liveness heartbeats on a fixed period
    Keepalive {
        /// Tunnel id (not tunnel name)
        id: String,

        /// Report the local client as connected
        #[arg(short, long)]
        connected: bool,

        /// Seconds since the connection state last changed
        #[arg(short = 'd', long, default_value_t = 0)]
        seconds: u64,

        /// Seconds between heartbeats
        #[arg(short, long, default_value_t = 30)]
        period: u64,
    },

    /// Query the latest released client build
    Checkversion,
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Assign the tunnel a name; jobs use it only by explicit request
    #[arg(short = 'i', long)]
    tunnel_identifier: Option<String>,

    /// Only requests for these comma-separated domains use the tunnel
    #[arg(short = 't', long, value_delimiter = ',')]
    tunnel_domains: Vec<String>,

    /// Requests for these domains are relayed directly, not tunneled
    #[arg(short = 'D', long, value_delimiter = ',')]
    direct_domains: Vec<String>,

    /// Requests matching these regular expressions are dropped instantly
    #[arg(short = 'F', long, value_delimiter = ',')]
    fast_fail_regexps: Vec<String>,

    /// Disable proxy caching; every request goes through the tunnel
    #[arg(short = 'N', long)]
    no_proxy_caching: bool,

    /// Let sub-accounts of the tunnel owner use the tunnel
    #[arg(short = 's', long)]
    shared_tunnel: bool,

    /// Request a specific tunnel VM version
    #[arg(long)]
    vm_version: Option<String>,

    /// Requests for these domains are not SSL re-encrypted
    #[arg(short = 'B', long, value_delimiter = ',')]
    no_ssl_bump_domains: Vec<String>,

    /// Extra feature flags, as a JSON document
    #[arg(long)]
    extra_info: Option<String>,

    #[arg(long, hide = true, default_value_t = 443)]
    kgp_port: u16,

    /// Seconds to wait for the tunnel to come up
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = FileConfig::load_default().unwrap_or_default();

    let username = cli
        .user
        .clone()
        .or_else(|| std::env::var("SAUCE_USERNAME").ok())
        .or_else(|| file.username.clone())
        .context("Username required. Use --user or set SAUCE_USERNAME")?;
    let api_key = cli
        .api_key
        .clone()
        .or_else(|| std::env::var("SAUCE_ACCESS_KEY").ok())
        .or_else(|| file.api_key.clone())
        .context("API key required. Use --api-key or set SAUCE_ACCESS_KEY")?;
    let rest_url = cli
        .rest_url
        .clone()
        .or_else(|| file.rest_url.clone())
        .unwrap_or_else(|| DEFAULT_REST_URL.to_string());

    let mut client = RestClient::new(&rest_url, &username, &api_key);
    if let Some(domain) = &file.default_domain {
        client = client.with_default_domain(domain);
    }
    if cli.verbose {
        client = client.with_codec(Arc::new(VerboseCodec));
    }

    match cli.command {
        Commands::Create(args) => create(&client, args).await,
        Commands::Shutdown { id, wait_for_jobs } => {
            let jobs = client
                .shutdown(&id, wait_for_jobs)
                .await
                .context("Unable to shutdown tunnel")?;
            if jobs > 0 {
                tracing::info!(jobs, "jobs were still running");
            }
            println!("Tunnel {} shutting down", id);
            Ok(())
        }
        Commands::Status { id } => {
            let status = client.status(&id).await?;
            println!("{}", status.status);
            if let Some(host) = status.host {
                println!("{}", host);
            }
            Ok(())
        }
        Commands::KgpHost { id } => {
            let status = client.status(&id).await?;
            match status.host {
                Some(host) => println!("{}", host),
                None => anyhow::bail!("tunnel {} has no host assigned yet", id),
            }
            Ok(())
        }
        Commands::Find {
            tunnel_identifier,
            tunnel_domains,
        } => {
            for id in client.find(&tunnel_identifier, &tunnel_domains).await? {
                println!("{}", id);
            }
            Ok(())
        }
        Commands::List => {
            for entry in client.list().await? {
                println!("{}", entry.id);
            }
            Ok(())
        }
        Commands::Ping {
            id,
            connected,
            seconds,
        } => {
            client
                .ping(&id, connected, Duration::from_secs(seconds))
                .await?;
            Ok(())
        }
        Commands::Keepalive {
            id,
            connected,
            seconds,
            period,
        } => {
            let mut ticker = tokio::time::interval(Duration::from_secs(period));
            loop {
                ticker.tick().await;
                client
                    .ping(&id, connected, Duration::from_secs(seconds))
                    .await?;
            }
        }
        Commands::Checkversion => {
            match client.latest_version().await? {
                Some(version) => println!("{} {}", version.build, version.download_url),
                None => anyhow::bail!("no build published for this platform"),
            }
            Ok(())
        }
    }
}

async fn create(client: &RestClient, args: CreateArgs) -> Result<()> {
    let command = std::env::args().collect::<Vec<_>>().join(" ");
    let request = TunnelRequest {
        tunnel_identifier: args.tunnel_identifier,
        domain_names: args.tunnel_domains,
        direct_domains: args.direct_domains,
        fast_fail_regexps: args.fast_fail_regexps,
        no_proxy_caching: args.no_proxy_caching,
        shared_tunnel: args.shared_tunnel,
        vm_version: args.vm_version,
        no_ssl_bump_domains: args.no_ssl_bump_domains,
        extra_info: args.extra_info,
        kgp_port: args.kgp_port,
        metadata: metadata::collect(&command),
    };

    let mut tunnel = client
        .create(&request, Duration::from_secs(args.timeout))
        .await
        .context("Unable to create tunnel")?;

    tracing::info!(id = tunnel.id(), "tunnel successfully created");
    println!("{}", tunnel.id());
    if let Some(host) = tunnel.host() {
        tracing::info!(host, "tunnel is running");
    }

    let terminal = tokio::select! {
        status = tunnel.wait_terminated() => Some(status),
        _ = tokio::signal::ctrl_c() => None,
    };

    match terminal {
        Some(Some(status)) => tracing::info!(%status, "tunnel terminated remotely"),
        Some(None) => tracing::warn!("supervision stopped without a terminal status"),
        None => {
            tracing::info!("interrupted, shutting tunnel down");
            let jobs = tunnel.shutdown(false).await?;
            if jobs > 0 {
                tracing::info!(jobs, "jobs were still running");
            }
        }
    }
    Ok(())
}
