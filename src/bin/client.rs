//! Reflex Client Binary
//!
//! Forwards a local TCP port to a fixed destination through a Reflex server.
//!
//! Usage: reflex-client [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   -g, --generate       Print a configuration template
//!   -h, --help           Print help information

use std::env;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use reflex::config::OutboundConfig;
use reflex::protocol::Destination;
use reflex::proxy::OutboundHandler;

/// On-disk client configuration.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfigFile {
    /// Local listen address for the forwarder
    listen_addr: String,
    /// Local listen port
    listen_port: u16,
    /// Destination host reached through the tunnel
    target_host: String,
    /// Destination port
    target_port: u16,
    #[serde(flatten)]
    outbound: OutboundConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "-h" | "--help" => {
            print_usage();
        }
        "-g" | "--generate" => {
            generate_config()?;
        }
        "-c" | "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a file path");
                return Ok(());
            }
            run_client(&args[2]).await?;
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"Reflex Client - probe-resistant proxy tunnel

USAGE:
    reflex-client [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to configuration file (JSON)
    -g, --generate       Print a configuration template
    -h, --help           Print help information

EXAMPLES:
    Forward localhost:1080 to example.com:443 via the tunnel:
        reflex-client --config client.json
"#
    );
}

fn generate_config() -> anyhow::Result<()> {
    let config = ClientConfigFile {
        listen_addr: "127.0.0.1".into(),
        listen_port: 1080,
        target_host: "example.com".into(),
        target_port: 443,
        outbound: OutboundConfig {
            address: "YOUR_SERVER_IP".into(),
            port: 8443,
            id: uuid::Uuid::new_v4().to_string(),
            policy: "youtube".into(),
            ech: None,
        },
    };

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn run_client(config_path: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_path)?;
    let config: ClientConfigFile = serde_json::from_str(&content)?;

    let handler = Arc::new(OutboundHandler::new(&config.outbound)?);
    let destination = Destination::from_host(&config.target_host, config.target_port);

    let addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        "forwarding {addr} to {destination} via {}:{}",
        config.outbound.address,
        config.outbound.port
    );

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                stream.set_nodelay(true).ok();
                let handler = Arc::clone(&handler);
                let destination = destination.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler.process(stream, destination).await {
                        tracing::debug!("tunnel for {peer} ended: {e}");
                    }
                });
            }
            Err(e) => {
                tracing::warn!("accept error: {e}");
            }
        }
    }
}
