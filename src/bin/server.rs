//! Reflex Server Binary
//!
//! Usage: reflex-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>      Path to configuration file
//!   -g, --generate           Generate new server configuration
//!   --show-clients <FILE>    List configured client ids
//!   -h, --help               Print help information

use std::env;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

use reflex::config::{FallbackConfig, InboundConfig, UserConfig};
use reflex::ech;
use reflex::proxy::InboundHandler;

/// On-disk server configuration.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerConfigFile {
    listen_addr: String,
    listen_port: u16,
    #[serde(flatten)]
    inbound: InboundConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing — respects RUST_LOG env var (e.g. RUST_LOG=debug)
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
            run_server(&args[2]).await?;
        }
        "--show-clients" => {
            if args.len() < 3 {
                eprintln!("Error: --show-clients requires a config file path");
                return Ok(());
            }
            show_clients(&args[2])?;
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
        r#"Reflex Server - probe-resistant proxy tunnel

USAGE:
    reflex-server [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file
    -g, --generate          Generate new server configuration
    --show-clients <FILE>   List configured client ids
    -h, --help              Print help information

EXAMPLES:
    Generate a new configuration:
        reflex-server --generate > server.toml

    Run the server:
        reflex-server --config server.toml
"#
    );
}

fn generate_config() -> anyhow::Result<()> {
    let client_id = Uuid::new_v4();

    let config = ServerConfigFile {
        listen_addr: "0.0.0.0".into(),
        listen_port: 8443,
        inbound: InboundConfig {
            clients: vec![UserConfig {
                id: client_id.to_string(),
                policy: "youtube".into(),
            }],
            fallback: Some(FallbackConfig { dest: 8080 }),
            ech: None,
        },
    };

    println!("# Reflex Server Configuration");
    println!(
        "# Recognized policies: {}",
        reflex::morph::PROFILE_NAMES.join(", ")
    );
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    println!("# Client connection id: {client_id}");

    Ok(())
}

fn show_clients(config_path: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_path)?;
    let config: ServerConfigFile = toml::from_str(&content)?;

    println!("Configured clients:");
    for (i, client) in config.inbound.clients.iter().enumerate() {
        let policy = if client.policy.is_empty() {
            "(no morphing)"
        } else {
            &client.policy
        };
        println!("  [{}] {} policy={}", i + 1, client.id, policy);
    }

    Ok(())
}

async fn run_server(config_path: &str) -> anyhow::Result<()> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let content = std::fs::read_to_string(config_path)?;
    let config: ServerConfigFile = toml::from_str(&content)?;

    let handler = Arc::new(InboundHandler::new(&config.inbound)?);

    // With ECH enabled, emit the config list clients need for the outer TLS
    // handshake. The TLS wrapping itself is handled by the fronting stack.
    if let Some(ech_settings) = config.inbound.ech.as_ref().filter(|e| e.enabled) {
        let public_name = if ech_settings.public_name.is_empty() {
            "cloudflare.com"
        } else {
            ech_settings.public_name.as_str()
        };
        let keys = ech::new_server_ech(public_name, 1)?;
        tracing::info!(
            public_name,
            config_list = %STANDARD.encode(&keys.config_list),
            "ECH enabled"
        );
    }

    let addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("reflex server listening on {addr}");
    tracing::info!("configured clients: {}", config.inbound.clients.len());
    if let Some(port) = config.inbound.fallback_port() {
        tracing::info!("fallback origin: 127.0.0.1:{port}");
    }

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                stream.set_nodelay(true).ok();
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = handler.handle(stream, peer).await {
                        tracing::debug!("connection from {peer} ended: {e}");
                    }
                });
            }
            Err(e) => {
                tracing::warn!("accept error: {e}");
            }
        }
    }
}
