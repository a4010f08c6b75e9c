//! shadowrelay client binary
//!
//! Usage: shadowrelay-client [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   -h, --help           Print help information

use std::env;

use shadowrelay::client::{Client, ClientConfig};

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
        r#"shadowrelay client - local SOCKS5 end of the two-hop proxy

USAGE:
    shadowrelay-client [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to configuration file
    -h, --help           Print help information

CONFIGURATION FILE FORMAT (JSON):
    {{
        "listen_addr": "127.0.0.1:4444",
        "server_addr": "server.example.com:5555",
        "cipher": {{ "kind": "table", "table": "<base64>" }},
        "ruleset": "global"
    }}

EXAMPLES:
    Run the client, then point applications at socks5://127.0.0.1:4444:
        shadowrelay-client --config client.json
"#
    );
}

async fn run_client(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    tracing::info!("Relay server: {}", config.server_addr);
    tracing::info!("Cipher: {:?}, ruleset: {:?}", config.cipher.kind, config.ruleset);

    let client = Client::from_config(config)?;
    client.run().await?;

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<ClientConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ClientConfig = serde_json::from_str(&content)?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}
