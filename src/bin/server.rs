//! shadowrelay server binary
//!
//! Usage: shadowrelay-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   -g, --generate       Generate new server configuration
//!   -h, --help           Print help information

use std::env;

use shadowrelay::client::ClientConfig;
use shadowrelay::server::{Server, ServerConfig, ServerConfigFile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respects RUST_LOG (e.g. RUST_LOG=debug)
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
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"shadowrelay server - remote end of the two-hop SOCKS5 proxy

USAGE:
    shadowrelay-server [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file
    -g, --generate          Generate new server configuration
    -h, --help              Print help information

CONFIGURATION FILE FORMAT (TOML):
    listen_addr = "0.0.0.0"
    listen_port = 5555

    [cipher]
    kind = "table"          # nop | table | base64
    table = "<base64>"      # shared with clients

EXAMPLES:
    Generate a new configuration:
        shadowrelay-server --generate > server.toml

    Run the server:
        shadowrelay-server --config server.toml
"#
    );
}

fn generate_config() -> anyhow::Result<()> {
    let config = ServerConfig::new_random("0.0.0.0", shadowrelay::DEFAULT_SERVER_PORT);
    let config_file = ServerConfigFile::from_config(&config);

    let client = ClientConfig::new(
        format!("YOUR_SERVER_IP:{}", config.listen_port),
        config.cipher.clone(),
    );

    println!("# shadowrelay server configuration");
    println!("# Generated: {}", chrono::Utc::now());
    println!();
    println!("{}", toml::to_string_pretty(&config_file)?);
    println!();
    println!("# Matching client.json:");
    for line in serde_json::to_string_pretty(&client)?.lines() {
        println!("# {}", line);
    }

    Ok(())
}

async fn run_server(config_path: &str) -> anyhow::Result<()> {
    let config_content = std::fs::read_to_string(config_path)?;
    let config_file: ServerConfigFile = toml::from_str(&config_content)?;
    let config = config_file.to_config().map_err(|e: String| anyhow::anyhow!(e))?;

    config.validate().map_err(|e: String| anyhow::anyhow!(e))?;

    tracing::info!("Starting server on {}", config.bind_addr());
    tracing::info!("Cipher: {:?}", config.cipher.kind);

    let server = Server::from_config(config)?;
    server.run().await?;

    Ok(())
}
