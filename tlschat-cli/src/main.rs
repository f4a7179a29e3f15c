//! tlschat-cli - Interactive console client for tlschat.
//!
//! Connects, prints the server greeting, then alternates reading a line
//! from stdin and printing the echoed response. `exit` (or end of input)
//! disconnects.

use clap::Parser;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use tlschat_client::{ChatClient, ClientConfig, TlsClientConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tlschat-cli")]
#[command(about = "Interactive console client for the tlschat server")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    server: SocketAddr,

    /// Path to CA certificate for server verification
    #[arg(long, env = "TLSCHAT_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (for mTLS)
    #[arg(long, env = "TLSCHAT_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to client private key (for mTLS)
    #[arg(long, env = "TLSCHAT_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    /// Server name for TLS SNI (defaults to the server host)
    #[arg(long)]
    server_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut tls = TlsClientConfig::new();
    if let Some(ca) = cli.ca_cert {
        tls = tls.with_ca_cert(ca);
    }
    if let (Some(cert), Some(key)) = (cli.client_cert, cli.client_key) {
        tls = tls.with_client_cert(cert, key);
    }
    if cli.insecure {
        tls = tls.with_insecure();
    }
    if let Some(name) = cli.server_name {
        tls = tls.with_server_name(name);
    }

    println!("Connecting to {}...", cli.server);
    let mut client = ChatClient::connect(ClientConfig::new(cli.server).with_tls(tls)).await?;
    println!("Connected.");

    match client.recv_line().await? {
        Some(greeting) => println!("{}", greeting),
        None => {
            println!("Server disconnected.");
            return Ok(());
        }
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(message) = stdin.next_line().await? else {
            break;
        };
        if message.is_empty() || message.eq_ignore_ascii_case("exit") {
            break;
        }

        match client.send_recv(&message).await? {
            Some(response) => println!("{}", response),
            None => {
                println!("Server disconnected.");
                return Ok(());
            }
        }
    }

    println!("Disconnecting...");
    client.close().await?;
    Ok(())
}
