//! Foundry CLI - operator checks for the chat proxy
//!
//! `foundry check` verifies credentials and the proxy's view of them;
//! `foundry chat` sends a message through the proxy and shows the reply
//! together with the page actions it implies.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod client;
mod commands;
mod display;

use crate::client::{DEFAULT_PROXY_URL, ProxyClient};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the running proxy
    #[arg(long, global = true, env = "FOUNDRY_PROXY_URL", default_value = DEFAULT_PROXY_URL)]
    proxy_url: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 120)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check credentials, proxy health and authentication diagnostics
    Check,

    /// Send a message through the proxy and show the reply
    Chat {
        /// Agent endpoint to use instead of the proxy's default
        #[arg(long)]
        endpoint: Option<String>,

        /// Message to send
        #[arg(required = true)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::init();

    let args = Args::parse();
    let client = ProxyClient::new(&args.proxy_url, Duration::from_secs(args.timeout))?;

    let ok = match args.command {
        Command::Check => commands::check(&client).await,
        Command::Chat { endpoint, message } => {
            let message = message.join(" ");
            match commands::chat(&client, &message, endpoint).await {
                Ok(ok) => ok,
                Err(e) => {
                    eprintln!("{} {e:#}", "Error:".bright_red());
                    false
                }
            }
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
