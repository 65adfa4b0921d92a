//! linkwire CLI Client
//!
//! Command-line interface for talking to a linkwire server.

use std::time::Duration;

use clap::{Parser, Subcommand};
use linkwire::{Client, Config};
use tracing_subscriber::{fmt, EnvFilter};

/// linkwire CLI
#[derive(Parser, Debug)]
#[command(name = "linkwire-cli")]
#[command(about = "CLI for a linkwire server")]
struct Args {
    /// Server host
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    /// Server port
    #[arg(short, long, default_value = "9000")]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send text without waiting for anything
    Send {
        /// The text to send
        text: String,
    },

    /// Send text and print the next reply
    Request {
        /// The text to send
        text: String,

        /// How long to wait for the reply, in milliseconds
        #[arg(short, long, default_value = "1000")]
        timeout_ms: u64,
    },
}

fn run(args: Args) -> linkwire::Result<()> {
    let mut client = Client::new(Config::default());
    client.connect_to(args.address, args.port)?;

    match args.command {
        Commands::Send { text } => {
            client.write_text(&text)?;
        }
        Commands::Request { text, timeout_ms } => {
            let reply = client.write_and_wait_text(&text, Duration::from_millis(timeout_ms))?;
            if reply.is_empty() {
                eprintln!("No reply within {} ms", timeout_ms);
            } else {
                println!("{}", reply);
            }
        }
    }

    client.disconnect();
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(true).init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
