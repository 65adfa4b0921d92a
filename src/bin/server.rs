//! linkwire Server Binary
//!
//! Starts a linkwire server that logs every connection and message, and
//! optionally echoes payloads back. Stops on Enter or end of stdin.

use std::io::BufRead;

use clap::{Parser, ValueEnum};
use linkwire::{Config, ReadMode, Server, TextCodec};
use tracing_subscriber::{fmt, EnvFilter};

/// linkwire Server
#[derive(Parser, Debug)]
#[command(name = "linkwire-server")]
#[command(about = "Multi-client TCP message server")]
#[command(version)]
struct Args {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Listen IP
    #[arg(short, long)]
    address: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Max bytes per receive
    #[arg(long)]
    packet_size: Option<usize>,

    /// Liveness poll interval in milliseconds (0 = continuous)
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Serve all connections from one reader thread
    #[arg(long)]
    multiplexed: bool,

    /// Text codec
    #[arg(long, value_enum)]
    codec: Option<CodecArg>,

    /// Echo every received payload back to its sender
    #[arg(short, long)]
    echo: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodecArg {
    Utf8,
    Latin1,
    Ascii,
}

impl From<CodecArg> for TextCodec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Utf8 => TextCodec::Utf8,
            CodecArg::Latin1 => TextCodec::Latin1,
            CodecArg::Ascii => TextCodec::Ascii,
        }
    }
}

fn build_config(args: &Args) -> linkwire::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::builder().address("127.0.0.1").port(9000).build(),
    };

    if let Some(address) = &args.address {
        config.address = Some(address.clone());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(size) = args.packet_size {
        config.packet_size = size;
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(codec) = args.codec {
        config.codec = codec.into();
    }
    if args.multiplexed {
        config.read_mode = ReadMode::Multiplexed;
    }
    Ok(config)
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,linkwire=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("linkwire server v{}", linkwire::VERSION);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut server = Server::new(config);

    server.on_connected(|conn| {
        tracing::info!("{} connected from {}", conn.name(), conn.peer_addr());
    });
    server.on_disconnected(|conn| {
        tracing::info!("{} disconnected", conn.name());
    });

    let echo = args.echo;
    server.on_data(move |msg| {
        tracing::info!(
            "{} sent {} bytes: {:?}",
            msg.connection().name(),
            msg.payload().len(),
            msg.text()
        );
        if echo {
            if let Err(e) = msg.reply(msg.payload()) {
                tracing::warn!("Echo to {} failed: {}", msg.connection().name(), e);
            }
        }
    });

    if let Err(e) = server.start() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Press Enter to stop");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    server.stop();
    tracing::info!("Server stopped");
}
