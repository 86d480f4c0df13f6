//! mjpeg-fanout command line
//!
//! ```text
//! mjpeg-fanout 0.0.0.0 8080 /tmp/camera.mjpeg secret /tmp/tokens
//! ffmpeg -f v4l2 -i /dev/video0 -f mjpeg -q:v 5 -r 10 - > /tmp/camera.mjpeg
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use mjpeg_fanout::capture::Framing;
use mjpeg_fanout::protocol::constants::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_QUEUE_DEPTH, MAX_FRAME_SIZE,
};
use mjpeg_fanout::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "mjpeg-fanout")]
#[command(about = "Stream one MJPEG source to many HTTP viewers", long_about = None)]
struct Args {
    /// Address to listen on
    bind_address: IpAddr,

    /// Port to listen on
    port: u16,

    /// Frame device: a FIFO or pipe carrying JPEG frames
    device: PathBuf,

    /// Shared secret accepted as a credential
    static_token: String,

    /// FIFO feeding one-time tokens; created if missing
    token_fifo: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Frames buffered per slow viewer before dropping
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// How frames are delimited on the device
    #[arg(long, default_value = "jpeg", value_parser = parse_framing)]
    framing: Framing,

    /// Largest accepted frame in bytes
    #[arg(long, default_value_t = MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Log server stats this often
    #[arg(long)]
    stats_interval_secs: Option<u64>,
}

fn parse_framing(s: &str) -> Result<Framing, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mjpeg_fanout=info".parse()?),
        )
        .init();

    let mut config = ServerConfig::default()
        .bind(SocketAddr::new(args.bind_address, args.port))
        .max_connections(args.max_connections)
        .queue_depth(args.queue_depth)
        .max_frame_size(args.max_frame_size)
        .static_token(args.static_token)
        .device(args.device)
        .framing(args.framing);
    if let Some(path) = args.token_fifo {
        config = config.token_feed(path);
    }
    if let Some(secs) = args.stats_interval_secs {
        config = config.stats_interval(Duration::from_secs(secs));
    }

    let server = Arc::new(Server::new(config));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let stats = server.run_until(shutdown).await?;
    tracing::info!(
        total = stats.total_connections,
        authenticated = stats.authenticated,
        rejected = stats.rejected,
        frames = stats.frames_captured,
        dropped = stats.dropped_messages,
        "Server stopped"
    );
    Ok(())
}
