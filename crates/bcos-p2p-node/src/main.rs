//! bcos-p2p-node binary.

use std::time::Duration;

use bcos_p2p_core::P2pCodec;
use bcos_p2p_node::{Args, Command, DialOptions, Node, NodeError};
use clap::Parser;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let node = Node::new(Handle::current(), P2pCodec::new(args.max_frame_len), args.session_config());

    match args.command {
        Command::Listen { addr } => node.listen(addr).await,
        Command::Dial { addr, count, timeout_ms, payload_len } => {
            let options =
                DialOptions { count, timeout: Duration::from_millis(timeout_ms), payload_len };
            let report = node.dial(addr, options).await?;
            info!(
                sent = report.sent,
                succeeded = report.succeeded(),
                failed = report.failed,
                min = ?report.min(),
                mean = ?report.mean(),
                max = ?report.max(),
                "dial finished"
            );
            Ok(())
        },
    }
}
