//! Echo and probe tests.
//!
//! The echo handler and probe loop over simulated TCP, plus one run of the
//! full node over loopback TCP.

use std::{sync::Arc, time::Duration};

use bcos_p2p_core::{P2pCodec, SessionConfig, SessionState};
use bcos_p2p_harness::SimNode;
use bcos_p2p_node::{DialOptions, Node, install_echo, run_probes};
use tokio::{net::TcpListener, runtime::Handle};
use turmoil::net::TcpListener as SimListener;

const BIND_ADDR: &str = "0.0.0.0:30300";
const SERVER_ADDR: &str = "server:30300";

async fn run_echo_server() -> turmoil::Result {
    let node = SimNode::new();
    let listener = SimListener::bind(BIND_ADDR).await?;
    loop {
        let session = node.accept(&listener).await?;
        install_echo(&session);
        session.start()?;
    }
}

#[test]
fn probes_are_echoed() {
    let mut sim = turmoil::Builder::new().build();
    sim.host("server", run_echo_server);

    sim.client("client", async move {
        let node = SimNode::new();
        let session = node.connect(SERVER_ADDR).await?;
        session.start()?;

        let options = DialOptions { count: 25, timeout: Duration::from_millis(500), payload_len: 512 };
        let report = run_probes(&session, options).await;

        assert_eq!(report.sent, 25);
        assert_eq!(report.succeeded(), 25);
        assert_eq!(report.failed, 0);
        assert!(report.min() <= report.mean() && report.mean() <= report.max());
        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn probes_stop_after_peer_leaves() {
    let mut sim = turmoil::Builder::new().build();
    sim.host("server", || async move {
        let listener = SimListener::bind(BIND_ADDR).await?;
        // Accept and immediately hang up
        loop {
            let (stream, _) = listener.accept().await?;
            drop(stream);
        }
    });

    sim.client("client", async move {
        let node = SimNode::new();
        let session = node.connect(SERVER_ADDR).await?;
        session.start()?;

        let options = DialOptions { count: 5, timeout: Duration::from_millis(500), payload_len: 8 };
        let report = run_probes(&session, options).await;

        assert_eq!(report.succeeded(), 0);
        assert!(report.sent < 5 || report.failed == 5);
        assert_eq!(session.state(), SessionState::Closed);
        Ok(())
    });

    sim.run().unwrap();
}

#[tokio::test]
async fn node_serves_and_dials_over_loopback() {
    let node = Arc::new(Node::new(Handle::current(), P2pCodec::default(), SessionConfig::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = node.clone();
    tokio::spawn(async move { server.serve(listener).await });

    let options = DialOptions { count: 5, timeout: Duration::from_secs(5), payload_len: 32 };
    let report = node.dial(addr, options).await.unwrap();

    assert_eq!(report.sent, 5);
    assert_eq!(report.succeeded(), 5);
}
