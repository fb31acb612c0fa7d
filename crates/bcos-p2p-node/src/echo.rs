//! Listening side: answer every request with its own payload.

use std::sync::Arc;

use bcos_p2p_core::{DisconnectReason, P2pCodec, Session, SessionError};
use bcos_p2p_proto::P2pMessage;
use tracing::{debug, info, warn};

/// Install the echo handler on `session`.
///
/// Requests are answered through `send_oneway`; stray responses are logged
/// and ignored. Protocol errors tear the session down.
pub fn install_echo(session: &Session<P2pCodec>) {
    session.set_message_handler(on_event);
}

fn on_event(session: Arc<Session<P2pCodec>>, event: Result<P2pMessage, SessionError>) {
    match event {
        Ok(message) if message.is_request() => {
            let response = P2pMessage::response_to(&message, message.payload.clone());
            if let Err(error) = session.send_oneway(&response) {
                warn!(seq = message.seq, %error, "failed to echo request");
            }
        },
        Ok(message) => {
            debug!(seq = message.seq, "ignoring unsolicited response");
        },
        Err(SessionError::Disconnected(reason)) => {
            info!(%reason, remote = ?session.remote_endpoint(), "peer disconnected");
        },
        Err(SessionError::Protocol(error)) => {
            warn!(%error, remote = ?session.remote_endpoint(), "dropping peer after framing error");
            session.disconnect(DisconnectReason::ProtocolError);
        },
        Err(error) => {
            warn!(%error, "session error");
        },
    }
}
