//! Per-connection handler
//!
//! Upgrades the socket to a WebSocket, registers with the registry, then
//! pumps frames both ways until either side closes. A bad frame only
//! produces an `error` reply to this connection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};

use crate::error::{Error, Result};
use crate::protocol::{decode, encode, ClientMessage, ConnectionId, ServerMessage};
use crate::registry::{RegistryError, RoomRegistry};
use crate::server::config::ServerConfig;

/// One participant's link to the registry
pub(crate) struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    registry: Arc<RoomRegistry>,
}

impl Connection {
    /// Complete the WebSocket upgrade and serve until the connection ends
    ///
    /// The connection is always removed from the registry on return, which
    /// runs the leave handling for whatever room it had joined.
    pub(crate) async fn serve(
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: &ServerConfig,
        registry: Arc<RoomRegistry>,
    ) -> Result<()> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.max_frame_size = Some(config.max_message_size);

        let ws = tokio::time::timeout(
            config.handshake_timeout,
            accept_async_with_config(socket, Some(ws_config)),
        )
        .await
        .map_err(|_| Error::Timeout(config.handshake_timeout))??;

        let (id, outbound) = registry.connect();
        tracing::info!(connection = %id, peer = %peer_addr, "Participant connected");

        let connection = Connection {
            id,
            peer_addr,
            registry: Arc::clone(&registry),
        };
        let result = connection.run(ws, outbound).await;

        if let Some(tag) = registry.disconnect(id) {
            tracing::debug!(
                connection = %id,
                room = %tag.room_id,
                role = %tag.role,
                "Left room on disconnect"
            );
        }
        tracing::info!(connection = %id, peer = %peer_addr, "Participant disconnected");

        result
    }

    async fn run(
        &self,
        ws: WebSocketStream<TcpStream>,
        mut outbound: mpsc::Receiver<ServerMessage>,
    ) -> Result<()> {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Binary(_))) => {
                        self.reject("binary frames are not supported".into());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                outgoing = outbound.recv() => match outgoing {
                    Some(message) => {
                        let text = encode(&message)?;
                        sink.send(Message::Text(text)).await?;
                    }
                    None => break,
                },
            }
        }

        let _ = sink.close().await;
        Ok(())
    }

    fn handle_text(&self, text: &str) {
        match decode::<ClientMessage>(text) {
            Ok(message) => self.dispatch(message),
            Err(e) => {
                tracing::warn!(connection = %self.id, peer = %self.peer_addr, error = %e, "Malformed frame");
                self.reject(e.to_string());
            }
        }
    }

    fn dispatch(&self, message: ClientMessage) {
        let result = match message.into_signal() {
            Ok((kind, to, payload)) => self.registry.relay(self.id, to, kind, payload),
            Err(ClientMessage::JoinBroadcaster { room_id }) => {
                self.registry.join_as_broadcaster(self.id, room_id)
            }
            Err(ClientMessage::JoinViewer { room_id }) => {
                self.registry.join_as_viewer(self.id, room_id)
            }
            Err(ClientMessage::Leave { room_id }) => {
                match self.registry.leave(self.id) {
                    Some(tag) if tag.room_id != room_id.trimmed() => {
                        tracing::debug!(
                            connection = %self.id,
                            requested = %room_id,
                            left = %tag.room_id,
                            "Leave named a different room"
                        );
                    }
                    Some(_) => {}
                    None => {
                        tracing::debug!(connection = %self.id, "Leave without a room");
                    }
                }
                Ok(())
            }
            // into_signal only hands back non-relay messages
            Err(_) => Ok(()),
        };

        // Room errors were answered by the registry; relay drops are silent
        if let Err(err @ RegistryError::InvalidRoomId(_)) = result {
            self.reject(err.to_string());
        }
    }

    fn reject(&self, message: String) {
        let _ = self
            .registry
            .notify(self.id, ServerMessage::Error { message });
    }
}
