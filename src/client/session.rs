//! Participant session
//!
//! Connects to the signaling server, joins the configured room and runs
//! the setup controller until asked to leave or the connection drops.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::peer::{MediaSource, PresentationEvent, SetupController, TrackKind, TransportFactory};
use crate::protocol::{decode, encode, ServerMessage};

use super::config::ClientConfig;

#[derive(Debug)]
enum Command {
    SetTrackEnabled { kind: TrackKind, enabled: bool },
    Leave,
}

/// Controls a running session from another task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Mute or unmute local tracks of `kind`
    ///
    /// Returns false once the session has ended.
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        self.tx
            .send(Command::SetTrackEnabled { kind, enabled })
            .is_ok()
    }

    /// Leave the room and end the session
    pub fn leave(&self) -> bool {
        self.tx.send(Command::Leave).is_ok()
    }
}

/// One broadcaster or viewer
///
/// # Example
/// ```no_run
/// use peercast::client::{ClientConfig, ParticipantSession};
/// use peercast::peer::ReceiveOnly;
/// # use peercast::peer::TransportFactory;
///
/// # async fn example<F: TransportFactory>(factory: F) -> peercast::Result<()> {
/// let config = ClientConfig::viewer("ws://localhost:3000", "ABC123");
/// let (session, mut events) = ParticipantSession::new(config, factory, ReceiveOnly);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// session.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// # Ok(())
/// # }
/// ```
pub struct ParticipantSession<F, M> {
    config: ClientConfig,
    factory: F,
    media: M,
    event_tx: mpsc::UnboundedSender<PresentationEvent>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,
}

impl<F, M> ParticipantSession<F, M>
where
    F: TransportFactory,
    M: MediaSource,
{
    /// Create a session
    ///
    /// Returns the session and a receiver for presentation events.
    pub fn new(
        config: ClientConfig,
        factory: F,
        media: M,
    ) -> (Self, mpsc::UnboundedReceiver<PresentationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let session = Self {
            config,
            factory,
            media,
            event_tx,
            command_tx,
            command_rx,
        };

        (session, event_rx)
    }

    /// Handle for controlling the session once it runs
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.command_tx.clone(),
        }
    }

    /// Run until [`SessionHandle::leave`] or the connection drops
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, [`SessionHandle::leave`] is called, or
    /// the connection drops
    ///
    /// Leaving sends `leave`, closes every peer link and releases local
    /// media. A dropped connection returns [`Error::ConnectionClosed`].
    pub async fn run_until<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let Self {
            config,
            factory,
            mut media,
            event_tx,
            command_tx,
            mut command_rx,
        } = self;
        // Handles alone keep the command channel open
        drop(command_tx);

        let (ws, _) = tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
        tracing::info!(
            url = %config.url,
            room = %config.room_id,
            role = %config.role,
            "Connected to signaling server"
        );

        let (mut sink, mut stream) = ws.split();
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let (mut controller, mut link_rx) = SetupController::new(
            config.role,
            config.room_id.clone(),
            factory,
            config.transport_config(),
            signal_tx,
            event_tx.clone(),
        );

        controller.start_media(&mut media).await;
        controller.join();

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => match decode::<ServerMessage>(&text) {
                        Ok(message) => controller.handle_server_message(message).await,
                        Err(e) => tracing::warn!(error = %e, "Malformed frame from server"),
                    },
                    Some(Ok(Message::Close(_))) | None => break Err(Error::ConnectionClosed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                },
                Some(message) = signal_rx.recv() => match encode(&message) {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break Err(e.into());
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode message"),
                },
                Some(event) = link_rx.recv() => controller.handle_link_event(event).await,
                Some(command) = command_rx.recv() => match command {
                    Command::SetTrackEnabled { kind, enabled } => {
                        let changed = controller.set_track_enabled(kind, enabled);
                        tracing::debug!(kind = %kind, enabled, changed, "Track toggled");
                    }
                    Command::Leave => break Ok(()),
                },
            }
        };

        controller.shutdown().await;

        if result.is_ok() {
            // Flush leave and anything still queued
            while let Ok(message) = signal_rx.try_recv() {
                if let Ok(text) = encode(&message) {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
            let _ = sink.close().await;
            tracing::info!(room = %config.room_id, "Left room");
        } else {
            tracing::warn!(room = %config.room_id, "Signaling connection lost");
            let _ = event_tx.send(PresentationEvent::SignalingLost);
        }

        media.stop().await;
        result
    }
}
