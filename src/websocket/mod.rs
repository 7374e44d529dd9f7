pub mod message_types;

use crate::error::{ChatError, ChatResult};
use crate::models::{ChatMessage, ParticipantId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use message_types::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Inbound channel events, in server receipt order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A chat message pushed for some room this connection joined.
    Message(ChatMessage),
    /// Server acknowledged the room join; carries the canonical room name.
    JoinedRoom(String),
    /// Transport or server-reported failure. Non-fatal for the owner: the
    /// session degrades to read-only, it does not crash.
    Error(String),
    /// The server closed the connection.
    Closed,
}

/// One persistent bidirectional connection to the chat endpoint.
///
/// Owned by exactly one conversation session, constructed at session start
/// and disconnected at session end. All conversations of a session share
/// this single connection; rooms scope what the server pushes down it.
pub struct RealtimeChannel {
    sink: WsSink,
    events: UnboundedReceiver<ChannelEvent>,
    reader: JoinHandle<()>,
    open: bool,
}

impl RealtimeChannel {
    /// Establish the transport connection and start decoding pushes.
    pub async fn connect(url: &str) -> ChatResult<Self> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ChatError::Channel(format!("connect to {url}: {e}")))?;
        tracing::debug!(%url, "chat socket connected");

        let (sink, source) = stream.split();
        let (tx, events) = unbounded_channel();
        let reader = tokio::spawn(read_loop(source, tx));

        Ok(Self {
            sink,
            events,
            reader,
            open: true,
        })
    }

    /// Ask the server to deliver pushes for the conversation between these
    /// two ids. Raw ids on the wire; the server canonicalizes the room.
    pub async fn join_room(
        &mut self,
        user1: &ParticipantId,
        user2: &ParticipantId,
    ) -> ChatResult<()> {
        self.emit(&ClientEvent::JoinRoom {
            user1: user1.clone(),
            user2: user2.clone(),
        })
        .await
    }

    /// Fire-and-forget emit; delivery confirmation arrives as the server
    /// echo on the push stream, not as an acknowledgement here.
    pub async fn send_message(&mut self, message: &ChatMessage) -> ChatResult<()> {
        self.emit(&ClientEvent::SendMessage {
            message: message.clone(),
        })
        .await
    }

    async fn emit(&mut self, event: &ClientEvent) -> ChatResult<()> {
        if !self.open {
            return Err(ChatError::NotConnected);
        }
        let payload = serde_json::to_string(event)
            .map_err(|e| ChatError::Channel(format!("encode event: {e}")))?;
        self.sink
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| ChatError::Channel(format!("send: {e}")))
    }

    /// Next inbound event, in receipt order. `None` once the connection is
    /// fully drained after a disconnect.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Release the connection. Idempotent: the first call closes the sink
    /// and stops the reader, later calls are no-ops.
    pub async fn disconnect(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        // The peer may already be gone; close errors carry no information.
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
        self.reader.abort();
        tracing::debug!("chat socket disconnected");
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut source: WsSource, tx: UnboundedSender<ChannelEvent>) {
    while let Some(frame) = source.next().await {
        let forwarded = match frame {
            Ok(WsMessage::Text(txt)) => match serde_json::from_str::<ServerEvent>(txt.as_str()) {
                Ok(ServerEvent::ReceiveMessage { message }) => {
                    tx.send(ChannelEvent::Message(message))
                }
                Ok(ServerEvent::JoinedRoom { room }) => tx.send(ChannelEvent::JoinedRoom(room)),
                Ok(ServerEvent::Error { message }) => tx.send(ChannelEvent::Error(message)),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unrecognized server frame");
                    Ok(())
                }
            },
            Ok(WsMessage::Close(_)) => {
                let _ = tx.send(ChannelEvent::Closed);
                return;
            }
            Ok(_) => Ok(()), // ping/pong/binary
            Err(e) => {
                let _ = tx.send(ChannelEvent::Error(e.to_string()));
                return;
            }
        };
        // Receiver gone means the owning session is tearing down.
        if forwarded.is_err() {
            return;
        }
    }
    let _ = tx.send(ChannelEvent::Closed);
}
