//! The orchestrating state machine behind one open chat view.
//!
//! A session is an actor: `ConversationSession::open` spawns a task that
//! resolves both identities, loads history, opens the realtime channel and
//! joins the room, then multiplexes handle commands with channel pushes.
//! The timeline is owned by that one task — events are applied strictly one
//! at a time, so it needs no synchronization, only ordering discipline.
//!
//! Teardown is deterministic: a close command, or dropping the handle,
//! cancels whichever await is in flight and releases the channel exactly
//! once. There is no automatic reconnect; after a transport failure the
//! session stays read-only until the owner closes it.

use crate::config::ChatConfig;
use crate::conversation::{AppendOutcome, ConversationKey, Timeline, TimelineEntry};
use crate::error::{ChatError, ChatResult};
use crate::models::{ChatMessage, Participant, ParticipantId};
use crate::services::{DirectoryClient, HistoryClient, IdentityResolver};
use crate::websocket::{ChannelEvent, RealtimeChannel};
use chrono::Utc;
use std::fmt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Why a session reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner closed the view or dropped the handle.
    Left,
    /// The caller's own identity has no directory record: they must
    /// complete registration before chatting. Not retryable in place.
    NotRegistered,
    /// The peer id resolves to no directory record.
    PeerNotFound,
    /// The directory could not be consulted at all.
    DirectoryUnavailable(String),
    /// The history fetch failed; the session never reached Connected.
    HistoryUnavailable(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Left => write!(f, "chat closed"),
            CloseReason::NotRegistered => {
                write!(f, "add your details before you can chat")
            }
            CloseReason::PeerNotFound => write!(f, "the other user profile was not found"),
            CloseReason::DirectoryUnavailable(e) => write!(f, "failed to load profiles: {e}"),
            CloseReason::HistoryUnavailable(e) => write!(f, "failed to load chat history: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Initializing,
    ResolvingIdentity,
    LoadingHistory,
    Connected,
    /// The channel is gone but the view is still open: history stays
    /// visible, composing is disabled.
    Disconnected,
    Closed(CloseReason),
}

impl SessionStatus {
    pub fn can_send(&self) -> bool {
        matches!(self, SessionStatus::Connected)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionStatus::Closed(_))
    }
}

enum SessionCommand {
    Send(String),
    Close,
}

/// Presentation-facing handle to a running session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    timeline: watch::Receiver<Vec<TimelineEntry>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status transition. `Err(SessionClosed)` once the
    /// actor is gone; the last observed status is then final.
    pub async fn status_changed(&mut self) -> ChatResult<SessionStatus> {
        self.status
            .changed()
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        Ok(self.status.borrow_and_update().clone())
    }

    /// Snapshot of the timeline in display order.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        self.timeline.borrow().clone()
    }

    pub async fn timeline_changed(&mut self) -> ChatResult<Vec<TimelineEntry>> {
        self.timeline
            .changed()
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        Ok(self.timeline.borrow_and_update().clone())
    }

    /// Submit a message. The body is trimmed; an empty-after-trim body is
    /// rejected here with no network call, and composing requires the
    /// Connected state. The actor stamps sender, receiver, timestamp and
    /// client tag, appends the optimistic local copy, then emits.
    pub fn send(&self, text: &str) -> ChatResult<()> {
        let body = text.trim();
        if body.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.status.borrow().can_send() {
            return Err(ChatError::NotConnected);
        }
        self.commands
            .send(SessionCommand::Send(body.to_string()))
            .map_err(|_| ChatError::SessionClosed)
    }

    /// Tear the session down and wait for the channel to be released.
    /// Dropping the handle has the same effect without the wait.
    pub async fn close(self) {
        let _ = self.commands.send(SessionCommand::Close);
        let _ = self.task.await;
    }
}

pub struct ConversationSession;

impl ConversationSession {
    /// Spawn the session actor for a chat between the authenticated caller
    /// (by external identity) and a directory peer (by row id). All
    /// collaborators are constructed from `config` — nothing ambient.
    pub fn open(
        config: ChatConfig,
        self_email: impl Into<String>,
        peer_id: ParticipantId,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Initializing);
        let (timeline_tx, timeline_rx) = watch::channel(Vec::new());

        let actor = SessionActor {
            config,
            self_email: self_email.into(),
            peer_id,
            commands: command_rx,
            status: status_tx,
            timeline: timeline_tx,
        };
        let task = tokio::spawn(actor.run());

        SessionHandle {
            commands: command_tx,
            status: status_rx,
            timeline: timeline_rx,
            task,
        }
    }
}

/// Everything setup produced; the channel is `None` when the transport
/// could not be established (read-only session).
struct Established {
    me: Participant,
    peer: Participant,
    timeline: Timeline,
    channel: Option<RealtimeChannel>,
}

struct SessionActor {
    config: ChatConfig,
    self_email: String,
    peer_id: ParticipantId,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    status: watch::Sender<SessionStatus>,
    timeline: watch::Sender<Vec<TimelineEntry>>,
}

impl SessionActor {
    async fn run(self) {
        let SessionActor {
            config,
            self_email,
            peer_id,
            mut commands,
            status,
            timeline,
        } = self;

        // Setup is raced against teardown so every await in it is
        // cancellable. A channel abandoned mid-setup is released by its
        // Drop impl; no completion can touch the session afterwards
        // because the whole future is gone.
        let setup = tokio::select! {
            _ = wait_for_close(&mut commands) => {
                status.send_replace(SessionStatus::Closed(CloseReason::Left));
                return;
            }
            setup = establish(&config, &self_email, &peer_id, &status, &timeline) => setup,
        };

        match setup {
            Err(reason) => {
                tracing::info!(%reason, "chat session closed during setup");
                status.send_replace(SessionStatus::Closed(reason));
            }
            Ok(established) => {
                run_established(established, &mut commands, &status, &timeline).await;
            }
        }
    }
}

async fn wait_for_close(commands: &mut mpsc::UnboundedReceiver<SessionCommand>) {
    loop {
        match commands.recv().await {
            // Sends cannot arrive before Connected (status-gated in the
            // handle); anything else racing in is dropped.
            Some(SessionCommand::Close) | None => return,
            Some(SessionCommand::Send(_)) => continue,
        }
    }
}

async fn establish(
    config: &ChatConfig,
    self_email: &str,
    peer_id: &ParticipantId,
    status: &watch::Sender<SessionStatus>,
    timeline_out: &watch::Sender<Vec<TimelineEntry>>,
) -> Result<Established, CloseReason> {
    status.send_replace(SessionStatus::ResolvingIdentity);

    let http = reqwest::Client::new();
    let directory = DirectoryClient::with_client(http.clone(), &config.directory_base_url);
    let resolver = IdentityResolver::new(directory);

    let me = match resolver.resolve_self(self_email).await {
        Ok(Some(p)) => p,
        Ok(None) => return Err(CloseReason::NotRegistered),
        Err(e) => return Err(CloseReason::DirectoryUnavailable(e.to_string())),
    };
    let peer = match resolver.resolve_peer(peer_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return Err(CloseReason::PeerNotFound),
        Err(e) => return Err(CloseReason::DirectoryUnavailable(e.to_string())),
    };

    status.send_replace(SessionStatus::LoadingHistory);

    let key = ConversationKey::new(me.id.clone(), peer.id.clone());
    let history = HistoryClient::with_client(http, &config.directory_base_url);
    let past = match history.fetch_history(&key).await {
        Ok(messages) => messages,
        Err(e) => return Err(CloseReason::HistoryUnavailable(e.to_string())),
    };
    let timeline = Timeline::from_history(key, past);
    timeline_out.send_replace(timeline.entries().to_vec());

    // Channel failures are not terminal: the view stays up read-only.
    let channel = match RealtimeChannel::connect(&config.chat_socket_url).await {
        Ok(mut channel) => match join_room(&mut channel, &me.id, &peer.id).await {
            Ok(()) => Some(channel),
            Err(e) => {
                tracing::warn!(error = %e, "room join failed; chat is read-only");
                channel.disconnect().await;
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "chat socket connect failed; chat is read-only");
            None
        }
    };

    Ok(Established {
        me,
        peer,
        timeline,
        channel,
    })
}

// Emit join_room and wait for the server's acknowledgement. Receipt order
// guarantees no room push for this conversation precedes the ack.
async fn join_room(
    channel: &mut RealtimeChannel,
    self_id: &ParticipantId,
    peer_id: &ParticipantId,
) -> ChatResult<()> {
    channel.join_room(self_id, peer_id).await?;
    loop {
        match channel.next_event().await {
            Some(ChannelEvent::JoinedRoom(room)) => {
                tracing::debug!(%room, "joined chat room");
                return Ok(());
            }
            // Cross-talk from other rooms on this connection is irrelevant
            // before the join completes.
            Some(ChannelEvent::Message(_)) => continue,
            Some(ChannelEvent::Error(e)) => return Err(ChatError::Channel(e)),
            Some(ChannelEvent::Closed) | None => {
                return Err(ChatError::Channel("connection closed during join".into()))
            }
        }
    }
}

async fn run_established(
    established: Established,
    commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    status: &watch::Sender<SessionStatus>,
    timeline_out: &watch::Sender<Vec<TimelineEntry>>,
) {
    let Established {
        me,
        peer,
        mut timeline,
        mut channel,
    } = established;

    status.send_replace(if channel.is_some() {
        SessionStatus::Connected
    } else {
        SessionStatus::Disconnected
    });

    let close_reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Send(body)) => {
                    // A send racing a disconnect is dropped; the handle
                    // already rejects sends once Disconnected is visible.
                    let Some(active) = channel.as_mut() else { continue };
                    let message = ChatMessage {
                        sender_id: me.id.clone(),
                        receiver_id: peer.id.clone(),
                        message: body,
                        timestamp: Utc::now(),
                        client_tag: Some(Uuid::new_v4()),
                    };
                    timeline.append_pending(message.clone());
                    timeline_out.send_replace(timeline.entries().to_vec());
                    if let Err(e) = active.send_message(&message).await {
                        tracing::warn!(error = %e, "send failed; chat is read-only");
                        degrade(&mut channel, status).await;
                    }
                }
                Some(SessionCommand::Close) | None => break CloseReason::Left,
            },
            event = next_channel_event(&mut channel) => match event {
                Some(ChannelEvent::Message(message)) => {
                    // Only pushes for this conversation's pair may touch
                    // the timeline, whatever the transport multiplexes.
                    if !message.involves(&me.id, &peer.id) {
                        tracing::debug!(
                            sender = %message.sender_id,
                            receiver = %message.receiver_id,
                            "ignoring push for another conversation"
                        );
                        continue;
                    }
                    match timeline.append_live(message) {
                        AppendOutcome::Appended | AppendOutcome::Confirmed => {
                            timeline_out.send_replace(timeline.entries().to_vec());
                        }
                        AppendOutcome::Duplicate => {
                            tracing::debug!("dropped redelivered message");
                        }
                        AppendOutcome::NotParticipant => {}
                    }
                }
                Some(ChannelEvent::JoinedRoom(room)) => {
                    tracing::debug!(%room, "room membership confirmed");
                }
                Some(ChannelEvent::Error(e)) => {
                    tracing::warn!(error = %e, "realtime channel failed; chat is read-only");
                    degrade(&mut channel, status).await;
                }
                Some(ChannelEvent::Closed) | None => {
                    tracing::info!("chat socket closed by server; chat is read-only");
                    degrade(&mut channel, status).await;
                }
            },
        }
    };

    if let Some(mut active) = channel.take() {
        active.disconnect().await;
    }
    status.send_replace(SessionStatus::Closed(close_reason));
}

/// Wait on the channel when there is one; park forever otherwise so the
/// select loop only wakes for commands.
async fn next_channel_event(channel: &mut Option<RealtimeChannel>) -> Option<ChannelEvent> {
    match channel.as_mut() {
        Some(active) => active.next_event().await,
        None => std::future::pending().await,
    }
}

/// Drop to read-only: release the channel (stops event processing) and
/// publish Disconnected. The timeline is left untouched.
async fn degrade(channel: &mut Option<RealtimeChannel>, status: &watch::Sender<SessionStatus>) {
    if let Some(mut dead) = channel.take() {
        dead.disconnect().await;
    }
    status.send_replace(SessionStatus::Disconnected);
}
