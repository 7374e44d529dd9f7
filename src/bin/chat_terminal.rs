//! Minimal terminal chat: the runnable counterpart of the directory's chat
//! view. Lines from stdin are sent, pushes are printed, Ctrl-D leaves.
//!
//! Usage: chat-terminal <your-email> <peer-id>
//! Endpoints come from ATLAS_API_BASE_URL / ATLAS_WS_URL.

use atlas_chat::{
    logging, ChatConfig, ChatError, ConversationSession, DeliveryState, DirectoryClient,
    IdentityResolver, ParticipantId, SessionStatus, TimelineEntry,
};
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_new_entries(entries: &[TimelineEntry], seen: &mut usize, self_id: &ParticipantId) {
    for entry in &entries[*seen..] {
        let who = if entry.message.sender_id == *self_id {
            "you"
        } else {
            entry.message.sender_id.as_str()
        };
        let mark = match entry.delivery {
            DeliveryState::Pending => " (sending)",
            DeliveryState::Delivered => "",
        };
        println!(
            "[{}] {}: {}{}",
            entry.message.timestamp.format("%H:%M:%S"),
            who,
            entry.message.message,
            mark
        );
    }
    *seen = entries.len();
}

#[tokio::main]
async fn main() -> Result<(), ChatError> {
    logging::init_tracing();

    let mut args = std::env::args().skip(1);
    let (email, peer_id) = match (args.next(), args.next()) {
        (Some(email), Some(peer)) => (email, ParticipantId::new(peer)),
        _ => {
            eprintln!("usage: chat-terminal <your-email> <peer-id>");
            std::process::exit(2);
        }
    };

    let config = ChatConfig::from_env()?;

    // Resolve both sides up front for the header; the session re-resolves
    // internally, which keeps it self-contained.
    let resolver = IdentityResolver::new(DirectoryClient::new(&config.directory_base_url));
    let me = match resolver.resolve_self(&email).await? {
        Some(p) => p,
        None => {
            eprintln!("{}", ChatError::NotRegistered);
            std::process::exit(1);
        }
    };
    match resolver.resolve_peer(&peer_id).await? {
        Some(peer) => println!("chat with {}", peer.name),
        None => {
            eprintln!("{}", ChatError::PeerNotFound);
            std::process::exit(1);
        }
    }

    let mut session = ConversationSession::open(config, email, peer_id);

    // Wait out setup before reading stdin.
    loop {
        match session.status() {
            SessionStatus::Connected => {
                println!("connected; type a message and press enter");
                break;
            }
            SessionStatus::Disconnected => {
                println!("could not reach the chat server; history only");
                break;
            }
            SessionStatus::Closed(reason) => {
                eprintln!("{reason}");
                std::process::exit(1);
            }
            _ => {
                session.status_changed().await?;
            }
        }
    }

    let mut seen = 0usize;
    print_new_entries(&session.timeline(), &mut seen, &me.id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(text)) => {
                    match session.send(&text) {
                        Ok(()) => {}
                        Err(ChatError::EmptyMessage) => {}
                        Err(e) => eprintln!("not sent: {e}"),
                    }
                }
                Ok(None) | Err(_) => break, // Ctrl-D or stdin gone
            },
            changed = session.timeline_changed() => match changed {
                Ok(entries) => print_new_entries(&entries, &mut seen, &me.id),
                Err(_) => break,
            },
        }
    }

    session.close().await;
    Ok(())
}
