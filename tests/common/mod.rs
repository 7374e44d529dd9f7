//! In-process mock of the two collaborators a session talks to: the
//! profile directory / history store (HTTP) and the chat socket (WS).
//!
//! The ws side mirrors the production contract: rooms are canonicalized
//! server-side from the two raw ids, and a room broadcast includes the
//! sender's own connection (the echo the client's optimistic entries are
//! confirmed by). Test-only hooks: `blast` pushes an event to every
//! connection regardless of room (a multiplexing transport), and
//! `kill_connections` severs all live sockets.

#![allow(dead_code)]

use atlas_chat::websocket::message_types::{ClientEvent, ServerEvent};
use atlas_chat::{ChatMessage, Participant, ParticipantId};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

pub struct MockBackend {
    pub base_url: String,
    pub ws_url: String,
    state: BackendState,
}

#[derive(Clone)]
struct BackendState {
    people: Arc<Mutex<Vec<Participant>>>,
    history: Arc<Mutex<Vec<ChatMessage>>>,
    history_fails: Arc<AtomicBool>,
    connections: Arc<Mutex<Vec<Connection>>>,
    next_connection_id: Arc<AtomicU64>,
    ws_connections_seen: Arc<AtomicUsize>,
}

struct Connection {
    id: u64,
    room: Option<String>,
    tx: UnboundedSender<String>,
}

fn canonical_room(a: &ParticipantId, b: &ParticipantId) -> String {
    let mut pair = [a.as_str(), b.as_str()];
    pair.sort();
    format!("{}:{}", pair[0], pair[1])
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::start_with(default_people()).await
    }

    pub async fn start_with(people: Vec<Participant>) -> Self {
        let state = BackendState {
            people: Arc::new(Mutex::new(people)),
            history: Arc::new(Mutex::new(Vec::new())),
            history_fails: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(Mutex::new(Vec::new())),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            ws_connections_seen: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route("/api/search", get(search))
            .route("/api/check_profile_exists", get(check_profile_exists))
            .route("/api/organizations", get(organizations))
            .route("/api/nearby", get(nearby))
            .route("/api/chat_history", get(chat_history))
            .route("/api/submit", post(submit))
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self {
            base_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/ws"),
            state,
        }
    }

    pub fn seed_history(&self, messages: Vec<ChatMessage>) {
        self.state.history.lock().unwrap().extend(messages);
    }

    pub fn fail_history(&self, fail: bool) {
        self.state.history_fails.store(fail, Ordering::SeqCst);
    }

    pub fn stored_messages(&self) -> Vec<ChatMessage> {
        self.state.history.lock().unwrap().clone()
    }

    pub fn ws_connections_seen(&self) -> usize {
        self.state.ws_connections_seen.load(Ordering::SeqCst)
    }

    /// Push a receive_message event to every live connection regardless of
    /// room membership, as a transport multiplexing unrelated rooms would.
    pub fn blast(&self, message: &ChatMessage) {
        let frame = serde_json::to_string(&ServerEvent::ReceiveMessage {
            message: message.clone(),
        })
        .unwrap();
        for connection in self.state.connections.lock().unwrap().iter() {
            let _ = connection.tx.send(frame.clone());
        }
    }

    /// Sever every live socket from the server side.
    pub fn kill_connections(&self) {
        self.state.connections.lock().unwrap().clear();
    }
}

pub fn default_people() -> Vec<Participant> {
    vec![
        person("1", "Alice", "alice@example.com", "Acme", "Engineer", Some((52.52, 13.405))),
        person("2", "Bob", "bob@example.com", "Globex", "Designer", Some((52.50, 13.40))),
        person("3", "Carol", "carol@example.com", "Acme", "Researcher", None),
    ]
}

pub fn person(
    id: &str,
    name: &str,
    email: &str,
    organization: &str,
    role: &str,
    coords: Option<(f64, f64)>,
) -> Participant {
    Participant {
        id: id.into(),
        name: name.to_string(),
        email: Some(email.to_string()),
        phone: None,
        photo_url: None,
        latitude: coords.map(|(lat, _)| lat),
        longitude: coords.map(|(_, lon)| lon),
        organization: Some(organization.to_string()),
        role: Some(role.to_string()),
        distance_km: None,
    }
}

pub fn message(sender: &str, receiver: &str, body: &str, secs: i64) -> ChatMessage {
    ChatMessage {
        sender_id: sender.into(),
        receiver_id: receiver.into(),
        message: body.to_string(),
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        client_tag: None,
    }
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search(
    State(state): State<BackendState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Participant>> {
    let q = params.q.trim().to_lowercase();
    let people = state.people.lock().unwrap();
    let results = people
        .iter()
        .filter(|p| {
            if q.is_empty() {
                return true;
            }
            let hay = [
                Some(p.name.as_str()),
                p.organization.as_deref(),
                p.role.as_deref(),
                p.email.as_deref(),
            ];
            hay.iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&q))
        })
        .cloned()
        .collect();
    Json(results)
}

#[derive(Deserialize)]
struct ExistsParams {
    email: String,
}

async fn check_profile_exists(
    State(state): State<BackendState>,
    Query(params): Query<ExistsParams>,
) -> Json<Value> {
    let wanted = params.email.trim().to_lowercase();
    let exists = state.people.lock().unwrap().iter().any(|p| {
        p.email
            .as_deref()
            .is_some_and(|e| e.trim().to_lowercase() == wanted)
    });
    Json(json!({ "exists": exists }))
}

async fn organizations(State(state): State<BackendState>) -> Json<Vec<String>> {
    let mut orgs: Vec<String> = state
        .people
        .lock()
        .unwrap()
        .iter()
        .filter_map(|p| p.organization.clone())
        .collect();
    orgs.sort();
    orgs.dedup();
    Json(orgs)
}

#[derive(Deserialize)]
struct NearbyParams {
    lat: f64,
    lon: f64,
    #[serde(default = "default_radius")]
    radius: f64,
    #[serde(default)]
    organization: Option<String>,
}

fn default_radius() -> f64 {
    10.0
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r = 6371.0;
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * r * a.sqrt().atan2((1.0 - a).sqrt())
}

async fn nearby(
    State(state): State<BackendState>,
    Query(params): Query<NearbyParams>,
) -> Json<Vec<Participant>> {
    let people = state.people.lock().unwrap();
    let mut results: Vec<Participant> = people
        .iter()
        .filter(|p| {
            params.organization.as_deref().map_or(true, |org| {
                p.organization
                    .as_deref()
                    .is_some_and(|o| o.eq_ignore_ascii_case(org))
            })
        })
        .filter_map(|p| {
            let (lat, lon) = (p.latitude?, p.longitude?);
            let distance = haversine_km(params.lat, params.lon, lat, lon);
            (distance <= params.radius).then(|| {
                let mut hit = p.clone();
                hit.distance_km = Some((distance * 100.0).round() / 100.0);
                hit
            })
        })
        .collect();
    results.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap());
    Json(results)
}

#[derive(Deserialize)]
struct HistoryParams {
    user1: String,
    user2: String,
}

async fn chat_history(
    State(state): State<BackendState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, Json<Value>)> {
    if state.history_fails.load(Ordering::SeqCst) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "history store offline" })),
        ));
    }
    let (user1, user2): (ParticipantId, ParticipantId) =
        (params.user1.as_str().into(), params.user2.as_str().into());
    let messages = state
        .history
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.involves(&user1, &user2))
        .cloned()
        .collect();
    Ok(Json(messages))
}

async fn submit(
    State(state): State<BackendState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    for field in ["name", "email", "organization"] {
        let missing = body
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("")
            .is_empty();
        if missing {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("{field} is required") })),
            ));
        }
    }

    let organization = if body["organization"] == "other" {
        body.get("new_organization")
            .and_then(Value::as_str)
            .unwrap_or("other")
            .to_string()
    } else {
        body["organization"].as_str().unwrap().to_string()
    };

    let mut people = state.people.lock().unwrap();
    let id = (people.len() + 1).to_string();
    people.push(Participant {
        id: id.as_str().into(),
        name: body["name"].as_str().unwrap().to_string(),
        email: Some(body["email"].as_str().unwrap().to_string()),
        phone: body.get("phone").and_then(Value::as_str).map(String::from),
        photo_url: body
            .get("photo_url")
            .and_then(Value::as_str)
            .map(String::from),
        latitude: body.get("latitude").and_then(Value::as_f64),
        longitude: body.get("longitude").and_then(Value::as_f64),
        organization: Some(organization),
        role: body.get("role").and_then(Value::as_str).map(String::from),
        distance_km: None,
    });
    Ok(Json(json!({ "message": "Successfully added user data" })))
}

// ---------------------------------------------------------------------------
// WebSocket surface
// ---------------------------------------------------------------------------

async fn ws_handler(State(state): State<BackendState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    state.ws_connections_seen.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BackendState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel::<String>();
    let id = state.next_connection_id.fetch_add(1, Ordering::SeqCst);
    state.connections.lock().unwrap().push(Connection {
        id,
        room: None,
        tx,
    });

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                // Sender dropped: the kill switch fired.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(txt))) => handle_client_event(&txt, id, &state),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.connections.lock().unwrap().retain(|c| c.id != id);
}

fn handle_client_event(raw: &str, connection_id: u64, state: &BackendState) {
    let Ok(event) = serde_json::from_str::<ClientEvent>(raw) else {
        return;
    };
    match event {
        ClientEvent::JoinRoom { user1, user2 } => {
            let room = canonical_room(&user1, &user2);
            let mut connections = state.connections.lock().unwrap();
            if let Some(connection) = connections.iter_mut().find(|c| c.id == connection_id) {
                connection.room = Some(room.clone());
                let ack = serde_json::to_string(&ServerEvent::JoinedRoom { room }).unwrap();
                let _ = connection.tx.send(ack);
            }
        }
        ClientEvent::SendMessage { message } => {
            state.history.lock().unwrap().push(message.clone());
            let room = canonical_room(&message.sender_id, &message.receiver_id);
            let frame = serde_json::to_string(&ServerEvent::ReceiveMessage { message }).unwrap();
            for connection in state
                .connections
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.room.as_deref() == Some(room.as_str()))
            {
                let _ = connection.tx.send(frame.clone());
            }
        }
    }
}
