use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::events::{EventContext, EventDispatcher, Interaction};

/// GUILDS | DIRECT_MESSAGES
pub const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 12);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway send failed: {0}")]
    Send(String),
    #[error("gateway protocol violation: {0}")]
    Protocol(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// `None` retries for the life of the process.
    pub max_retries: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Floor on the wait after the gateway ends a session (op 7 or op 9).
    /// Discord asks for at least a second before identifying again.
    pub session_end_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            session_end_delay_ms: 1_000,
        }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    fn session_end_delay(&self, idle_sessions: u32) -> Duration {
        self.backoff(idle_sessions).max(Duration::from_millis(self.session_end_delay_ms))
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_retries.is_some_and(|max_retries| failures > max_retries)
    }
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` ends the session; the runner reconnects.
    async fn next_interaction(&self) -> Result<Option<Interaction>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Wire frame shared by every gateway opcode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GatewayEvent {
    Hello { heartbeat_interval: Duration },
    Ready { session_id: Option<String> },
    Interaction(Value),
    HeartbeatRequested,
    HeartbeatAck,
    SessionEnded { reason: &'static str },
    Other,
}

pub fn classify(frame: &GatewayFrame) -> GatewayEvent {
    match frame.op {
        OP_HELLO => match frame.d.get("heartbeat_interval").and_then(Value::as_u64) {
            Some(millis) => GatewayEvent::Hello { heartbeat_interval: Duration::from_millis(millis) },
            None => GatewayEvent::Other,
        },
        OP_DISPATCH => match frame.t.as_deref() {
            Some("INTERACTION_CREATE") => GatewayEvent::Interaction(frame.d.clone()),
            Some("READY") => GatewayEvent::Ready {
                session_id: frame.d.get("session_id").and_then(Value::as_str).map(str::to_owned),
            },
            _ => GatewayEvent::Other,
        },
        OP_HEARTBEAT => GatewayEvent::HeartbeatRequested,
        OP_HEARTBEAT_ACK => GatewayEvent::HeartbeatAck,
        OP_RECONNECT => GatewayEvent::SessionEnded { reason: "reconnect requested" },
        OP_INVALID_SESSION => GatewayEvent::SessionEnded { reason: "invalid session" },
        _ => GatewayEvent::Other,
    }
}

pub fn identify_frame(token: &SecretString, intents: u64) -> GatewayFrame {
    GatewayFrame {
        op: OP_IDENTIFY,
        d: json!({
            "token": token.expose_secret(),
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "mailbrief",
                "device": "mailbrief"
            }
        }),
        s: None,
        t: None,
    }
}

pub fn heartbeat_frame(last_sequence: Option<u64>) -> GatewayFrame {
    GatewayFrame {
        op: OP_HEARTBEAT,
        d: last_sequence.map_or(Value::Null, Value::from),
        s: None,
        t: None,
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct GatewaySession {
    socket: Socket,
    heartbeat: Interval,
    last_sequence: Option<u64>,
    awaiting_ack: bool,
}

impl GatewaySession {
    async fn send(&mut self, frame: &GatewayFrame) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(frame).map_err(|error| TransportError::Send(error.to_string()))?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| TransportError::Send(error.to_string()))
    }
}

async fn read_frame(socket: &mut Socket) -> Result<Option<GatewayFrame>, TransportError> {
    loop {
        let text = match socket.next().await {
            None | Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(_)) => continue,
        };
        match serde_json::from_str::<GatewayFrame>(text.as_str()) {
            Ok(frame) => return Ok(Some(frame)),
            Err(error) => warn!(
                event_name = "ingress.discord.frame_invalid",
                error = %error,
                "ignoring undecodable gateway frame"
            ),
        }
    }
}

pub struct DiscordGatewayTransport {
    url: String,
    token: SecretString,
    intents: u64,
    session: Mutex<Option<GatewaySession>>,
}

impl DiscordGatewayTransport {
    pub fn new(url: impl Into<String>, token: SecretString) -> Self {
        Self { url: url.into(), token, intents: DEFAULT_INTENTS, session: Mutex::new(None) }
    }
}

#[async_trait]
impl GatewayTransport for DiscordGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut guard = self.session.lock().await;
        let (mut socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let hello = read_frame(&mut socket)
            .await?
            .ok_or_else(|| TransportError::Protocol("closed before hello".to_owned()))?;
        let GatewayEvent::Hello { heartbeat_interval } = classify(&hello) else {
            return Err(TransportError::Protocol(format!("expected hello, got op {}", hello.op)));
        };

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut session =
            GatewaySession { socket, heartbeat, last_sequence: None, awaiting_ack: false };

        session.send(&identify_frame(&self.token, self.intents)).await?;
        debug!(
            event_name = "ingress.discord.identify_sent",
            heartbeat_ms = heartbeat_interval.as_millis() as u64,
            "gateway identify sent"
        );

        *guard = Some(session);
        Ok(())
    }

    async fn next_interaction(&self) -> Result<Option<Interaction>, TransportError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Err(TransportError::Protocol("not connected".to_owned()));
        };

        loop {
            tokio::select! {
                _ = session.heartbeat.tick() => {
                    if session.awaiting_ack {
                        return Err(TransportError::Receive("heartbeat not acknowledged".to_owned()));
                    }
                    let frame = heartbeat_frame(session.last_sequence);
                    session.send(&frame).await?;
                    session.awaiting_ack = true;
                }
                frame = read_frame(&mut session.socket) => {
                    let Some(frame) = frame? else {
                        return Ok(None);
                    };
                    if frame.s.is_some() {
                        session.last_sequence = frame.s;
                    }

                    match classify(&frame) {
                        GatewayEvent::Interaction(payload) => match Interaction::from_payload(&payload) {
                            Ok(interaction) => return Ok(Some(interaction)),
                            Err(error) => warn!(
                                event_name = "ingress.discord.interaction_invalid",
                                error = %error,
                                "ignoring undecodable interaction"
                            ),
                        },
                        GatewayEvent::Ready { session_id } => info!(
                            event_name = "ingress.discord.ready",
                            session_id = session_id.as_deref().unwrap_or("unknown"),
                            "gateway session ready"
                        ),
                        GatewayEvent::HeartbeatRequested => {
                            let frame = heartbeat_frame(session.last_sequence);
                            session.send(&frame).await?;
                        }
                        GatewayEvent::HeartbeatAck => session.awaiting_ack = false,
                        GatewayEvent::SessionEnded { reason } => {
                            info!(event_name = "ingress.discord.session_ended", reason, "gateway asked to reconnect");
                            return Ok(None);
                        }
                        GatewayEvent::Hello { .. } | GatewayEvent::Other => {}
                    }
                }
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.socket.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), reconnect_policy }
    }

    /// Runs until retries are exhausted, or forever without a retry cap.
    ///
    /// A session the gateway ends is still followed by a wait. Only a session
    /// that delivered interactions resets the count; sessions that end empty
    /// back off like failures but never exhaust the budget.
    pub async fn start(&self) {
        let mut failures: u32 = 0;
        loop {
            match self.connect_and_pump(failures).await {
                Ok(delivered) => {
                    if delivered > 0 {
                        failures = 0;
                    }
                    let delay = self.reconnect_policy.session_end_delay(failures);
                    if delivered == 0 {
                        failures = failures.saturating_add(1);
                    }
                    info!(
                        event_name = "ingress.discord.reconnect_scheduled",
                        delivered,
                        delay_ms = delay.as_millis() as u64,
                        "gateway session ended; waiting before identifying again"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(transport_error) => {
                    warn!(
                        event_name = "ingress.discord.transport_failed",
                        attempt = failures,
                        max_retries = ?self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );
                    if let Err(error) = self.transport.disconnect().await {
                        debug!(event_name = "ingress.discord.disconnect_failed", error = %error, "disconnect after failure failed");
                    }

                    failures += 1;
                    if self.reconnect_policy.exhausted(failures) {
                        warn!(
                            event_name = "ingress.discord.retries_exhausted",
                            max_retries = ?self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return;
                    }

                    let delay = self.reconnect_policy.backoff(failures - 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Returns how many interactions the session delivered before it ended.
    async fn connect_and_pump(&self, attempt: u32) -> Result<usize, TransportError> {
        info!(event_name = "ingress.discord.connecting", attempt, "opening gateway connection");
        self.transport.connect().await?;
        info!(event_name = "ingress.discord.connected", attempt, "gateway connected");

        let mut delivered = 0;
        loop {
            let Some(interaction) = self.transport.next_interaction().await? else {
                info!(event_name = "ingress.discord.stream_closed", attempt, delivered, "gateway stream closed");
                self.transport.disconnect().await?;
                return Ok(delivered);
            };
            delivered += 1;

            info!(
                event_name = "ingress.discord.interaction_received",
                correlation_id = %interaction.id,
                event_type = ?interaction.kind.event_type(),
                "received interaction"
            );

            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let context = EventContext::for_interaction(&interaction);
                if let Err(error) = dispatcher.dispatch(&interaction, &context).await {
                    warn!(
                        event_name = "ingress.discord.dispatch_failed",
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "interaction dispatch failed; continuing gateway loop"
                    );
                }
            });
        }
    }
}
