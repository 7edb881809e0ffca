//! Change feed over the realtime service's Phoenix channel protocol.
//!
//! One websocket carries one channel joined to `realtime:public:<table>` with
//! a `postgres_changes` INSERT filter. Join replies and system events become
//! [`ChannelStatus`] signals; inserted rows are surfaced as raw JSON so the
//! caller decides what a bad payload means.

use std::time::Duration;

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

use mailbrief_core::lifecycle::ChannelStatus;

use crate::client::StoreClient;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("realtime connect failed: {0}")]
    Connect(String),
    #[error("realtime send failed: {0}")]
    Send(String),
    #[error("realtime read failed: {0}")]
    Receive(String),
    #[error("no realtime channel is open")]
    NotSubscribed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChangeSignal {
    Status(ChannelStatus),
    Insert(Value),
}

#[async_trait]
pub trait ChangeFeedTransport: Send + Sync {
    /// Opens the connection and requests the INSERT subscription. The
    /// outcome of the request arrives later as a status signal.
    async fn subscribe(&self, table: &str) -> Result<(), TransportError>;

    /// `Ok(None)` means the underlying stream ended.
    async fn next_signal(&self) -> Result<Option<ChangeSignal>, TransportError>;

    /// Tears down whatever is open. Never fails.
    async fn unsubscribe(&self);
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize, Deserialize)]
struct PhoenixFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

struct Channel {
    socket: Socket,
    topic: String,
    join_ref: String,
    next_ref: u64,
    heartbeat: Interval,
    join_deadline: Option<Instant>,
}

impl Channel {
    fn next_reference(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn send(&mut self, frame: &PhoenixFrame) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(frame).map_err(|error| TransportError::Send(error.to_string()))?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| TransportError::Send(error.to_string()))
    }
}

pub struct PhoenixRealtimeTransport {
    url: String,
    access_token: SecretString,
    heartbeat_interval: Duration,
    join_timeout: Duration,
    channel: Mutex<Option<Channel>>,
}

impl PhoenixRealtimeTransport {
    pub fn new(client: &StoreClient) -> Self {
        Self {
            url: client.realtime_url(),
            access_token: client.api_key().clone(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            join_timeout: JOIN_TIMEOUT,
            channel: Mutex::new(None),
        }
    }

    pub fn with_timing(mut self, heartbeat_interval: Duration, join_timeout: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self.join_timeout = join_timeout;
        self
    }
}

#[async_trait]
impl ChangeFeedTransport for PhoenixRealtimeTransport {
    async fn subscribe(&self, table: &str) -> Result<(), TransportError> {
        let mut guard = self.channel.lock().await;
        if let Some(previous) = guard.take() {
            close_channel(previous).await;
        }

        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        info!(event_name = "store.realtime.connected", table, "realtime socket connected");

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + self.heartbeat_interval, self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let topic = channel_topic(table);
        let mut channel = Channel {
            socket,
            topic: topic.clone(),
            join_ref: "1".to_string(),
            next_ref: 1,
            heartbeat,
            join_deadline: Some(Instant::now() + self.join_timeout),
        };
        channel.send(&join_frame(&topic, table, &channel.join_ref, &self.access_token)).await?;
        debug!(event_name = "store.realtime.join_sent", topic = %topic, "join requested");

        *guard = Some(channel);
        Ok(())
    }

    async fn next_signal(&self) -> Result<Option<ChangeSignal>, TransportError> {
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return Err(TransportError::NotSubscribed);
        };

        loop {
            let join_deadline = channel.join_deadline;
            tokio::select! {
                _ = channel.heartbeat.tick() => {
                    let reference = channel.next_reference();
                    channel.send(&heartbeat_frame(reference)).await?;
                }
                _ = join_timer(join_deadline) => {
                    channel.join_deadline = None;
                    return Ok(Some(ChangeSignal::Status(ChannelStatus::TimedOut)));
                }
                message = channel.socket.next() => {
                    let text = match message {
                        None => return Ok(None),
                        Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                        Some(Ok(Message::Close(_))) => {
                            return Ok(Some(ChangeSignal::Status(ChannelStatus::Closed)));
                        }
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(_)) => continue,
                    };

                    let frame: PhoenixFrame = match serde_json::from_str(text.as_str()) {
                        Ok(frame) => frame,
                        Err(error) => {
                            warn!(
                                event_name = "store.realtime.frame_invalid",
                                error = %error,
                                "ignoring undecodable realtime frame"
                            );
                            continue;
                        }
                    };

                    if let Some(signal) = decode_frame(&frame, &channel.topic, &channel.join_ref) {
                        if matches!(signal, ChangeSignal::Status(_)) {
                            channel.join_deadline = None;
                        }
                        return Ok(Some(signal));
                    }
                }
            }
        }
    }

    async fn unsubscribe(&self) {
        if let Some(channel) = self.channel.lock().await.take() {
            close_channel(channel).await;
        }
    }
}

async fn join_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn close_channel(mut channel: Channel) {
    let reference = channel.next_reference();
    let leave = PhoenixFrame {
        topic: channel.topic.clone(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference),
        join_ref: Some(channel.join_ref.clone()),
    };
    if let Err(error) = channel.send(&leave).await {
        debug!(event_name = "store.realtime.leave_failed", error = %error, "leave not sent");
    }
    if let Err(error) = channel.socket.close(None).await {
        debug!(event_name = "store.realtime.close_failed", error = %error, "socket close failed");
    }
    info!(event_name = "store.realtime.torn_down", topic = %channel.topic, "realtime channel closed");
}

fn channel_topic(table: &str) -> String {
    format!("realtime:public:{table}")
}

fn join_frame(topic: &str, table: &str, join_ref: &str, access_token: &SecretString) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "INSERT", "schema": "public", "table": table }
                ],
                "private": false
            },
            "access_token": access_token.expose_secret(),
        }),
        reference: Some(join_ref.to_string()),
        join_ref: Some(join_ref.to_string()),
    }
}

fn heartbeat_frame(reference: String) -> PhoenixFrame {
    PhoenixFrame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference),
        join_ref: None,
    }
}

fn decode_frame(frame: &PhoenixFrame, topic: &str, join_ref: &str) -> Option<ChangeSignal> {
    if frame.topic != topic {
        return None;
    }

    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(join_ref) => {
            let status = frame.payload.get("status").and_then(Value::as_str).unwrap_or("error");
            if status == "ok" {
                Some(ChangeSignal::Status(ChannelStatus::Subscribed))
            } else {
                let reason = frame
                    .payload
                    .pointer("/response/reason")
                    .and_then(Value::as_str)
                    .unwrap_or(status);
                Some(ChangeSignal::Status(ChannelStatus::ChannelError(reason.to_string())))
            }
        }
        "phx_error" => Some(ChangeSignal::Status(ChannelStatus::ChannelError(
            "channel process crashed".to_string(),
        ))),
        "phx_close" => Some(ChangeSignal::Status(ChannelStatus::Closed)),
        "system" => {
            let status = frame.payload.get("status").and_then(Value::as_str);
            if status == Some("error") {
                let message = frame
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("system error");
                Some(ChangeSignal::Status(ChannelStatus::ChannelError(message.to_string())))
            } else {
                None
            }
        }
        "postgres_changes" => {
            let data = frame.payload.get("data")?;
            let change = data.get("type").or_else(|| data.get("eventType"))?.as_str()?;
            if change.eq_ignore_ascii_case("INSERT") {
                data.get("record").cloned().map(ChangeSignal::Insert)
            } else {
                None
            }
        }
        "INSERT" => frame.payload.get("record").cloned().map(ChangeSignal::Insert),
        _ => None,
    }
}
