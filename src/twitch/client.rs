use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::error::{Result, TwitchError};
use super::messages::{parse_privmsg, ChatMessage};
use crate::config::Settings;
use crate::webhook::WebhookForwarder;

const TWITCH_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const OUTBOUND_QUEUE_SIZE: usize = 64;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connection state observed by the health check.
///
/// Written only by the chat client's own run loop; everyone else reads.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub connected: bool,
    /// Attempt counter kept as bookkeeping; no code path compares it.
    pub reconnect_attempts: u32,
}

/// An outbound send request from the control API into the run loop.
struct Outbound {
    channel: String,
    text: String,
    reply: oneshot::Sender<bool>,
}

/// Cloneable capability handle over the running chat client.
///
/// Wraps the transport behind a command channel instead of exposing it;
/// the control API only ever sees this surface.
#[derive(Clone)]
pub struct ChatHandle {
    outbound_tx: mpsc::Sender<Outbound>,
    state: Arc<RwLock<ConnectionState>>,
    channel: String,
    nick: String,
}

impl ChatHandle {
    /// Whether the client currently holds an authenticated connection.
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    /// Snapshot of the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// The bot nickname, as configured.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Sends a chat message to the given channel.
    ///
    /// Every failure path collapses to `false`: unknown channel, client not
    /// running, or a transport error on the write. Never panics or raises.
    pub async fn send(&self, channel: &str, text: &str) -> bool {
        let target = channel.trim_start_matches('#');
        if !target.eq_ignore_ascii_case(self.channel.trim_start_matches('#')) {
            log::warn!("channel not joined: {}", channel);
            return false;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Outbound {
            channel: self.channel.clone(),
            text: text.to_string(),
            reply: reply_tx,
        };

        if self.outbound_tx.send(request).await.is_err() {
            log::error!("chat client not running, dropping send to #{}", target);
            return false;
        }

        reply_rx.await.unwrap_or(false)
    }
}

/// How a single connection session ended.
enum SessionEnd {
    /// The shutdown token flipped; do not reconnect.
    Shutdown,
    /// The server closed the connection or the stream ended.
    Disconnected,
}

/// What to do with one inbound IRC line.
enum LineAction {
    /// Reply to a server PING.
    Pong,
    /// Forward a chat message to the webhook.
    Forward(ChatMessage),
    /// Nothing to do.
    None,
}

/// Actions produced by the session loop's `select!` branches.
///
/// Decouples the `select!` block (which borrows individual fields) from the
/// handling code (which needs `&mut self` and the write half).
enum SessionAction {
    /// A text frame arrived from the IRC stream.
    Text(String),
    /// The peer sent a WebSocket ping frame.
    PingFrame(Vec<u8>),
    /// The connection closed or the stream ended.
    Closed,
    /// The WebSocket reported an error.
    StreamError(TwitchError),
    /// An outbound send request arrived from the control API.
    Outbound(Outbound),
    /// The shutdown token may have flipped.
    ShutdownCheck,
}

/// Twitch chat client: one persistent IRC-over-WebSocket connection to a
/// single channel, forwarding every inbound message to the webhook and
/// dispatching outbound sends from the control API.
pub struct ChatClient {
    settings: &'static Settings,
    forwarder: Option<WebhookForwarder>,
    state: Arc<RwLock<ConnectionState>>,
    outbound_rx: mpsc::Receiver<Outbound>,
}

impl ChatClient {
    /// Creates the client and its control-API handle.
    pub fn new(settings: &'static Settings, forwarder: WebhookForwarder) -> (Self, ChatHandle) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let state = Arc::new(RwLock::new(ConnectionState::default()));

        let handle = ChatHandle {
            outbound_tx,
            state: state.clone(),
            channel: settings.twitch_channel.clone(),
            nick: settings.twitch_bot_nick.clone(),
        };

        let client = Self {
            settings,
            forwarder: Some(forwarder),
            state,
            outbound_rx,
        };

        (client, handle)
    }

    /// Connects and serves until the shutdown token flips.
    ///
    /// Reconnects after a disconnect with a fixed short delay; the attempt
    /// counter is updated but never consulted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_session(&mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Disconnected) => {
                    log::warn!("disconnected from twitch chat");
                }
                Err(e) => {
                    log::error!("twitch connection error: {}", e);
                }
            }

            self.mark_disconnected().await;

            tokio::select! {
                _ = sleep(RECONNECT_DELAY) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// One connection lifetime: connect, authenticate, join, then serve.
    async fn run_session(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<SessionEnd> {
        let (ws_stream, _) = connect_async(TWITCH_IRC_URL).await?;
        let (mut write, mut read) = ws_stream.split();

        // The authentication step takes the prefix-stripped token; the IRC
        // PASS line carries the wire-required oauth: prefix.
        let token = self.settings.token_clean();
        send_line(&mut write, "CAP REQ :twitch.tv/tags twitch.tv/commands").await?;
        send_line(&mut write, &format!("PASS oauth:{}", token)).await?;
        send_line(&mut write, &format!("NICK {}", self.settings.twitch_bot_nick)).await?;
        send_line(
            &mut write,
            &format!("JOIN #{}", self.settings.twitch_channel.trim_start_matches('#')),
        )
        .await?;

        let mut outbound_open = true;
        loop {
            let action = tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => SessionAction::Text(text.to_string()),
                    Some(Ok(Message::Ping(payload))) => SessionAction::PingFrame(payload.to_vec()),
                    Some(Ok(Message::Close(_))) | None => SessionAction::Closed,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => SessionAction::StreamError(e.into()),
                },
                request = self.outbound_rx.recv(), if outbound_open => match request {
                    Some(request) => SessionAction::Outbound(request),
                    // All handles dropped; keep serving inbound traffic
                    None => {
                        outbound_open = false;
                        continue;
                    }
                },
                _ = shutdown.changed() => SessionAction::ShutdownCheck,
            };

            match action {
                SessionAction::Text(text) => {
                    for line in text.lines() {
                        match self.handle_line(line).await? {
                            LineAction::Pong => {
                                send_line(&mut write, "PONG :tmi.twitch.tv").await?;
                            }
                            LineAction::Forward(message) => {
                                self.forward(message).await;
                            }
                            LineAction::None => {}
                        }
                    }
                }
                SessionAction::PingFrame(payload) => {
                    write.send(Message::Pong(payload.into())).await?;
                }
                SessionAction::Closed => return Ok(SessionEnd::Disconnected),
                SessionAction::StreamError(e) => return Err(e),
                SessionAction::Outbound(request) => {
                    self.dispatch_send(&mut write, request).await;
                }
                SessionAction::ShutdownCheck => {
                    if *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    /// Classifies one inbound IRC line and updates connection state.
    async fn handle_line(&self, line: &str) -> Result<LineAction> {
        if line.starts_with("PING") {
            return Ok(LineAction::Pong);
        }

        // 001 is the post-login welcome numeric
        if line.split_whitespace().nth(1) == Some("001") {
            let mut state = self.state.write().await;
            state.connected = true;
            state.reconnect_attempts = 0;
            log::info!(
                "connected to twitch chat as {} (channel #{})",
                self.settings.twitch_bot_nick,
                self.settings.twitch_channel
            );
            return Ok(LineAction::None);
        }

        if line.contains("NOTICE") && line.contains("Login authentication failed") {
            return Err(TwitchError::AuthError(
                "login authentication failed".to_string(),
            ));
        }

        if let Some(msg) = parse_privmsg(line) {
            // Never re-forward our own outbound traffic
            if self.is_echo(&msg.username) {
                return Ok(LineAction::None);
            }
            log::debug!("message received from {}", msg.username);
            return Ok(LineAction::Forward(msg.into_chat_message()));
        }

        Ok(LineAction::None)
    }

    fn is_echo(&self, username: &str) -> bool {
        username.eq_ignore_ascii_case(&self.settings.twitch_bot_nick)
    }

    /// Forwards one message to the webhook, in receive order. Delivery
    /// failures are logged inside the forwarder and never reach the
    /// connection loop.
    async fn forward(&self, message: ChatMessage) {
        if let Some(forwarder) = &self.forwarder {
            forwarder.forward(&message).await;
        }
    }

    /// Writes one outbound PRIVMSG and reports the result to the caller.
    async fn dispatch_send(&self, write: &mut WsSink, request: Outbound) {
        let channel = request.channel.trim_start_matches('#');
        let line = format!("PRIVMSG #{} :{}", channel, request.text);
        let sent = match send_line(write, &line).await {
            Ok(()) => {
                log::info!("message sent to #{}", channel);
                true
            }
            Err(e) => {
                log::error!("failed to send chat message: {}", e);
                false
            }
        };
        let _ = request.reply.send(sent);
    }

    async fn mark_disconnected(&self) {
        let mut state = self.state.write().await;
        state.connected = false;
        state.reconnect_attempts += 1;
    }

    /// Releases owned resources. Safe to call more than once, and safe even
    /// if the client never connected.
    async fn shutdown(&mut self) {
        if self.forwarder.take().is_some() {
            log::info!("chat client shut down");
        }
        self.state.write().await.connected = false;
        self.outbound_rx.close();
    }
}

async fn send_line(write: &mut WsSink, line: &str) -> Result<()> {
    if line.starts_with("PASS") {
        log::debug!("sending: PASS ***");
    } else {
        log::debug!("sending: {}", line);
    }
    write
        .send(Message::Text(format!("{}\r\n", line).into()))
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A handle wired to a loopback task that acknowledges every send.
    pub fn acked_handle(channel: &str, nick: &str, connected: bool) -> ChatHandle {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE_SIZE);
        tokio::spawn(async move {
            while let Some(request) = outbound_rx.recv().await {
                let _ = request.reply.send(true);
            }
        });
        ChatHandle {
            outbound_tx,
            state: Arc::new(RwLock::new(ConnectionState {
                connected,
                reconnect_attempts: 0,
            })),
            channel: channel.to_string(),
            nick: nick.to_string(),
        }
    }

    /// A handle whose run loop is gone; every send fails.
    pub fn dead_handle(channel: &str, nick: &str, connected: bool) -> ChatHandle {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(1);
        drop(outbound_rx);
        ChatHandle {
            outbound_tx,
            state: Arc::new(RwLock::new(ConnectionState {
                connected,
                reconnect_attempts: 0,
            })),
            channel: channel.to_string(),
            nick: nick.to_string(),
        }
    }
}
