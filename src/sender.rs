use std::{future::Future, net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use tokio::{net::TcpStream, select, sync::mpsc, time};
use tracing::{debug, info, warn};

use crate::message::{self, ChatMessage};

/// How long a sent message may wait for its ack before the session is
/// declared dead.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Pause between connection attempts while replacing a dead session.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Liveness of the synchronous chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready to send the next message.
    Connected,
    /// A message is in flight; nothing may be sent until its reply arrives.
    AwaitingReply,
    /// The channel missed a reply or hit an I/O error; this socket must
    /// not be used again.
    Disconnected,
}

/// One live connection to the chat endpoint. The wire exchange alternates
/// strictly: one send, then one reply. A session that reaches
/// `Disconnected` is dropped whole and replaced with a fresh connection.
pub struct Session {
    stream: TcpStream,
    state: SessionState,
}

impl Session {
    pub async fn connect(server: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(server).await?;
        Ok(Self {
            stream,
            state: SessionState::Connected,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transmits one message. Legal only while `Connected`.
    pub async fn send(&mut self, message: &ChatMessage) -> std::io::Result<()> {
        if self.state != SessionState::Connected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "send while a reply is pending",
            ));
        }
        match message::write_message(&mut self.stream, message).await {
            Ok(()) => {
                self.state = SessionState::AwaitingReply;
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Consumes the pending reply byte, returning the session to
    /// `Connected`. Legal only while `AwaitingReply`.
    pub async fn await_ack(&mut self) -> std::io::Result<u8> {
        if self.state != SessionState::AwaitingReply {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "no reply is pending",
            ));
        }
        match message::read_ack(&mut self.stream).await {
            Ok(ack) => {
                self.state = SessionState::Connected;
                Ok(ack)
            }
            Err(err) => {
                self.state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Marks a session whose reply never arrived. The owner must drop it
    /// and connect a replacement before sending again.
    pub fn mark_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
    }
}

/// Client side of the send channel: pulls outgoing lines from the input
/// queue and performs one full send, then ack-or-reconnect, per message,
/// never more than one in flight. A missed ack costs that one message;
/// the sender itself never blocks past the timeout.
pub struct ChatSender {
    username: String,
    server: SocketAddr,
    outbox: mpsc::Receiver<String>,
    session: Session,
    ack_timeout: Duration,
}

impl ChatSender {
    /// Establishes the initial session. Failure here is the caller's to
    /// treat as fatal; only post-timeout reconnects retry.
    pub async fn connect(
        username: String,
        server: SocketAddr,
        outbox: mpsc::Receiver<String>,
    ) -> Result<Self> {
        let session = Session::connect(server)
            .await
            .with_context(|| format!("failed to connect to chat endpoint {server}"))?;
        info!("chat channel connected to {server}");
        Ok(Self {
            username,
            server,
            outbox,
            session,
            ack_timeout: ACK_TIMEOUT,
        })
    }

    /// Overrides the ack timeout; tests shorten it.
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// Runs the submission loop until the input queue closes or the
    /// shutdown future completes. Shutdown is observed between delivery
    /// cycles; within a cycle the only bounded wait is the ack timer.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                next = self.outbox.recv() => match next {
                    Some(text) => self.submit(text).await,
                    None => break,
                },
            }
        }

        Ok(())
    }

    /// One delivery cycle. On timeout or socket error the message is
    /// reported lost, never retried, and the session is replaced.
    async fn submit(&mut self, text: String) {
        let message = ChatMessage {
            username: self.username.clone(),
            message: text,
        };

        if let Err(error) = self.session.send(&message).await {
            warn!(%error, "chat channel write failed; message lost");
            self.replace_session().await;
            return;
        }

        match time::timeout(self.ack_timeout, self.session.await_ack()).await {
            Ok(Ok(_ack)) => {}
            Ok(Err(error)) => {
                warn!(%error, "chat channel failed while awaiting ack; message lost");
                self.replace_session().await;
            }
            Err(_elapsed) => {
                warn!(timeout = ?self.ack_timeout, "no ack from server; message lost");
                self.session.mark_disconnected();
                self.replace_session().await;
            }
        }
    }

    /// Dials a brand-new connection to stand in for the dead session,
    /// retrying until one is established. The old socket is closed on
    /// replacement and never reused.
    async fn replace_session(&mut self) {
        loop {
            match Session::connect(self.server).await {
                Ok(fresh) => {
                    self.session = fresh;
                    info!("chat channel reconnected to {}", self.server);
                    return;
                }
                Err(error) => {
                    debug!(%error, "reconnect attempt failed");
                    time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
}
