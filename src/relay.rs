use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    select,
    sync::{broadcast, mpsc, oneshot},
};
use tracing::{debug, info, warn};

use crate::message::{self, ChatMessage, ACK, NACK};

/// Broadcast buffer depth; a feed connection further behind than this
/// skips the overwritten messages.
const FEED_BUFFER: usize = 128;

/// Inbound requests queued ahead of the relay loop.
const REQUEST_QUEUE: usize = 32;

/// The central relay: one synchronous chat endpoint, one broadcast feed
/// endpoint. Every request is acknowledged before its message is fanned
/// out, and all requests pass through a single sequential loop, so the
/// broadcast order every subscriber sees is the acceptance order.
pub struct Relay {
    chat_listener: TcpListener,
    feed_listener: TcpListener,
    broadcaster: broadcast::Sender<ChatMessage>,
}

/// One not-yet-decoded request line plus the slot its reply byte goes to.
struct InboundRequest {
    raw: String,
    reply: oneshot::Sender<u8>,
}

impl Relay {
    /// Binds both endpoints. The relay never runs partially bound; if
    /// either address is taken the error propagates and the server must
    /// not start.
    pub async fn bind<A, B>(chat_addr: A, feed_addr: B) -> Result<Self>
    where
        A: ToSocketAddrs,
        B: ToSocketAddrs,
    {
        let chat_listener = TcpListener::bind(chat_addr)
            .await
            .context("failed to bind chat endpoint")?;
        let feed_listener = TcpListener::bind(feed_addr)
            .await
            .context("failed to bind feed endpoint")?;
        let (broadcaster, _) = broadcast::channel(FEED_BUFFER);
        Ok(Self {
            chat_listener,
            feed_listener,
            broadcaster,
        })
    }

    pub fn chat_addr(&self) -> std::io::Result<SocketAddr> {
        self.chat_listener.local_addr()
    }

    pub fn feed_addr(&self) -> std::io::Result<SocketAddr> {
        self.feed_listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Relay {
            chat_listener,
            feed_listener,
            broadcaster,
        } = self;
        let (requests_tx, mut requests_rx) = mpsc::channel::<InboundRequest>(REQUEST_QUEUE);
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                accepted = chat_listener.accept() => {
                    handle_chat_accept(accepted, &requests_tx);
                }
                accepted = feed_listener.accept() => {
                    handle_feed_accept(accepted, &broadcaster);
                }
                request = requests_rx.recv() => match request {
                    Some(request) => relay_request(request, &broadcaster),
                    None => break,
                },
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_chat_accept(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    requests: &mpsc::Sender<InboundRequest>,
) {
    match result {
        Ok((stream, peer)) => {
            debug!(%peer, "chat client connected");
            let requests = requests.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_chat_connection(stream, requests).await {
                    debug!(%peer, error = ?err, "chat connection closed with error");
                }
            });
        }
        Err(err) => warn!(error = ?err, "failed to accept chat connection"),
    }
}

fn handle_feed_accept(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    broadcaster: &broadcast::Sender<ChatMessage>,
) {
    match result {
        Ok((stream, peer)) => {
            // Subscribe before handing off; the connection sees every
            // message published from this point on, and nothing earlier.
            let feed = broadcaster.subscribe();
            info!(%peer, "feed subscriber connected");
            tokio::spawn(async move {
                if let Err(err) = serve_feed_connection(stream, feed).await {
                    debug!(%peer, error = ?err, "feed connection closed with error");
                }
            });
        }
        Err(err) => warn!(error = ?err, "failed to accept feed connection"),
    }
}

/// Reads one request line at a time and writes the reply byte back before
/// reading the next, keeping the wire exchange strictly alternating.
async fn serve_chat_connection(
    stream: TcpStream,
    requests: mpsc::Sender<InboundRequest>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let raw = line.trim_end_matches(['\n', '\r']);
        if raw.is_empty() {
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = InboundRequest {
            raw: raw.to_string(),
            reply: reply_tx,
        };
        if requests.send(request).await.is_err() {
            // Relay loop is gone.
            return Ok(());
        }
        let Ok(ack) = reply_rx.await else {
            return Ok(());
        };
        message::write_ack(&mut writer, ack).await?;
    }
}

/// Handles one accepted request on the relay loop: decode, reply, publish.
/// The reply is dispatched before the broadcast so the sender is unblocked
/// with minimal latency; a request that fails to decode is dropped with an
/// error acknowledgment and the loop carries on.
fn relay_request(request: InboundRequest, broadcaster: &broadcast::Sender<ChatMessage>) {
    let InboundRequest { raw, reply } = request;
    let message = match serde_json::from_str::<ChatMessage>(&raw) {
        Ok(message) => message,
        Err(error) => {
            warn!(%error, "dropping malformed chat request");
            let _ = reply.send(NACK);
            return;
        }
    };

    let _ = reply.send(ACK);
    debug!(username = %message.username, "relaying message");
    if broadcaster.send(message).is_err() {
        debug!("no feed subscribers connected");
    }
}

async fn serve_feed_connection(
    stream: TcpStream,
    mut feed: broadcast::Receiver<ChatMessage>,
) -> std::io::Result<()> {
    let mut writer = stream;
    loop {
        match feed.recv().await {
            Ok(message) => message::write_message(&mut writer, &message).await?,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "feed subscriber lagging, messages skipped");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
