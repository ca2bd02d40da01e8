use std::{future::Future, net::SocketAddr, time::Duration};

use anyhow::Result;
use tokio::{io::BufReader, net::TcpStream, select, sync::mpsc, time};
use tracing::{debug, info, warn};

use crate::message::{self, ChatMessage};

/// Pause between feed connection attempts after a drop.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Why a feed session ended.
enum FeedDisposition {
    /// The server closed the stream; subscribe again after a delay.
    Resubscribe,
    /// The display side is gone; stop for good.
    Stop,
}

/// Client side of the broadcast channel: keeps one subscription alive and
/// forwards every received message to the display queue, unfiltered. A
/// dropped feed is retried on a fixed delay rather than left dead.
pub struct FeedSubscriber {
    server: SocketAddr,
    updates: mpsc::Sender<String>,
    reconnect_delay: Duration,
}

impl FeedSubscriber {
    pub fn new(server: SocketAddr, updates: mpsc::Sender<String>) -> Self {
        Self {
            server,
            updates,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Overrides the reconnect delay; tests shorten it.
    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let outcome = select! {
                _ = &mut shutdown => break,
                result = self.run_session() => result,
            };
            match outcome {
                Ok(FeedDisposition::Stop) => break,
                Ok(FeedDisposition::Resubscribe) => {
                    debug!("feed connection closed; resubscribing")
                }
                Err(error) => warn!(%error, "feed connection lost; resubscribing"),
            }
            select! {
                _ = &mut shutdown => break,
                _ = time::sleep(self.reconnect_delay) => {}
            }
        }

        Ok(())
    }

    /// One subscription: connect, then forward updates until the feed or
    /// the display queue goes away.
    async fn run_session(&self) -> std::io::Result<FeedDisposition> {
        let stream = TcpStream::connect(self.server).await?;
        info!("feed subscription established to {}", self.server);
        let mut reader = BufReader::new(stream);

        loop {
            match message::read_message(&mut reader).await? {
                Some(update) => {
                    let line = format!("{}:{}", update.username, update.message);
                    if self.updates.send(line).await.is_err() {
                        return Ok(FeedDisposition::Stop);
                    }
                }
                None => return Ok(FeedDisposition::Resubscribe),
            }
        }
    }
}
