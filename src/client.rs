use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::lookup_host,
    select, signal,
    sync::{mpsc, watch},
    task::JoinHandle,
    time,
};
use tracing::{debug, warn};

use crate::{cli::ClientArgs, config::Config, sender::ChatSender, subscriber::FeedSubscriber};

/// Outgoing lines queued between the input pump and the sender.
const INPUT_QUEUE: usize = 32;

/// Formatted updates queued between the subscriber and the display pump.
const DISPLAY_QUEUE: usize = 64;

/// How long background tasks get to wind down after shutdown.
const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Wires the client together: the resilient sender and the feed
/// subscriber each run on their own task, handing off to the terminal
/// through two single-producer queues. The pieces share one shutdown
/// signal and are joined at teardown.
pub async fn run(args: ClientArgs, config: Config) -> Result<()> {
    let chat_addr = resolve(&config.chat_addr()).await?;
    let feed_addr = resolve(&config.feed_addr()).await?;

    let (input_tx, input_rx) = mpsc::channel::<String>(INPUT_QUEUE);
    let (display_tx, display_rx) = mpsc::channel::<String>(DISPLAY_QUEUE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sender = ChatSender::connect(args.username.clone(), chat_addr, input_rx).await?;
    let subscriber = FeedSubscriber::new(feed_addr, display_tx);

    let mut sender_task = tokio::spawn(sender.run_until(on_shutdown(shutdown_rx.clone())));
    let mut feed_task = tokio::spawn(subscriber.run_until(on_shutdown(shutdown_rx)));
    let mut display_task = tokio::spawn(pump_display(display_rx));
    let mut input_task = tokio::spawn(pump_input(input_tx));

    select! {
        result = &mut input_task => match result {
            Ok(Ok(())) => debug!("input closed"),
            Ok(Err(error)) => warn!(%error, "input pump failed"),
            Err(join_error) => warn!(%join_error, "input pump did not finish cleanly"),
        },
        ctrl_c = signal::ctrl_c() => {
            if let Err(error) = ctrl_c {
                warn!(%error, "ctrl-c handler failed");
            }
        }
    }

    let _ = shutdown_tx.send(true);
    input_task.abort();
    join_with_grace(&mut sender_task, "chat sender").await;
    join_with_grace(&mut feed_task, "feed subscriber").await;
    join_with_grace(&mut display_task, "display pump").await;

    Ok(())
}

/// Stdin to the input queue, one trimmed line at a time. EOF ends the
/// client's session.
async fn pump_input(input: mpsc::Sender<String>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        line.clear();
        let bytes = lines
            .read_line(&mut line)
            .await
            .context("failed to read from stdin")?;
        if bytes == 0 {
            return Ok(());
        }
        let text = line.trim_end_matches(['\n', '\r']);
        if text.is_empty() {
            continue;
        }
        if input.send(text.to_string()).await.is_err() {
            return Ok(());
        }
    }
}

/// Display queue to stdout, one update per line.
async fn pump_display(mut updates: mpsc::Receiver<String>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(update) = updates.recv().await {
        stdout.write_all(update.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn on_shutdown(mut signal: watch::Receiver<bool>) {
    // A closed channel counts as shutdown too.
    let _ = signal.wait_for(|stop| *stop).await;
}

async fn join_with_grace(task: &mut JoinHandle<Result<()>>, name: &str) {
    match time::timeout(TEARDOWN_GRACE, &mut *task).await {
        Ok(Ok(Ok(()))) => debug!("{name} stopped"),
        Ok(Ok(Err(error))) => warn!(%error, "{name} ended with error"),
        Ok(Err(join_error)) => warn!(%join_error, "{name} did not finish cleanly"),
        Err(_) => {
            warn!("{name} did not stop within {TEARDOWN_GRACE:?}; aborting it");
            task.abort();
        }
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr> {
    lookup_host(addr)
        .await
        .with_context(|| format!("failed to resolve {addr}"))?
        .next()
        .with_context(|| format!("no addresses for {addr}"))
}
