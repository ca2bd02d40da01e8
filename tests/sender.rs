use std::time::Duration;

use anyhow::{Context, Result};
use relaychat::{
    message::{read_message, write_ack, ChatMessage, ACK},
    sender::ChatSender,
};
use tokio::{
    io::BufReader,
    net::TcpListener,
    sync::{mpsc, oneshot},
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn sender_reconnects_after_missing_ack() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // A server that swallows the first connection's request without ever
    // replying, then serves the replacement connection properly.
    let server = tokio::spawn(async move {
        let (first, _) = listener.accept().await.expect("first accept");
        let mut first_reader = BufReader::new(first);
        let swallowed = read_message(&mut first_reader)
            .await
            .expect("read on first connection")
            .expect("first request");

        let (second, _) = listener.accept().await.expect("second accept");
        let (reader, mut writer) = second.into_split();
        let mut reader = BufReader::new(reader);
        let delivered = read_message(&mut reader)
            .await
            .expect("read on second connection")
            .expect("second request");
        write_ack(&mut writer, ACK).await.expect("ack");

        (swallowed, delivered)
    });

    let (input_tx, input_rx) = mpsc::channel(8);
    let sender = ChatSender::connect("alice".into(), addr, input_rx)
        .await?
        .with_ack_timeout(Duration::from_millis(200));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let sender_task = tokio::spawn(sender.run_until(async move {
        let _ = stop_rx.await;
    }));

    input_tx.send("lost".to_string()).await?;
    input_tx.send("delivered".to_string()).await?;

    // The first message is given up after the timeout; the second flows
    // over the fresh session. Nothing here waits unboundedly.
    let (swallowed, delivered) = timeout(WAIT, server).await.context("server fixture hung")??;
    assert_eq!(
        swallowed,
        ChatMessage {
            username: "alice".into(),
            message: "lost".into(),
        }
    );
    assert_eq!(
        delivered,
        ChatMessage {
            username: "alice".into(),
            message: "delivered".into(),
        }
    );

    let _ = stop_tx.send(());
    timeout(WAIT, sender_task)
        .await
        .context("sender did not stop")???;
    Ok(())
}

#[tokio::test]
async fn at_most_one_message_in_flight() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut order = Vec::new();

        for _ in 0..3 {
            let message = read_message(&mut reader)
                .await
                .expect("read request")
                .expect("request");
            // Nothing else may arrive while this request is unreplied.
            let premature = timeout(Duration::from_millis(100), read_message(&mut reader)).await;
            assert!(
                premature.is_err(),
                "a second request arrived before the first was acknowledged"
            );
            order.push(message.message);
            write_ack(&mut writer, ACK).await.expect("ack");
        }

        order
    });

    let (input_tx, input_rx) = mpsc::channel(8);
    // Queue everything up front; the sender must still serialize.
    for text in ["one", "two", "three"] {
        input_tx.send(text.to_string()).await?;
    }

    let sender = ChatSender::connect("alice".into(), addr, input_rx).await?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let sender_task = tokio::spawn(sender.run_until(async move {
        let _ = stop_rx.await;
    }));

    let order = timeout(WAIT, server).await.context("server fixture hung")??;
    assert_eq!(order, vec!["one", "two", "three"]);

    let _ = stop_tx.send(());
    timeout(WAIT, sender_task)
        .await
        .context("sender did not stop")???;
    Ok(())
}
