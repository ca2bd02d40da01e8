use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Reply byte for an accepted chat request. The same byte is returned for
/// every accepted message, whatever its content or length.
pub const ACK: u8 = 0x00;

/// Reply byte for a request the relay could not decode. The request is
/// dropped, but the sender's synchronous channel is still unblocked.
pub const NACK: u8 = 0x01;

/// One chat message as it travels the wire: a single JSON object per line
/// with exactly these two fields. Re-emitted verbatim on the feed side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
}

/// Reads the next JSON-line message, skipping blank lines. Returns `None`
/// at end of stream; malformed JSON maps to `InvalidData`.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Option<ChatMessage>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(trimmed).map_err(to_io_error)?;
        return Ok(Some(parsed));
    }
}

/// Encodes one message as a JSON line and flushes it so the peer sees it
/// without buffering delay.
pub async fn write_message<W>(writer: &mut W, message: &ChatMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_ack<R>(reader: &mut R) -> io::Result<u8>
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte).await?;
    Ok(byte[0])
}

pub async fn write_ack<W>(writer: &mut W, ack: u8) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[ack]).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn roundtrip_chat_message() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);
        let message = ChatMessage {
            username: "alice".into(),
            message: "hello".into(),
        };

        write_message(&mut writer, &message)
            .await
            .expect("write message");
        let parsed = read_message(&mut reader)
            .await
            .expect("read message")
            .expect("expected message");
        assert_eq!(message, parsed);

        drop(writer);
        let eof = read_message(&mut reader).await.expect("read at eof");
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_invalid_data() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"not json\n").await.expect("write");
        let err = read_message(&mut reader)
            .await
            .expect_err("malformed line should fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let mut reader = BufReader::new(reader);

        writer.write_all(b"\n\r\n").await.expect("write blanks");
        let message = ChatMessage {
            username: "bob".into(),
            message: "hi".into(),
        };
        write_message(&mut writer, &message)
            .await
            .expect("write message");

        let parsed = read_message(&mut reader)
            .await
            .expect("read message")
            .expect("expected message");
        assert_eq!(message, parsed);
    }

    #[tokio::test]
    async fn ack_bytes_roundtrip_and_differ() {
        let (mut writer, mut reader) = tokio::io::duplex(16);

        write_ack(&mut writer, ACK).await.expect("write ack");
        write_ack(&mut writer, NACK).await.expect("write nack");

        assert_eq!(read_ack(&mut reader).await.expect("read ack"), ACK);
        assert_eq!(read_ack(&mut reader).await.expect("read nack"), NACK);
        assert_ne!(ACK, NACK);
    }
}
