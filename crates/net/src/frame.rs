//! Message framing
//!
//! Each message travels as a 4-byte big-endian length followed by that
//! many bytes of JSON. Frames are capped at 1 MiB.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::Message;

const MAX_FRAME_SIZE: u32 = 1024 * 1024;
const HEADER_LEN: usize = 4;

/// A short read means the peer hung up mid-frame
fn closed_on_eof(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
        _ => Error::Io(e),
    }
}

fn checked_len(len: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(0) => Err(Error::Protocol("Empty frame".into())),
        Ok(n) if n <= MAX_FRAME_SIZE => Ok(n),
        _ => Err(Error::Protocol(format!(
            "Frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_SIZE
        ))),
    }
}

/// Header and payload in one buffer
fn encode(msg: &Message) -> Result<Vec<u8>> {
    let payload = msg
        .to_bytes()
        .map_err(|e| Error::Protocol(format!("Cannot encode {}: {}", msg.kind(), e)))?;
    let len = checked_len(payload.len())?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.map_err(closed_on_eof)?;
    let len = checked_len(u32::from_be_bytes(header) as usize)?;

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(closed_on_eof)?;

    Message::from_bytes(&payload).map_err(|e| Error::Protocol(format!("Undecodable frame: {}", e)))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    writer.write_all(&encode(msg)?).await?;
    writer.flush().await?;
    Ok(())
}
