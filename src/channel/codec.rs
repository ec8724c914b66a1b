//! Native messaging framing: a 32-bit little-endian length, then that many
//! bytes of UTF-8 JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::ChannelError;

/// Hosts may not send more than 1 MiB in a single message
pub const MAX_INBOUND_FRAME: usize = 1024 * 1024;

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len()).map_err(|_| ChannelError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. EOF before the length prefix means the peer closed the channel.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, ChannelError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut header).await {
        return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ChannelError::Closed
        } else {
            e.into()
        });
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_len {
        return Err(ChannelError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload).await
}

pub async fn read_json<R, T>(reader: &mut R, max_len: usize) -> Result<T, ChannelError>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let payload = read_frame(reader, max_len).await?;
    Ok(serde_json::from_slice(&payload)?)
}
