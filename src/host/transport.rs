use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AppError, Result};

/// Largest frame the browser may send.
pub const MAX_INCOMING: usize = 64 * 1024 * 1024;
/// Largest frame the browser accepts from a host.
pub const MAX_OUTGOING: usize = 1024 * 1024;

/// Read one length-prefixed frame. `Ok(None)` means the browser closed the
/// pipe between frames.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_le_bytes(header) as usize;
    if length > MAX_INCOMING {
        return Err(AppError::Protocol(format!(
            "Incoming message of {} bytes exceeds the {} byte limit",
            length, MAX_INCOMING
        )));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_OUTGOING {
        return Err(AppError::Protocol(format!(
            "Outgoing message of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_OUTGOING
        )));
    }

    writer
        .write_all(&(payload.len() as u32).to_le_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
