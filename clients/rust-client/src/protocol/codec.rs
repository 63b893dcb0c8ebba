//! Length-delimited framing shared by both ends of a connection.
//!
//! ```text
//! +-----------------+---------------------+
//! | length (u32 BE) | payload (length B)  |
//! +-----------------+---------------------+
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{DriverError, ProtocolErrorKind};

/// Default upper bound on a single frame payload (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

fn check_frame_len(len: u64, max_frame_size: usize) -> Result<(), DriverError> {
    if len > max_frame_size as u64 || len > u64::from(u32::MAX) {
        return Err(DriverError::ProtocolError(ProtocolErrorKind::FrameTooLarge {
            len,
            max: max_frame_size,
        }));
    }
    Ok(())
}

/// Prefix `payload` with its big-endian length.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Vec<u8>, DriverError> {
    check_frame_len(payload.len() as u64, max_frame_size)?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Write one frame as a single buffered write followed by a flush.
///
/// Size is checked before anything touches the stream, so a rejected frame
/// leaves the connection in sync.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin,
{
    let data = encode_frame(payload, max_frame_size)?;
    writer
        .write_all(&data)
        .await
        .map_err(|e| DriverError::ConnectionError(format!("Write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| DriverError::ConnectionError(format!("Flush failed: {}", e)))?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
/// A stream that ends inside a frame yields `IncompleteFrame`; a declared
/// length above `max_frame_size` yields `FrameTooLarge` without reading or
/// allocating the payload.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Vec<u8>>, DriverError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX];
    let mut filled = 0;
    while filled < LENGTH_PREFIX {
        let n = reader
            .read(&mut len_buf[filled..])
            .await
            .map_err(|e| DriverError::ConnectionError(format!("Read length failed: {}", e)))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(DriverError::ProtocolError(ProtocolErrorKind::IncompleteFrame));
        }
        filled += n;
    }

    let msg_len = u32::from_be_bytes(len_buf);
    check_frame_len(u64::from(msg_len), max_frame_size)?;

    let mut payload = vec![0u8; msg_len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            DriverError::ProtocolError(ProtocolErrorKind::IncompleteFrame)
        }
        _ => DriverError::ConnectionError(format!("Read payload failed: {}", e)),
    })?;

    Ok(Some(payload))
}
