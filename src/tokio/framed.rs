//! Length-prefixed framing beneath the multiplexer.
//!
//! Every frame travels as `len u32 LE ++ frame[len]`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zerocopy::byteorder::little_endian::U32 as U32LE;
use zerocopy::{FromZeros, IntoBytes};

use crate::error::{Error, Result};
use crate::protocol::frame::Command;

/// Largest frame accepted in either direction
pub const MAX_FRAME_LEN: usize = 256 << 20;

const PREFIX_LEN: usize = size_of::<U32LE>();

/// Read one whole frame into `buffer`, replacing its contents
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, buffer: &mut Vec<u8>) -> Result<()> {
    let mut prefix = U32LE::new_zeroed();
    reader.read_exact(prefix.as_mut_bytes()).await?;

    let length = prefix.get() as usize;
    if length > MAX_FRAME_LEN {
        return Err(Error::MalformedFrame(format!(
            "frame of {length} bytes exceeds {MAX_FRAME_LEN}"
        )));
    }

    buffer.clear();
    buffer.resize(length, 0);
    reader.read_exact(buffer).await?;
    Ok(())
}

/// Write one frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(Error::BadUsageError(format!(
            "frame of {} bytes exceeds {MAX_FRAME_LEN}",
            frame.len()
        )));
    }
    let prefix = U32LE::new(frame.len() as u32);
    writer.write_all(prefix.as_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Encode `command` as a request under `req_id`, length prefix included
pub fn encode_frame(command: &Command, req_id: u64) -> Result<Vec<u8>> {
    let mut out = vec![0u8; PREFIX_LEN];
    command.write(&mut out, req_id)?;
    let length = out.len() - PREFIX_LEN;
    if length > MAX_FRAME_LEN {
        return Err(Error::BadUsageError(format!(
            "request of {length} bytes exceeds {MAX_FRAME_LEN}"
        )));
    }
    out[..PREFIX_LEN].copy_from_slice(&(length as u32).to_le_bytes());
    Ok(out)
}
