//! Length-prefixed frames: `u32` big-endian length, then the bytes.
//!
//! Frames are built and parsed by tokio-util's [`LengthDelimitedCodec`].
//! A [`Stream`] only offers exact reads, so the prefix is read first and
//! handed to the codec, which enforces the size bound before the body is
//! read.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::error::StreamError;
use crate::stream::Stream;

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Reading a frame failed.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The declared length exceeds the caller's bound. Nothing past the
    /// prefix was read.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error(transparent)]
    Stream(#[from] StreamError),
}

fn codec(max: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(LENGTH_PREFIX)
        .max_frame_length(max)
        .new_codec()
}

/// Write `payload` as one frame, in a single stream write.
pub async fn write_frame(stream: &dyn Stream, payload: &[u8]) -> Result<(), StreamError> {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + payload.len());
    codec(u32::MAX as usize).encode(Bytes::copy_from_slice(payload), &mut buf)?;
    stream.write(&buf).await
}

/// Read one frame of at most `max` bytes.
///
/// The length is checked before the body buffer is allocated.
pub async fn read_frame(stream: &dyn Stream, max: usize) -> Result<Bytes, FrameError> {
    let mut codec = codec(max);
    let mut buf = BytesMut::zeroed(LENGTH_PREFIX);
    stream.read(&mut buf).await?;
    let size = (&buf[..]).get_u32() as usize;

    match codec.decode(&mut buf) {
        Ok(Some(frame)) => return Ok(frame.freeze()),
        Ok(None) => {}
        Err(err) if is_too_large(&err) => return Err(FrameError::TooLarge { size, max }),
        Err(err) => return Err(StreamError::Io(err).into()),
    }

    // The codec consumed the prefix and now waits for `size` body bytes.
    buf.resize(size, 0);
    stream.read(&mut buf).await?;
    match codec.decode(&mut buf) {
        Ok(Some(frame)) => Ok(frame.freeze()),
        Ok(None) => Err(StreamError::Closed.into()),
        Err(err) => Err(StreamError::Io(err).into()),
    }
}

fn is_too_large(err: &std::io::Error) -> bool {
    err.get_ref()
        .map_or(false, |inner| inner.is::<LengthDelimitedCodecError>())
}
