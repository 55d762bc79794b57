//! TLV framing primitive shared by every message.
//!
//! Buffer-side helpers (`put_field`, `take_field`) work on `bytes` buffers so a
//! container can be validated entirely in memory once its declared length has
//! been read off the socket. Socket-side helpers read exact byte counts:
//! `read_exact` keeps reading across partial transfers and turns an early EOF
//! into `UnexpectedEof`, which surfaces as a transport error.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::CodecError;

/// Size of the tag prefix
pub const TAG_SIZE: usize = 1;

/// Size of the big-endian length prefix
pub const LENGTH_SIZE: usize = 4;

/// Size of a full field header
pub const HEADER_SIZE: usize = TAG_SIZE + LENGTH_SIZE;

/// Largest bet container the server will buffer.
pub const MAX_RECORD_LENGTH: usize = 64 * 1024;

/// Tag vocabulary
pub mod tag {
    pub const BET: u8 = b'B';
    pub const BATCH: u8 = b'Z';
    pub const FINISH: u8 = b'F';
    pub const POLL: u8 = b'P';

    pub const AGENCY: u8 = b'A';
    pub const FIRST_NAME: u8 = b'N';
    pub const LAST_NAME: u8 = b'L';
    pub const DOCUMENT: u8 = b'D';
    pub const BIRTHDATE: u8 = b'H';
    pub const NUMBER: u8 = b'U';

    pub const ACK: u8 = b'O';
    pub const WAIT: u8 = b'Y';
    pub const WINNERS: u8 = b'W';
}

/// Append `TAG | LENGTH | VALUE` to `buf`.
pub fn put_field(buf: &mut BytesMut, tag: u8, value: &[u8]) -> Result<(), CodecError> {
    let length = u32::try_from(value.len()).map_err(|_| CodecError::ValueTooLarge(value.len()))?;

    buf.reserve(HEADER_SIZE + value.len());
    buf.put_u8(tag);
    buf.put_u32(length);
    buf.put_slice(value);
    Ok(())
}

/// Split one field off the front of a container body.
///
/// Fails if the header or the value would extend past the end of `body`, so a
/// loop over `take_field` consumes exactly the container's declared length or
/// errors out.
pub fn take_field(body: &mut Bytes) -> Result<(u8, Bytes), CodecError> {
    if body.remaining() < HEADER_SIZE {
        return Err(CodecError::Truncated { tag: None });
    }

    let tag = body.get_u8();
    let length = body.get_u32() as usize;
    if body.remaining() < length {
        return Err(CodecError::Truncated { tag: Some(tag) });
    }

    Ok((tag, body.split_to(length)))
}

/// Read a single tag byte.
pub async fn read_tag<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u8, CodecError> {
    Ok(reader.read_u8().await?)
}

/// Read a tag byte and fail unless it equals `expected`.
pub async fn expect_tag<R: AsyncRead + Unpin>(
    reader: &mut R,
    expected: u8,
) -> Result<(), CodecError> {
    let found = read_tag(reader).await?;
    if found != expected {
        return Err(CodecError::UnexpectedTag { expected, found });
    }
    Ok(())
}

/// Read a 4-byte big-endian length or count.
pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, CodecError> {
    Ok(reader.read_u32().await?)
}

/// Read exactly `length` bytes, refusing lengths above `max`.
pub async fn read_value<R: AsyncRead + Unpin>(
    reader: &mut R,
    length: u32,
    max: usize,
) -> Result<Bytes, CodecError> {
    let size = length as usize;
    if size > max {
        return Err(CodecError::TooLong { length, max });
    }

    let mut value = BytesMut::zeroed(size);
    reader.read_exact(&mut value).await?;
    Ok(value.freeze())
}
