//! Client requests.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::bet::Bet;
use super::tlv::{self, tag};
use super::CodecError;

/// Upper bound on how many bets are preallocated from a declared batch count.
/// Larger batches still decode, the vector just grows as records arrive.
const MAX_BATCH_PREALLOC: usize = 1024;

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Store these bets (`B` single record or `Z` batch)
    Upload(Vec<Bet>),
    /// The agency has no more bets to upload
    Finish,
    /// Ask for the winners of an agency
    Poll { agency: u32 },
}

impl Request {
    /// Read the next request from the socket.
    ///
    /// Returns `Ok(None)` if the peer closed the connection cleanly before
    /// sending the first byte of a request. EOF anywhere after that byte is a
    /// transport error. The whole request is decoded before it is returned, so
    /// a malformed batch never yields a partial upload.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Self>, CodecError> {
        let mut first = [0u8; tlv::TAG_SIZE];
        if reader.read(&mut first).await? == 0 {
            return Ok(None);
        }

        let request = match first[0] {
            tag::BET => Request::Upload(vec![Bet::read_body(reader).await?]),
            tag::BATCH => Request::Upload(read_batch(reader).await?),
            tag::FINISH => Request::Finish,
            tag::POLL => Request::Poll {
                agency: reader.read_u32().await?,
            },
            other => return Err(CodecError::UnknownRequest(other)),
        };

        Ok(Some(request))
    }

    /// Encode the request as a client sends it. Uploads always use the batch form.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Request::Upload(bets) => {
                let count =
                    u32::try_from(bets.len()).map_err(|_| CodecError::ValueTooLarge(bets.len()))?;
                buf.put_u8(tag::BATCH);
                buf.put_u32(count);
                for bet in bets {
                    bet.encode(buf)?;
                }
            }
            Request::Finish => buf.put_u8(tag::FINISH),
            Request::Poll { agency } => {
                buf.put_u8(tag::POLL);
                buf.put_u32(*agency);
            }
        }
        Ok(())
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Upload(_) => "upload",
            Request::Finish => "finish",
            Request::Poll { .. } => "poll",
        }
    }
}

async fn read_batch<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<Bet>, CodecError> {
    let count = tlv::read_length(reader).await? as usize;
    let mut bets = Vec::with_capacity(count.min(MAX_BATCH_PREALLOC));

    for _ in 0..count {
        bets.push(Bet::read(reader).await?);
    }

    Ok(bets)
}
