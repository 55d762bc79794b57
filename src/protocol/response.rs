//! Server responses.

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncRead;

use super::bet::BetField;
use super::tlv::{self, tag, MAX_RECORD_LENGTH};
use super::CodecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Upload stored
    Ack,
    /// Not every agency has finished yet
    Wait,
    /// Documents of the winning bets for the polled agency
    Winners(Vec<String>),
}

impl Response {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Response::Ack => buf.put_u8(tag::ACK),
            Response::Wait => buf.put_u8(tag::WAIT),
            Response::Winners(documents) => {
                let count = u32::try_from(documents.len())
                    .map_err(|_| CodecError::ValueTooLarge(documents.len()))?;
                buf.put_u8(tag::WINNERS);
                buf.put_u32(count);
                for document in documents {
                    tlv::put_field(buf, tag::DOCUMENT, document.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    /// Read a response off the socket (client side).
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, CodecError> {
        match tlv::read_tag(reader).await? {
            tag::ACK => Ok(Response::Ack),
            tag::WAIT => Ok(Response::Wait),
            tag::WINNERS => {
                let count = tlv::read_length(reader).await?;
                let mut documents = Vec::new();
                for _ in 0..count {
                    tlv::expect_tag(reader, tag::DOCUMENT).await?;
                    let length = tlv::read_length(reader).await?;
                    let raw = tlv::read_value(reader, length, MAX_RECORD_LENGTH).await?;
                    let document = String::from_utf8(raw.to_vec())
                        .map_err(|_| CodecError::InvalidText(BetField::Document))?;
                    documents.push(document);
                }
                Ok(Response::Winners(documents))
            }
            other => Err(CodecError::UnknownResponse(other)),
        }
    }
}
