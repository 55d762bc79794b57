//! Agency side of the protocol.
//!
//! A typical agency opens one connection, uploads its bets in batches, sends
//! a finish, and then polls for winners on fresh connections until the draw
//! has been performed.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::protocol::tlv::tag;
use crate::protocol::{Bet, CodecError, Request, Response};

/// Result of polling for winners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Draw not performed yet
    Wait,
    /// Winning documents for the agency
    Winners(Vec<String>),
}

pub struct AgencyClient<S> {
    stream: S,
}

impl AgencyClient<TcpStream> {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, CodecError> {
        Ok(Self::new(TcpStream::connect(addr).await?))
    }
}

impl<S> AgencyClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Upload a batch and wait for the server to acknowledge it.
    pub async fn send_batch(&mut self, bets: &[Bet]) -> Result<(), CodecError> {
        self.send(&Request::Upload(bets.to_vec())).await?;

        match Response::read(&mut self.stream).await? {
            Response::Ack => Ok(()),
            Response::Wait => Err(CodecError::UnexpectedTag {
                expected: tag::ACK,
                found: tag::WAIT,
            }),
            Response::Winners(_) => Err(CodecError::UnexpectedTag {
                expected: tag::ACK,
                found: tag::WINNERS,
            }),
        }
    }

    /// Tell the server this agency is done uploading. Consumes the connection.
    pub async fn finish(mut self) -> Result<(), CodecError> {
        self.send(&Request::Finish).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Ask for an agency's winners. The server closes the connection afterwards.
    pub async fn poll_winners(mut self, agency: u32) -> Result<PollOutcome, CodecError> {
        self.send(&Request::Poll { agency }).await?;

        match Response::read(&mut self.stream).await? {
            Response::Wait => Ok(PollOutcome::Wait),
            Response::Winners(documents) => Ok(PollOutcome::Winners(documents)),
            Response::Ack => Err(CodecError::UnexpectedTag {
                expected: tag::WINNERS,
                found: tag::ACK,
            }),
        }
    }

    async fn send(&mut self, request: &Request) -> Result<(), CodecError> {
        let mut buf = BytesMut::new();
        request.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::bet::sample_bet;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_send_batch_expects_ack() {
        let bets = vec![sample_bet("4", "30904465", "7574")];
        let mut expected = BytesMut::new();
        Request::Upload(bets.clone()).encode(&mut expected).unwrap();

        let stream = Builder::new().write(&expected).read(b"O").build();
        let mut client = AgencyClient::new(stream);
        client.send_batch(&bets).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_batch_rejects_other_reply() {
        let mut expected = BytesMut::new();
        Request::Upload(vec![]).encode(&mut expected).unwrap();

        let stream = Builder::new().write(&expected).read(b"Y").build();
        let mut client = AgencyClient::new(stream);
        assert!(client.send_batch(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_poll_outcomes() {
        let stream = Builder::new().write(b"P\x00\x00\x00\x02").read(b"Y").build();
        let outcome = AgencyClient::new(stream).poll_winners(2).await.unwrap();
        assert_eq!(outcome, PollOutcome::Wait);

        let stream = Builder::new()
            .write(b"P\x00\x00\x00\x02")
            .read(b"W\x00\x00\x00\x01D\x00\x00\x00\x03123")
            .build();
        let outcome = AgencyClient::new(stream).poll_winners(2).await.unwrap();
        assert_eq!(outcome, PollOutcome::Winners(vec!["123".into()]));
    }

    #[tokio::test]
    async fn test_finish_sends_single_byte() {
        let stream = Builder::new().write(b"F").build();
        AgencyClient::new(stream).finish().await.unwrap();
    }
}
