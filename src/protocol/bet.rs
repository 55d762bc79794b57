//! Bet records and their container encoding.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::io::AsyncRead;

use super::tlv::{self, tag, MAX_RECORD_LENGTH};
use super::CodecError;

/// The six mandatory sub-fields of a bet, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BetField {
    Agency = 0,
    FirstName = 1,
    LastName = 2,
    Document = 3,
    Birthdate = 4,
    Number = 5,
}

impl BetField {
    pub const ALL: [BetField; 6] = [
        BetField::Agency,
        BetField::FirstName,
        BetField::LastName,
        BetField::Document,
        BetField::Birthdate,
        BetField::Number,
    ];

    pub fn tag(self) -> u8 {
        match self {
            BetField::Agency => tag::AGENCY,
            BetField::FirstName => tag::FIRST_NAME,
            BetField::LastName => tag::LAST_NAME,
            BetField::Document => tag::DOCUMENT,
            BetField::Birthdate => tag::BIRTHDATE,
            BetField::Number => tag::NUMBER,
        }
    }

    pub fn from_tag(t: u8) -> Option<Self> {
        match t {
            tag::AGENCY => Some(BetField::Agency),
            tag::FIRST_NAME => Some(BetField::FirstName),
            tag::LAST_NAME => Some(BetField::LastName),
            tag::DOCUMENT => Some(BetField::Document),
            tag::BIRTHDATE => Some(BetField::Birthdate),
            tag::NUMBER => Some(BetField::Number),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BetField::Agency => "agency",
            BetField::FirstName => "first name",
            BetField::LastName => "last name",
            BetField::Document => "document",
            BetField::Birthdate => "birthdate",
            BetField::Number => "number",
        }
    }
}

impl std::fmt::Display for BetField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single wager.
///
/// Only obtainable through [`BetBuilder::build`], so every `Bet` in the
/// process has all six fields set to non-empty text. Field order matches the
/// on-disk row layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bet {
    agency: String,
    first_name: String,
    last_name: String,
    document: String,
    birthdate: String,
    number: String,
}

impl Bet {
    pub fn agency(&self) -> &str {
        &self.agency
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn birthdate(&self) -> &str {
        &self.birthdate
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    /// Agency as a numeric id, if the text is a decimal number.
    pub fn agency_id(&self) -> Option<u32> {
        self.agency.trim().parse().ok()
    }

    pub fn field(&self, field: BetField) -> &str {
        match field {
            BetField::Agency => &self.agency,
            BetField::FirstName => &self.first_name,
            BetField::LastName => &self.last_name,
            BetField::Document => &self.document,
            BetField::Birthdate => &self.birthdate,
            BetField::Number => &self.number,
        }
    }

    /// Write the container body (the six sub-fields, no `B` header).
    pub fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        for field in BetField::ALL {
            tlv::put_field(buf, field.tag(), self.field(field).as_bytes())?;
        }
        Ok(())
    }

    /// Write the full `B | LENGTH | body` container.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;
        tlv::put_field(buf, tag::BET, &body)
    }

    /// Decode a container body whose declared length has already been honoured.
    ///
    /// Sub-fields are consumed until the body is exhausted; a field running
    /// past the end is a framing error. A repeated tag overwrites the earlier
    /// value.
    pub fn decode_body(mut body: Bytes) -> Result<Bet, CodecError> {
        let mut builder = BetBuilder::new();

        while !body.is_empty() {
            let (t, value) = tlv::take_field(&mut body)?;
            let field = BetField::from_tag(t).ok_or(CodecError::UnknownField(t))?;
            builder.set(field, value);
        }

        builder.build()
    }

    /// Read `LENGTH | body` off the socket and decode it.
    pub async fn read_body<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bet, CodecError> {
        let length = tlv::read_length(reader).await?;
        let body = tlv::read_value(reader, length, MAX_RECORD_LENGTH).await?;
        Self::decode_body(body)
    }

    /// Read a full `B | LENGTH | body` container off the socket.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bet, CodecError> {
        tlv::expect_tag(reader, tag::BET).await?;
        Self::read_body(reader).await
    }
}

/// Collects bet sub-fields and validates them into a [`Bet`].
#[derive(Debug, Clone, Default)]
pub struct BetBuilder {
    fields: [Option<Bytes>; 6],
}

impl BetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, field: BetField, value: Bytes) -> &mut Self {
        self.fields[field as usize] = Some(value);
        self
    }

    pub fn with(mut self, field: BetField, value: impl AsRef<[u8]>) -> Self {
        self.set(field, Bytes::copy_from_slice(value.as_ref()));
        self
    }

    pub fn build(self) -> Result<Bet, CodecError> {
        // Presence is checked for every field before any text decoding so the
        // reported field is always the first missing one in wire order.
        for field in BetField::ALL {
            match &self.fields[field as usize] {
                Some(value) if !value.is_empty() => {}
                _ => return Err(CodecError::MissingField(field)),
            }
        }

        let [agency, first_name, last_name, document, birthdate, number] =
            self.fields.map(Option::unwrap_or_default);

        Ok(Bet {
            agency: text(BetField::Agency, agency)?,
            first_name: text(BetField::FirstName, first_name)?,
            last_name: text(BetField::LastName, last_name)?,
            document: text(BetField::Document, document)?,
            birthdate: text(BetField::Birthdate, birthdate)?,
            number: text(BetField::Number, number)?,
        })
    }
}

fn text(field: BetField, value: Bytes) -> Result<String, CodecError> {
    String::from_utf8(value.to_vec()).map_err(|_| CodecError::InvalidText(field))
}

#[cfg(test)]
pub(crate) fn sample_bet(agency: &str, document: &str, number: &str) -> Bet {
    BetBuilder::new()
        .with(BetField::Agency, agency)
        .with(BetField::FirstName, "Santiago Lionel")
        .with(BetField::LastName, "Lorca")
        .with(BetField::Document, document)
        .with(BetField::Birthdate, "1999-03-17")
        .with(BetField::Number, number)
        .build()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    /// Hand-build a container body from raw `(tag, value)` pairs.
    fn body(fields: &[(u8, &[u8])]) -> Bytes {
        let mut buf = BytesMut::new();
        for (t, value) in fields {
            tlv::put_field(&mut buf, *t, value).unwrap();
        }
        buf.freeze()
    }

    const FULL: [(u8, &[u8]); 6] = [
        (b'A', b"1"),
        (b'N', b"Santiago Lionel"),
        (b'L', b"Lorca"),
        (b'D', b"30904465"),
        (b'H', b"1999-03-17"),
        (b'U', b"7574"),
    ];

    #[test]
    fn test_round_trip() {
        let bet = sample_bet("3", "24807259", "7577");

        let mut buf = BytesMut::new();
        bet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], b'B');

        let mut container = buf.freeze();
        let (t, body) = tlv::take_field(&mut container).unwrap();
        assert_eq!(t, tag::BET);
        assert!(container.is_empty());
        assert_eq!(Bet::decode_body(body).unwrap(), bet);
    }

    #[test]
    fn test_round_trip_non_ascii_text() {
        let bet = BetBuilder::new()
            .with(BetField::Agency, "12")
            .with(BetField::FirstName, "José María")
            .with(BetField::LastName, "Núñez")
            .with(BetField::Document, "11223344")
            .with(BetField::Birthdate, "1984-02-29")
            .with(BetField::Number, "42")
            .build()
            .unwrap();

        let mut buf = BytesMut::new();
        bet.encode_body(&mut buf).unwrap();
        assert_eq!(Bet::decode_body(buf.freeze()).unwrap(), bet);
    }

    #[test]
    fn test_decode_any_field_order() {
        let mut fields = FULL;
        fields.reverse();
        let bet = Bet::decode_body(body(&fields)).unwrap();
        assert_eq!(bet.agency(), "1");
        assert_eq!(bet.document(), "30904465");
        assert_eq!(bet.agency_id(), Some(1));
    }

    #[test]
    fn test_last_write_wins() {
        let mut fields = FULL.to_vec();
        fields.push((b'D', b"99999999"));
        let bet = Bet::decode_body(body(&fields)).unwrap();
        assert_eq!(bet.document(), "99999999");
    }

    #[test]
    fn test_each_missing_field_is_reported() {
        for (skip, field) in BetField::ALL.iter().enumerate() {
            let fields: Vec<_> = FULL
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, f)| *f)
                .collect();

            match Bet::decode_body(body(&fields)) {
                Err(CodecError::MissingField(missing)) => assert_eq!(missing, *field),
                other => panic!("unexpected for {}: {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut fields = FULL;
        fields[1] = (b'N', b"");
        match Bet::decode_body(body(&fields)) {
            Err(CodecError::MissingField(BetField::FirstName)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_tag() {
        let mut fields = FULL.to_vec();
        fields.push((b'Q', b"?"));
        match Bet::decode_body(body(&fields)) {
            Err(CodecError::UnknownField(b'Q')) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let mut fields = FULL;
        fields[2] = (b'L', b"\xff\xfe");
        let err = Bet::decode_body(body(&fields)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(err, CodecError::InvalidText(BetField::LastName)));
    }

    #[tokio::test]
    async fn test_read_body_length_mismatch() {
        // Declared length one byte short of the encoded fields
        let fields = body(&FULL);
        let mut raw = Vec::new();
        raw.extend_from_slice(&(fields.len() as u32 - 1).to_be_bytes());
        raw.extend_from_slice(&fields);

        let err = Bet::read_body(&mut raw.as_slice()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Framing);
    }

    #[tokio::test]
    async fn test_read_requires_bet_tag() {
        let mut raw: &[u8] = b"Z\x00\x00\x00\x00";
        match Bet::read(&mut raw).await {
            Err(CodecError::UnexpectedTag { expected: b'B', found: b'Z' }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
