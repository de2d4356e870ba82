use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use prost::Message;
use thiserror::Error;

use super::payload::{SignedTicketPayload, TicketMessage};
use super::signature::verify_signature;

/// The only frame layout currently issued.
pub const SUPPORTED_FRAME_VERSION: u8 = 1;

const HEADER_LEN: usize = 5;

/// Why a secret could not be read as a signed ticket. Every variant means
/// the ticket is invalid; none of them is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("ticket secret is empty")]
    Empty,
    #[error("ticket secret is not base64: {0}")]
    Base64(String),
    #[error("unsupported ticket frame version {0}")]
    UnsupportedVersion(u8),
    #[error("ticket frame shorter than its header")]
    TooShort,
    #[error("ticket frame truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("ticket signature does not match any valid key")]
    BadSignature,
    #[error("ticket payload is malformed: {0}")]
    Payload(String),
}

/// Raw frame split into its signed parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketFrame {
    pub version: u8,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Length fields combine two bytes as `hi << 2 + lo`. Issued tickets depend
/// on this exact arithmetic.
fn frame_length(hi: u8, lo: u8) -> usize {
    ((hi as usize) << 2) + lo as usize
}

/// Splits a length into the two header bytes `frame_length` reads back.
fn length_bytes(len: usize) -> Option<(u8, u8)> {
    let hi = u8::try_from(len >> 2).ok()?;
    Some((hi, (len & 0b11) as u8))
}

/// Reads the reversed-base64 frame of a secret.
pub fn decode_frame(secret: &str) -> Result<TicketFrame, DecodeError> {
    let reversed: String = secret.trim().chars().rev().collect();
    if reversed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let raw = STANDARD
        .decode(reversed.as_bytes())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    let Some(&version) = raw.first() else {
        return Err(DecodeError::Empty);
    };
    if version != SUPPORTED_FRAME_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    if raw.len() < HEADER_LEN {
        return Err(DecodeError::TooShort);
    }

    let payload_len = frame_length(raw[1], raw[2]);
    let signature_len = frame_length(raw[3], raw[4]);
    let needed = HEADER_LEN + payload_len + signature_len;
    if raw.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            actual: raw.len(),
        });
    }

    let payload_end = HEADER_LEN + payload_len;
    Ok(TicketFrame {
        version,
        payload: raw[HEADER_LEN..payload_end].to_vec(),
        signature: raw[payload_end..needed].to_vec(),
    })
}

/// Builds a secret from a payload and signature. Inverse of [`decode_frame`].
pub fn encode_frame(payload: &[u8], signature: &[u8]) -> Option<String> {
    let (payload_hi, payload_lo) = length_bytes(payload.len())?;
    let (signature_hi, signature_lo) = length_bytes(signature.len())?;

    let mut raw = Vec::with_capacity(HEADER_LEN + payload.len() + signature.len());
    raw.extend_from_slice(&[
        SUPPORTED_FRAME_VERSION,
        payload_hi,
        payload_lo,
        signature_hi,
        signature_lo,
    ]);
    raw.extend_from_slice(payload);
    raw.extend_from_slice(signature);

    Some(STANDARD.encode(raw).chars().rev().collect())
}

fn unix_time(seconds: Option<i64>) -> Result<Option<DateTime<Utc>>, DecodeError> {
    seconds
        .map(|secs| {
            DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| DecodeError::Payload(format!("timestamp out of range: {secs}")))
        })
        .transpose()
}

/// Decodes a secret, checks its signature against `valid_keys`, then parses
/// the payload. Pure: the same inputs always give the same result.
pub fn decode_ticket(
    secret: &str,
    valid_keys: &[String],
) -> Result<SignedTicketPayload, DecodeError> {
    let frame = decode_frame(secret)?;

    if !verify_signature(&frame.signature, &frame.payload, valid_keys) {
        return Err(DecodeError::BadSignature);
    }

    let message = TicketMessage::decode(frame.payload.as_slice())
        .map_err(|e| DecodeError::Payload(e.to_string()))?;

    Ok(SignedTicketPayload {
        seed: message.seed,
        item_id: message.item,
        variation_id: (message.variation != 0).then_some(message.variation),
        subevent_id: (message.subevent != 0).then_some(message.subevent),
        valid_from: unix_time(message.valid_from_unix_time)?,
        valid_until: unix_time(message.valid_until_unix_time)?,
    })
}

#[cfg(test)]
pub(crate) mod test_tickets {
    use ed25519_dalek::{Signer, SigningKey};
    use prost::Message;

    use super::encode_frame;
    use crate::tickets::TicketMessage;

    pub fn issue(key: &SigningKey, message: &TicketMessage) -> String {
        let payload = message.encode_to_vec();
        let signature = key.sign(&payload).to_bytes();
        encode_frame(&payload, &signature).expect("frame fits")
    }

    pub fn message(seed: &str, item: i64, subevent: i64) -> TicketMessage {
        TicketMessage {
            seed: seed.to_string(),
            item,
            variation: 0,
            subevent,
            valid_from_unix_time: None,
            valid_until_unix_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_tickets::*;
    use super::*;
    use crate::tickets::signature::test_keys::{public_pem, signing_key};

    fn raw_secret(raw: &[u8]) -> String {
        STANDARD.encode(raw).chars().rev().collect()
    }

    #[test]
    fn decodes_signed_ticket_fields() {
        let key = signing_key(7);
        let mut msg = message("seed-1", 42, 3);
        msg.variation = 8;
        msg.valid_from_unix_time = Some(1_700_000_000);
        let secret = issue(&key, &msg);

        let payload = decode_ticket(&secret, &[public_pem(&key)]).expect("valid ticket");
        assert_eq!(payload.seed, "seed-1");
        assert_eq!(payload.item_id, 42);
        assert_eq!(payload.variation_id, Some(8));
        assert_eq!(payload.subevent_id, Some(3));
        assert_eq!(payload.valid_from.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(payload.valid_until, None);

        // Pure: decoding twice gives the same value.
        assert_eq!(decode_ticket(&secret, &[public_pem(&key)]), Ok(payload));
    }

    #[test]
    fn zero_ids_decode_as_absent() {
        let key = signing_key(7);
        let secret = issue(&key, &message("s", 1, 0));
        let payload = decode_ticket(&secret, &[public_pem(&key)]).expect("valid ticket");
        assert_eq!(payload.variation_id, None);
        assert_eq!(payload.subevent_id, None);
    }

    #[test]
    fn length_fields_use_two_bit_shift() {
        // hi=1, lo=3 => 7 payload bytes; hi=0, lo=2 => 2 signature bytes.
        let mut raw = vec![1, 1, 3, 0, 2];
        raw.extend_from_slice(b"payload");
        raw.extend_from_slice(b"sg");
        let frame = decode_frame(&raw_secret(&raw)).expect("frame");
        assert_eq!(frame.payload, b"payload");
        assert_eq!(frame.signature, b"sg");

        assert_eq!(frame_length(16, 0), 64);
        assert_eq!(length_bytes(64), Some((16, 0)));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(decode_frame(""), Err(DecodeError::Empty));
        assert!(matches!(decode_frame("!!!"), Err(DecodeError::Base64(_))));
        assert_eq!(
            decode_frame(&raw_secret(&[2, 0, 0, 0, 0])),
            Err(DecodeError::UnsupportedVersion(2))
        );
        assert_eq!(decode_frame(&raw_secret(&[1, 0, 1])), Err(DecodeError::TooShort));
        assert_eq!(
            decode_frame(&raw_secret(&[1, 0, 2, 0, 1, 9])),
            Err(DecodeError::Truncated {
                needed: 8,
                actual: 6
            })
        );
    }

    #[test]
    fn tampering_breaks_verification() {
        let key = signing_key(7);
        let secret = issue(&key, &message("seed", 5, 0));
        let frame = decode_frame(&secret).expect("frame");

        let mut payload = frame.payload.clone();
        payload[0] ^= 0x01;
        let tampered_payload = encode_frame(&payload, &frame.signature).expect("frame");
        assert_eq!(
            decode_ticket(&tampered_payload, &[public_pem(&key)]),
            Err(DecodeError::BadSignature)
        );

        let mut signature = frame.signature.clone();
        signature[10] ^= 0x80;
        let tampered_signature = encode_frame(&frame.payload, &signature).expect("frame");
        assert_eq!(
            decode_ticket(&tampered_signature, &[public_pem(&key)]),
            Err(DecodeError::BadSignature)
        );
    }

    #[test]
    fn unknown_key_is_bad_signature() {
        let secret = issue(&signing_key(7), &message("seed", 5, 0));
        assert_eq!(
            decode_ticket(&secret, &[public_pem(&signing_key(8))]),
            Err(DecodeError::BadSignature)
        );
    }
}
