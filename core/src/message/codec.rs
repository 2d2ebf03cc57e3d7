// Wire codec — self-describing JSON with size limits to prevent abuse

use super::types::Message;
use thiserror::Error;

/// Maximum encoded message size: 256 KB.
/// A full work-order snapshot fits comfortably; anything larger is hostile.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoded message too large: {0} bytes (max {MAX_MESSAGE_SIZE})")]
    TooLarge(usize),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Decoding failures are dropped by callers, never raised into the
/// transport's receive path.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload too large: {0} bytes (max {MAX_MESSAGE_SIZE})")]
    TooLarge(usize),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialize a Message to wire bytes
pub fn encode(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let bytes = serde_json::to_vec(msg)?;

    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(EncodeError::TooLarge(bytes.len()));
    }

    Ok(bytes)
}

/// Deserialize wire bytes to a Message
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(DecodeError::TooLarge(bytes.len()));
    }

    let msg: Message = serde_json::from_slice(bytes)?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::WorkOrder;
    use proptest::prelude::*;

    #[test]
    fn test_ping_roundtrip() {
        let msg = Message::ping("Alex");
        let bytes = encode(&msg).unwrap();
        let restored = decode(&bytes).unwrap();

        assert_eq!(msg, restored);
    }

    #[test]
    fn test_vitals_roundtrip_exact() {
        let msg = Message::vitals("Sam", 95.0, 97.5, 132.25);
        let restored = decode(&encode(&msg).unwrap()).unwrap();

        match restored {
            Message::Vitals {
                heart_rate,
                oxygen,
                energy,
                ..
            } => {
                assert_eq!(heart_rate, 95.0);
                assert_eq!(oxygen, 97.5);
                assert_eq!(energy, 132.25);
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn test_work_orders_reply_roundtrip_field_for_field() {
        let orders = vec![WorkOrder::sample_psu_swap(), WorkOrder::sample_node_install()];
        let msg = Message::work_orders_reply("X", orders.clone());

        let restored = decode(&encode(&msg).unwrap()).unwrap();

        assert_eq!(restored, Message::work_orders_reply("X", orders));
    }

    #[test]
    fn test_truncated_payload_fails() {
        let bytes = encode(&Message::ping("Alex")).unwrap();
        let result = decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_unknown_kind_fails() {
        let result = decode(br#"{"kind":"selfDestruct","from":"Mallory"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_discriminator_fails() {
        let result = decode(br#"{"from":"Alex"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_oversized_decode() {
        let big = vec![b' '; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(decode(&big), Err(DecodeError::TooLarge(_))));
    }

    proptest! {
        // Arbitrary garbage must return DecodeError, never panic.
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode(&bytes);
        }
    }
}
