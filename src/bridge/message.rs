//! Upstream notification frames.

/// One notification received from the upstream publisher.
///
/// The wire form is `"<topic> <payload>"`: the topic ends at the first ASCII
/// space and everything after it is the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BridgeMessage {
    /// Split a raw frame into topic and payload. Never fails.
    ///
    /// Without a separator the whole frame is the topic and the payload is
    /// empty. Topic bytes that are not UTF-8 are replaced; payload bytes are
    /// kept as received.
    pub fn parse(frame: &[u8]) -> Self {
        let (topic, payload) = match frame.iter().position(|&b| b == b' ') {
            Some(idx) => (&frame[..idx], &frame[idx + 1..]),
            None => (frame, &[][..]),
        };

        Self {
            topic: String::from_utf8_lossy(topic).into_owned(),
            payload: payload.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_first_space() {
        let msg = BridgeMessage::parse(br#"misp_json_event {"Event": {"info": "a b c"}}"#);
        assert_eq!(msg.topic, "misp_json_event");
        assert_eq!(msg.payload, br#"{"Event": {"info": "a b c"}}"#);
    }

    #[test]
    fn test_no_separator() {
        let msg = BridgeMessage::parse(b"misp_json_self");
        assert_eq!(msg.topic, "misp_json_self");
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_trailing_and_leading_space() {
        let msg = BridgeMessage::parse(b"topic ");
        assert_eq!(msg.topic, "topic");
        assert!(msg.payload.is_empty());

        let msg = BridgeMessage::parse(b" payload");
        assert_eq!(msg.topic, "");
        assert_eq!(msg.payload, b"payload");
    }

    #[test]
    fn test_binary_payload_kept() {
        let msg = BridgeMessage::parse(b"raw \xff\xfe\x00");
        assert_eq!(msg.topic, "raw");
        assert_eq!(msg.payload, vec![0xff, 0xfe, 0x00]);

        let msg = BridgeMessage::parse(b"");
        assert_eq!(msg.topic, "");
        assert!(msg.payload.is_empty());
    }
}
