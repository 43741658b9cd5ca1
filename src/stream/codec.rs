// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::CodecError;
use crate::pulse::{Pulse, PulseRecord};

/// Serialization of one pulse to and from one line of text.
///
/// Implementations must not emit newlines inside an encoded line.
pub trait PulseCodec {
    fn encode(&self, pulse: &Pulse) -> Result<String, CodecError>;
    fn decode(&self, line: &str) -> Result<Pulse, CodecError>;
}

/// `{"topic": "...", "payload": [...]}` per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLineCodec;

impl PulseCodec for JsonLineCodec {
    fn encode(&self, pulse: &Pulse) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&pulse.to_record())?)
    }

    fn decode(&self, line: &str) -> Result<Pulse, CodecError> {
        let record: PulseRecord = serde_json::from_str(line)?;
        Ok(Pulse::from(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_is_single_line() {
        let pulse = Pulse::new("note");
        pulse.add(json!({"text": "line one\nline two"}));

        let line = JsonLineCodec.encode(&pulse).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.starts_with(r#"{"topic":"note""#));
    }

    #[test]
    fn test_decode_defaults_missing_payload() {
        let pulse = JsonLineCodec.decode(r#"{"topic":"ping"}"#).unwrap();

        assert_eq!(pulse.topic(), "ping");
        assert!(pulse.payload().is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = JsonLineCodec.decode("not json").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
