use std::fmt;

use prost::Message;

use crate::config::AppConfig;
use crate::wire::envelope::{Envelope, EnvelopeError};
use crate::wire::proto::GateMessage;

pub const MAX_ENVELOPE_SIZE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    pub max_envelope_size_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_envelope_size_bytes: MAX_ENVELOPE_SIZE_BYTES,
        }
    }
}

#[derive(Debug)]
pub enum CodecError {
    PayloadTooLarge { size: usize, limit: usize },
    ProtocolZeroLength,
    ProtobufEncode(prost::EncodeError),
    ProtobufDecode(prost::DecodeError),
    Envelope(EnvelopeError),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { size, limit } => {
                write!(f, "frame size {size} exceeds limit {limit}")
            }
            Self::ProtocolZeroLength => write!(f, "protocol error: frame cannot be empty"),
            Self::ProtobufEncode(source) => write!(f, "protobuf encode error: {source}"),
            Self::ProtobufDecode(source) => write!(f, "protobuf decode error: {source}"),
            Self::Envelope(source) => write!(f, "envelope error: {source}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<prost::DecodeError> for CodecError {
    fn from(source: prost::DecodeError) -> Self {
        Self::ProtobufDecode(source)
    }
}

impl From<EnvelopeError> for CodecError {
    fn from(source: EnvelopeError) -> Self {
        Self::Envelope(source)
    }
}

/// Converts envelopes to and from binary websocket frames.
///
/// Websocket messages are already delimited, so frames carry no length
/// header; the size limit is enforced on the encoded protobuf bytes.
#[derive(Clone, Copy, Debug)]
pub struct WireCodec {
    config: CodecConfig,
}

impl WireCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn from_app_config(app_config: &AppConfig) -> Self {
        Self::new(CodecConfig {
            max_envelope_size_bytes: app_config.wire.max_envelope_size_bytes,
        })
    }

    pub fn max_envelope_size_bytes(&self) -> usize {
        self.config.max_envelope_size_bytes
    }

    pub fn encode_frame(&self, envelope: Envelope) -> Result<Vec<u8>, CodecError> {
        let gate = envelope.into_gate();
        let mut frame = Vec::with_capacity(gate.encoded_len());
        gate.encode(&mut frame).map_err(CodecError::ProtobufEncode)?;

        if frame.len() > self.config.max_envelope_size_bytes {
            return Err(CodecError::PayloadTooLarge {
                size: frame.len(),
                limit: self.config.max_envelope_size_bytes,
            });
        }

        Ok(frame)
    }

    pub fn decode_frame(&self, frame: &[u8]) -> Result<Envelope, CodecError> {
        if frame.is_empty() {
            return Err(CodecError::ProtocolZeroLength);
        }
        if frame.len() > self.config.max_envelope_size_bytes {
            return Err(CodecError::PayloadTooLarge {
                size: frame.len(),
                limit: self.config.max_envelope_size_bytes,
            });
        }

        let gate = GateMessage::decode(frame)?;
        Ok(Envelope::from_gate(gate)?)
    }
}

/// Decodes a typed message body, mapping failures into the codec taxonomy.
pub fn decode_body<M: Message + Default>(body: &[u8]) -> Result<M, CodecError> {
    Ok(M::decode(body)?)
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use crate::wire::envelope::{Envelope, MessageKind};
    use crate::wire::proto::{HeartbeatReply, LoginReply, PlayerBasic};

    use super::{decode_body, CodecConfig, CodecError, WireCodec};

    #[test]
    fn encodes_and_decodes_request_frame() {
        let codec = WireCodec::new(CodecConfig::default());
        let body = HeartbeatReply { server_time: 42 }.encode_to_vec();
        let frame = codec
            .encode_frame(Envelope::request("svc", "Heartbeat", 3, 9, body.clone()))
            .expect("frame should encode");

        let decoded = codec.decode_frame(&frame).expect("frame should decode");
        assert_eq!(decoded.kind, MessageKind::Request);
        assert_eq!(decoded.client_seq, 3);
        assert_eq!(decoded.server_seq, 9);
        assert_eq!(decoded.body, body);
    }

    #[test]
    fn rejects_empty_frame() {
        let codec = WireCodec::new(CodecConfig::default());
        let err = codec.decode_frame(&[]).expect_err("empty frame is invalid");
        assert!(matches!(err, CodecError::ProtocolZeroLength));
    }

    #[test]
    fn rejects_frames_over_the_configured_limit() {
        let codec = WireCodec::new(CodecConfig {
            max_envelope_size_bytes: 16,
        });
        let err = codec
            .encode_frame(Envelope::request("svc", "Method", 1, 0, vec![0; 64]))
            .expect_err("oversized frame should fail");
        assert!(matches!(err, CodecError::PayloadTooLarge { limit: 16, .. }));

        let err = codec
            .decode_frame(&[0; 32])
            .expect_err("oversized inbound frame should fail");
        assert!(matches!(err, CodecError::PayloadTooLarge { size: 32, .. }));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let codec = WireCodec::new(CodecConfig::default());
        let err = codec
            .decode_frame(&[0xff, 0xff, 0xff])
            .expect_err("garbage should not decode");
        assert!(matches!(err, CodecError::ProtobufDecode(_)));
    }

    #[test]
    fn decode_body_reads_typed_reply() {
        let bytes = LoginReply {
            basic: Some(PlayerBasic {
                gid: 77,
                name: "grower".to_owned(),
                level: 12,
                exp: 300,
                gold: 4_000,
            }),
            time_now_millis: 1_700_000_000_000,
        }
        .encode_to_vec();

        let reply: LoginReply = decode_body(&bytes).expect("body should decode");
        assert_eq!(reply.basic.map(|b| b.gid), Some(77));
    }
}
