use std::fmt;

use crate::wire::proto::{GateMessage, Meta};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Request = 1,
    Response = 2,
    Notify = 3,
}

impl MessageKind {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Notify),
            _ => None,
        }
    }
}

/// Decoded gateway frame with its metadata flattened out.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub service: String,
    pub method: String,
    pub kind: MessageKind,
    pub client_seq: i64,
    pub server_seq: i64,
    pub error_code: i64,
    pub error_message: String,
    pub body: Vec<u8>,
}

#[derive(Debug, PartialEq)]
pub enum EnvelopeError {
    MissingMeta,
    UnknownMessageKind { value: i32 },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMeta => write!(f, "gateway frame carries no meta block"),
            Self::UnknownMessageKind { value } => {
                write!(f, "unknown message_type {value} in gateway meta")
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl Envelope {
    pub fn request(
        service: impl Into<String>,
        method: impl Into<String>,
        client_seq: i64,
        server_seq: i64,
        body: Vec<u8>,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            kind: MessageKind::Request,
            client_seq,
            server_seq,
            error_code: 0,
            error_message: String::new(),
            body,
        }
    }

    pub fn from_gate(message: GateMessage) -> Result<Self, EnvelopeError> {
        let meta = message.meta.ok_or(EnvelopeError::MissingMeta)?;
        let kind = MessageKind::from_wire(meta.message_type).ok_or(
            EnvelopeError::UnknownMessageKind {
                value: meta.message_type,
            },
        )?;

        Ok(Self {
            service: meta.service_name,
            method: meta.method_name,
            kind,
            client_seq: meta.client_seq,
            server_seq: meta.server_seq,
            error_code: meta.error_code,
            error_message: meta.error_message,
            body: message.body,
        })
    }

    pub fn into_gate(self) -> GateMessage {
        GateMessage {
            meta: Some(Meta {
                service_name: self.service,
                method_name: self.method,
                message_type: self.kind as i32,
                client_seq: self.client_seq,
                server_seq: self.server_seq,
                error_code: self.error_code,
                error_message: self.error_message,
            }),
            body: self.body,
        }
    }

    pub fn qualified_method(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

#[cfg(test)]
mod tests {
    use crate::wire::proto::{GateMessage, Meta};

    use super::{Envelope, EnvelopeError, MessageKind};

    #[test]
    fn request_round_trips_through_gate_message() {
        let envelope = Envelope::request("gamepb.userpb.UserService", "Login", 1, 0, vec![1, 2]);
        let gate = envelope.clone().into_gate();
        assert_eq!(gate.meta.as_ref().map(|m| m.message_type), Some(1));

        let decoded = Envelope::from_gate(gate).expect("gate message should convert");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn missing_meta_is_rejected() {
        let err = Envelope::from_gate(GateMessage {
            meta: None,
            body: Vec::new(),
        })
        .expect_err("meta is required");
        assert_eq!(err, EnvelopeError::MissingMeta);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Envelope::from_gate(GateMessage {
            meta: Some(Meta {
                message_type: 9,
                ..Meta::default()
            }),
            body: Vec::new(),
        })
        .expect_err("kind 9 is unknown");
        assert_eq!(err, EnvelopeError::UnknownMessageKind { value: 9 });
        assert_eq!(MessageKind::from_wire(3), Some(MessageKind::Notify));
    }
}
