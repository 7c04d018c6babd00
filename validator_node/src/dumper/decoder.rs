//! Reconstructs typed events from raw logs.
//!
//! The unindexed payload is ABI-decoded against the event's unindexed
//! inputs; each topic after the signature is decoded against the matching
//! indexed input. Indexed dynamic values (strings, bytes, arrays) are only
//! present as their keccak hash and decode to `Token::FixedBytes`.
//!
//! Topics are decoded here rather than through `Event::parse_log` so that
//! topic count, payload length and topic value failures stay distinct
//! `DecodeError` variants.

use super::registry::{EventRegistry, EventSchema};
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, Log, H256, U256};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingSignature,

    #[error("unknown event signature {0:?}")]
    UnknownEvent(H256),

    #[error("expected {expected} event, log is {actual}")]
    ShapeMismatch { expected: &'static str, actual: String },

    #[error("{event}: expected {expected} indexed topics, got {actual}")]
    TopicCount {
        event: String,
        expected: usize,
        actual: usize,
    },

    #[error("{event}: payload of {actual} bytes does not fit a {head}-byte head")]
    PayloadLength {
        event: String,
        head: usize,
        actual: usize,
    },

    #[error("{event}: payload decode failed: {reason}")]
    Payload { event: String, reason: String },

    #[error("topic {name} is not a valid {kind}")]
    TopicType { name: String, kind: String },

    #[error("missing parameter {0}")]
    MissingParam(String),

    #[error("parameter {name} is not a {expected}")]
    ParamType { name: String, expected: &'static str },

    #[error("invalid contract interface: {0}")]
    InvalidInterface(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// A decoded event: inputs in declaration order with their values
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub name: String,
    pub params: Vec<(String, Token)>,
}

impl DecodedLog {
    pub fn param(&self, name: &str) -> Result<&Token> {
        self.params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, token)| token)
            .ok_or_else(|| DecodeError::MissingParam(name.to_string()))
    }

    pub fn address(&self, name: &str) -> Result<Address> {
        token_address(name, self.param(name)?)
    }

    pub fn uint(&self, name: &str) -> Result<U256> {
        token_uint(name, self.param(name)?)
    }

    pub fn u64(&self, name: &str) -> Result<u64> {
        token_u64(name, self.param(name)?)
    }

    pub fn string(&self, name: &str) -> Result<String> {
        token_string(name, self.param(name)?)
    }

    pub fn tuple(&self, name: &str) -> Result<Vec<Token>> {
        match self.param(name)? {
            Token::Tuple(fields) => Ok(fields.clone()),
            _ => Err(type_error(name, "tuple")),
        }
    }
}

fn type_error(name: &str, expected: &'static str) -> DecodeError {
    DecodeError::ParamType {
        name: name.to_string(),
        expected,
    }
}

pub fn token_address(name: &str, token: &Token) -> Result<Address> {
    match token {
        Token::Address(address) => Ok(*address),
        _ => Err(type_error(name, "address")),
    }
}

pub fn token_uint(name: &str, token: &Token) -> Result<U256> {
    match token {
        Token::Uint(value) => Ok(*value),
        _ => Err(type_error(name, "uint")),
    }
}

pub fn token_u64(name: &str, token: &Token) -> Result<u64> {
    let value = token_uint(name, token)?;
    if value > U256::from(u64::MAX) {
        return Err(type_error(name, "uint64"));
    }
    Ok(value.as_u64())
}

pub fn token_string(name: &str, token: &Token) -> Result<String> {
    match token {
        Token::String(value) => Ok(value.clone()),
        _ => Err(type_error(name, "string")),
    }
}

/// A Rust type a decoded event can be turned into
pub trait EventShape: Sized {
    /// Event name in the contract interface
    const NAME: &'static str;

    fn from_decoded(log: &DecodedLog) -> Result<Self>;
}

/// Size of the ABI head of a static type, `None` for dynamic types
fn static_size(kind: &ParamType) -> Option<usize> {
    match kind {
        ParamType::Address
        | ParamType::Bool
        | ParamType::Int(_)
        | ParamType::Uint(_)
        | ParamType::FixedBytes(_) => Some(32),
        ParamType::FixedArray(inner, len) => static_size(inner).map(|size| size * len),
        ParamType::Tuple(fields) => fields.iter().map(static_size).sum(),
        ParamType::Bytes | ParamType::String | ParamType::Array(_) => None,
    }
}

/// Decode one topic against an indexed input
fn decode_topic(name: &str, kind: &ParamType, topic: &H256) -> Result<Token> {
    let bytes = topic.as_bytes();
    let invalid = || DecodeError::TopicType {
        name: name.to_string(),
        kind: kind.to_string(),
    };

    match kind {
        ParamType::Address => {
            if bytes[..12].iter().any(|b| *b != 0) {
                return Err(invalid());
            }
            Ok(Token::Address(Address::from_slice(&bytes[12..])))
        }
        ParamType::Bool => match U256::from_big_endian(bytes) {
            v if v.is_zero() => Ok(Token::Bool(false)),
            v if v == U256::one() => Ok(Token::Bool(true)),
            _ => Err(invalid()),
        },
        ParamType::Uint(bits) => {
            let value = U256::from_big_endian(bytes);
            if *bits < 256 && value.bits() > *bits {
                return Err(invalid());
            }
            Ok(Token::Uint(value))
        }
        ParamType::Int(_) => Ok(Token::Int(U256::from_big_endian(bytes))),
        ParamType::FixedBytes(len) => {
            if *len > 32 || bytes[*len..].iter().any(|b| *b != 0) {
                return Err(invalid());
            }
            Ok(Token::FixedBytes(bytes[..*len].to_vec()))
        }
        // Only the hash of indexed dynamic values reaches the log
        ParamType::String | ParamType::Bytes | ParamType::Array(_) => {
            Ok(Token::FixedBytes(bytes.to_vec()))
        }
        ParamType::FixedArray(..) | ParamType::Tuple(_) => Err(invalid()),
    }
}

/// Decode the unindexed payload and the indexed topics of a log
pub fn decode_log(schema: &EventSchema, log: &Log) -> Result<DecodedLog> {
    let topics = log.topics.get(1..).unwrap_or_default();
    if topics.len() != schema.indexed.len() {
        return Err(DecodeError::TopicCount {
            event: schema.name.clone(),
            expected: schema.indexed.len(),
            actual: topics.len(),
        });
    }

    let unindexed: Vec<ParamType> = schema
        .event
        .inputs
        .iter()
        .filter(|input| !input.indexed)
        .map(|input| input.kind.clone())
        .collect();

    let data = log.data.as_ref();
    let head: usize = unindexed
        .iter()
        .map(|kind| static_size(kind).unwrap_or(32))
        .sum();
    if data.len() < head || data.len() % 32 != 0 {
        return Err(DecodeError::PayloadLength {
            event: schema.name.clone(),
            head,
            actual: data.len(),
        });
    }

    let mut payload = ethers::abi::decode(&unindexed, data)
        .map_err(|e| DecodeError::Payload {
            event: schema.name.clone(),
            reason: e.to_string(),
        })?
        .into_iter();

    let mut topic_values = schema
        .indexed
        .iter()
        .zip(topics)
        .map(|(input, topic)| decode_topic(&input.name, &input.kind, topic))
        .collect::<Result<Vec<_>>>()?
        .into_iter();

    // Merge both streams back into declaration order
    let mut params = Vec::with_capacity(schema.event.inputs.len());
    for input in &schema.event.inputs {
        let value = if input.indexed {
            topic_values.next()
        } else {
            payload.next()
        };
        let value = value.ok_or_else(|| DecodeError::MissingParam(input.name.clone()))?;
        params.push((input.name.clone(), value));
    }

    Ok(DecodedLog {
        name: schema.name.clone(),
        params,
    })
}

/// Looks logs up in the registry and decodes them into event shapes
#[derive(Debug, Clone)]
pub struct LogDecoder {
    registry: Arc<EventRegistry>,
}

impl LogDecoder {
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Event name of a log, if its signature is known
    pub fn event_name(&self, log: &Log) -> Option<&str> {
        log.topics
            .first()
            .and_then(|signature| self.registry.event_name(signature))
    }

    /// Decode `log` without committing to a shape
    pub fn decode_raw(&self, log: &Log) -> Result<DecodedLog> {
        let signature = log.topics.first().ok_or(DecodeError::MissingSignature)?;
        let schema = self
            .registry
            .schema(signature)
            .ok_or(DecodeError::UnknownEvent(*signature))?;
        decode_log(schema, log)
    }

    pub fn decode<T: EventShape>(&self, log: &Log) -> Result<T> {
        let decoded = self.decode_raw(log)?;
        if decoded.name != T::NAME {
            return Err(DecodeError::ShapeMismatch {
                expected: T::NAME,
                actual: decoded.name,
            });
        }
        T::from_decoded(&decoded)
    }
}
