use super::abi::{MARKET_ABI, REGISTRY_ABI};
use super::decoder::DecodeError;
use ethers::abi::{Abi, Event, EventParam};
use ethers::types::H256;
use std::collections::HashMap;

/// Everything needed to decode one event kind
#[derive(Debug, Clone)]
pub struct EventSchema {
    pub name: String,
    pub event: Event,
    /// Indexed inputs in declaration order, one per topic after the first
    pub indexed: Vec<EventParam>,
}

/// Signature-hash index over a set of contract interfaces.
///
/// Immutable after construction, so it can be shared freely.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    interfaces: Vec<Abi>,
    events: HashMap<H256, EventSchema>,
}

impl EventRegistry {
    pub fn new(interfaces: Vec<Abi>) -> Self {
        let mut events = HashMap::new();

        for abi in &interfaces {
            for event in abi.events() {
                let indexed = event
                    .inputs
                    .iter()
                    .filter(|input| input.indexed)
                    .cloned()
                    .collect();

                events.insert(
                    event.signature(),
                    EventSchema {
                        name: event.name.clone(),
                        event: event.clone(),
                        indexed,
                    },
                );
            }
        }

        Self { interfaces, events }
    }

    /// Parse JSON interface definitions
    pub fn from_json<S: AsRef<str>>(sources: &[S]) -> Result<Self, DecodeError> {
        let interfaces = sources
            .iter()
            .map(|source| {
                serde_json::from_str::<Abi>(source.as_ref())
                    .map_err(|e| DecodeError::InvalidInterface(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(interfaces))
    }

    /// Registry for the bundled registry and market contracts
    pub fn grid() -> Result<Self, DecodeError> {
        Self::from_json(&[REGISTRY_ABI, MARKET_ABI])
    }

    pub fn interfaces(&self) -> &[Abi] {
        &self.interfaces
    }

    pub fn schema(&self, signature: &H256) -> Option<&EventSchema> {
        self.events.get(signature)
    }

    pub fn event_name(&self, signature: &H256) -> Option<&str> {
        self.events.get(signature).map(|schema| schema.name.as_str())
    }

    pub fn indexed(&self, signature: &H256) -> Option<&[EventParam]> {
        self.events
            .get(signature)
            .map(|schema| schema.indexed.as_slice())
    }

    /// Signature hash of a named event
    pub fn signature_of(&self, name: &str) -> Option<H256> {
        self.events
            .iter()
            .find(|(_, schema)| schema.name == name)
            .map(|(signature, _)| *signature)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
