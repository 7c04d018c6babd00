//! Challenge/response value types shared by the scheduler and the
//! control-plane that feeds it.

use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// One resource node offered by one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Provider (owner) address
    pub provider: Address,
    /// Node index under the provider
    pub id: u64,
}

impl NodeId {
    pub fn new(provider: Address, id: u64) -> Self {
        Self { provider, id }
    }

    /// Address bytes followed by the little-endian node index.
    ///
    /// Addresses are fixed width, so the encoding is injective.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20 + 8);
        out.extend_from_slice(self.provider.as_bytes());
        out.extend_from_slice(&self.id.to_le_bytes());
        out
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{}", self.provider, self.id)
    }
}

/// A single challenge issued to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof {
    #[serde(flatten)]
    pub node: NodeId,
    pub nonce: i64,
}

impl Proof {
    pub fn new(node: NodeId, nonce: i64) -> Self {
        Self { node, nonce }
    }

    /// Node encoding followed by the little-endian nonce.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.node.to_bytes();
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out
    }
}

/// Outcome of a proof, pushed by an external prover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofResult {
    #[serde(flatten)]
    pub node: NodeId,
    pub success: bool,
}

impl ProofResult {
    pub fn new(node: NodeId, success: bool) -> Self {
        Self { node, success }
    }
}
