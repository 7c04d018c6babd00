//! Event interfaces of the GRID registry and market contracts.

/// Registry contract: provider and node registration
pub const REGISTRY_ABI: &str = r#"[
  {
    "type": "event",
    "name": "Register",
    "anonymous": false,
    "inputs": [
      { "name": "cp", "type": "address", "indexed": true },
      { "name": "name", "type": "string", "indexed": false },
      { "name": "ip", "type": "string", "indexed": false },
      { "name": "domain", "type": "string", "indexed": false },
      { "name": "port", "type": "string", "indexed": false }
    ]
  },
  {
    "type": "event",
    "name": "AddNode",
    "anonymous": false,
    "inputs": [
      { "name": "cp", "type": "address", "indexed": true },
      { "name": "id", "type": "uint64", "indexed": false },
      {
        "name": "cpu", "type": "tuple", "indexed": false,
        "components": [
          { "name": "priceMon", "type": "uint256" },
          { "name": "priceSec", "type": "uint256" },
          { "name": "model", "type": "string" }
        ]
      },
      {
        "name": "gpu", "type": "tuple", "indexed": false,
        "components": [
          { "name": "priceMon", "type": "uint256" },
          { "name": "priceSec", "type": "uint256" },
          { "name": "model", "type": "string" }
        ]
      },
      {
        "name": "mem", "type": "tuple", "indexed": false,
        "components": [
          { "name": "priceMon", "type": "uint256" },
          { "name": "priceSec", "type": "uint256" },
          { "name": "num", "type": "uint64" }
        ]
      },
      {
        "name": "disk", "type": "tuple", "indexed": false,
        "components": [
          { "name": "priceMon", "type": "uint256" },
          { "name": "priceSec", "type": "uint256" },
          { "name": "num", "type": "uint64" }
        ]
      }
    ]
  }
]"#;

/// Market contract: orders and withdrawals
pub const MARKET_ABI: &str = r#"[
  {
    "type": "event",
    "name": "CreateOrder",
    "anonymous": false,
    "inputs": [
      { "name": "cp", "type": "address", "indexed": true },
      { "name": "id", "type": "uint64", "indexed": false },
      { "name": "nid", "type": "uint64", "indexed": false },
      { "name": "act", "type": "uint256", "indexed": false },
      { "name": "pro", "type": "uint256", "indexed": false },
      { "name": "dur", "type": "uint256", "indexed": false }
    ]
  },
  {
    "type": "event",
    "name": "Withdraw",
    "anonymous": false,
    "inputs": [
      { "name": "cp", "type": "address", "indexed": true },
      { "name": "amount", "type": "uint256", "indexed": false }
    ]
  }
]"#;
