//! Typed contract events.

use super::decoder::{token_string, token_u64, token_uint, DecodeError, DecodedLog, EventShape, Result};
use ethers::abi::Token;
use ethers::types::{Address, U256};

/// A provider joined the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEvent {
    pub cp: Address,
    pub name: String,
    pub ip: String,
    pub domain: String,
    pub port: String,
}

impl EventShape for RegisterEvent {
    const NAME: &'static str = "Register";

    fn from_decoded(log: &DecodedLog) -> Result<Self> {
        Ok(Self {
            cp: log.address("cp")?,
            name: log.string("name")?,
            ip: log.string("ip")?,
            domain: log.string("domain")?,
            port: log.string("port")?,
        })
    }
}

/// Price of a modelled resource (cpu, gpu)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPrice {
    pub price_mon: U256,
    pub price_sec: U256,
    pub model: String,
}

/// Price of a sized resource (memory, disk)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityPrice {
    pub price_mon: U256,
    pub price_sec: U256,
    pub num: u64,
}

fn three_fields(name: &str, fields: Vec<Token>) -> Result<[Token; 3]> {
    fields.try_into().map_err(|_| DecodeError::ParamType {
        name: name.to_string(),
        expected: "3-field tuple",
    })
}

impl ModelPrice {
    fn from_tuple(name: &str, fields: Vec<Token>) -> Result<Self> {
        let [mon, sec, model] = three_fields(name, fields)?;
        Ok(Self {
            price_mon: token_uint(name, &mon)?,
            price_sec: token_uint(name, &sec)?,
            model: token_string(name, &model)?,
        })
    }
}

impl CapacityPrice {
    fn from_tuple(name: &str, fields: Vec<Token>) -> Result<Self> {
        let [mon, sec, num] = three_fields(name, fields)?;
        Ok(Self {
            price_mon: token_uint(name, &mon)?,
            price_sec: token_uint(name, &sec)?,
            num: token_u64(name, &num)?,
        })
    }
}

/// A provider offered a new node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddNodeEvent {
    pub cp: Address,
    pub id: u64,
    pub cpu: ModelPrice,
    pub gpu: ModelPrice,
    pub mem: CapacityPrice,
    pub disk: CapacityPrice,
}

impl EventShape for AddNodeEvent {
    const NAME: &'static str = "AddNode";

    fn from_decoded(log: &DecodedLog) -> Result<Self> {
        Ok(Self {
            cp: log.address("cp")?,
            id: log.u64("id")?,
            cpu: ModelPrice::from_tuple("cpu", log.tuple("cpu")?)?,
            gpu: ModelPrice::from_tuple("gpu", log.tuple("gpu")?)?,
            mem: CapacityPrice::from_tuple("mem", log.tuple("mem")?)?,
            disk: CapacityPrice::from_tuple("disk", log.tuple("disk")?)?,
        })
    }
}

/// A user rented a node. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderEvent {
    pub cp: Address,
    pub id: u64,
    pub nid: u64,
    /// Activation time
    pub act: U256,
    /// Probation period
    pub pro: U256,
    /// Rental duration
    pub dur: U256,
}

impl EventShape for CreateOrderEvent {
    const NAME: &'static str = "CreateOrder";

    fn from_decoded(log: &DecodedLog) -> Result<Self> {
        Ok(Self {
            cp: log.address("cp")?,
            id: log.u64("id")?,
            nid: log.u64("nid")?,
            act: log.uint("act")?,
            pro: log.uint("pro")?,
            dur: log.uint("dur")?,
        })
    }
}

/// A provider withdrew matured balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawEvent {
    pub cp: Address,
    pub amount: U256,
}

impl EventShape for WithdrawEvent {
    const NAME: &'static str = "Withdraw";

    fn from_decoded(log: &DecodedLog) -> Result<Self> {
        Ok(Self {
            cp: log.address("cp")?,
            amount: log.uint("amount")?,
        })
    }
}
