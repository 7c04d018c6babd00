//! Per-cycle reward release and penalties.

use crate::database::Profit;
use num_bigint::BigInt;

/// Failed proofs forfeit `1/PENALTY_DIVISOR` of the still-accruing profit
pub const PENALTY_DIVISOR: u32 = 100;

/// What one settlement moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub reward: BigInt,
    pub penalty: BigInt,
}

/// Reward due at `anchor` for a schedule running from `last_time` to
/// `end_time`.
///
/// The prorating factor is the truncated quotient of elapsed over total
/// seconds, so a partial period releases nothing.
pub fn reward_at(anchor: i64, profit: &Profit) -> BigInt {
    if anchor <= profit.last_time {
        BigInt::from(0)
    } else if anchor >= profit.end_time {
        profit.profit.clone()
    } else if profit.last_time >= profit.end_time {
        BigInt::from(0)
    } else {
        let factor = (anchor - profit.last_time) / (profit.end_time - profit.last_time);
        &profit.profit * factor
    }
}

/// Apply one node's proof outcome for the cycle starting at `anchor`
pub fn settle(anchor: i64, proven: bool, profit: &mut Profit) -> Settlement {
    let reward = reward_at(anchor, profit);
    let remaining = &profit.profit - &reward;
    let penalty = if proven {
        BigInt::from(0)
    } else {
        &remaining / PENALTY_DIVISOR
    };

    profit.last_time = anchor;
    profit.balance += &reward;
    profit.profit = remaining - &penalty;
    profit.penalty += &penalty;

    Settlement { reward, penalty }
}
