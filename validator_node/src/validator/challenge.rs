use super::Result;
use async_trait::async_trait;

pub type Challenge = [u8; 32];

/// Source of the per-cycle challenge value
#[async_trait]
pub trait ChallengeSource: Send + Sync {
    async fn generate_challenge(&self) -> Result<Challenge>;
}

/// Local pseudo-random challenges
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomChallenge;

#[async_trait]
impl ChallengeSource for RandomChallenge {
    async fn generate_challenge(&self) -> Result<Challenge> {
        Ok(rand::random())
    }
}
