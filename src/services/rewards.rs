//! Battle reward policy
//!
//! The engine decides who won; how much that is worth is configuration. The
//! default policy pays the winner and loser a fraction of their own final
//! scores, and splits a pooled fraction evenly on a draw.

use crate::config::RewardRates;
use crate::domain::{BattleResult, RewardSplit};
use anyhow::Result;

pub trait RewardPolicy: Send + Sync {
    /// Compute payouts for a finished battle. Failures here never block
    /// settlement; the engine records the outcome and retries rewards later.
    fn rewards(&self, result: &BattleResult) -> Result<RewardSplit>;
}

/// Rate-based policy driven by `RewardRates`
pub struct RateRewardPolicy {
    rates: RewardRates,
}

impl RateRewardPolicy {
    pub fn new(rates: RewardRates) -> Self {
        Self { rates }
    }
}

impl RewardPolicy for RateRewardPolicy {
    fn rewards(&self, result: &BattleResult) -> Result<RewardSplit> {
        let split = match result {
            BattleResult::Decided {
                winner_score,
                loser_score,
                ..
            } => RewardSplit {
                winner_coins: (*winner_score as f64 * self.rates.winner_rate).floor() as i64,
                loser_coins: (*loser_score as f64 * self.rates.loser_rate).floor() as i64,
            },
            BattleResult::Draw { total_score } => {
                let each = (*total_score as f64 * self.rates.draw_rate).floor() as i64;
                RewardSplit {
                    winner_coins: each,
                    loser_coins: each,
                }
            }
        };
        Ok(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SlotId;

    #[test]
    fn decided_battle_pays_by_rate() {
        let policy = RateRewardPolicy::new(RewardRates::default());
        let split = policy
            .rewards(&BattleResult::Decided {
                winner: SlotId::Host2,
                winner_score: 60,
                loser_score: 50,
            })
            .unwrap();

        assert_eq!(split.winner_coins, 6); // floor(60 * 0.10)
        assert_eq!(split.loser_coins, 2); // floor(50 * 0.05)
    }

    #[test]
    fn draw_splits_the_pool() {
        let policy = RateRewardPolicy::new(RewardRates::default());
        let split = policy
            .rewards(&BattleResult::Draw { total_score: 100 })
            .unwrap();

        assert_eq!(split.winner_coins, 7); // floor(100 * 0.075)
        assert_eq!(split.loser_coins, 7);
    }
}
