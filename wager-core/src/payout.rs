/// Split of a two-player pot between the winner and the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayoutSettings {
    pub winner_share_percent: u64,
}

impl Default for PayoutSettings {
    fn default() -> Self {
        PayoutSettings {
            winner_share_percent: 80,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayoutQuote {
    pub stake: u64,
    pub pot: u64,
    pub winner_payout: u64,
    pub platform_margin: u64,
}

impl PayoutSettings {
    pub fn is_valid(&self) -> bool {
        self.winner_share_percent <= 100
    }

    pub fn quote(&self, stake: u64) -> PayoutQuote {
        let pot = stake.saturating_mul(2);
        let share = self.winner_share_percent.min(100);
        // u128 keeps pot * share from overflowing for large stakes
        let winner_payout = (pot as u128 * share as u128 / 100) as u64;
        PayoutQuote {
            stake,
            pot,
            winner_payout,
            platform_margin: pot - winner_payout,
        }
    }
}
