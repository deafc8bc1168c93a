use std::sync::{Arc, Mutex};

use log::info;
use wager_core::{ChessWinReason, PayoutQuote};

use crate::{IdentityId, RoomId};

#[derive(Clone, Debug, PartialEq)]
pub enum Settlement {
    Chess {
        room_id: RoomId,
        winner: IdentityId,
        loser: IdentityId,
        reason: ChessWinReason,
        payout: PayoutQuote,
    },
    /// Final room balances of color players leaving the table.
    Color {
        room_id: RoomId,
        stake: u64,
        balances: Vec<(IdentityId, u64)>,
    },
}

pub type ArcSettlementSink = Arc<Box<dyn SettlementSink + Send + Sync + 'static>>;

/// Hand-off point to wallet persistence. Must return without waiting on I/O.
pub trait SettlementSink {
    fn settle(&self, settlement: Settlement);
}

pub struct LogSettlementSink;

impl SettlementSink for LogSettlementSink {
    fn settle(&self, settlement: Settlement) {
        match settlement {
            Settlement::Chess {
                room_id,
                winner,
                loser,
                reason,
                payout,
            } => info!(
                "Settlement {}: {} beat {} ({:?}), pot {}, payout {}, margin {}",
                room_id, winner, loser, reason, payout.pot, payout.winner_payout,
                payout.platform_margin
            ),
            Settlement::Color {
                room_id,
                stake,
                balances,
            } => info!(
                "Settlement {}: stake {}, balances {:?}",
                room_id, stake, balances
            ),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockSettlementSink {
    pub settlements: Arc<Mutex<Vec<Settlement>>>,
}

#[allow(unused)]
impl MockSettlementSink {
    pub fn get_settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().unwrap().clone()
    }
}

impl SettlementSink for MockSettlementSink {
    fn settle(&self, settlement: Settlement) {
        self.settlements.lock().unwrap().push(settlement);
    }
}
