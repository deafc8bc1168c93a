use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
};

use rand::{Rng, seq::IndexedRandom};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorOption {
    pub name: String,
    pub multiplier: u64,
}

impl ColorOption {
    pub fn new(name: &str, multiplier: u64) -> Self {
        ColorOption {
            name: name.to_string(),
            multiplier,
        }
    }
}

/// The colors a round can land on, each with its payout multiplier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorPalette {
    options: Vec<ColorOption>,
}

impl Default for ColorPalette {
    fn default() -> Self {
        ColorPalette::new(vec![
            ColorOption::new("Red", 2),
            ColorOption::new("Blue", 2),
            ColorOption::new("Green", 2),
            ColorOption::new("Yellow", 3),
            ColorOption::new("Purple", 3),
            ColorOption::new("Orange", 4),
        ])
    }
}

impl ColorPalette {
    pub fn new(options: Vec<ColorOption>) -> Self {
        ColorPalette { options }
    }

    pub fn options(&self) -> &[ColorOption] {
        &self.options
    }

    /// Case-insensitive lookup, returns the canonical option.
    pub fn find(&self, name: &str) -> Option<&ColorOption> {
        self.options
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&ColorOption> {
        self.options.choose(rng)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorRoundSettings {
    pub betting_seconds: u32,
    pub history_cap: usize,
    pub starting_balance: u64,
}

impl Default for ColorRoundSettings {
    fn default() -> Self {
        ColorRoundSettings {
            betting_seconds: 30,
            history_cap: 10,
            starting_balance: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    NotStarted,
    BettingOpen,
    Resolving,
    Settled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorBet {
    pub color: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BetRejection {
    #[error("Betting is closed")]
    BettingClosed,
    #[error("You are not seated in this room")]
    NotSeated,
    #[error("Unknown color")]
    UnknownColor,
    #[error("Bet amount must be positive")]
    InvalidAmount,
    #[error("Insufficient balance")]
    InsufficientBalance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundStart {
    pub round: u32,
    pub time_left: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundTick {
    Remaining(u32),
    Closed,
    Idle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundWinner<P> {
    pub player: P,
    pub winnings: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundResult<P> {
    pub round: u32,
    pub color: String,
    pub multiplier: u64,
    pub winners: Vec<RoundWinner<P>>,
    pub total_pot: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundSummary {
    pub round: u32,
    pub color: String,
    pub winner_count: usize,
    pub total_pot: u64,
}

/// Betting state of one color room: seated players with their room balance,
/// the live round and the recent results.
#[derive(Clone, Debug)]
pub struct ColorTable<P> {
    settings: ColorRoundSettings,
    palette: ColorPalette,
    round: u32,
    phase: RoundPhase,
    time_left: u32,
    players: Vec<(P, u64)>,
    bets: HashMap<P, ColorBet>,
    history: VecDeque<RoundSummary>,
}

impl<P: Clone + Eq + Hash> ColorTable<P> {
    pub fn new(settings: ColorRoundSettings, palette: ColorPalette, players: Vec<P>) -> Self {
        let balance = settings.starting_balance;
        ColorTable {
            time_left: settings.betting_seconds,
            settings,
            palette,
            round: 0,
            phase: RoundPhase::NotStarted,
            players: players.into_iter().map(|p| (p, balance)).collect(),
            bets: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }

    pub fn players(&self) -> &[(P, u64)] {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn balance(&self, player: &P) -> Option<u64> {
        self.players
            .iter()
            .find(|(p, _)| p == player)
            .map(|(_, b)| *b)
    }

    pub fn bet(&self, player: &P) -> Option<&ColorBet> {
        self.bets.get(player)
    }

    pub fn history(&self) -> impl Iterator<Item = &RoundSummary> {
        self.history.iter()
    }

    pub fn start_round(&mut self) -> RoundStart {
        self.round += 1;
        self.time_left = self.settings.betting_seconds;
        self.bets.clear();
        self.phase = RoundPhase::BettingOpen;
        RoundStart {
            round: self.round,
            time_left: self.time_left,
        }
    }

    /// Advances the betting window by one second.
    pub fn tick(&mut self) -> RoundTick {
        if self.phase != RoundPhase::BettingOpen {
            return RoundTick::Idle;
        }
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            self.phase = RoundPhase::Resolving;
            RoundTick::Closed
        } else {
            RoundTick::Remaining(self.time_left)
        }
    }

    /// Records a bet, replacing any earlier bet of the same player this round.
    pub fn place_bet(
        &mut self,
        player: &P,
        color: &str,
        amount: u64,
    ) -> Result<ColorBet, BetRejection> {
        if self.phase != RoundPhase::BettingOpen {
            return Err(BetRejection::BettingClosed);
        }
        let Some(balance) = self.balance(player) else {
            return Err(BetRejection::NotSeated);
        };
        let Some(option) = self.palette.find(color) else {
            return Err(BetRejection::UnknownColor);
        };
        if amount == 0 {
            return Err(BetRejection::InvalidAmount);
        }
        if amount > balance {
            return Err(BetRejection::InsufficientBalance);
        }
        let bet = ColorBet {
            color: option.name.clone(),
            amount,
        };
        self.bets.insert(player.clone(), bet.clone());
        Ok(bet)
    }

    /// Settles the round against `winning`. Matching bets are credited
    /// `amount * multiplier`; other bets are left alone.
    pub fn resolve(&mut self, winning: &ColorOption) -> RoundResult<P> {
        let mut winners = Vec::new();
        for (player, balance) in self.players.iter_mut() {
            let Some(bet) = self.bets.get(player) else {
                continue;
            };
            if bet.color != winning.name {
                continue;
            }
            let winnings = bet.amount.saturating_mul(winning.multiplier);
            *balance = balance.saturating_add(winnings);
            winners.push(RoundWinner {
                player: player.clone(),
                winnings,
            });
        }
        let total_pot = winners.iter().map(|w| w.winnings).sum();

        self.history.push_front(RoundSummary {
            round: self.round,
            color: winning.name.clone(),
            winner_count: winners.len(),
            total_pot,
        });
        self.history.truncate(self.settings.history_cap);
        self.phase = RoundPhase::Settled;
        self.time_left = 0;

        RoundResult {
            round: self.round,
            color: winning.name.clone(),
            multiplier: winning.multiplier,
            winners,
            total_pot,
        }
    }

    /// Drops a player and their pending bet, returning the final balance.
    pub fn remove_player(&mut self, player: &P) -> Option<u64> {
        let index = self.players.iter().position(|(p, _)| p == player)?;
        self.bets.remove(player);
        Some(self.players.remove(index).1)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn table() -> ColorTable<&'static str> {
        ColorTable::new(
            ColorRoundSettings::default(),
            ColorPalette::default(),
            vec!["alice", "bob"],
        )
    }

    fn option(name: &str) -> ColorOption {
        ColorPalette::default()
            .find(name)
            .cloned()
            .expect("Color should exist")
    }

    #[test]
    fn test_winning_bet_is_credited() {
        let mut table = table();
        table.start_round();
        table.place_bet(&"alice", "Yellow", 100).expect("Bet should be accepted");
        table.place_bet(&"bob", "Red", 50).expect("Bet should be accepted");

        let result = table.resolve(&option("Yellow"));
        assert_eq!(result.round, 1);
        assert_eq!(
            result.winners,
            vec![RoundWinner {
                player: "alice",
                winnings: 300,
            }]
        );
        assert_eq!(result.total_pot, 300);
        assert_eq!(table.balance(&"alice"), Some(1300));
        assert_eq!(table.balance(&"bob"), Some(1000));
    }

    #[test]
    fn test_second_bet_replaces_first() {
        let mut table = table();
        table.start_round();
        table.place_bet(&"alice", "Orange", 100).expect("Bet should be accepted");
        table.place_bet(&"alice", "blue", 40).expect("Bet should be accepted");
        assert_eq!(
            table.bet(&"alice"),
            Some(&ColorBet {
                color: "Blue".to_string(),
                amount: 40,
            })
        );

        let result = table.resolve(&option("Orange"));
        assert!(result.winners.is_empty());
        assert_eq!(table.balance(&"alice"), Some(1000));
    }

    #[test]
    fn test_bet_rejections() {
        let mut table = table();
        assert_eq!(
            table.place_bet(&"alice", "Red", 10),
            Err(BetRejection::BettingClosed)
        );
        table.start_round();
        assert_eq!(
            table.place_bet(&"carol", "Red", 10),
            Err(BetRejection::NotSeated)
        );
        assert_eq!(
            table.place_bet(&"alice", "Black", 10),
            Err(BetRejection::UnknownColor)
        );
        assert_eq!(
            table.place_bet(&"alice", "Red", 0),
            Err(BetRejection::InvalidAmount)
        );
        assert_eq!(
            table.place_bet(&"alice", "Red", 1001),
            Err(BetRejection::InsufficientBalance)
        );
        assert!(table.place_bet(&"alice", "Red", 1000).is_ok());
    }

    #[test]
    fn test_betting_window_closes() {
        let mut table = ColorTable::new(
            ColorRoundSettings {
                betting_seconds: 3,
                ..ColorRoundSettings::default()
            },
            ColorPalette::default(),
            vec!["alice", "bob"],
        );
        assert_eq!(table.tick(), RoundTick::Idle);
        let start = table.start_round();
        assert_eq!(start, RoundStart { round: 1, time_left: 3 });
        assert_eq!(table.tick(), RoundTick::Remaining(2));
        assert_eq!(table.tick(), RoundTick::Remaining(1));
        assert_eq!(table.tick(), RoundTick::Closed);
        assert_eq!(table.phase(), RoundPhase::Resolving);
        assert_eq!(
            table.place_bet(&"alice", "Red", 10),
            Err(BetRejection::BettingClosed)
        );
    }

    #[test]
    fn test_new_round_clears_bets() {
        let mut table = table();
        table.start_round();
        table.place_bet(&"bob", "Green", 10).expect("Bet should be accepted");
        table.resolve(&option("Red"));
        let start = table.start_round();
        assert_eq!(start.round, 2);
        assert!(table.bet(&"bob").is_none());
    }

    #[test]
    fn test_history_is_capped_most_recent_first() {
        let mut table = table();
        for _ in 0..12 {
            table.start_round();
            table.resolve(&option("Purple"));
        }
        let rounds: Vec<u32> = table.history().map(|s| s.round).collect();
        assert_eq!(rounds, vec![12, 11, 10, 9, 8, 7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_remove_player() {
        let mut table = table();
        table.start_round();
        table.place_bet(&"bob", "Red", 10).expect("Bet should be accepted");
        assert_eq!(table.remove_player(&"bob"), Some(1000));
        assert_eq!(table.player_count(), 1);
        assert!(table.bet(&"bob").is_none());
        assert_eq!(table.remove_player(&"bob"), None);
    }

    #[test]
    fn test_palette() {
        let palette = ColorPalette::default();
        assert_eq!(palette.options().len(), 6);
        assert_eq!(palette.find("orange").map(|o| o.multiplier), Some(4));
        assert!(palette.find("Black").is_none());

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let drawn = palette.draw(&mut rng).expect("Palette is not empty");
            assert!(palette.options().contains(drawn));
        }
        assert!(ColorPalette::new(vec![]).draw(&mut rng).is_none());
    }
}
