use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use log::{debug, error, info};
use tokio::select;
use tokio_util::sync::CancellationToken;
use wager_core::{ColorBet, ColorTable, RoundTick};

use crate::{
    GameType, IdentityId, RoomId, ServiceError, ServiceResult,
    config::GameConfig,
    connection::ArcConnectionService,
    room::{ArcRoomService, Room, Seat},
    settlement::{ArcSettlementSink, Settlement},
    transport::{ColorPlayerInfo, RoundWinnerInfo, ServerMessage},
};

const ROUND_TICK: Duration = Duration::from_secs(1);
pub const NOT_ENOUGH_PLAYERS: &str = "not enough players";

#[derive(Clone, Debug)]
pub struct ColorSession {
    pub room_id: RoomId,
    pub stake: u64,
    pub seats: Vec<Seat>,
    pub table: ColorTable<IdentityId>,
}

impl ColorSession {
    pub fn player_ids(&self) -> Vec<IdentityId> {
        self.seats.iter().map(|s| s.id.clone()).collect()
    }

    fn display_name(&self, id: &IdentityId) -> String {
        self.seats
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.display_name.clone())
            .unwrap_or_else(|| id.clone())
    }

    pub fn player_infos(&self) -> Vec<ColorPlayerInfo> {
        self.table
            .players()
            .iter()
            .map(|(id, balance)| ColorPlayerInfo {
                id: id.clone(),
                display_name: self.display_name(id),
                balance: *balance,
            })
            .collect()
    }
}

pub type ArcColorService = Arc<Box<dyn ColorService + Send + Sync + 'static>>;

pub trait ColorService {
    fn start_game(&self, room: &Room) -> ServiceResult<()>;
    fn place_bet(
        &self,
        player: &IdentityId,
        room_id: &str,
        color: &str,
        amount: u64,
    ) -> ServiceResult<ColorBet>;
    fn get_session(&self, room_id: &str) -> Option<ColorSession>;
    fn on_player_disconnected(&self, player: &IdentityId);
}

#[derive(Clone)]
pub struct ColorServiceImpl {
    connection_service: ArcConnectionService,
    room_service: ArcRoomService,
    settlement_sink: ArcSettlementSink,
    config: Arc<GameConfig>,
    sessions: Arc<DashMap<RoomId, ColorSession>>,
    session_tokens: Arc<DashMap<RoomId, CancellationToken>>,
    session_by_player: Arc<DashMap<IdentityId, RoomId>>,
}

impl ColorServiceImpl {
    pub fn new(
        connection_service: ArcConnectionService,
        room_service: ArcRoomService,
        settlement_sink: ArcSettlementSink,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            connection_service,
            room_service,
            settlement_sink,
            config,
            sessions: Arc::new(DashMap::new()),
            session_tokens: Arc::new(DashMap::new()),
            session_by_player: Arc::new(DashMap::new()),
        }
    }

    /// Opens the next round, or ends the session when the table is short of
    /// players. Returns whether the round loop should go on.
    fn begin_round(&self, room_id: &str) -> bool {
        let Some(mut session) = self.sessions.get_mut(room_id) else {
            return false;
        };
        if session.table.player_count() < 2 {
            drop(session);
            self.finish_session(room_id, NOT_ENOUGH_PLAYERS);
            return false;
        }
        let start = session.table.start_round();
        let players = session.player_ids();
        drop(session);

        debug!("Color room {}: round {} open", room_id, start.round);
        self.connection_service.send_to_many(
            &players,
            &ServerMessage::RoundStarted {
                room_id: room_id.to_string(),
                round: start.round,
                time_left: start.time_left,
            },
        );
        true
    }

    /// Counts the betting window down by a second. Returns `None` once the
    /// session is gone.
    fn tick_round(&self, room_id: &str) -> Option<RoundTick> {
        let mut session = self.sessions.get_mut(room_id)?;
        let tick = session.table.tick();
        let players = session.player_ids();
        drop(session);

        let RoundTick::Remaining(time_left) = tick else {
            return Some(tick);
        };
        self.connection_service.send_to_many(
            &players,
            &ServerMessage::TimerUpdate {
                room_id: room_id.to_string(),
                time_left,
            },
        );
        Some(tick)
    }

    fn resolve_round(&self, room_id: &str) -> bool {
        let Some(mut session) = self.sessions.get_mut(room_id) else {
            return false;
        };
        let winning = {
            let mut rng = rand::rng();
            session.table.palette().draw(&mut rng).cloned()
        };
        let Some(winning) = winning else {
            drop(session);
            error!("Color room {} has an empty palette", room_id);
            self.finish_session(room_id, "no colors configured");
            return false;
        };

        let result = session.table.resolve(&winning);
        let history = session.table.history().cloned().collect();
        let winners: Vec<RoundWinnerInfo> = result
            .winners
            .iter()
            .map(|w| RoundWinnerInfo {
                id: w.player.clone(),
                display_name: session.display_name(&w.player),
                winnings: w.winnings,
            })
            .collect();
        let players = session.player_ids();
        drop(session);

        info!(
            "Color room {}: round {} landed on {}, {} winner(s), pot {}",
            room_id,
            result.round,
            result.color,
            winners.len(),
            result.total_pot
        );
        self.connection_service.send_to_many(
            &players,
            &ServerMessage::RoundResult {
                room_id: room_id.to_string(),
                round: result.round,
                color: result.color,
                multiplier: result.multiplier,
                winners,
                total_pot: result.total_pot,
                history,
            },
        );
        true
    }

    fn finish_session(&self, room_id: &str, reason: &str) {
        let Some((_, session)) = self.sessions.remove(room_id) else {
            return;
        };
        if let Some((_, token)) = self.session_tokens.remove(room_id) {
            token.cancel();
        }
        let players = session.player_ids();
        for id in &players {
            self.session_by_player.remove_if(id, |_, r| r == room_id);
        }
        self.room_service.remove(GameType::Color, room_id);
        info!("Color room {} is over: {}", room_id, reason);

        self.connection_service.send_to_many(
            &players,
            &ServerMessage::ColorGameOver {
                room_id: room_id.to_string(),
                reason: reason.to_string(),
            },
        );
        self.connection_service.clear_current_game(&players);

        self.settlement_sink.settle(Settlement::Color {
            room_id: room_id.to_string(),
            stake: session.stake,
            balances: session.table.players().to_vec(),
        });
    }

    fn run_rounds(&self, room_id: RoomId, cancel_token: CancellationToken) {
        let color_service = self.clone();
        let result_delay = self.config.color_result_delay;
        tokio::spawn(async move {
            while color_service.begin_round(&room_id) {
                loop {
                    select! {
                        _ = cancel_token.cancelled() => {
                            return;
                        }
                        _ = tokio::time::sleep(ROUND_TICK) => {}
                    }
                    match color_service.tick_round(&room_id) {
                        Some(RoundTick::Remaining(_)) => continue,
                        Some(RoundTick::Closed) => break,
                        _ => return,
                    }
                }
                if !color_service.resolve_round(&room_id) {
                    return;
                }
                select! {
                    _ = cancel_token.cancelled() => {
                        return;
                    }
                    _ = tokio::time::sleep(result_delay) => {}
                }
            }
        });
    }
}

impl ColorService for ColorServiceImpl {
    fn start_game(&self, room: &Room) -> ServiceResult<()> {
        if room.game_type != GameType::Color {
            return ServiceError::bad_request("Not a color room");
        }
        if room.seats.len() < 2 {
            return ServiceError::not_possible(NOT_ENOUGH_PLAYERS);
        }
        if self.sessions.contains_key(&room.id) {
            return ServiceError::not_possible("Game already started");
        }

        let session = ColorSession {
            room_id: room.id.clone(),
            stake: room.stake,
            seats: room.seats.clone(),
            table: ColorTable::new(
                self.config.color_round.clone(),
                self.config.color_palette.clone(),
                room.seat_ids(),
            ),
        };
        let started_msg = ServerMessage::ColorStarted {
            room_id: room.id.clone(),
            players: session.player_infos(),
            stake: room.stake,
        };

        let cancel_token = CancellationToken::new();
        self.sessions.insert(room.id.clone(), session);
        self.session_tokens
            .insert(room.id.clone(), cancel_token.clone());
        for id in room.seat_ids() {
            self.session_by_player.insert(id, room.id.clone());
        }
        info!(
            "Color room {} started with {:?}, stake {}",
            room.id,
            room.seat_ids(),
            room.stake
        );

        self.connection_service
            .send_to_many(&room.seat_ids(), &started_msg);
        self.run_rounds(room.id.clone(), cancel_token);
        Ok(())
    }

    fn place_bet(
        &self,
        player: &IdentityId,
        room_id: &str,
        color: &str,
        amount: u64,
    ) -> ServiceResult<ColorBet> {
        let Some(mut session) = self.sessions.get_mut(room_id) else {
            return ServiceError::not_found("Room not found");
        };
        let bet = match session.table.place_bet(player, color, amount) {
            Ok(bet) => bet,
            Err(e) => {
                debug!("Rejected bet of {} in {}: {}", player, room_id, e);
                return ServiceError::not_possible(e.to_string());
            }
        };
        let players = session.player_ids();
        drop(session);

        self.connection_service.send_to_many(
            &players,
            &ServerMessage::BetPlaced {
                room_id: room_id.to_string(),
                player_id: player.clone(),
                color: bet.color.clone(),
                amount: bet.amount,
            },
        );
        Ok(bet)
    }

    fn get_session(&self, room_id: &str) -> Option<ColorSession> {
        self.sessions.get(room_id).map(|s| s.value().clone())
    }

    fn on_player_disconnected(&self, player: &IdentityId) {
        let Some((_, room_id)) = self.session_by_player.remove(player) else {
            return;
        };
        let Some(mut session) = self.sessions.get_mut(&room_id) else {
            return;
        };
        let balance = session.table.remove_player(player);
        session.seats.retain(|s| &s.id != player);
        let stake = session.stake;
        let remaining = session.player_ids();
        let players = session.player_infos();
        drop(session);

        info!("{} left color room {}", player, room_id);
        self.room_service
            .vacate_seat(GameType::Color, &room_id, player);
        if let Some(balance) = balance {
            self.settlement_sink.settle(Settlement::Color {
                room_id: room_id.clone(),
                stake,
                balances: vec![(player.clone(), balance)],
            });
        }
        self.connection_service.send_to_many(
            &remaining,
            &ServerMessage::PlayersUpdate { room_id, players },
        );
    }
}
