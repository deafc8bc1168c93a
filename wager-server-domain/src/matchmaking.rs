use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{error, info};
use thiserror::Error;
use wager_core::PieceColor;

use crate::{
    GameType, IdentityId,
    chess::ArcChessService,
    color::ArcColorService,
    config::GameConfig,
    connection::ArcConnectionService,
    identity::Identity,
    room::{ArcRoomService, Room, RoomError, RoomStatus, Seat},
    transport::{ColorPlayerInfo, ServerMessage},
};

#[derive(Clone, Debug, PartialEq)]
pub struct QueueEntry {
    pub seat: Seat,
    pub stake: u64,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Already in queue")]
    AlreadyQueued,
    #[error("Entry fee must be positive")]
    InvalidStake,
}

/// Waiting pool of one game type, kept in arrival order.
#[derive(Clone, Debug, Default)]
pub struct MatchQueue {
    entries: Vec<QueueEntry>,
}

impl MatchQueue {
    pub fn contains(&self, id: &IdentityId) -> bool {
        self.entries.iter().any(|e| &e.seat.id == id)
    }

    pub fn push(&mut self, entry: QueueEntry) -> Result<(), QueueError> {
        if self.contains(&entry.seat.id) {
            return Err(QueueError::AlreadyQueued);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, id: &IdentityId) -> Option<QueueEntry> {
        let index = self.entries.iter().position(|e| &e.seat.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Pairs `newcomer` with the earliest other entry at the same stake.
    /// Returns `(newcomer, partner)`.
    pub fn take_pair(&mut self, newcomer: &IdentityId) -> Option<(QueueEntry, QueueEntry)> {
        let stake = self.entries.iter().find(|e| &e.seat.id == newcomer)?.stake;
        let partner_id = self
            .entries
            .iter()
            .find(|e| &e.seat.id != newcomer && e.stake == stake)?
            .seat
            .id
            .clone();
        let first = self.remove(newcomer)?;
        let second = self.remove(&partner_id)?;
        Some((first, second))
    }

    /// Takes the first `size` entries at `stake`, in arrival order.
    pub fn take_group(&mut self, stake: u64, size: usize) -> Option<Vec<QueueEntry>> {
        let ids: Vec<IdentityId> = self
            .entries
            .iter()
            .filter(|e| e.stake == stake)
            .take(size)
            .map(|e| e.seat.id.clone())
            .collect();
        if ids.len() < size {
            return None;
        }
        Some(ids.iter().filter_map(|id| self.remove(id)).collect())
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueueOutcome {
    Waiting,
    Matched(Room),
}

pub type ArcMatchmakingService = Arc<Box<dyn MatchmakingService + Send + Sync + 'static>>;

/// Entry points that put identities into rooms: the stake queues and
/// private rooms addressed by code.
pub trait MatchmakingService {
    fn join_queue(
        &self,
        game_type: GameType,
        identity: &Identity,
        stake: u64,
    ) -> Result<QueueOutcome, QueueError>;
    fn cancel_queue(&self, game_type: GameType, identity_id: &IdentityId) -> bool;
    fn remove_on_disconnect(&self, identity_id: &IdentityId);
    fn queued_entries(&self, game_type: GameType) -> Vec<QueueEntry>;
    fn create_room(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        identity: &Identity,
    ) -> Result<Room, RoomError>;
    fn join_room(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        identity: &Identity,
    ) -> Result<Room, RoomError>;
    fn sweep_stale_rooms(&self) -> usize;
}

#[derive(Clone)]
pub struct MatchmakingServiceImpl {
    connection_service: ArcConnectionService,
    room_service: ArcRoomService,
    chess_service: ArcChessService,
    color_service: ArcColorService,
    config: Arc<GameConfig>,
    queues: Arc<DashMap<GameType, MatchQueue>>,
}

impl MatchmakingServiceImpl {
    pub fn new(
        connection_service: ArcConnectionService,
        room_service: ArcRoomService,
        chess_service: ArcChessService,
        color_service: ArcColorService,
        config: Arc<GameConfig>,
    ) -> Self {
        Self {
            connection_service,
            room_service,
            chess_service,
            color_service,
            config,
            queues: Arc::new(DashMap::new()),
        }
    }

    fn start_session(&self, room: &Room) {
        let started = match room.game_type {
            GameType::Chess => self.chess_service.start_game(room),
            GameType::Color => self.color_service.start_game(room),
        };
        if let Err(e) = started {
            error!("Failed to start session for room {}: {}", room.id, e);
        }
    }

    fn color_players(&self, room: &Room) -> Vec<ColorPlayerInfo> {
        let balance = self.config.color_round.starting_balance;
        room.seats
            .iter()
            .map(|s| ColorPlayerInfo {
                id: s.id.clone(),
                display_name: s.display_name.clone(),
                balance,
            })
            .collect()
    }
}

impl MatchmakingService for MatchmakingServiceImpl {
    fn join_queue(
        &self,
        game_type: GameType,
        identity: &Identity,
        stake: u64,
    ) -> Result<QueueOutcome, QueueError> {
        if stake == 0 {
            return Err(QueueError::InvalidStake);
        }
        let entry = QueueEntry {
            seat: identity.seat(),
            stake,
            enqueued_at: Utc::now(),
        };
        let matched = {
            let mut queue = self.queues.entry(game_type).or_default();
            queue.push(entry)?;
            match game_type {
                GameType::Chess => queue
                    .take_pair(&identity.id)
                    .map(|(first, second)| vec![first, second]),
                GameType::Color => queue.take_group(stake, 2),
            }
        };
        self.connection_service
            .set_current_game(&identity.id, Some(game_type));

        let Some(entries) = matched else {
            info!("{} waiting in {} queue with stake {}", identity.id, game_type, stake);
            let waiting_msg = match game_type {
                GameType::Chess => ServerMessage::WaitingForOpponent { stake },
                GameType::Color => ServerMessage::WaitingForPlayers { stake },
            };
            self.connection_service.send_to(&identity.id, &waiting_msg);
            return Ok(QueueOutcome::Waiting);
        };

        let seats: Vec<Seat> = entries.into_iter().map(|e| e.seat).collect();
        let room = self.room_service.create_matched(game_type, stake, seats);
        info!(
            "Matched {:?} in {} room {}",
            room.seat_ids(),
            game_type,
            room.id
        );
        self.start_session(&room);
        Ok(QueueOutcome::Matched(room))
    }

    fn cancel_queue(&self, game_type: GameType, identity_id: &IdentityId) -> bool {
        let removed = self
            .queues
            .get_mut(&game_type)
            .and_then(|mut queue| queue.remove(identity_id))
            .is_some();
        if removed {
            info!("{} left the {} queue", identity_id, game_type);
            self.connection_service.set_current_game(identity_id, None);
        }
        self.connection_service
            .send_to(identity_id, &ServerMessage::QueueCancelled { game_type });
        removed
    }

    fn remove_on_disconnect(&self, identity_id: &IdentityId) {
        for game_type in GameType::ALL {
            if let Some(mut queue) = self.queues.get_mut(&game_type)
                && queue.remove(identity_id).is_some()
            {
                info!("Removed {} from the {} queue", identity_id, game_type);
            }
        }
    }

    fn queued_entries(&self, game_type: GameType) -> Vec<QueueEntry> {
        self.queues
            .get(&game_type)
            .map(|queue| queue.entries().to_vec())
            .unwrap_or_default()
    }

    fn create_room(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        identity: &Identity,
    ) -> Result<Room, RoomError> {
        let room = self
            .room_service
            .create_with_code(game_type, code, stake, identity.seat())?;
        self.connection_service
            .set_current_game(&identity.id, Some(game_type));

        self.connection_service.send_to(
            &identity.id,
            &ServerMessage::RoomCreated {
                game_type,
                room_id: room.id.clone(),
                stake,
            },
        );
        let follow_up = match game_type {
            GameType::Chess => ServerMessage::PlayerAssigned {
                room_id: room.id.clone(),
                color: PieceColor::White,
                opponent: None,
            },
            GameType::Color => ServerMessage::PlayersUpdate {
                room_id: room.id.clone(),
                players: self.color_players(&room),
            },
        };
        self.connection_service.send_to(&identity.id, &follow_up);
        Ok(room)
    }

    fn join_room(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        identity: &Identity,
    ) -> Result<Room, RoomError> {
        let room = self
            .room_service
            .join(game_type, code, stake, identity.seat())?;
        self.connection_service
            .set_current_game(&identity.id, Some(game_type));

        if game_type == GameType::Color {
            self.connection_service.send_to_many(
                &room.seat_ids(),
                &ServerMessage::PlayersUpdate {
                    room_id: room.id.clone(),
                    players: self.color_players(&room),
                },
            );
        }
        if room.status == RoomStatus::Active {
            self.start_session(&room);
        }
        Ok(room)
    }

    fn sweep_stale_rooms(&self) -> usize {
        let removed = self.room_service.sweep_stale(self.config.room_ttl);
        for room in &removed {
            info!("Swept stale waiting room {} ({})", room.id, room.game_type);
            self.connection_service.clear_current_game(&room.seat_ids());
        }
        removed.len()
    }
}
