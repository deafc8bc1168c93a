use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use log::info;
use thiserror::Error;

use crate::{GameType, IdentityId, RoomId};

pub const MAX_SEATS: usize = 2;
pub const MAX_ROOM_CODE_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seat {
    pub id: IdentityId,
    pub display_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomStatus {
    WaitingForOpponent,
    Active,
    Finished,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub game_type: GameType,
    pub stake: u64,
    pub status: RoomStatus,
    pub seats: Vec<Seat>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    fn new(id: RoomId, game_type: GameType, stake: u64, seats: Vec<Seat>) -> Self {
        let status = if seats.len() >= MAX_SEATS {
            RoomStatus::Active
        } else {
            RoomStatus::WaitingForOpponent
        };
        Room {
            id,
            game_type,
            stake,
            status,
            seats,
            created_at: Utc::now(),
        }
    }

    pub fn is_seated(&self, id: &IdentityId) -> bool {
        self.seats.iter().any(|s| &s.id == id)
    }

    pub fn seat_ids(&self) -> Vec<IdentityId> {
        self.seats.iter().map(|s| s.id.clone()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room code already exists")]
    CodeTaken,
    #[error("Room not found")]
    NotFound,
    #[error("Entry fee doesn't match room requirements")]
    StakeMismatch,
    #[error("Room is full (max 2 players)")]
    Full,
    #[error("Already in this room")]
    AlreadyJoined,
    #[error("Invalid room code")]
    InvalidCode,
    #[error("Entry fee must be positive")]
    InvalidStake,
}

pub fn validate_room_code(code: &str) -> Result<(), RoomError> {
    let valid = !code.is_empty()
        && code.len() <= MAX_ROOM_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid { Ok(()) } else { Err(RoomError::InvalidCode) }
}

pub type ArcRoomService = Arc<Box<dyn RoomService + Send + Sync + 'static>>;

pub trait RoomService {
    fn create_with_code(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        creator: Seat,
    ) -> Result<Room, RoomError>;
    fn create_matched(&self, game_type: GameType, stake: u64, seats: Vec<Seat>) -> Room;
    fn join(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        joiner: Seat,
    ) -> Result<Room, RoomError>;
    fn get_room(&self, game_type: GameType, room_id: &str) -> Option<Room>;
    fn get_rooms(&self, game_type: GameType) -> Vec<Room>;
    fn vacate_seat(&self, game_type: GameType, room_id: &str, identity_id: &IdentityId)
    -> Option<Room>;
    fn remove(&self, game_type: GameType, room_id: &str) -> Option<Room>;
    fn remove_waiting_rooms_of(&self, identity_id: &IdentityId) -> Vec<Room>;
    fn sweep_stale(&self, max_age: Duration) -> Vec<Room>;
}

#[derive(Clone, Default)]
pub struct RoomServiceImpl {
    chess_rooms: Arc<DashMap<RoomId, Room>>,
    color_rooms: Arc<DashMap<RoomId, Room>>,
}

impl RoomServiceImpl {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self, game_type: GameType) -> &DashMap<RoomId, Room> {
        match game_type {
            GameType::Chess => &self.chess_rooms,
            GameType::Color => &self.color_rooms,
        }
    }

    fn remove_where(&self, predicate: impl Fn(&Room) -> bool) -> Vec<Room> {
        let mut removed = Vec::new();
        for game_type in GameType::ALL {
            let rooms = self.rooms(game_type);
            let ids: Vec<RoomId> = rooms
                .iter()
                .filter(|entry| predicate(entry.value()))
                .map(|entry| entry.key().clone())
                .collect();
            for id in ids {
                if let Some((_, room)) = rooms.remove_if(&id, |_, room| predicate(room)) {
                    removed.push(room);
                }
            }
        }
        removed
    }
}

impl RoomService for RoomServiceImpl {
    fn create_with_code(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        creator: Seat,
    ) -> Result<Room, RoomError> {
        validate_room_code(code)?;
        if stake == 0 {
            return Err(RoomError::InvalidStake);
        }
        match self.rooms(game_type).entry(code.to_string()) {
            Entry::Occupied(_) => Err(RoomError::CodeTaken),
            Entry::Vacant(vacant) => {
                let room = Room::new(code.to_string(), game_type, stake, vec![creator]);
                vacant.insert(room.clone());
                info!("Room {} ({}) created with stake {}", code, game_type, stake);
                Ok(room)
            }
        }
    }

    fn create_matched(&self, game_type: GameType, stake: u64, seats: Vec<Seat>) -> Room {
        let id = format!("{}_{}", game_type.as_str(), uuid::Uuid::new_v4().simple());
        let room = Room::new(id.clone(), game_type, stake, seats);
        self.rooms(game_type).insert(id.clone(), room.clone());
        info!("Room {} ({}) created from queue with stake {}", id, game_type, stake);
        room
    }

    fn join(
        &self,
        game_type: GameType,
        code: &str,
        stake: u64,
        joiner: Seat,
    ) -> Result<Room, RoomError> {
        let Some(mut room) = self.rooms(game_type).get_mut(code) else {
            return Err(RoomError::NotFound);
        };
        if room.stake != stake {
            return Err(RoomError::StakeMismatch);
        }
        if room.seats.len() >= MAX_SEATS || room.status != RoomStatus::WaitingForOpponent {
            return Err(RoomError::Full);
        }
        if game_type == GameType::Color && room.is_seated(&joiner.id) {
            return Err(RoomError::AlreadyJoined);
        }
        room.seats.push(joiner);
        if room.seats.len() == MAX_SEATS {
            room.status = RoomStatus::Active;
        }
        info!("Room {} ({}) now has {} seats", code, game_type, room.seats.len());
        Ok(room.clone())
    }

    fn get_room(&self, game_type: GameType, room_id: &str) -> Option<Room> {
        self.rooms(game_type)
            .get(room_id)
            .map(|entry| entry.value().clone())
    }

    fn get_rooms(&self, game_type: GameType) -> Vec<Room> {
        self.rooms(game_type)
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn vacate_seat(
        &self,
        game_type: GameType,
        room_id: &str,
        identity_id: &IdentityId,
    ) -> Option<Room> {
        let mut room = self.rooms(game_type).get_mut(room_id)?;
        room.seats.retain(|s| &s.id != identity_id);
        Some(room.clone())
    }

    fn remove(&self, game_type: GameType, room_id: &str) -> Option<Room> {
        let (_, mut room) = self.rooms(game_type).remove(room_id)?;
        room.status = RoomStatus::Finished;
        info!("Room {} ({}) removed", room_id, game_type);
        Some(room)
    }

    fn remove_waiting_rooms_of(&self, identity_id: &IdentityId) -> Vec<Room> {
        self.remove_where(|room| {
            room.status == RoomStatus::WaitingForOpponent
                && room.seats.first().is_some_and(|s| &s.id == identity_id)
        })
    }

    fn sweep_stale(&self, max_age: Duration) -> Vec<Room> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - max_age;
        self.remove_where(|room| {
            room.status == RoomStatus::WaitingForOpponent && room.created_at < cutoff
        })
    }
}
