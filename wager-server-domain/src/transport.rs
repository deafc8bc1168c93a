use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use wager_core::{
    ChessBoard, ChessClock, ChessResult, MoveOutcome, PayoutQuote, PieceColor, RoundSummary,
};

use crate::{GameType, IdentityId, RoomId, room::Seat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(uuid::Uuid);

impl Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerId {
    pub fn new() -> Self {
        ListenerId(uuid::Uuid::new_v4())
    }
}

pub type ArcTransportService = Arc<Box<dyn TransportService + Send + Sync + 'static>>;

/// Outbound side of the event channel. Sends never block: implementations
/// queue the message and return.
pub trait TransportService {
    fn disconnect_listener(&self, id: ListenerId, reason: DisconnectReason);
    fn try_listener_send(&self, id: ListenerId, msg: &ServerMessage);
    fn try_listener_multicast(&self, ids: &[ListenerId], msg: &ServerMessage) {
        for id in ids {
            self.try_listener_send(*id, msg);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PresenceEntry {
    pub id: IdentityId,
    pub display_name: String,
    pub current_game: Option<GameType>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColorPlayerInfo {
    pub id: IdentityId,
    pub display_name: String,
    pub balance: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoundWinnerInfo {
    pub id: IdentityId,
    pub display_name: String,
    pub winnings: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    OnlineUsers {
        users: Vec<PresenceEntry>,
    },
    AlreadyInQueue {
        game_type: GameType,
    },
    WaitingForOpponent {
        stake: u64,
    },
    WaitingForPlayers {
        stake: u64,
    },
    QueueCancelled {
        game_type: GameType,
    },
    RoomCreated {
        game_type: GameType,
        room_id: RoomId,
        stake: u64,
    },
    RoomCreationFailed {
        game_type: GameType,
        reason: String,
    },
    RoomJoinFailed {
        game_type: GameType,
        reason: String,
    },
    PlayersUpdate {
        room_id: RoomId,
        players: Vec<ColorPlayerInfo>,
    },
    ChessStarted {
        room_id: RoomId,
        white: Seat,
        black: Seat,
        stake: u64,
        board: ChessBoard,
        current_turn: PieceColor,
        clock: ChessClock,
    },
    ColorStarted {
        room_id: RoomId,
        players: Vec<ColorPlayerInfo>,
        stake: u64,
    },
    PlayerAssigned {
        room_id: RoomId,
        color: PieceColor,
        opponent: Option<Seat>,
    },
    MoveMade {
        room_id: RoomId,
        outcome: MoveOutcome,
    },
    MoveRejected {
        room_id: RoomId,
        reason: String,
    },
    ClockUpdate {
        room_id: RoomId,
        clock: ChessClock,
    },
    ChessGameOver {
        room_id: RoomId,
        result: ChessResult,
        board: ChessBoard,
        payout: PayoutQuote,
    },
    ColorGameOver {
        room_id: RoomId,
        reason: String,
    },
    RoundStarted {
        room_id: RoomId,
        round: u32,
        time_left: u32,
    },
    TimerUpdate {
        room_id: RoomId,
        time_left: u32,
    },
    BetPlaced {
        room_id: RoomId,
        player_id: IdentityId,
        color: String,
        amount: u64,
    },
    BetRejected {
        room_id: RoomId,
        reason: String,
    },
    RoundResult {
        room_id: RoomId,
        round: u32,
        color: String,
        multiplier: u64,
        winners: Vec<RoundWinnerInfo>,
        total_pot: u64,
        history: Vec<RoundSummary>,
    },
    GameInvite {
        from: String,
        from_id: IdentityId,
        game_type: GameType,
        room_code: String,
        message: String,
    },
    Error {
        message: String,
    },
    ConnectionClosed {
        reason: DisconnectReason,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientQuit,
    NewSession,
    ServerShutdown,
}

#[derive(Clone, Default)]
pub struct MockTransportService {
    pub sent_messages: Arc<Mutex<Vec<(ListenerId, ServerMessage)>>>,
    pub disconnected: Arc<Mutex<Vec<(ListenerId, DisconnectReason)>>>,
}

#[allow(unused)]
impl MockTransportService {
    pub fn get_messages(&self) -> Vec<(ListenerId, ServerMessage)> {
        self.sent_messages.lock().unwrap().clone()
    }

    pub fn messages_for(&self, id: ListenerId) -> Vec<ServerMessage> {
        self.sent_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(listener, _)| *listener == id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent_messages.lock().unwrap().clear();
    }

    pub fn get_disconnects(&self) -> Vec<(ListenerId, DisconnectReason)> {
        self.disconnected.lock().unwrap().clone()
    }
}

impl TransportService for MockTransportService {
    fn disconnect_listener(&self, id: ListenerId, reason: DisconnectReason) {
        self.disconnected.lock().unwrap().push((id, reason));
    }

    fn try_listener_send(&self, id: ListenerId, msg: &ServerMessage) {
        self.sent_messages.lock().unwrap().push((id, msg.clone()));
    }
}
