use serde::{Deserialize, Serialize};
use validator::Validate;
use wager_core::{
    ChessBoard, ChessClock, ChessWinReason, PieceColor, PieceKind, RoundSummary, Square,
};
use wager_server_domain::{
    GameType,
    room::{RoomError, Seat},
    transport::{ColorPlayerInfo, DisconnectReason, PresenceEntry, ServerMessage},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JsonGameType {
    Chess,
    Color,
}

impl From<GameType> for JsonGameType {
    fn from(game_type: GameType) -> Self {
        match game_type {
            GameType::Chess => JsonGameType::Chess,
            GameType::Color => JsonGameType::Color,
        }
    }
}

impl From<JsonGameType> for GameType {
    fn from(game_type: JsonGameType) -> Self {
        match game_type {
            JsonGameType::Chess => GameType::Chess,
            JsonGameType::Color => GameType::Color,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JsonColor {
    White,
    Black,
}

impl From<PieceColor> for JsonColor {
    fn from(color: PieceColor) -> Self {
        match color {
            PieceColor::White => JsonColor::White,
            PieceColor::Black => JsonColor::Black,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonSquare {
    pub row: i32,
    pub col: i32,
}

impl From<JsonSquare> for Square {
    fn from(square: JsonSquare) -> Self {
        Square::new(square.row, square.col)
    }
}

impl From<Square> for JsonSquare {
    fn from(square: Square) -> Self {
        JsonSquare {
            row: square.row,
            col: square.col,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct JsonPiece {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub color: JsonColor,
}

/// Rows top to bottom, row 0 being black's home rank.
pub type JsonBoard = Vec<Vec<Option<JsonPiece>>>;

fn piece_kind_name(kind: PieceKind) -> &'static str {
    match kind {
        PieceKind::Pawn => "pawn",
        PieceKind::Knight => "knight",
        PieceKind::Bishop => "bishop",
        PieceKind::Rook => "rook",
        PieceKind::Queen => "queen",
        PieceKind::King => "king",
    }
}

fn board_to_json(board: &ChessBoard) -> JsonBoard {
    board
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|square| {
                    square.map(|piece| JsonPiece {
                        kind: piece_kind_name(piece.kind),
                        color: piece.color.into(),
                    })
                })
                .collect()
        })
        .collect()
}

fn win_reason_name(reason: ChessWinReason) -> &'static str {
    match reason {
        ChessWinReason::Checkmate => "checkmate",
        ChessWinReason::KingCaptured => "king-captured",
        ChessWinReason::Resignation => "resignation",
        ChessWinReason::Timeout => "timeout",
        ChessWinReason::Abandonment => "abandonment",
    }
}

fn disconnect_reason_name(reason: DisconnectReason) -> &'static str {
    match reason {
        DisconnectReason::ClientQuit => "client-quit",
        DisconnectReason::NewSession => "new-session",
        DisconnectReason::ServerShutdown => "server-shutdown",
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JsonOnlineUser {
    pub id: String,
    pub name: String,
    pub current_game: Option<JsonGameType>,
}

impl From<&PresenceEntry> for JsonOnlineUser {
    fn from(entry: &PresenceEntry) -> Self {
        JsonOnlineUser {
            id: entry.id.clone(),
            name: entry.display_name.clone(),
            current_game: entry.current_game.map(JsonGameType::from),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct JsonPlayer {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<JsonColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
}

impl JsonPlayer {
    fn seat(seat: &Seat, color: Option<PieceColor>) -> Self {
        JsonPlayer {
            id: seat.id.clone(),
            name: seat.display_name.clone(),
            color: color.map(JsonColor::from),
            balance: None,
        }
    }

    fn color_player(info: &ColorPlayerInfo) -> Self {
        JsonPlayer {
            id: info.id.clone(),
            name: info.display_name.clone(),
            color: None,
            balance: Some(info.balance),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonClock {
    pub white: u32,
    pub black: u32,
}

impl From<ChessClock> for JsonClock {
    fn from(clock: ChessClock) -> Self {
        JsonClock {
            white: clock.white,
            black: clock.black,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JsonRoundWinner {
    pub player_id: String,
    pub name: String,
    pub winnings: u64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JsonRoundSummary {
    pub round: u32,
    pub color: String,
    pub winner_count: usize,
    pub total_pot: u64,
}

impl From<&RoundSummary> for JsonRoundSummary {
    fn from(summary: &RoundSummary) -> Self {
        JsonRoundSummary {
            round: summary.round,
            color: summary.color.clone(),
            winner_count: summary.winner_count,
            total_pot: summary.total_pot,
        }
    }
}

/// Stake of a queue join, either a bare number or `{stake}`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum StakePayload {
    Bare(u64),
    Wrapped {
        #[serde(alias = "entryFee")]
        stake: u64,
    },
}

impl StakePayload {
    pub fn stake(&self) -> u64 {
        match self {
            StakePayload::Bare(stake) | StakePayload::Wrapped { stake } => *stake,
        }
    }
}

#[derive(Deserialize, Validate, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    #[validate(length(min = 1, max = 32))]
    pub room_code: String,
    #[serde(alias = "entryFee")]
    #[validate(range(min = 1))]
    pub stake: u64,
}

impl RoomPayload {
    /// Reason text for the first problem with the payload, if any.
    pub fn rejection(&self) -> Option<String> {
        let errors = self.validate().err()?;
        let reason = if errors.errors().contains_key("room_code") {
            RoomError::InvalidCode
        } else {
            RoomError::InvalidStake
        };
        Some(reason.to_string())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinChessQueue(StakePayload),
    JoinColorQueue(StakePayload),
    CreateChessRoom(RoomPayload),
    CreateColorRoom(RoomPayload),
    JoinChessRoom(RoomPayload),
    JoinColorRoom(RoomPayload),
    ChessMove {
        room_id: String,
        from: JsonSquare,
        to: JsonSquare,
    },
    ChessResign {
        room_id: String,
    },
    PlaceColorBet {
        room_id: String,
        color: String,
        amount: u64,
    },
    CancelQueue(JsonGameType),
    InviteUser {
        target_user_id: String,
        game_type: JsonGameType,
        room_code: String,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    OnlineUsersUpdate {
        users: Vec<JsonOnlineUser>,
    },
    AlreadyInQueue {
        game_type: JsonGameType,
    },
    WaitingForOpponent {
        stake: u64,
    },
    WaitingForPlayers {
        stake: u64,
    },
    QueueCancelled {
        game_type: JsonGameType,
    },
    RoomCreated {
        game_type: JsonGameType,
        room_code: String,
        stake: u64,
        message: String,
    },
    RoomCreationFailed {
        game_type: JsonGameType,
        reason: String,
    },
    RoomJoinFailed {
        game_type: JsonGameType,
        reason: String,
    },
    PlayersUpdate {
        room_id: String,
        players: Vec<JsonPlayer>,
    },
    GameStarted {
        room_id: String,
        game_type: JsonGameType,
        stake: u64,
        players: Vec<JsonPlayer>,
        #[serde(skip_serializing_if = "Option::is_none")]
        board: Option<JsonBoard>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_turn: Option<JsonColor>,
        #[serde(skip_serializing_if = "Option::is_none")]
        clock: Option<JsonClock>,
    },
    PlayerAssigned {
        room_id: String,
        color: JsonColor,
        opponent: Option<JsonPlayer>,
    },
    MoveMade {
        room_id: String,
        from: JsonSquare,
        to: JsonSquare,
        board: JsonBoard,
        current_turn: JsonColor,
        in_check: bool,
        clock: JsonClock,
    },
    MoveRejected {
        room_id: String,
        reason: String,
    },
    ClockUpdate {
        room_id: String,
        white: u32,
        black: u32,
    },
    GameOver {
        room_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<JsonColor>,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        board: Option<JsonBoard>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pot: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_payout: Option<u64>,
    },
    RoundStarted {
        room_id: String,
        round: u32,
        time_left: u32,
    },
    TimerUpdate {
        room_id: String,
        time_left: u32,
    },
    BetPlaced {
        room_id: String,
        player_id: String,
        color: String,
        amount: u64,
    },
    BetRejected {
        room_id: String,
        reason: String,
    },
    RoundResult {
        room_id: String,
        round: u32,
        color: String,
        multiplier: u64,
        winners: Vec<JsonRoundWinner>,
        total_pot: u64,
        history: Vec<JsonRoundSummary>,
    },
    GameInvite {
        from: String,
        from_id: String,
        game_type: JsonGameType,
        room_code: String,
        message: String,
    },
    Error {
        message: String,
    },
    ConnectionClosed {
        reason: &'static str,
    },
}

impl From<&ServerMessage> for ServerEvent {
    fn from(msg: &ServerMessage) -> Self {
        match msg {
            ServerMessage::OnlineUsers { users } => ServerEvent::OnlineUsersUpdate {
                users: users.iter().map(JsonOnlineUser::from).collect(),
            },
            ServerMessage::AlreadyInQueue { game_type } => ServerEvent::AlreadyInQueue {
                game_type: (*game_type).into(),
            },
            ServerMessage::WaitingForOpponent { stake } => {
                ServerEvent::WaitingForOpponent { stake: *stake }
            }
            ServerMessage::WaitingForPlayers { stake } => {
                ServerEvent::WaitingForPlayers { stake: *stake }
            }
            ServerMessage::QueueCancelled { game_type } => ServerEvent::QueueCancelled {
                game_type: (*game_type).into(),
            },
            ServerMessage::RoomCreated {
                game_type,
                room_id,
                stake,
            } => ServerEvent::RoomCreated {
                game_type: (*game_type).into(),
                room_code: room_id.clone(),
                stake: *stake,
                message: match game_type {
                    GameType::Chess => "Room created successfully. Waiting for opponent to join.",
                    GameType::Color => "Room created successfully. Waiting for players to join.",
                }
                .to_string(),
            },
            ServerMessage::RoomCreationFailed { game_type, reason } => {
                ServerEvent::RoomCreationFailed {
                    game_type: (*game_type).into(),
                    reason: reason.clone(),
                }
            }
            ServerMessage::RoomJoinFailed { game_type, reason } => ServerEvent::RoomJoinFailed {
                game_type: (*game_type).into(),
                reason: reason.clone(),
            },
            ServerMessage::PlayersUpdate { room_id, players } => ServerEvent::PlayersUpdate {
                room_id: room_id.clone(),
                players: players.iter().map(JsonPlayer::color_player).collect(),
            },
            ServerMessage::ChessStarted {
                room_id,
                white,
                black,
                stake,
                board,
                current_turn,
                clock,
            } => ServerEvent::GameStarted {
                room_id: room_id.clone(),
                game_type: JsonGameType::Chess,
                stake: *stake,
                players: vec![
                    JsonPlayer::seat(white, Some(PieceColor::White)),
                    JsonPlayer::seat(black, Some(PieceColor::Black)),
                ],
                board: Some(board_to_json(board)),
                current_turn: Some((*current_turn).into()),
                clock: Some((*clock).into()),
            },
            ServerMessage::ColorStarted {
                room_id,
                players,
                stake,
            } => ServerEvent::GameStarted {
                room_id: room_id.clone(),
                game_type: JsonGameType::Color,
                stake: *stake,
                players: players.iter().map(JsonPlayer::color_player).collect(),
                board: None,
                current_turn: None,
                clock: None,
            },
            ServerMessage::PlayerAssigned {
                room_id,
                color,
                opponent,
            } => ServerEvent::PlayerAssigned {
                room_id: room_id.clone(),
                color: (*color).into(),
                opponent: opponent
                    .as_ref()
                    .map(|seat| JsonPlayer::seat(seat, Some(color.opponent()))),
            },
            ServerMessage::MoveMade { room_id, outcome } => ServerEvent::MoveMade {
                room_id: room_id.clone(),
                from: outcome.from.into(),
                to: outcome.to.into(),
                board: board_to_json(&outcome.board),
                current_turn: outcome.current_turn.into(),
                in_check: outcome.in_check,
                clock: outcome.clock.into(),
            },
            ServerMessage::MoveRejected { room_id, reason } => ServerEvent::MoveRejected {
                room_id: room_id.clone(),
                reason: reason.clone(),
            },
            ServerMessage::ClockUpdate { room_id, clock } => ServerEvent::ClockUpdate {
                room_id: room_id.clone(),
                white: clock.white,
                black: clock.black,
            },
            ServerMessage::ChessGameOver {
                room_id,
                result,
                board,
                payout,
            } => ServerEvent::GameOver {
                room_id: room_id.clone(),
                winner: Some(result.winner.into()),
                reason: win_reason_name(result.reason).to_string(),
                board: Some(board_to_json(board)),
                pot: Some(payout.pot),
                winner_payout: Some(payout.winner_payout),
            },
            ServerMessage::ColorGameOver { room_id, reason } => ServerEvent::GameOver {
                room_id: room_id.clone(),
                winner: None,
                reason: reason.clone(),
                board: None,
                pot: None,
                winner_payout: None,
            },
            ServerMessage::RoundStarted {
                room_id,
                round,
                time_left,
            } => ServerEvent::RoundStarted {
                room_id: room_id.clone(),
                round: *round,
                time_left: *time_left,
            },
            ServerMessage::TimerUpdate { room_id, time_left } => ServerEvent::TimerUpdate {
                room_id: room_id.clone(),
                time_left: *time_left,
            },
            ServerMessage::BetPlaced {
                room_id,
                player_id,
                color,
                amount,
            } => ServerEvent::BetPlaced {
                room_id: room_id.clone(),
                player_id: player_id.clone(),
                color: color.clone(),
                amount: *amount,
            },
            ServerMessage::BetRejected { room_id, reason } => ServerEvent::BetRejected {
                room_id: room_id.clone(),
                reason: reason.clone(),
            },
            ServerMessage::RoundResult {
                room_id,
                round,
                color,
                multiplier,
                winners,
                total_pot,
                history,
            } => ServerEvent::RoundResult {
                room_id: room_id.clone(),
                round: *round,
                color: color.clone(),
                multiplier: *multiplier,
                winners: winners
                    .iter()
                    .map(|w| JsonRoundWinner {
                        player_id: w.id.clone(),
                        name: w.display_name.clone(),
                        winnings: w.winnings,
                    })
                    .collect(),
                total_pot: *total_pot,
                history: history.iter().map(JsonRoundSummary::from).collect(),
            },
            ServerMessage::GameInvite {
                from,
                from_id,
                game_type,
                room_code,
                message,
            } => ServerEvent::GameInvite {
                from: from.clone(),
                from_id: from_id.clone(),
                game_type: (*game_type).into(),
                room_code: room_code.clone(),
                message: message.clone(),
            },
            ServerMessage::Error { message } => ServerEvent::Error {
                message: message.clone(),
            },
            ServerMessage::ConnectionClosed { reason } => ServerEvent::ConnectionClosed {
                reason: disconnect_reason_name(*reason),
            },
        }
    }
}
