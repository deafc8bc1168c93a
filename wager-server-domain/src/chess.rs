use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use log::{debug, error, info};
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;
use wager_core::{
    ChessGame, ChessResult, ChessWinReason, MoveOutcome, MoveRejection, PieceColor, Square,
};

use crate::{
    GameType, IdentityId, RoomId, ServiceError, ServiceResult,
    config::GameConfig,
    connection::ArcConnectionService,
    room::{ArcRoomService, Room, Seat},
    settlement::{ArcSettlementSink, Settlement},
    transport::ServerMessage,
};

const CLOCK_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct ChessSession {
    pub room_id: RoomId,
    pub stake: u64,
    pub white: Seat,
    pub black: Seat,
    pub game: ChessGame,
}

impl ChessSession {
    pub fn color_of(&self, id: &IdentityId) -> Option<PieceColor> {
        if &self.white.id == id {
            Some(PieceColor::White)
        } else if &self.black.id == id {
            Some(PieceColor::Black)
        } else {
            None
        }
    }

    pub fn seat(&self, color: PieceColor) -> &Seat {
        match color {
            PieceColor::White => &self.white,
            PieceColor::Black => &self.black,
        }
    }

    pub fn player_ids(&self) -> Vec<IdentityId> {
        vec![self.white.id.clone(), self.black.id.clone()]
    }
}

pub type ArcChessService = Arc<Box<dyn ChessService + Send + Sync + 'static>>;

pub trait ChessService {
    fn start_game(&self, room: &Room) -> ServiceResult<()>;
    fn apply_move(
        &self,
        player: &IdentityId,
        room_id: &str,
        from: Square,
        to: Square,
    ) -> ServiceResult<MoveOutcome>;
    fn resign(&self, player: &IdentityId, room_id: &str) -> ServiceResult<ChessResult>;
    fn get_session(&self, room_id: &str) -> Option<ChessSession>;
    fn get_session_of_player(&self, player: &IdentityId) -> Option<ChessSession>;
    fn on_player_disconnected(&self, player: &IdentityId);
    /// Sends the running game back to a seated player on a new connection.
    /// Returns whether the player has a live game.
    fn on_player_reconnected(&self, player: &IdentityId) -> bool;
}

#[derive(Clone)]
pub struct ChessServiceImpl {
    connection_service: ArcConnectionService,
    room_service: ArcRoomService,
    settlement_sink: ArcSettlementSink,
    config: Arc<GameConfig>,
    sessions: Arc<DashMap<RoomId, ChessSession>>,
    session_tokens: Arc<DashMap<RoomId, CancellationToken>>,
    session_by_player: Arc<DashMap<IdentityId, RoomId>>,
    disconnected_at: Arc<DashMap<IdentityId, Instant>>,
}

impl ChessServiceImpl {
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
            disconnected_at: Arc::new(DashMap::new()),
        }
    }

    /// Starts a session for an active room from an arbitrary position.
    pub fn start_game_with(&self, room: &Room, game: ChessGame) -> ServiceResult<()> {
        let [white, black] = room.seats.as_slice() else {
            return ServiceError::not_possible("Chess needs exactly two seated players");
        };
        if room.game_type != GameType::Chess {
            return ServiceError::bad_request("Not a chess room");
        }
        if self.sessions.contains_key(&room.id) {
            return ServiceError::not_possible("Game already started");
        }

        let session = ChessSession {
            room_id: room.id.clone(),
            stake: room.stake,
            white: white.clone(),
            black: black.clone(),
            game,
        };
        let started_msg = ServerMessage::ChessStarted {
            room_id: room.id.clone(),
            white: white.clone(),
            black: black.clone(),
            stake: room.stake,
            board: session.game.board().clone(),
            current_turn: session.game.current_turn(),
            clock: session.game.clock(),
        };

        let cancel_token = CancellationToken::new();
        self.sessions.insert(room.id.clone(), session);
        self.session_tokens
            .insert(room.id.clone(), cancel_token.clone());
        for seat in [white, black] {
            self.session_by_player
                .insert(seat.id.clone(), room.id.clone());
        }
        info!(
            "Chess game {} started: {} (white) vs {} (black), stake {}",
            room.id, white.id, black.id, room.stake
        );

        self.connection_service
            .send_to_many(&room.seat_ids(), &started_msg);
        for (seat, color, opponent) in [
            (white, PieceColor::White, black),
            (black, PieceColor::Black, white),
        ] {
            self.connection_service.send_to(
                &seat.id,
                &ServerMessage::PlayerAssigned {
                    room_id: room.id.clone(),
                    color,
                    opponent: Some(opponent.clone()),
                },
            );
        }

        self.run_clock(room.id.clone(), cancel_token);
        Ok(())
    }

    /// Tears a finished session down. Only the first caller for a room does
    /// anything, so racing finishers are harmless.
    fn check_game_over(&self, room_id: &str) {
        let Some((_, session)) = self
            .sessions
            .remove_if(room_id, |_, session| !session.game.is_ongoing())
        else {
            return;
        };
        let Some(result) = session.game.result() else {
            return;
        };

        if let Some((_, token)) = self.session_tokens.remove(room_id) {
            token.cancel();
        }
        let players = session.player_ids();
        for id in &players {
            self.session_by_player.remove_if(id, |_, r| r == room_id);
            self.disconnected_at.remove(id);
        }
        self.room_service.remove(GameType::Chess, room_id);

        let payout = self.config.payout.quote(session.stake);
        let winner = session.seat(result.winner).id.clone();
        let loser = session.seat(result.winner.opponent()).id.clone();
        info!(
            "Chess game {} is over: {} beat {} ({:?})",
            room_id, winner, loser, result.reason
        );

        self.connection_service.send_to_many(
            &players,
            &ServerMessage::ChessGameOver {
                room_id: room_id.to_string(),
                result,
                board: session.game.board().clone(),
                payout,
            },
        );
        self.connection_service.clear_current_game(&players);

        self.settlement_sink.settle(Settlement::Chess {
            room_id: room_id.to_string(),
            winner,
            loser,
            reason: result.reason,
            payout,
        });
    }

    fn run_clock(&self, room_id: RoomId, cancel_token: CancellationToken) {
        let chess_service = self.clone();
        tokio::spawn(async move {
            loop {
                select! {
                    _ = cancel_token.cancelled() => {
                        return;
                    }
                    _ = tokio::time::sleep(CLOCK_TICK) => {}
                }
                let Some(mut session) = chess_service.sessions.get_mut(&room_id) else {
                    return;
                };
                let timed_out = session.game.tick().is_some();
                let clock = session.game.clock();
                let players = session.player_ids();
                drop(session);

                chess_service.connection_service.send_to_many(
                    &players,
                    &ServerMessage::ClockUpdate {
                        room_id: room_id.clone(),
                        clock,
                    },
                );
                if timed_out {
                    break;
                }
            }
            chess_service.check_game_over(&room_id);
        });
    }

    fn run_disconnect_waiter(
        &self,
        room_id: RoomId,
        player: IdentityId,
        since: Instant,
        cancel_token: CancellationToken,
    ) {
        let chess_service = self.clone();
        let grace = self.config.chess_disconnect_grace;
        tokio::spawn(async move {
            select! {
                _ = cancel_token.cancelled() => {
                    return;
                }
                _ = tokio::time::sleep(grace) => {}
            }
            let still_gone = chess_service
                .disconnected_at
                .remove_if(&player, |_, at| *at == since)
                .is_some()
                && chess_service
                    .connection_service
                    .get_connection(&player)
                    .is_none();
            if !still_gone {
                debug!("{} came back to chess game {} in time", player, room_id);
                return;
            }

            let Some(mut session) = chess_service.sessions.get_mut(&room_id) else {
                return;
            };
            let Some(color) = session.color_of(&player) else {
                return;
            };
            let forfeited = session
                .game
                .forfeit(color, ChessWinReason::Abandonment)
                .is_ok();
            drop(session);
            if forfeited {
                info!("{} abandoned chess game {}", player, room_id);
                chess_service.check_game_over(&room_id);
            }
        });
    }
}

impl ChessService for ChessServiceImpl {
    fn start_game(&self, room: &Room) -> ServiceResult<()> {
        self.start_game_with(room, ChessGame::new(self.config.chess_clock_secs))
    }

    fn apply_move(
        &self,
        player: &IdentityId,
        room_id: &str,
        from: Square,
        to: Square,
    ) -> ServiceResult<MoveOutcome> {
        let Some(mut session) = self.sessions.get_mut(room_id) else {
            return ServiceError::not_found("Room not found");
        };
        let Some(color) = session.color_of(player) else {
            return ServiceError::not_possible(MoveRejection::NotAPlayer.to_string());
        };
        let outcome = match session.game.apply_move(color, from, to) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Rejected move of {} in {}: {}", player, room_id, e);
                return ServiceError::not_possible(e.to_string());
            }
        };
        let players = session.player_ids();
        drop(session);

        self.connection_service.send_to_many(
            &players,
            &ServerMessage::MoveMade {
                room_id: room_id.to_string(),
                outcome: outcome.clone(),
            },
        );
        if outcome.result.is_some() {
            self.check_game_over(room_id);
        }
        Ok(outcome)
    }

    fn resign(&self, player: &IdentityId, room_id: &str) -> ServiceResult<ChessResult> {
        let Some(mut session) = self.sessions.get_mut(room_id) else {
            return ServiceError::not_found("Room not found");
        };
        let Some(color) = session.color_of(player) else {
            return ServiceError::not_possible(MoveRejection::NotAPlayer.to_string());
        };
        let result = session
            .game
            .resign(color)
            .map_err(|e| ServiceError::NotPossible(e.to_string()))?;
        drop(session);

        info!("{} resigned chess game {}", player, room_id);
        self.check_game_over(room_id);
        Ok(result)
    }

    fn get_session(&self, room_id: &str) -> Option<ChessSession> {
        self.sessions.get(room_id).map(|s| s.value().clone())
    }

    fn get_session_of_player(&self, player: &IdentityId) -> Option<ChessSession> {
        let room_id = self.session_by_player.get(player)?.value().clone();
        self.get_session(&room_id)
    }

    fn on_player_disconnected(&self, player: &IdentityId) {
        let Some(room_id) = self.session_by_player.get(player).map(|r| r.value().clone()) else {
            return;
        };
        let Some(cancel_token) = self.session_tokens.get(&room_id).map(|t| t.value().clone())
        else {
            error!("Chess game {} has no timer token", room_id);
            return;
        };
        let since = Instant::now();
        self.disconnected_at.insert(player.clone(), since);
        info!(
            "{} disconnected from chess game {}, forfeit in {:?}",
            player, room_id, self.config.chess_disconnect_grace
        );
        self.run_disconnect_waiter(room_id, player.clone(), since, cancel_token);
    }

    fn on_player_reconnected(&self, player: &IdentityId) -> bool {
        let Some(session) = self.get_session_of_player(player) else {
            return false;
        };
        let Some(color) = session.color_of(player) else {
            return false;
        };
        if self.disconnected_at.remove(player).is_some() {
            info!("{} is back in chess game {}", player, session.room_id);
        }

        self.connection_service.send_to(
            player,
            &ServerMessage::ChessStarted {
                room_id: session.room_id.clone(),
                white: session.white.clone(),
                black: session.black.clone(),
                stake: session.stake,
                board: session.game.board().clone(),
                current_turn: session.game.current_turn(),
                clock: session.game.clock(),
            },
        );
        self.connection_service.send_to(
            player,
            &ServerMessage::PlayerAssigned {
                room_id: session.room_id.clone(),
                color,
                opponent: Some(session.seat(color.opponent()).clone()),
            },
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use wager_core::{ChessBoard, Piece, PieceKind};

    use crate::{
        app::test_support::{TestApp, test_app},
        matchmaking::QueueOutcome,
        transport::ListenerId,
    };

    use super::*;

    struct Match {
        test: TestApp,
        room: Room,
        white: (IdentityId, ListenerId),
        black: (IdentityId, ListenerId),
    }

    fn start_match(config: GameConfig) -> Match {
        let test = test_app(config);
        let (alice, alice_listener) = test.connect("alice");
        let (bob, bob_listener) = test.connect("bob");
        test.app
            .matchmaking_service
            .join_queue(GameType::Chess, &alice, 50)
            .expect("Failed to join queue");
        let QueueOutcome::Matched(room) = test
            .app
            .matchmaking_service
            .join_queue(GameType::Chess, &bob, 50)
            .expect("Failed to join queue")
        else {
            panic!("Expected a match");
        };
        Match {
            test,
            room,
            white: (bob.id, bob_listener),
            black: (alice.id, alice_listener),
        }
    }

    fn play(m: &Match, player: &IdentityId, from: (i32, i32), to: (i32, i32)) -> MoveOutcome {
        m.test
            .app
            .chess_service
            .apply_move(
                player,
                &m.room.id,
                Square::new(from.0, from.1),
                Square::new(to.0, to.1),
            )
            .expect("Move should be accepted")
    }

    fn game_over(messages: &[ServerMessage]) -> Option<ChessResult> {
        messages.iter().find_map(|m| match m {
            ServerMessage::ChessGameOver { result, .. } => Some(*result),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_start_sends_state_and_assignments() {
        let m = start_match(GameConfig::default());
        let messages = m.test.messages_for(m.white.1);
        assert!(messages.iter().any(|msg| matches!(
            msg,
            ServerMessage::ChessStarted {
                current_turn: PieceColor::White,
                stake: 50,
                ..
            }
        )));
        assert!(messages.iter().any(|msg| matches!(
            msg,
            ServerMessage::PlayerAssigned {
                color: PieceColor::White,
                opponent: Some(_),
                ..
            }
        )));
        let session = m
            .test
            .app
            .chess_service
            .get_session_of_player(&m.black.0)
            .expect("Session should exist");
        assert_eq!(session.white.id, m.white.0);
        assert_eq!(session.game.board(), &ChessBoard::new());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_moves_change_nothing() {
        let m = start_match(GameConfig::default());
        let chess = &m.test.app.chess_service;
        m.test.transport.clear();

        let out_of_turn = chess.apply_move(
            &m.black.0,
            &m.room.id,
            Square::new(1, 4),
            Square::new(3, 4),
        );
        assert!(
            matches!(out_of_turn, Err(ServiceError::NotPossible(ref r)) if r == "It's not your turn")
        );
        let illegal = chess.apply_move(
            &m.white.0,
            &m.room.id,
            Square::new(7, 0),
            Square::new(4, 0),
        );
        assert!(matches!(illegal, Err(ServiceError::NotPossible(_))));
        let stranger = chess.apply_move(
            &"mallory".to_string(),
            &m.room.id,
            Square::new(6, 4),
            Square::new(4, 4),
        );
        assert!(matches!(stranger, Err(ServiceError::NotPossible(_))));
        assert!(matches!(
            chess.apply_move(&m.white.0, "nope", Square::new(6, 4), Square::new(4, 4)),
            Err(ServiceError::NotFound(_))
        ));

        let session = chess.get_session(&m.room.id).expect("Session should exist");
        assert_eq!(session.game.board(), &ChessBoard::new());
        assert_eq!(session.game.current_turn(), PieceColor::White);
        assert!(m.test.transport.get_messages().is_empty());
    }

    #[tokio::test]
    async fn test_move_is_broadcast_to_both_seats() {
        let m = start_match(GameConfig::default());
        let outcome = play(&m, &m.white.0, (6, 4), (4, 4));
        assert_eq!(outcome.current_turn, PieceColor::Black);
        for listener in [m.white.1, m.black.1] {
            assert!(m.test.messages_for(listener).iter().any(|msg| matches!(
                msg,
                ServerMessage::MoveMade { outcome: o, .. } if *o == outcome
            )));
        }
    }

    #[tokio::test]
    async fn test_checkmate_finishes_and_settles() {
        let m = start_match(GameConfig::default());
        play(&m, &m.white.0, (6, 5), (5, 5));
        play(&m, &m.black.0, (1, 4), (3, 4));
        play(&m, &m.white.0, (6, 6), (4, 6));
        let outcome = play(&m, &m.black.0, (0, 3), (4, 7));
        let expected = ChessResult {
            winner: PieceColor::Black,
            reason: ChessWinReason::Checkmate,
        };
        assert_eq!(outcome.result, Some(expected));

        let app = &m.test.app;
        assert!(app.chess_service.get_session(&m.room.id).is_none());
        assert!(app.room_service.get_room(GameType::Chess, &m.room.id).is_none());
        assert_eq!(game_over(&m.test.messages_for(m.white.1)), Some(expected));
        assert!(
            app.connection_service
                .get_presence()
                .iter()
                .all(|p| p.current_game.is_none())
        );

        let settlements = m.test.settlement.get_settlements();
        assert_eq!(settlements.len(), 1);
        let Settlement::Chess {
            winner, payout, ..
        } = &settlements[0]
        else {
            panic!("Expected a chess settlement");
        };
        assert_eq!(winner, &m.black.0);
        assert_eq!(payout.pot, 100);
        assert_eq!(payout.winner_payout, 80);

        // The race loser sees the room already gone.
        assert!(matches!(
            app.chess_service.resign(&m.white.0, &m.room.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resignation() {
        let m = start_match(GameConfig::default());
        let result = m
            .test
            .app
            .chess_service
            .resign(&m.black.0, &m.room.id)
            .expect("Resign should succeed");
        assert_eq!(
            result,
            ChessResult {
                winner: PieceColor::White,
                reason: ChessWinReason::Resignation,
            }
        );
        assert_eq!(game_over(&m.test.messages_for(m.black.1)), Some(result));
        assert_eq!(m.test.settlement.get_settlements().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_runs_out() {
        let config = GameConfig {
            chess_clock_secs: 3,
            ..GameConfig::default()
        };
        let m = start_match(config);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let messages = m.test.messages_for(m.black.1);
        let ticks = messages
            .iter()
            .filter(|msg| matches!(msg, ServerMessage::ClockUpdate { .. }))
            .count();
        assert_eq!(ticks, 3);
        assert_eq!(
            game_over(&messages),
            Some(ChessResult {
                winner: PieceColor::Black,
                reason: ChessWinReason::Timeout,
            })
        );
        assert!(m.test.app.chess_service.get_session(&m.room.id).is_none());

        // The clock task is gone with the session.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let after = m
            .test
            .messages_for(m.black.1)
            .iter()
            .filter(|msg| matches!(msg, ServerMessage::ClockUpdate { .. }))
            .count();
        assert_eq!(after, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_forfeits_after_grace() {
        let config = GameConfig {
            chess_disconnect_grace: Duration::from_secs(10),
            ..GameConfig::default()
        };
        let m = start_match(config);
        m.test
            .app
            .connection_service
            .unregister(&m.black.0, m.black.1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(m.test.app.chess_service.get_session(&m.room.id).is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            game_over(&m.test.messages_for(m.white.1)),
            Some(ChessResult {
                winner: PieceColor::White,
                reason: ChessWinReason::Abandonment,
            })
        );
        assert!(m.test.app.chess_service.get_session(&m.room.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_keeps_game() {
        let config = GameConfig {
            chess_disconnect_grace: Duration::from_secs(10),
            ..GameConfig::default()
        };
        let m = start_match(config);
        let identity = m
            .test
            .app
            .connection_service
            .get_identity(&m.black.0)
            .expect("Black is online");
        m.test
            .app
            .connection_service
            .unregister(&m.black.0, m.black.1);
        play(&m, &m.white.0, (6, 4), (4, 4));
        tokio::time::sleep(Duration::from_secs(3)).await;
        let listener = ListenerId::new();
        m.test
            .app
            .connection_service
            .register(identity, listener);

        let messages = m.test.messages_for(listener);
        assert!(messages.iter().any(|msg| matches!(
            msg,
            ServerMessage::ChessStarted { room_id, current_turn: PieceColor::Black, board, .. }
                if room_id == &m.room.id && board.get(Square::new(4, 4)).is_some()
        )));
        assert!(messages.contains(&ServerMessage::PlayerAssigned {
            room_id: m.room.id.clone(),
            color: PieceColor::Black,
            opponent: Some(Seat {
                id: m.white.0.clone(),
                display_name: m.white.0.to_uppercase(),
            }),
        }));
        let presence = m.test.app.connection_service.get_presence();
        let black = presence
            .iter()
            .find(|p| p.id == m.black.0)
            .expect("Black is online again");
        assert_eq!(black.current_game, Some(GameType::Chess));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(m.test.app.chess_service.get_session(&m.room.id).is_some());
        assert!(m.test.settlement.get_settlements().is_empty());
    }

    #[tokio::test]
    async fn test_king_capture_from_custom_position() {
        let test = test_app(GameConfig::default());
        let (alice, _) = test.connect("alice");
        let (bob, bob_listener) = test.connect("bob");
        let room = test.app.room_service.create_matched(
            GameType::Chess,
            10,
            vec![alice.seat(), bob.seat()],
        );

        let mut board = ChessBoard::empty();
        board.set(
            Square::new(7, 4),
            Some(Piece::new(PieceKind::King, PieceColor::White)),
        );
        board.set(
            Square::new(0, 4),
            Some(Piece::new(PieceKind::King, PieceColor::Black)),
        );
        board.set(
            Square::new(5, 4),
            Some(Piece::new(PieceKind::Rook, PieceColor::White)),
        );
        let service = ChessServiceImpl::new(
            test.app.connection_service.clone(),
            test.app.room_service.clone(),
            test.app.settlement_sink.clone(),
            test.app.config.clone(),
        );
        service
            .start_game_with(&room, ChessGame::from_board(board, PieceColor::White, 600))
            .expect("Failed to start game");
        assert!(service.start_game(&room).is_err());

        let outcome = service
            .apply_move(&alice.id, &room.id, Square::new(5, 4), Square::new(0, 4))
            .expect("Capture should be legal");
        assert_eq!(
            outcome.result,
            Some(ChessResult {
                winner: PieceColor::White,
                reason: ChessWinReason::KingCaptured,
            })
        );
        assert!(game_over(&test.messages_for(bob_listener)).is_some());
        assert!(service.get_session(&room.id).is_none());
    }
}
