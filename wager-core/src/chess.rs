use thiserror::Error;

use crate::{PieceColor, Square, board::ChessBoard};

/// Seconds left on each side of the clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChessClock {
    pub white: u32,
    pub black: u32,
}

impl ChessClock {
    pub fn new(seconds_per_side: u32) -> Self {
        ChessClock {
            white: seconds_per_side,
            black: seconds_per_side,
        }
    }

    pub fn remaining(&self, color: PieceColor) -> u32 {
        match color {
            PieceColor::White => self.white,
            PieceColor::Black => self.black,
        }
    }

    fn remaining_mut(&mut self, color: PieceColor) -> &mut u32 {
        match color {
            PieceColor::White => &mut self.white,
            PieceColor::Black => &mut self.black,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChessWinReason {
    Checkmate,
    KingCaptured,
    Resignation,
    Timeout,
    Abandonment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChessResult {
    pub winner: PieceColor,
    pub reason: ChessWinReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("It's not your turn")]
    NotYourTurn,
    #[error("You are not a player in this game")]
    NotAPlayer,
    #[error("Game is already over")]
    GameFinished,
    #[error("Square is off the board")]
    OutOfBounds,
    #[error("Illegal move")]
    IllegalMove,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MoveOutcome {
    pub from: Square,
    pub to: Square,
    pub board: ChessBoard,
    pub current_turn: PieceColor,
    pub in_check: bool,
    pub clock: ChessClock,
    pub result: Option<ChessResult>,
}

#[derive(Clone, Debug)]
pub struct ChessGame {
    board: ChessBoard,
    current_turn: PieceColor,
    clock: ChessClock,
    result: Option<ChessResult>,
    ply_count: u32,
}

impl ChessGame {
    pub fn new(seconds_per_side: u32) -> Self {
        Self::from_board(ChessBoard::new(), PieceColor::White, seconds_per_side)
    }

    pub fn from_board(board: ChessBoard, current_turn: PieceColor, seconds_per_side: u32) -> Self {
        ChessGame {
            board,
            current_turn,
            clock: ChessClock::new(seconds_per_side),
            result: None,
            ply_count: 0,
        }
    }

    pub fn board(&self) -> &ChessBoard {
        &self.board
    }

    pub fn current_turn(&self) -> PieceColor {
        self.current_turn
    }

    pub fn clock(&self) -> ChessClock {
        self.clock
    }

    pub fn result(&self) -> Option<ChessResult> {
        self.result
    }

    pub fn is_ongoing(&self) -> bool {
        self.result.is_none()
    }

    pub fn ply_count(&self) -> u32 {
        self.ply_count
    }

    /// Validates and applies a move. Nothing changes when the move is rejected.
    pub fn apply_move(
        &mut self,
        mover: PieceColor,
        from: Square,
        to: Square,
    ) -> Result<MoveOutcome, MoveRejection> {
        if !self.is_ongoing() {
            return Err(MoveRejection::GameFinished);
        }
        if mover != self.current_turn {
            return Err(MoveRejection::NotYourTurn);
        }
        if !from.is_valid() || !to.is_valid() {
            return Err(MoveRejection::OutOfBounds);
        }
        if !self.board.is_valid_move(from, to, mover) {
            return Err(MoveRejection::IllegalMove);
        }

        self.board = self.board.make_move(from, to);
        self.current_turn = mover.opponent();
        self.ply_count += 1;

        let defender = mover.opponent();
        if self.board.find_king(defender).is_none() {
            self.result = Some(ChessResult {
                winner: mover,
                reason: ChessWinReason::KingCaptured,
            });
        } else if self.board.is_checkmate(defender) {
            self.result = Some(ChessResult {
                winner: mover,
                reason: ChessWinReason::Checkmate,
            });
        }

        Ok(MoveOutcome {
            from,
            to,
            board: self.board.clone(),
            current_turn: self.current_turn,
            in_check: self.board.is_king_in_check(defender),
            clock: self.clock,
            result: self.result,
        })
    }

    pub fn resign(&mut self, color: PieceColor) -> Result<ChessResult, MoveRejection> {
        self.forfeit(color, ChessWinReason::Resignation)
    }

    /// Ends the game against `color` for a reason outside of play.
    pub fn forfeit(
        &mut self,
        color: PieceColor,
        reason: ChessWinReason,
    ) -> Result<ChessResult, MoveRejection> {
        if !self.is_ongoing() {
            return Err(MoveRejection::GameFinished);
        }
        let result = ChessResult {
            winner: color.opponent(),
            reason,
        };
        self.result = Some(result);
        Ok(result)
    }

    /// Burns one second from the side to move. Returns the result when that
    /// side runs out of time.
    pub fn tick(&mut self) -> Option<ChessResult> {
        if !self.is_ongoing() {
            return None;
        }
        let side = self.current_turn;
        let remaining = self.clock.remaining_mut(side);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.result = Some(ChessResult {
                winner: side.opponent(),
                reason: ChessWinReason::Timeout,
            });
        }
        self.result
    }
}
