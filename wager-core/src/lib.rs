mod board;
mod chess;
mod color;
mod payout;

pub use board::{ChessBoard, Piece, PieceKind};
pub use chess::{ChessClock, ChessGame, ChessResult, ChessWinReason, MoveOutcome, MoveRejection};
pub use color::{
    BetRejection, ColorBet, ColorOption, ColorPalette, ColorRoundSettings, ColorTable,
    RoundPhase, RoundResult, RoundStart, RoundSummary, RoundTick, RoundWinner,
};
pub use payout::{PayoutQuote, PayoutSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PieceColor {
    White,
    Black,
}

impl PieceColor {
    pub fn opponent(&self) -> PieceColor {
        match self {
            PieceColor::White => PieceColor::Black,
            PieceColor::Black => PieceColor::White,
        }
    }

    /// Row holding this color's king and rooks at the start of a game.
    pub fn home_row(&self) -> i32 {
        match self {
            PieceColor::White => 7,
            PieceColor::Black => 0,
        }
    }

    pub fn pawn_row(&self) -> i32 {
        match self {
            PieceColor::White => 6,
            PieceColor::Black => 1,
        }
    }

    /// Row delta of a single forward pawn step. White plays up the board.
    pub fn pawn_direction(&self) -> i32 {
        match self {
            PieceColor::White => -1,
            PieceColor::Black => 1,
        }
    }
}

/// A board coordinate. Row 0 is black's home row, row 7 is white's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Square {
    pub row: i32,
    pub col: i32,
}

impl Square {
    pub fn new(row: i32, col: i32) -> Self {
        Square { row, col }
    }

    pub fn is_valid(&self) -> bool {
        self.row >= 0 && self.row < 8 && self.col >= 0 && self.col < 8
    }

    pub fn offset(&self, d_row: i32, d_col: i32) -> Self {
        Square {
            row: self.row + d_row,
            col: self.col + d_col,
        }
    }
}
