use crate::{PieceColor, Square};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: PieceColor,
}

impl Piece {
    pub fn new(kind: PieceKind, color: PieceColor) -> Self {
        Piece { kind, color }
    }
}

const BACK_ROW: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

const KING_STEPS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// 8x8 grid indexed `[row][col]`. Moves produce a new board rather than
/// mutating in place.
#[derive(Clone, Debug, PartialEq)]
pub struct ChessBoard {
    squares: [[Option<Piece>; 8]; 8],
}

impl Default for ChessBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessBoard {
    pub fn new() -> Self {
        let mut board = Self::empty();
        for color in [PieceColor::White, PieceColor::Black] {
            for (col, kind) in BACK_ROW.iter().enumerate() {
                let col = col as i32;
                board.set(Square::new(color.home_row(), col), Some(Piece::new(*kind, color)));
                board.set(
                    Square::new(color.pawn_row(), col),
                    Some(Piece::new(PieceKind::Pawn, color)),
                );
            }
        }
        board
    }

    pub fn empty() -> Self {
        ChessBoard {
            squares: [[None; 8]; 8],
        }
    }

    pub fn get(&self, square: Square) -> Option<Piece> {
        if !square.is_valid() {
            return None;
        }
        self.squares[square.row as usize][square.col as usize]
    }

    pub fn set(&mut self, square: Square, piece: Option<Piece>) {
        if square.is_valid() {
            self.squares[square.row as usize][square.col as usize] = piece;
        }
    }

    pub fn rows(&self) -> &[[Option<Piece>; 8]; 8] {
        &self.squares
    }

    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        self.squares.iter().enumerate().flat_map(|(row, cols)| {
            cols.iter().enumerate().filter_map(move |(col, piece)| {
                piece.map(|p| (Square::new(row as i32, col as i32), p))
            })
        })
    }

    pub fn find_king(&self, color: PieceColor) -> Option<Square> {
        self.pieces()
            .find(|(_, p)| p.kind == PieceKind::King && p.color == color)
            .map(|(sq, _)| sq)
    }

    /// Legality of moving the piece on `from` to `to` for `mover`.
    /// Simplified rules: no en passant, no promotion, castling only checks
    /// the rook position and the squares in between, and moving into
    /// check is not rejected.
    pub fn is_valid_move(&self, from: Square, to: Square, mover: PieceColor) -> bool {
        if !from.is_valid() || !to.is_valid() {
            return false;
        }
        let Some(piece) = self.get(from) else {
            return false;
        };
        if piece.color != mover {
            return false;
        }
        let target = self.get(to);
        if target.is_some_and(|t| t.color == mover) {
            return false;
        }

        let d_row = to.row - from.row;
        let d_col = to.col - from.col;

        match piece.kind {
            PieceKind::Pawn => {
                let dir = mover.pawn_direction();
                if d_col == 0 {
                    if d_row == dir && target.is_none() {
                        return true;
                    }
                    from.row == mover.pawn_row()
                        && d_row == 2 * dir
                        && target.is_none()
                        && self.get(from.offset(dir, 0)).is_none()
                } else {
                    d_col.abs() == 1 && d_row == dir && target.is_some()
                }
            }
            PieceKind::Rook => (d_row == 0 || d_col == 0) && self.is_path_clear(from, to),
            PieceKind::Bishop => d_row.abs() == d_col.abs() && self.is_path_clear(from, to),
            PieceKind::Queen => {
                (d_row == 0 || d_col == 0 || d_row.abs() == d_col.abs())
                    && self.is_path_clear(from, to)
            }
            PieceKind::Knight => {
                (d_row.abs() == 2 && d_col.abs() == 1) || (d_row.abs() == 1 && d_col.abs() == 2)
            }
            PieceKind::King => {
                if d_row.abs() <= 1 && d_col.abs() <= 1 {
                    return true;
                }
                self.is_castle(from, d_row, d_col, mover)
            }
        }
    }

    fn is_castle(&self, from: Square, d_row: i32, d_col: i32, mover: PieceColor) -> bool {
        if d_row != 0 || d_col.abs() != 2 || from.row != mover.home_row() {
            return false;
        }
        let rook_square = Square::new(from.row, if d_col > 0 { 7 } else { 0 });
        let has_rook = self
            .get(rook_square)
            .is_some_and(|p| p.kind == PieceKind::Rook && p.color == mover);
        has_rook && self.is_path_clear(from, rook_square)
    }

    /// True when every square strictly between `from` and `to` is empty.
    /// Only meaningful for straight or diagonal lines.
    pub fn is_path_clear(&self, from: Square, to: Square) -> bool {
        let step_row = (to.row - from.row).signum();
        let step_col = (to.col - from.col).signum();
        let mut current = from.offset(step_row, step_col);
        while current != to && current.is_valid() {
            if self.get(current).is_some() {
                return false;
            }
            current = current.offset(step_row, step_col);
        }
        true
    }

    /// Relocates the piece on `from` to `to`. Castling does not move the rook.
    pub fn make_move(&self, from: Square, to: Square) -> ChessBoard {
        let mut next = self.clone();
        let piece = next.get(from);
        next.set(to, piece);
        next.set(from, None);
        next
    }

    pub fn is_king_in_check(&self, color: PieceColor) -> bool {
        let Some(king) = self.find_king(color) else {
            return false;
        };
        let attacker = color.opponent();
        self.pieces()
            .filter(|(_, p)| p.color == attacker)
            .any(|(sq, _)| self.is_valid_move(sq, king, attacker))
    }

    /// Checkmate as far as king moves go: the king is in check and no
    /// adjacent square gets it out. Blocking or capturing the attacker with
    /// another piece is not considered.
    pub fn is_checkmate(&self, color: PieceColor) -> bool {
        if !self.is_king_in_check(color) {
            return false;
        }
        let Some(king) = self.find_king(color) else {
            return true;
        };
        !KING_STEPS.iter().any(|(d_row, d_col)| {
            let escape = king.offset(*d_row, *d_col);
            self.is_valid_move(king, escape, color)
                && !self.make_move(king, escape).is_king_in_check(color)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(board: &mut ChessBoard, row: i32, col: i32, kind: PieceKind, color: PieceColor) {
        board.set(Square::new(row, col), Some(Piece::new(kind, color)));
    }

    #[test]
    fn test_initial_layout() {
        let board = ChessBoard::new();
        assert_eq!(board.pieces().count(), 32);
        assert_eq!(
            board.get(Square::new(7, 4)),
            Some(Piece::new(PieceKind::King, PieceColor::White))
        );
        assert_eq!(
            board.get(Square::new(0, 3)),
            Some(Piece::new(PieceKind::Queen, PieceColor::Black))
        );
        assert_eq!(
            board.get(Square::new(1, 0)),
            Some(Piece::new(PieceKind::Pawn, PieceColor::Black))
        );
        assert!(board.get(Square::new(4, 4)).is_none());
    }

    #[test]
    fn test_pawn_moves() {
        let board = ChessBoard::new();
        let white = PieceColor::White;
        assert!(board.is_valid_move(Square::new(6, 4), Square::new(5, 4), white));
        assert!(board.is_valid_move(Square::new(6, 4), Square::new(4, 4), white));
        assert!(!board.is_valid_move(Square::new(6, 4), Square::new(3, 4), white));
        assert!(!board.is_valid_move(Square::new(6, 4), Square::new(7, 4), white));
        assert!(!board.is_valid_move(Square::new(6, 4), Square::new(5, 5), white));
        assert!(board.is_valid_move(Square::new(1, 4), Square::new(3, 4), PieceColor::Black));

        let mut blocked = ChessBoard::new();
        place(&mut blocked, 5, 4, PieceKind::Knight, PieceColor::Black);
        assert!(!blocked.is_valid_move(Square::new(6, 4), Square::new(4, 4), white));
        assert!(!blocked.is_valid_move(Square::new(6, 4), Square::new(5, 4), white));
        assert!(blocked.is_valid_move(Square::new(6, 3), Square::new(5, 4), white));
        assert!(blocked.is_valid_move(Square::new(6, 5), Square::new(5, 4), white));
    }

    #[test]
    fn test_wrong_color_and_own_capture() {
        let board = ChessBoard::new();
        assert!(!board.is_valid_move(Square::new(1, 4), Square::new(2, 4), PieceColor::White));
        assert!(!board.is_valid_move(Square::new(7, 0), Square::new(6, 0), PieceColor::White));
        assert!(!board.is_valid_move(Square::new(4, 4), Square::new(3, 4), PieceColor::White));
        assert!(!board.is_valid_move(Square::new(7, 1), Square::new(7, 1), PieceColor::White));
    }

    #[test]
    fn test_sliding_pieces() {
        let mut board = ChessBoard::empty();
        place(&mut board, 4, 4, PieceKind::Queen, PieceColor::White);
        place(&mut board, 4, 6, PieceKind::Pawn, PieceColor::Black);
        place(&mut board, 2, 2, PieceKind::Pawn, PieceColor::White);
        let from = Square::new(4, 4);
        let white = PieceColor::White;
        assert!(board.is_valid_move(from, Square::new(4, 6), white));
        assert!(!board.is_valid_move(from, Square::new(4, 7), white));
        assert!(board.is_valid_move(from, Square::new(3, 3), white));
        assert!(!board.is_valid_move(from, Square::new(1, 1), white));
        assert!(!board.is_valid_move(from, Square::new(2, 3), white));

        place(&mut board, 0, 0, PieceKind::Rook, PieceColor::White);
        assert!(board.is_valid_move(Square::new(0, 0), Square::new(0, 7), white));
        assert!(!board.is_valid_move(Square::new(0, 0), Square::new(1, 1), white));
        place(&mut board, 7, 7, PieceKind::Bishop, PieceColor::White);
        assert!(board.is_valid_move(Square::new(7, 7), Square::new(5, 5), white));
        assert!(!board.is_valid_move(Square::new(7, 7), Square::new(7, 5), white));
    }

    #[test]
    fn test_knight_jumps() {
        let board = ChessBoard::new();
        let white = PieceColor::White;
        assert!(board.is_valid_move(Square::new(7, 1), Square::new(5, 2), white));
        assert!(board.is_valid_move(Square::new(7, 1), Square::new(5, 0), white));
        assert!(!board.is_valid_move(Square::new(7, 1), Square::new(6, 3), white));
        assert!(!board.is_valid_move(Square::new(7, 1), Square::new(5, 1), white));
    }

    #[test]
    fn test_simplified_castle() {
        let mut board = ChessBoard::empty();
        place(&mut board, 7, 4, PieceKind::King, PieceColor::White);
        place(&mut board, 7, 7, PieceKind::Rook, PieceColor::White);
        place(&mut board, 7, 0, PieceKind::Rook, PieceColor::White);
        place(&mut board, 7, 1, PieceKind::Knight, PieceColor::White);
        let white = PieceColor::White;
        assert!(board.is_valid_move(Square::new(7, 4), Square::new(7, 6), white));
        assert!(!board.is_valid_move(Square::new(7, 4), Square::new(7, 2), white));

        let castled = board.make_move(Square::new(7, 4), Square::new(7, 6));
        assert_eq!(
            castled.get(Square::new(7, 7)),
            Some(Piece::new(PieceKind::Rook, PieceColor::White))
        );
        assert!(castled.get(Square::new(7, 5)).is_none());

        let mut off_home = ChessBoard::empty();
        place(&mut off_home, 6, 4, PieceKind::King, PieceColor::White);
        place(&mut off_home, 6, 7, PieceKind::Rook, PieceColor::White);
        assert!(!off_home.is_valid_move(Square::new(6, 4), Square::new(6, 6), white));
    }

    #[test]
    fn test_make_move_copies() {
        let board = ChessBoard::new();
        let next = board.make_move(Square::new(6, 4), Square::new(4, 4));
        assert!(board.get(Square::new(4, 4)).is_none());
        assert!(next.get(Square::new(6, 4)).is_none());
        assert_eq!(
            next.get(Square::new(4, 4)),
            Some(Piece::new(PieceKind::Pawn, PieceColor::White))
        );
    }

    #[test]
    fn test_check_detection() {
        let mut board = ChessBoard::empty();
        place(&mut board, 0, 4, PieceKind::King, PieceColor::Black);
        place(&mut board, 7, 4, PieceKind::King, PieceColor::White);
        place(&mut board, 4, 4, PieceKind::Rook, PieceColor::White);
        assert!(board.is_king_in_check(PieceColor::Black));
        assert!(!board.is_king_in_check(PieceColor::White));
        assert!(!board.is_checkmate(PieceColor::Black));

        place(&mut board, 2, 4, PieceKind::Pawn, PieceColor::Black);
        assert!(!board.is_king_in_check(PieceColor::Black));

        let kingless = ChessBoard::empty();
        assert!(!kingless.is_king_in_check(PieceColor::White));
    }

    #[test]
    fn test_back_rank_checkmate() {
        let mut board = ChessBoard::empty();
        place(&mut board, 0, 6, PieceKind::King, PieceColor::Black);
        place(&mut board, 1, 5, PieceKind::Pawn, PieceColor::Black);
        place(&mut board, 1, 6, PieceKind::Pawn, PieceColor::Black);
        place(&mut board, 1, 7, PieceKind::Pawn, PieceColor::Black);
        place(&mut board, 0, 0, PieceKind::Rook, PieceColor::White);
        place(&mut board, 7, 4, PieceKind::King, PieceColor::White);
        assert!(board.is_checkmate(PieceColor::Black));

        // Escape square opens up once a pawn is gone.
        board.set(Square::new(1, 7), None);
        assert!(!board.is_checkmate(PieceColor::Black));
    }

    #[test]
    fn test_checkmate_ignores_blocking_pieces() {
        let mut board = ChessBoard::empty();
        place(&mut board, 0, 6, PieceKind::King, PieceColor::Black);
        place(&mut board, 1, 5, PieceKind::Pawn, PieceColor::Black);
        place(&mut board, 1, 6, PieceKind::Pawn, PieceColor::Black);
        place(&mut board, 1, 7, PieceKind::Pawn, PieceColor::Black);
        // Black rook could capture the attacker, but only king moves count.
        place(&mut board, 5, 0, PieceKind::Rook, PieceColor::Black);
        place(&mut board, 0, 0, PieceKind::Rook, PieceColor::White);
        place(&mut board, 7, 4, PieceKind::King, PieceColor::White);
        assert!(board.is_checkmate(PieceColor::Black));
    }
}
