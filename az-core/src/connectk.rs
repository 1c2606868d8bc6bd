//! Connect-K: gravity-drop connection game on a `rows x columns` grid.
//!
//! Two boolean planes track occupancy from the perspective of the player
//! about to move: `mine` (their own pieces) and `theirs` (the opponent's).
//! Playing a column drops a piece to the lowest open row, then the planes
//! swap (the mover the flips state is a "to move" capability, not a
//! specific side) so that the resulting state is again expressed from the
//! perspective of whoever moves next.

use crate::game::GameState;
use serde::{Deserialize, Serialize};
use std::fmt;

const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectK {
    rows: usize,
    columns: usize,
    k: usize,
    /// Row-major, row 0 is the top row. `mine[r * columns + c]`.
    mine: Vec<bool>,
    theirs: Vec<bool>,
    outcome: Option<f32>,
}

impl ConnectK {
    pub fn new(rows: usize, columns: usize, k: usize) -> Self {
        Self {
            rows,
            columns,
            k,
            mine: vec![false; rows * columns],
            theirs: vec![false; rows * columns],
            outcome: None,
        }
    }

    /// Standard Connect Four: 6 rows, 7 columns, 4 in a row.
    pub fn connect_four() -> Self {
        Self::new(6, 7, 4)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn index(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }

    fn occupied(&self, row: usize, column: usize) -> bool {
        let idx = self.index(row, column);
        self.mine[idx] || self.theirs[idx]
    }

    fn landing_row(&self, column: usize) -> usize {
        let mut row = 0;
        loop {
            if row == self.rows - 1 || self.occupied(row + 1, column) {
                return row;
            }
            row += 1;
        }
    }

    fn check_for_game_over(&mut self, row: usize, column: usize) {
        if row == 0 && (0..self.columns).all(|c| self.occupied(0, c)) {
            self.outcome = Some(0.0);
            return;
        }

        for (dr, dc) in DIRECTIONS {
            let mut run = 0usize;
            let mut best_run = 0usize;
            for i in -(self.k as i32 - 1)..self.k as i32 {
                let r = row as i32 + dr * i;
                let c = column as i32 + dc * i;
                if r < 0 || c < 0 || r as usize >= self.rows || c as usize >= self.columns {
                    run = 0;
                    continue;
                }
                if self.theirs[self.index(r as usize, c as usize)] {
                    run += 1;
                    best_run = best_run.max(run);
                } else {
                    run = 0;
                }
            }
            if best_run >= self.k {
                self.outcome = Some(-1.0);
                return;
            }
        }
    }
}

impl GameState for ConnectK {
    fn moves(&self) -> Vec<usize> {
        if self.outcome.is_some() {
            return Vec::new();
        }
        (0..self.columns)
            .filter(|&c| !self.occupied(0, c))
            .collect()
    }

    fn play(&self, column: usize) -> Self {
        let row = self.landing_row(column);

        let mut child = Self {
            rows: self.rows,
            columns: self.columns,
            k: self.k,
            mine: self.theirs.clone(),
            theirs: self.mine.clone(),
            outcome: None,
        };
        let idx = child.index(row, column);
        child.theirs[idx] = true;
        child.check_for_game_over(row, column);
        child
    }

    fn outcome(&self) -> Option<f32> {
        self.outcome
    }

    fn position(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(2 * self.rows * self.columns);
        out.extend(self.mine.iter().map(|&b| if b { 1.0 } else { 0.0 }));
        out.extend(self.theirs.iter().map(|&b| if b { 1.0 } else { 0.0 }));
        out
    }

    fn position_shape(&self) -> (usize, usize, usize) {
        (2, self.rows, self.columns)
    }

    fn num_actions(&self) -> usize {
        self.columns
    }
}

impl fmt::Display for ConnectK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let border = "#".repeat(self.columns + 2);
        writeln!(f, "{border}")?;
        for row in 0..self.rows {
            write!(f, "#")?;
            for column in 0..self.columns {
                let idx = self.index(row, column);
                let ch = if self.mine[idx] {
                    '*'
                } else if self.theirs[idx] {
                    '+'
                } else {
                    ' '
                };
                write!(f, "{ch}")?;
            }
            writeln!(f, "#")?;
        }
        write!(f, "{border}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_board_has_one_move_per_column() {
        let g = ConnectK::connect_four();
        assert_eq!(g.moves(), vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(g.outcome(), None);
    }

    #[test]
    fn pieces_stack_with_gravity() {
        let g = ConnectK::connect_four();
        let g1 = g.play(3);
        let g2 = g1.play(3);
        // after two drops in the same column, the column still has room
        assert!(g2.moves().contains(&3));
        assert_eq!(g2.position_shape(), (2, 6, 7));
    }

    #[test]
    fn vertical_four_is_a_loss_for_the_next_mover() {
        // Player A drops in column 0 three times, interleaved with player B
        // dropping elsewhere, then a fourth A drop connects four vertically.
        let mut g = ConnectK::connect_four();
        let drops = [0, 1, 0, 1, 0, 1, 0];
        for &col in &drops {
            g = g.play(col);
        }
        assert_eq!(g.outcome(), Some(-1.0));
        assert!(g.moves().is_empty());
    }

    #[test]
    fn horizontal_four_is_detected() {
        let mut g = ConnectK::connect_four();
        // A plays 0,1,2,3 on the bottom row; B plays elsewhere each turn.
        let drops = [0, 0, 1, 1, 2, 2, 3];
        for &col in &drops {
            g = g.play(col);
        }
        assert_eq!(g.outcome(), Some(-1.0));
    }

    #[test]
    fn draw_on_full_board_with_no_winner() {
        // A 1x4 board with k=5 can never connect 5; it fills and draws.
        let mut g = ConnectK::new(1, 4, 5);
        for col in [0, 1, 2, 3] {
            g = g.play(col);
        }
        assert_eq!(g.outcome(), Some(0.0));
    }

    #[test]
    fn try_play_rejects_illegal_move() {
        let g = ConnectK::new(1, 1, 2);
        let full = g.play(0);
        assert!(full.try_play(0).is_err());
    }

    #[test]
    fn position_is_zero_one_and_matches_shape() {
        let g = ConnectK::connect_four().play(2);
        let (c, r, cols) = g.position_shape();
        let pos = g.position();
        assert_eq!(pos.len(), c * r * cols);
        assert!(pos.iter().all(|&x| x == 0.0 || x == 1.0));
        assert_eq!(pos.iter().filter(|&&x| x == 1.0).count(), 1);
    }
}
