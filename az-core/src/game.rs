//! The Game capability (C1): the trait search and training code are written
//! against, independent of any particular game's rules.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    #[error("move {0} is not legal in this position")]
    IllegalMove(usize),
    #[error("play() called on a terminal state")]
    TerminalState,
}

/// A two-player, perfect-information, zero-sum game state.
///
/// Implementors are value types: `play` never mutates `self`, it returns a
/// fresh state. `outcome()` is always reported from the perspective of the
/// player about to move *in that state* — a terminal state with `outcome()
/// == Some(-1.0)` means the player who would move next has just lost.
pub trait GameState: Clone + Send + Sync {
    /// Legal action indices in `[0, num_actions())`. Empty iff terminal.
    fn moves(&self) -> Vec<usize>;

    /// Apply a move, returning the resulting state. Precondition: `mv` is in
    /// `self.moves()`. Use [`GameState::try_play`] at trust boundaries where
    /// the move did not come from `moves()` itself.
    fn play(&self, mv: usize) -> Self;

    /// Checked version of [`GameState::play`] for untrusted callers (e.g. a
    /// worker replaying a move index received over a channel).
    fn try_play(&self, mv: usize) -> Result<Self, GameError>
    where
        Self: Sized,
    {
        if self.outcome().is_some() {
            return Err(GameError::TerminalState);
        }
        if !self.moves().contains(&mv) {
            return Err(GameError::IllegalMove(mv));
        }
        Ok(self.play(mv))
    }

    /// `None` while the game continues; otherwise one of `{-1.0, 0.0, 1.0}`
    /// from the perspective of the player about to move at this state.
    fn outcome(&self) -> Option<f32>;

    /// Flattened, row-major tensor of shape `position_shape()`, fed to the
    /// evaluator as-is.
    fn position(&self) -> Vec<f32>;

    /// `(channels, rows, columns)` — constant across a run.
    fn position_shape(&self) -> (usize, usize, usize);

    /// Size of the fixed action space `M`, i.e. the bound on `moves()`.
    fn num_actions(&self) -> usize;
}
