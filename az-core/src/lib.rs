//! az-core - Game capability and the Connect-K reference game
//!
//! This crate provides:
//! - The `GameState` trait: the narrow capability the search and training
//!   crates require from a game (legal moves, apply move, terminal outcome,
//!   a fixed-shape tensor view).
//! - A concrete Connect-K implementation satisfying that trait.

pub mod connectk;
pub mod game;

pub use connectk::ConnectK;
pub use game::{GameError, GameState};
