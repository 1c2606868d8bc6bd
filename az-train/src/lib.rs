//! az-train - replay buffer, buffered duplex channel, worker, and
//! coordinator (C5-C8): the concurrency and training machinery around
//! az-mcts's self-play search.

pub mod buffer;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod worker;

pub use buffer::{Example, ReplayBuffer};
pub use config::TrainingConfig;
pub use coordinator::Coordinator;
pub use error::TrainerError;
