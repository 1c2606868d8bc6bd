//! Wire protocol between coordinator and worker (§6).

use az_core::GameState;

/// A single committed turn, as recorded by [`az_mcts::MctsInstance`]:
/// the root state and its visit-proportional improved policy.
pub type TurnRecord<S> = (S, Vec<(usize, f32)>);

/// worker -> coordinator
pub enum ToCoordinator<S: GameState> {
    Evaluate(S),
    Result {
        score: f32,
        history: Vec<TurnRecord<S>>,
    },
}

/// coordinator -> worker
pub enum ToWorker<S: GameState> {
    Evaluation {
        value: f32,
        children: Vec<(usize, S, f32)>,
    },
    Terminate,
}
