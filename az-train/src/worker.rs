//! Worker (C6): runs `worker_concurrency` self-play games cooperatively on
//! one thread, cycling each between PUCT selection and evaluator round
//! trips through the coordinator.

use crate::channel::TaggedSender;
use crate::config::TrainingConfig;
use crate::error::TrainerError;
use crate::protocol::{ToCoordinator, ToWorker};
use az_core::GameState;
use az_mcts::{LeafHandle, MctsInstance, PuctConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::mpsc;

struct Slot<S> {
    mcts: MctsInstance<S>,
    noise_applied: bool,
}

/// Advances one slot until it has a genuine (non-terminal) leaf ready for
/// the evaluator, handling any number of move commits and locally-resolved
/// terminal leaves along the way.
fn drain_to_next_leaf<S: GameState>(
    slot: &mut Slot<S>,
    initial_state: &S,
    cfg: &TrainingConfig,
    rng: &mut impl Rng,
    to_coord: &mut TaggedSender<ToCoordinator<S>>,
) -> (LeafHandle, S) {
    loop {
        if slot.mcts.searches_this_turn() >= cfg.evaluations_per_turn {
            slot.mcts
                .move_proportional(rng)
                .expect("root is expanded once its evaluation budget is spent");
            // Noise is single-shot per turn, not per game: the move just
            // committed advanced the root, so the next turn's first
            // expansion must be allowed to apply it again.
            slot.noise_applied = false;
            if slot.mcts.complete() || slot.mcts.turns() >= cfg.max_turns {
                let (score, history) = slot
                    .mcts
                    .collect_result(cfg.max_turns)
                    .expect("game just ended or hit the turn cap");
                to_coord.send(ToCoordinator::Result { score, history });
                slot.mcts.reset(initial_state.clone());
            }
        }

        // `None` means the reachable subtree is fully terminal-saturated and
        // `select_leaf`'s bounded retries ran out before the per-turn budget
        // did; its internal terminal backups still advanced
        // `searches_this_turn`, so looping back re-checks the budget above
        // and, eventually, commits the move instead of spinning forever.
        let Some((leaf, state)) = slot.mcts.select_leaf() else {
            continue;
        };

        if let Some(outcome) = state.outcome() {
            slot.mcts
                .expand_leaf(leaf, outcome, Vec::new())
                .expect("freshly selected leaf has not been expanded yet");
            continue;
        }
        return (leaf, state);
    }
}

/// Runs until a [`ToWorker::Terminate`] arrives or the coordinator's send
/// half is dropped. Intended to be the body of a `std::thread::spawn`.
///
/// A protocol violation from the coordinator (an evaluation with nothing
/// pending, or one that re-expands an already-expanded leaf) aborts the
/// worker after logging a diagnostic, per the protocol-violation handling.
pub fn run_worker<S: GameState>(
    id: usize,
    initial_state: S,
    cfg: TrainingConfig,
    puct: PuctConfig,
    seed: u64,
    mut to_coord: TaggedSender<ToCoordinator<S>>,
    from_coord: mpsc::Receiver<Vec<ToWorker<S>>>,
) -> Result<(), TrainerError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut pending_selection: VecDeque<Slot<S>> = (0..cfg.worker_concurrency)
        .map(|_| Slot {
            mcts: MctsInstance::new(initial_state.clone(), puct),
            noise_applied: false,
        })
        .collect();
    let mut pending_evaluation: VecDeque<(Slot<S>, LeafHandle)> = VecDeque::new();

    loop {
        let ready = pending_selection.len();
        for _ in 0..ready {
            let mut slot = pending_selection.pop_front().expect("just checked len");
            let (leaf, state) = drain_to_next_leaf(&mut slot, &initial_state, &cfg, &mut rng, &mut to_coord);
            to_coord.send(ToCoordinator::Evaluate(state));
            pending_evaluation.push_back((slot, leaf));
        }
        to_coord.flush();

        if pending_evaluation.is_empty() {
            tracing::warn!(worker = id, "no pending evaluations; worker has no live games");
            return Ok(());
        }

        let Ok(batch) = from_coord.recv() else {
            tracing::info!(worker = id, "coordinator channel closed, exiting");
            return Ok(());
        };

        for msg in batch {
            match msg {
                ToWorker::Evaluation { value, children } => {
                    let Some((mut slot, leaf)) = pending_evaluation.pop_front() else {
                        let err = TrainerError::Protocol {
                            worker: id,
                            detail: "EVALUATION arrived with no pending evaluator request".into(),
                        };
                        tracing::error!(worker = id, %err, "protocol violation, aborting worker");
                        return Err(err);
                    };
                    if let Err(source) = slot.mcts.expand_leaf(leaf, value, children) {
                        let err = TrainerError::Protocol {
                            worker: id,
                            detail: format!("expand_leaf: {source}"),
                        };
                        tracing::error!(worker = id, %err, "protocol violation, aborting worker");
                        return Err(err);
                    }

                    if !slot.noise_applied && slot.mcts.searches_this_turn() >= 1 {
                        let _ = slot
                            .mcts
                            .add_dirichlet_noise(cfg.noise_alpha, cfg.noise_fraction, &mut rng);
                        slot.noise_applied = true;
                    }
                    pending_selection.push_back(slot);
                }
                ToWorker::Terminate => {
                    tracing::info!(worker = id, "received TERMINATE");
                    return Ok(());
                }
            }
        }
    }
}
