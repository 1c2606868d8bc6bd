//! One self-play game's MCTS state: a root, a tree, and per-turn history.
//!
//! ## Architecture
//! - Level 1: orchestration (`MctsInstance`)
//! - Level 2: leaf selection / expansion, delegating to [`crate::tree::Tree`]
//! - Level 3: move commitment (visit-proportional sampling), history

use crate::tree::{NodeId, PuctConfig, Tree};
use az_core::GameState;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Dirichlet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MctsError {
    #[error("leaf handle does not refer to a pending selection")]
    UnknownLeaf,
    #[error("leaf was already expanded")]
    AlreadyExpanded,
    #[error("root is not expanded yet")]
    RootNotExpanded,
    #[error("collect_result called before the game ended or max_turns was reached")]
    NotFinished,
}

/// Opaque ticket returned by [`MctsInstance::select_leaf`]; must be passed
/// back, unmodified, to [`MctsInstance::expand_leaf`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafHandle(usize);

struct PendingSelection {
    node: NodeId,
    path: Vec<(NodeId, usize)>,
}

/// One turn's recorded training example: the state the root held, paired
/// with the visit-proportional improved policy over its legal moves.
pub type TurnRecord<S> = (S, Vec<(usize, f32)>);

/// Drives one self-play game: repeated leaf selection/expansion rounds,
/// punctuated by move commitments, until the game ends.
pub struct MctsInstance<S> {
    tree: Tree<S>,
    root: NodeId,
    current_state: S,
    puct: PuctConfig,
    turns: u32,
    evaluations_this_turn: u32,
    root_leaf_pending: bool,
    pending: Vec<Option<PendingSelection>>,
    history: Vec<TurnRecord<S>>,
}

impl<S: GameState> MctsInstance<S> {
    pub fn new(initial_state: S, puct: PuctConfig) -> Self {
        Self {
            tree: Tree::new(initial_state.clone()),
            root: NodeId::ROOT,
            current_state: initial_state,
            puct,
            turns: 0,
            evaluations_this_turn: 0,
            root_leaf_pending: false,
            pending: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> &S {
        &self.current_state
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn searches_this_turn(&self) -> u32 {
        self.evaluations_this_turn
    }

    pub fn complete(&self) -> bool {
        self.current_state.outcome().is_some()
    }

    /// Current root child priors, in child order. Exposed for inspection
    /// (e.g. printing the search distribution) and testing.
    pub fn root_priors(&self) -> Vec<f32> {
        self.tree.get(self.root).children.iter().map(|e| e.prior).collect()
    }

    /// Descend from the root via PUCT, applying virtual loss along the way,
    /// stopping at the first unexpanded node. Returns `None` only while the
    /// root itself is unexpanded and a prior selection into it is still
    /// outstanding (only one leaf is ever in flight before the root has
    /// priors to discriminate on).
    pub fn select_leaf(&mut self) -> Option<(LeafHandle, S)> {
        // A node already expanded-and-terminal resolves instantly: back it
        // up with its cached value and restart the descent. Bounded so a
        // fully-solved subtree can't spin forever.
        for _ in 0..=self.tree.len() {
            let mut current = self.root;
            let mut path = Vec::new();

            loop {
                let node = self.tree.get(current);
                if let Some(terminal_value) = node.terminal_value {
                    self.tree.backpropagate(&path, terminal_value);
                    self.evaluations_this_turn += 1;
                    break;
                }
                if !node.expanded {
                    if current == self.root {
                        if self.root_leaf_pending {
                            return None;
                        }
                        self.root_leaf_pending = true;
                    }
                    let state = node.state.clone();
                    let handle = self.park(current, path);
                    return Some((handle, state));
                }
                let child_index = self
                    .tree
                    .select_best_child_index(current, &self.puct)
                    .expect("expanded non-terminal node always has children");
                self.tree.add_pending(current, child_index);
                let child = self.tree.get(current).children[child_index].child;
                path.push((current, child_index));
                current = child;
            }
        }
        None
    }

    fn park(&mut self, node: NodeId, path: Vec<(NodeId, usize)>) -> LeafHandle {
        self.pending.push(Some(PendingSelection { node, path }));
        LeafHandle(self.pending.len() - 1)
    }

    /// Expand a previously-selected leaf. `children` is empty iff the leaf's
    /// state is terminal, in which case `value` is its cached outcome.
    pub fn expand_leaf(
        &mut self,
        leaf: LeafHandle,
        value: f32,
        children: Vec<(usize, S, f32)>,
    ) -> Result<(), MctsError> {
        let slot = self
            .pending
            .get_mut(leaf.0)
            .ok_or(MctsError::UnknownLeaf)?
            .take()
            .ok_or(MctsError::UnknownLeaf)?;

        if self.tree.get(slot.node).expanded {
            return Err(MctsError::AlreadyExpanded);
        }

        let is_terminal = children.is_empty();
        if !is_terminal {
            self.tree.install_children(slot.node, children);
        }
        let node = self.tree.get_mut(slot.node);
        node.expanded = true;
        if is_terminal {
            node.terminal_value = Some(value);
        }

        self.tree.backpropagate(&slot.path, value);
        self.evaluations_this_turn += 1;

        if slot.node == self.root {
            self.root_leaf_pending = false;
        }
        Ok(())
    }

    /// Perturb root priors with Dirichlet noise. Idempotent in the sense
    /// that callers are expected to invoke it exactly once per turn,
    /// immediately after the root is first expanded.
    pub fn add_dirichlet_noise(
        &mut self,
        alpha: f32,
        fraction: f32,
        rng: &mut impl Rng,
    ) -> Result<(), MctsError> {
        if !self.tree.get(self.root).expanded {
            return Err(MctsError::RootNotExpanded);
        }
        let n = self.tree.get(self.root).children.len();
        if n == 0 {
            return Ok(());
        }
        let dirichlet = Dirichlet::new_with_size(alpha, n).expect("alpha > 0");
        let noise: Vec<f32> = dirichlet.sample(rng);
        for (edge, eta) in self.tree.get_mut(self.root).children.iter_mut().zip(noise) {
            edge.prior = (1.0 - fraction) * edge.prior + fraction * eta;
        }
        Ok(())
    }

    /// Commit a move sampled proportional to root visit counts, recording
    /// the improved policy into history and advancing the root.
    pub fn move_proportional(&mut self, rng: &mut impl Rng) -> Result<usize, MctsError> {
        let root_node = self.tree.get(self.root);
        if !root_node.expanded {
            return Err(MctsError::RootNotExpanded);
        }
        let total: u32 = root_node.children.iter().map(|e| e.visits).sum();
        let weights: Vec<f32> = if total == 0 {
            vec![1.0; root_node.children.len()]
        } else {
            root_node.children.iter().map(|e| e.visits as f32).collect()
        };
        let moves: Vec<usize> = root_node.children.iter().map(|e| e.mv).collect();
        let pi: Vec<(usize, f32)> = moves
            .iter()
            .zip(weights.iter())
            .map(|(&mv, &w)| (mv, w / weights.iter().sum::<f32>()))
            .collect();
        self.history.push((self.current_state.clone(), pi));

        let dist = WeightedIndex::new(&weights).expect("weights are non-negative and non-empty");
        let choice = dist.sample(rng);
        let mv = moves[choice];
        let child_id = root_node.children[choice].child;

        self.root = self.tree.compact(child_id);
        self.current_state = self.tree.get(self.root).state.clone();
        self.turns += 1;
        self.evaluations_this_turn = 0;
        self.root_leaf_pending = false;
        self.pending.clear();
        Ok(mv)
    }

    /// Score (from the first mover's perspective) and full per-turn history,
    /// available once the game has ended or hit the turn cap.
    pub fn collect_result(&self, max_turns: u32) -> Result<(f32, Vec<TurnRecord<S>>), MctsError> {
        if !self.complete() && self.turns < max_turns {
            return Err(MctsError::NotFinished);
        }
        let terminal_score = self.current_state.outcome().unwrap_or(0.0);
        // Flip back to the first mover's perspective: outcome() is reported
        // from the mover-to-move at the terminal state, which is `turns`
        // plies removed from the first mover's perspective.
        let score = if self.turns % 2 == 0 {
            terminal_score
        } else {
            -terminal_score
        };
        Ok((score, self.history.clone()))
    }

    pub fn reset(&mut self, initial_state: S) {
        self.tree = Tree::new(initial_state.clone());
        self.root = NodeId::ROOT;
        self.current_state = initial_state;
        self.turns = 0;
        self.evaluations_this_turn = 0;
        self.root_leaf_pending = false;
        self.pending.clear();
        self.history.clear();
    }
}
