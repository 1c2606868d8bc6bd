//! az-mcts - PUCT search tree and the self-play MCTS instance.
//!
//! This crate is generic over [`az_core::GameState`]; it knows nothing about
//! Connect-K specifically.

pub mod instance;
pub mod tree;

pub use instance::{LeafHandle, MctsError, MctsInstance, TurnRecord};
pub use tree::{ChildEdge, Node, NodeId, PuctConfig, Tree};

#[cfg(test)]
mod tests {
    use super::*;
    use az_core::{ConnectK, GameState};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Drives one instance to its first leaf, expands with a uniform
    /// evaluator, and returns the instance plus rng for further driving.
    fn uniform_expand<S: GameState>(
        instance: &mut MctsInstance<S>,
        leaf: LeafHandle,
        state: &S,
    ) {
        match state.outcome() {
            Some(v) => instance.expand_leaf(leaf, v, Vec::new()).unwrap(),
            None => {
                let moves = state.moves();
                let prior = 1.0 / moves.len() as f32;
                let children: Vec<_> = moves
                    .iter()
                    .map(|&mv| (mv, state.play(mv), prior))
                    .collect();
                instance.expand_leaf(leaf, 0.0, children).unwrap();
            }
        }
    }

    #[test]
    fn root_expands_on_first_leaf() {
        let game = ConnectK::connect_four();
        let mut instance = MctsInstance::new(game, PuctConfig::default());
        let (leaf, state) = instance.select_leaf().expect("first leaf always available");
        uniform_expand(&mut instance, leaf, &state);
        assert_eq!(instance.searches_this_turn(), 1);
    }

    #[test]
    fn second_leaf_is_blocked_until_root_expands() {
        let game = ConnectK::connect_four();
        let mut instance = MctsInstance::new(game, PuctConfig::default());
        let (_leaf, _state) = instance.select_leaf().expect("first leaf");
        assert!(instance.select_leaf().is_none());
    }

    #[test]
    fn virtual_loss_spreads_selection_across_children() {
        let game = ConnectK::connect_four();
        let mut instance = MctsInstance::new(game.clone(), PuctConfig::default());
        let (leaf, state) = instance.select_leaf().unwrap();
        uniform_expand(&mut instance, leaf, &state);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let (_leaf, leaf_state) = instance.select_leaf().expect("root expanded, room for 4");
            seen.insert(leaf_state.position());
        }
        assert_eq!(seen.len(), 4, "four concurrent selections should hit distinct children");
    }

    #[test]
    fn dirichlet_noise_applies_once_and_only_to_root() {
        let game = ConnectK::connect_four();
        let mut instance = MctsInstance::new(game, PuctConfig::default());
        let (leaf, state) = instance.select_leaf().unwrap();
        uniform_expand(&mut instance, leaf, &state);

        let priors_before = instance.root_priors();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        instance.add_dirichlet_noise(0.3, 0.25, &mut rng).unwrap();
        let priors_after = instance.root_priors();

        assert_eq!(priors_before.len(), priors_after.len());
        assert!(priors_before.iter().zip(&priors_after).any(|(a, b)| (a - b).abs() > 1e-6));
        let sum: f32 = priors_after.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn move_proportional_detaches_subtree() {
        let game = ConnectK::connect_four();
        let mut instance = MctsInstance::new(game, PuctConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..10 {
            if let Some((leaf, state)) = instance.select_leaf() {
                uniform_expand(&mut instance, leaf, &state);
            }
        }
        let mv = instance.move_proportional(&mut rng).unwrap();
        assert!(mv < 7);
        assert_eq!(instance.searches_this_turn(), 0);
        assert_eq!(instance.turns(), 1);
    }
}
