//! az CLI - command-line entry point for self-play training.
//!
//! Commands:
//! - train: run the coordinator/worker self-play training loop
//! - play: play one self-play game with a (optionally loaded) network and
//!   print each position
//! - bench: time a synchronous search loop to gauge leaves/sec

use anyhow::Context;
use az_core::{ConnectK, GameState};
use az_mcts::{MctsInstance, PuctConfig};
use az_net::{ConvNet, Evaluator, NetConfig};
use az_train::{Coordinator, TrainingConfig};
use candle_core::Device;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "az")]
#[command(about = "AlphaZero-style self-play trainer for Connect-K")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the self-play training loop
    Train {
        /// Path to a JSON-serialized TrainingConfig; defaults are used if absent
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "6")]
        rows: usize,
        #[arg(long, default_value = "7")]
        columns: usize,
        #[arg(long, default_value = "4")]
        k: usize,
        /// Resume from an existing checkpoint
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
    /// Play one self-play game and print each position
    Play {
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        #[arg(long, default_value = "6")]
        rows: usize,
        #[arg(long, default_value = "7")]
        columns: usize,
        #[arg(long, default_value = "4")]
        k: usize,
        #[arg(long, default_value = "200")]
        simulations: u32,
    },
    /// Benchmark synchronous search throughput
    Bench {
        #[arg(long, default_value = "6")]
        rows: usize,
        #[arg(long, default_value = "7")]
        columns: usize,
        #[arg(long, default_value = "4")]
        k: usize,
        #[arg(long, default_value = "1000")]
        leaves: u32,
    },
}

fn net_config(game: &ConnectK) -> NetConfig {
    let (channels, rows, columns) = game.position_shape();
    NetConfig::for_game(channels, rows, columns, game.num_actions())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { config, rows, columns, k, checkpoint } => {
            let cfg = match config {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading config at {}", path.display()))?;
                    serde_json::from_str(&text)
                        .with_context(|| format!("parsing config at {}", path.display()))?
                }
                None => TrainingConfig::default(),
            };

            let game = ConnectK::new(rows, columns, k);
            let puct = PuctConfig::default()
                .with_c_init(cfg.c_init)
                .with_c_base(cfg.c_base);
            let device = Device::Cpu;

            let mut coordinator = Coordinator::spawn(game.clone(), cfg, puct, net_config(&game), device)?;
            if let Some(path) = &checkpoint {
                coordinator
                    .load_checkpoint(path)
                    .with_context(|| format!("loading checkpoint {}", path.display()))?;
                tracing::info!(path = %path.display(), "resumed from checkpoint");
            }
            tracing::info!(rows, columns, k, "starting training loop");
            coordinator.run()?;
            Ok(())
        }

        Commands::Play { checkpoint, rows, columns, k, simulations } => {
            let game = ConnectK::new(rows, columns, k);
            let device = Device::Cpu;
            let mut net = ConvNet::new(net_config(&game), device)?;
            if let Some(path) = &checkpoint {
                net.load(path).with_context(|| format!("loading checkpoint {}", path.display()))?;
            }

            let puct = PuctConfig::default();
            let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
            let mut state = game.clone();
            let mut mcts = MctsInstance::new(state.clone(), puct);
            let mut ply = 0;
            let mut noise_applied = false;

            println!("{}", state);
            while state.outcome().is_none() {
                for _ in 0..simulations {
                    let Some((leaf, leaf_state)) = mcts.select_leaf() else {
                        break;
                    };
                    if let Some(outcome) = leaf_state.outcome() {
                        mcts.expand_leaf(leaf, outcome, Vec::new())?;
                        continue;
                    }
                    let (value, raw_policy) = net
                        .predict(std::slice::from_ref(&leaf_state))?
                        .pop()
                        .expect("predict returns one row per input state");
                    let legal = leaf_state.moves();
                    let children: Vec<(usize, ConnectK, f32)> = legal
                        .iter()
                        .map(|&mv| (mv, leaf_state.play(mv), raw_policy[mv]))
                        .collect();
                    mcts.expand_leaf(leaf, value, children)?;
                    if !noise_applied && mcts.searches_this_turn() >= 1 {
                        let _ = mcts.add_dirichlet_noise(0.3, 0.25, &mut rng);
                        noise_applied = true;
                    }
                }
                mcts.move_proportional(&mut rng)?;
                noise_applied = false;
                state = mcts.current_state().clone();
                ply += 1;
                println!("ply {ply}:\n{state}");
            }

            println!("final outcome (mover-to-move perspective): {:?}", state.outcome());
            Ok(())
        }

        Commands::Bench { rows, columns, k, leaves } => {
            let game = ConnectK::new(rows, columns, k);
            let device = Device::Cpu;
            let net = ConvNet::new(net_config(&game), device)?;
            let puct = PuctConfig::default();
            let mut mcts = MctsInstance::new(game.clone(), puct);

            let start = Instant::now();
            let mut done = 0u32;
            while done < leaves {
                let Some((leaf, leaf_state)) = mcts.select_leaf() else {
                    break;
                };
                if let Some(outcome) = leaf_state.outcome() {
                    mcts.expand_leaf(leaf, outcome, Vec::new())?;
                    continue;
                }
                let (value, raw_policy) = net
                    .predict(std::slice::from_ref(&leaf_state))?
                    .pop()
                    .expect("predict returns one row per input state");
                let legal = leaf_state.moves();
                let children: Vec<(usize, ConnectK, f32)> = legal
                    .iter()
                    .map(|&mv| (mv, leaf_state.play(mv), raw_policy[mv]))
                    .collect();
                mcts.expand_leaf(leaf, value, children)?;
                done += 1;
            }
            let elapsed = start.elapsed();
            let rate = done as f64 / elapsed.as_secs_f64().max(1e-9);
            println!("{done} leaves evaluated in {elapsed:?} ({rate:.1} leaves/sec)");
            Ok(())
        }
    }
}
