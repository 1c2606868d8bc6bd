//! Coordinator (C7): the Wait / Drain / Evaluate / Train / Stop cycle.

use crate::buffer::{Example, ReplayBuffer};
use crate::channel::{fan_in, tagged_sender, BufferedSender, FanInReceiver};
use crate::config::TrainingConfig;
use crate::error::TrainerError;
use crate::protocol::{ToCoordinator, ToWorker, TurnRecord};
use crate::worker::run_worker;
use az_core::GameState;
use az_mcts::PuctConfig;
use az_net::{ConvNet, Evaluator, NetConfig, Optimizer};
use candle_core::{Device, Tensor};
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

const WAIT_TIMEOUT: Duration = Duration::from_secs(1);
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

struct WorkerHandle<S: GameState> {
    to_worker: BufferedSender<ToWorker<S>>,
    thread: Option<JoinHandle<()>>,
    done_rx: mpsc::Receiver<()>,
    alive: bool,
}

pub struct Coordinator<S: GameState> {
    cfg: TrainingConfig,
    workers: Vec<WorkerHandle<S>>,
    active_workers: usize,
    from_workers: FanInReceiver<ToCoordinator<S>>,
    buffer: ReplayBuffer,
    net: ConvNet,
    optimizer: Optimizer,
    step: u64,
}

impl<S: GameState + 'static> Coordinator<S> {
    pub fn spawn(
        initial_state: S,
        cfg: TrainingConfig,
        puct: PuctConfig,
        net_cfg: NetConfig,
        device: Device,
    ) -> Result<Self, TrainerError> {
        let net = ConvNet::new(net_cfg, device).map_err(az_net::NetError::from)?;
        let optimizer = Optimizer::new(&net, cfg.learning_rate_at(0), cfg.weight_decay)
            .map_err(TrainerError::Evaluator)?;

        let (fan_in_tx, from_workers) = fan_in::<ToCoordinator<S>>();
        let mut workers = Vec::with_capacity(cfg.workers);

        for id in 0..cfg.workers {
            let (to_worker_tx, to_worker_rx) = mpsc::channel::<Vec<ToWorker<S>>>();
            let (done_tx, done_rx) = mpsc::channel::<()>();
            let tagged = tagged_sender(id, fan_in_tx.clone());
            let state = initial_state.clone();
            let cfg_clone = cfg.clone();
            let seed = id as u64;

            let thread = std::thread::Builder::new()
                .name(format!("az-worker-{id}"))
                .spawn(move || {
                    if let Err(err) = run_worker(id, state, cfg_clone, puct, seed, tagged, to_worker_rx) {
                        tracing::error!(worker = id, %err, "worker aborted");
                    }
                    let _ = done_tx.send(());
                })
                .expect("spawning a worker thread should not fail under normal resource limits");

            workers.push(WorkerHandle {
                to_worker: BufferedSender::new(to_worker_tx),
                thread: Some(thread),
                done_rx,
                alive: true,
            });
        }
        // fan_in_tx itself is never stored: every worker holds a clone, and
        // those clones keep the channel alive; the coordinator only needs
        // the receiving half.
        drop(fan_in_tx);

        let active_workers = cfg.workers;
        let buffer = ReplayBuffer::new(cfg.buffer_size);
        Ok(Self {
            cfg,
            workers,
            active_workers,
            from_workers,
            buffer,
            net,
            optimizer,
            step: 0,
        })
    }

    /// Loads network weights from a checkpoint written by [`Self::train`]'s
    /// periodic save.
    pub fn load_checkpoint(&mut self, path: &Path) -> Result<(), TrainerError> {
        self.net.load(path).map_err(az_net::NetError::from)?;
        Ok(())
    }

    /// Runs cycles until `total_steps` is reached, then shuts down workers.
    pub fn run(&mut self) -> Result<(), TrainerError> {
        loop {
            let mut pending_eval: Vec<(usize, S)> = Vec::new();
            self.wait_and_drain(&mut pending_eval)?;
            self.evaluate(pending_eval)?;
            self.train()?;

            if self.active_workers == 0 {
                tracing::error!("every worker hit a game-capability violation; stopping run");
                self.stop();
                return Ok(());
            }
            if self.step >= self.cfg.total_steps {
                self.stop();
                return Ok(());
            }
        }
    }

    fn wait_and_drain(&mut self, pending_eval: &mut Vec<(usize, S)>) -> Result<(), TrainerError> {
        let Some(first) = self.from_workers.recv_timeout(WAIT_TIMEOUT) else {
            return Ok(());
        };
        let mut batches = vec![first];
        while let Some(next) = self.from_workers.recv_timeout(Duration::from_millis(0)) {
            batches.push(next);
        }

        for (worker_id, messages) in batches {
            for msg in messages {
                match msg {
                    ToCoordinator::Evaluate(state) => pending_eval.push((worker_id, state)),
                    ToCoordinator::Result { score, history } => {
                        self.insert_history(score, history);
                    }
                }
            }
        }
        Ok(())
    }

    fn insert_history(&mut self, score: f32, history: Vec<TurnRecord<S>>) {
        let num_actions = self.net.config().num_actions;
        let mut label_score = score;
        for (state, policy) in history {
            let mut label = vec![0.0f32; 1 + num_actions];
            label[0] = label_score;
            for (mv, prob) in policy {
                label[1 + mv] = prob;
            }
            self.buffer.insert(Example {
                features: state.position(),
                label,
            });
            label_score = -label_score;
        }
    }

    /// A worker is only supposed to hand us leaves it could not resolve
    /// locally; one submitting an already-terminal state violates the game
    /// capability. That worker is dropped, not the whole run.
    fn reject_capability_violations(&mut self, pending_eval: Vec<(usize, S)>) -> Vec<(usize, S)> {
        let mut kept = Vec::with_capacity(pending_eval.len());
        for (worker_id, state) in pending_eval {
            if !self.workers[worker_id].alive {
                continue;
            }
            if state.outcome().is_some() {
                let err = TrainerError::GameCapability {
                    worker: worker_id,
                    source: az_core::GameError::TerminalState,
                };
                tracing::error!(worker = worker_id, %err, "dropping worker");
                self.workers[worker_id].alive = false;
                self.active_workers -= 1;
                continue;
            }
            kept.push((worker_id, state));
        }
        kept
    }

    fn evaluate(&mut self, pending_eval: Vec<(usize, S)>) -> Result<(), TrainerError> {
        let pending_eval = self.reject_capability_violations(pending_eval);
        if pending_eval.is_empty() {
            return Ok(());
        }
        let states: Vec<S> = pending_eval.iter().map(|(_, s)| s.clone()).collect();
        let predictions = self.net.predict(&states).map_err(TrainerError::Evaluator)?;

        for ((worker_id, state), (value, raw_policy)) in pending_eval.into_iter().zip(predictions) {
            let legal = state.moves();
            let mut priors: Vec<f32> = legal.iter().map(|&mv| raw_policy[mv]).collect();
            let total: f32 = priors.iter().sum();
            if total > 0.0 {
                for p in priors.iter_mut() {
                    *p /= total;
                }
            } else {
                let uniform = 1.0 / legal.len().max(1) as f32;
                priors = vec![uniform; legal.len()];
            }
            let children: Vec<(usize, S, f32)> = legal
                .iter()
                .zip(priors)
                .map(|(&mv, p)| (mv, state.play(mv), p))
                .collect();

            self.workers[worker_id]
                .to_worker
                .send(ToWorker::Evaluation { value, children });
        }
        for worker in &mut self.workers {
            worker.to_worker.flush();
        }
        Ok(())
    }

    fn train(&mut self) -> Result<(), TrainerError> {
        if self.buffer.len() < 4 * self.cfg.batch_size {
            return Ok(());
        }
        let lr = self.cfg.learning_rate_at(self.step);
        self.optimizer.set_learning_rate(lr);

        let mut rng = rand::thread_rng();
        let batch = self.buffer.sample(self.cfg.batch_size, &mut rng);
        let device = self.net.device().clone();

        let feature_len = batch[0].features.len();
        let label_len = batch[0].label.len();
        let mut features = Vec::with_capacity(batch.len() * feature_len);
        let mut values = Vec::with_capacity(batch.len());
        let mut policies = Vec::with_capacity(batch.len() * (label_len - 1));
        for ex in &batch {
            features.extend_from_slice(&ex.features);
            values.push(ex.label[0]);
            policies.extend_from_slice(&ex.label[1..]);
        }

        let cfg = self.net.config();
        let xs = Tensor::from_vec(
            features,
            (batch.len(), cfg.input_channels, cfg.rows, cfg.columns),
            &device,
        )
        .map_err(az_net::NetError::from)?;
        let value_target = Tensor::from_vec(values, (batch.len(),), &device).map_err(az_net::NetError::from)?;
        let policy_target = Tensor::from_vec(policies, (batch.len(), cfg.num_actions), &device)
            .map_err(az_net::NetError::from)?;

        let (value_pred, policy_pred) = self
            .net
            .forward_t(&xs, true)
            .map_err(az_net::NetError::from)?;
        let loss = az_net::optimizer::loss(&value_pred, &value_target, &policy_pred, &policy_target)
            .map_err(az_net::NetError::from)?;
        self.optimizer.step(&loss).map_err(TrainerError::Evaluator)?;

        self.step += 1;
        if self.step % self.cfg.checkpoint_every == 0 {
            let path = Path::new(&self.cfg.checkpoint_dir).join(format!("step-{}.safetensors", self.step));
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = self.net.save(&path) {
                tracing::warn!(error = %e, "failed to write checkpoint");
            } else {
                tracing::info!(step = self.step, path = %path.display(), "checkpoint written");
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.to_worker.send(ToWorker::Terminate);
            worker.to_worker.flush();
        }
        let per_worker_budget = SHUTDOWN_BUDGET / self.workers.len().max(1) as u32;
        for (id, worker) in self.workers.iter_mut().enumerate() {
            match worker.done_rx.recv_timeout(per_worker_budget) {
                Ok(()) => {
                    if let Some(thread) = worker.thread.take() {
                        let _ = thread.join();
                    }
                }
                Err(_) => {
                    let err = TrainerError::WorkerShutdownTimeout(id);
                    tracing::warn!(worker = id, %err, "abandoning its thread");
                }
            }
        }
    }
}
