use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SimError;
use crate::engine::{EngineKind, ReplicateState, UniformSource};
use crate::network::ReactionNetwork;

const DEFAULT_BASE_SEED: u64 = 0xDEADBEEFCAFEBABE;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of integer checkpoints, `0..horizon`.
    pub horizon: usize,
    pub replicates: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(horizon: usize, replicates: usize) -> Self {
        Self {
            horizon,
            replicates,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Termination {
    /// Simulated time passed the last checkpoint.
    Horizon,
    /// No reaction could fire and nothing was pending.
    Absorbed { time: f64 },
}

/// Output of a single replicate: a `[time][species]` buffer.
#[derive(Clone, Debug)]
pub struct ReplicateRun {
    pub states: Vec<f64>,
    pub steps: u64,
    pub termination: Termination,
}

/// Checkpoint samples laid out as `[time][species][replicate]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    data: Vec<f64>,
    n_times: usize,
    n_species: usize,
    n_replicates: usize,
}

impl Trajectory {
    fn new(n_times: usize, n_species: usize, n_replicates: usize) -> Self {
        Self {
            data: vec![0.0; n_times * n_species * n_replicates],
            n_times,
            n_species,
            n_replicates,
        }
    }

    #[inline]
    fn offset(&self, time: usize, species: usize, replicate: usize) -> usize {
        (time * self.n_species + species) * self.n_replicates + replicate
    }

    /// Copies a finished replicate into its column.
    fn write_replicate(&mut self, replicate: usize, states: &[f64]) {
        debug_assert_eq!(states.len(), self.n_times * self.n_species);
        for (row_idx, row) in states.chunks_exact(self.n_species).enumerate() {
            for (species, &value) in row.iter().enumerate() {
                let idx = self.offset(row_idx, species, replicate);
                self.data[idx] = value;
            }
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_times, self.n_species, self.n_replicates)
    }

    pub fn get(&self, time: usize, species: usize, replicate: usize) -> f64 {
        self.data[self.offset(time, species, replicate)]
    }

    pub fn state_at(&self, time: usize, replicate: usize) -> Vec<f64> {
        (0..self.n_species)
            .map(|species| self.get(time, species, replicate))
            .collect()
    }

    pub fn series(&self, species: usize, replicate: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.n_times).map(move |time| self.get(time, species, replicate))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

#[derive(Clone, Debug)]
pub struct Ensemble {
    pub times: Vec<u64>,
    pub trajectory: Trajectory,
    pub steps: Vec<u64>,
    pub terminations: Vec<Termination>,
}

impl Ensemble {
    /// Step count of the last replicate processed.
    pub fn last_steps(&self) -> u64 {
        self.steps.last().copied().unwrap_or(0)
    }

    /// `(times, trajectory, last replicate's steps)`.
    pub fn into_parts(self) -> (Vec<u64>, Trajectory, u64) {
        let steps = self.last_steps();
        (self.times, self.trajectory, steps)
    }
}

struct StateRecorder<'a> {
    buffer: &'a mut [f64],
    write_idx: usize,
    n_species: usize,
}

impl<'a> StateRecorder<'a> {
    fn new(buffer: &'a mut [f64], n_species: usize) -> Self {
        Self {
            buffer,
            write_idx: 0,
            n_species,
        }
    }

    fn record(&mut self, state: &[f64]) {
        let end = self.write_idx + self.n_species;
        debug_assert!(end <= self.buffer.len());
        self.buffer[self.write_idx..end].copy_from_slice(state);
        self.write_idx = end;
    }

    fn rows(&self) -> usize {
        self.write_idx / self.n_species
    }

    fn fill(&mut self, state: &[f64]) {
        while self.write_idx < self.buffer.len() {
            self.record(state);
        }
    }
}

/// Runs replicates of one network under one engine.
pub struct Simulator {
    network: Arc<ReactionNetwork>,
    engine: EngineKind,
    cancel: Option<Arc<AtomicBool>>,
}

impl Simulator {
    pub fn new(network: impl Into<Arc<ReactionNetwork>>, engine: EngineKind) -> Self {
        let network = network.into();
        if engine == EngineKind::DirectMethod && network.has_delays() {
            warn!("direct method ignores reaction delays; every reaction fires instantly");
        }
        Self {
            network,
            engine,
            cancel: None,
        }
    }

    /// Installs a flag checked before every iteration; once set, the
    /// running replicate stops with [`SimError::Cancelled`].
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn network(&self) -> &ReactionNetwork {
        &self.network
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    /// Generator used by [`Self::run`] for replicate `replicate`.
    pub fn replicate_rng(seed: Option<u64>, replicate: usize) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(derive_seed(seed, replicate as u64))
    }

    /// Runs every replicate on its own seeded stream.
    pub fn run(&self, config: &RunConfig) -> Result<Ensemble, SimError> {
        validate_run(config.horizon, config.replicates)?;
        debug!(
            horizon = config.horizon,
            replicates = config.replicates,
            seed = ?config.seed,
            engine = ?self.engine,
            "starting run"
        );
        self.collect(config.horizon, config.replicates, |replicate| {
            let mut rng = Self::replicate_rng(config.seed, replicate);
            self.simulate_replicate(config.horizon, replicate, &mut rng)
        })
    }

    /// Runs every replicate in order on one caller-supplied stream.
    pub fn run_with_source<U: UniformSource + ?Sized>(
        &self,
        horizon: usize,
        replicates: usize,
        rng: &mut U,
    ) -> Result<Ensemble, SimError> {
        validate_run(horizon, replicates)?;
        self.collect(horizon, replicates, |replicate| {
            self.simulate_replicate(horizon, replicate, rng)
        })
    }

    fn collect<F>(&self, horizon: usize, replicates: usize, mut run_one: F) -> Result<Ensemble, SimError>
    where
        F: FnMut(usize) -> Result<ReplicateRun, SimError>,
    {
        let mut trajectory = Trajectory::new(horizon, self.network.n_species(), replicates);
        let mut steps = Vec::with_capacity(replicates);
        let mut terminations = Vec::with_capacity(replicates);
        for replicate in 0..replicates {
            let run = run_one(replicate)?;
            trajectory.write_replicate(replicate, &run.states);
            steps.push(run.steps);
            terminations.push(run.termination);
        }
        Ok(Ensemble {
            times: (0..horizon as u64).collect(),
            trajectory,
            steps,
            terminations,
        })
    }

    /// Simulates one replicate from the initial condition up to checkpoint
    /// `horizon - 1`.
    ///
    /// Replicates share nothing mutable, so callers may run them on separate
    /// threads with independent generators.
    pub fn simulate_replicate<U: UniformSource + ?Sized>(
        &self,
        horizon: usize,
        replicate: usize,
        rng: &mut U,
    ) -> Result<ReplicateRun, SimError> {
        validate_run(horizon, 1)?;
        let network = &*self.network;
        let mut states = vec![0.0; horizon * network.n_species()];
        let mut current = ReplicateState::new(network);
        let last_checkpoint = (horizon - 1) as f64;

        let termination = {
            let mut recorder = StateRecorder::new(&mut states, network.n_species());
            recorder.record(&current.state);
            let termination = loop {
                if self.is_cancelled() {
                    return Err(SimError::Cancelled {
                        replicate,
                        time: current.time,
                    });
                }
                let event = current.next_event(self.engine, network, rng)?;
                let Some(time) = event.time() else {
                    break Termination::Absorbed { time: current.time };
                };
                while recorder.rows() < horizon && (recorder.rows() as f64) < time {
                    recorder.record(&current.state);
                }
                if time > last_checkpoint {
                    break Termination::Horizon;
                }
                current.apply(event, network);
            };
            recorder.fill(&current.state);
            termination
        };

        debug!(
            replicate,
            steps = current.steps,
            pending = current.schedule.len(),
            ?termination,
            "replicate finished"
        );
        Ok(ReplicateRun {
            states,
            steps: current.steps,
            termination,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

fn validate_run(horizon: usize, replicates: usize) -> Result<(), SimError> {
    if horizon == 0 {
        return Err(SimError::InvalidArgument(
            "horizon must contain at least one checkpoint".into(),
        ));
    }
    if replicates == 0 {
        return Err(SimError::InvalidArgument(
            "number of replicates must be greater than zero".into(),
        ));
    }
    Ok(())
}

pub(crate) fn derive_seed(seed: Option<u64>, replicate: u64) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;
    let base = seed.unwrap_or(DEFAULT_BASE_SEED);
    let mut z = base ^ (replicate.wrapping_mul(GOLDEN_GAMMA));
    // SplitMix64
    z = z.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
