use rand::Rng;
use rand::distributions::Open01;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::SimError;
use crate::network::ReactionNetwork;
use crate::schedule::DelaySchedule;

/// Source of uniform variates in the open interval `(0, 1)`.
///
/// Every [`rand::Rng`] is a source; tests may supply scripted values.
pub trait UniformSource {
    fn next_uniform(&mut self) -> f64;
}

impl<R: Rng + ?Sized> UniformSource for R {
    fn next_uniform(&mut self) -> f64 {
        self.sample(Open01)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Gillespie's direct method. Delays are ignored.
    DirectMethod,
    /// Delay SSA, reaction rejection method.
    #[default]
    DelayRejection,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Event {
    /// Instantaneous firing of the net stoichiometry.
    Fire { reaction: usize, time: f64 },
    /// Start of a delayed reaction that completes at `completes`.
    Initiate {
        reaction: usize,
        time: f64,
        completes: f64,
    },
    /// A scheduled delayed reaction pre-empting the drawn candidate.
    Complete { reaction: usize, time: f64 },
    Absorbed,
}

impl Event {
    pub(crate) fn time(&self) -> Option<f64> {
        match *self {
            Self::Fire { time, .. } | Self::Initiate { time, .. } | Self::Complete { time, .. } => {
                Some(time)
            }
            Self::Absorbed => None,
        }
    }
}

/// Mutable state of one replicate. Never shared between replicates.
pub(crate) struct ReplicateState {
    pub(crate) state: Vec<f64>,
    pub(crate) time: f64,
    pub(crate) steps: u64,
    pub(crate) schedule: DelaySchedule,
    propensities: Vec<f64>,
}

impl ReplicateState {
    pub(crate) fn new(network: &ReactionNetwork) -> Self {
        Self {
            state: network.initial_state().to_vec(),
            time: 0.0,
            steps: 0,
            schedule: DelaySchedule::new(),
            propensities: vec![0.0; network.n_reactions()],
        }
    }

    /// Recomputes every propensity and returns their sum.
    fn evaluate(&mut self, network: &ReactionNetwork) -> Result<f64, SimError> {
        let rates = network.rates();
        let mut total = 0.0;
        for (idx, (slot, reaction)) in self
            .propensities
            .iter_mut()
            .zip(network.reactions())
            .enumerate()
        {
            let value = reaction.propensity(rates, &self.state);
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::NumericDegeneracy {
                    reaction: idx,
                    value,
                    time: self.time,
                });
            }
            *slot = value;
            total += value;
        }
        if !total.is_finite() {
            return Err(SimError::NumericDegeneracy {
                reaction: self.propensities.len() - 1,
                value: total,
                time: self.time,
            });
        }
        Ok(total)
    }

    /// Draws the next event without touching the species state.
    ///
    /// A scheduled completion selected by the rejection rule is removed from
    /// the schedule here; everything else happens in [`Self::apply`].
    pub(crate) fn next_event<U: UniformSource + ?Sized>(
        &mut self,
        engine: EngineKind,
        network: &ReactionNetwork,
        rng: &mut U,
    ) -> Result<Event, SimError> {
        let a0 = self.evaluate(network)?;
        match engine {
            EngineKind::DirectMethod => {
                if a0 == 0.0 {
                    return Ok(Event::Absorbed);
                }
                let tau = -rng.next_uniform().ln() / a0;
                let reaction = select_reaction(&self.propensities, a0 * rng.next_uniform());
                Ok(Event::Fire {
                    reaction,
                    time: self.time + tau,
                })
            }
            EngineKind::DelayRejection => {
                if a0 == 0.0 && self.schedule.is_empty() {
                    return Ok(Event::Absorbed);
                }
                // With nothing left to fire, only the pending completions remain.
                let (tau, candidate) = if a0 > 0.0 {
                    let tau = -rng.next_uniform().ln() / a0;
                    let reaction = select_reaction(&self.propensities, a0 * rng.next_uniform());
                    (tau, Some(reaction))
                } else {
                    (f64::INFINITY, None)
                };
                let candidate_time = self.time + tau;
                match (self.schedule.pop_due(candidate_time), candidate) {
                    (Some(due), _) => {
                        trace!(
                            reaction = due.reaction,
                            time = due.time,
                            rejected = ?candidate,
                            "delayed completion pre-empts candidate"
                        );
                        Ok(Event::Complete {
                            reaction: due.reaction,
                            time: due.time,
                        })
                    }
                    (None, Some(reaction)) => {
                        let delay = network.reaction(reaction).delay();
                        if delay > 0.0 {
                            Ok(Event::Initiate {
                                reaction,
                                time: candidate_time,
                                completes: candidate_time + delay,
                            })
                        } else {
                            Ok(Event::Fire {
                                reaction,
                                time: candidate_time,
                            })
                        }
                    }
                    (None, None) => Ok(Event::Absorbed),
                }
            }
        }
    }

    /// Applies `event` to the state, advances time and counts one step.
    pub(crate) fn apply(&mut self, event: Event, network: &ReactionNetwork) {
        match event {
            Event::Fire { reaction, time } => {
                add_column(&mut self.state, network.reaction(reaction).net());
                self.time = time;
            }
            Event::Initiate {
                reaction,
                time,
                completes,
            } => {
                let rx = network.reaction(reaction);
                if rx.is_consuming() {
                    add_column(&mut self.state, rx.reactants());
                }
                self.schedule.insert(completes, reaction);
                trace!(reaction, time, completes, "delayed reaction initiated");
                self.time = time;
            }
            Event::Complete { reaction, time } => {
                let rx = network.reaction(reaction);
                if rx.is_consuming() {
                    add_column(&mut self.state, rx.products());
                } else {
                    add_column(&mut self.state, rx.net());
                }
                self.time = time;
            }
            Event::Absorbed => return,
        }
        self.steps += 1;
    }
}

#[inline]
fn add_column(state: &mut [f64], column: &[f64]) {
    for (x, delta) in state.iter_mut().zip(column) {
        *x += delta;
    }
}

/// Smallest index whose cumulative propensity reaches `target`.
pub(crate) fn select_reaction(propensities: &[f64], target: f64) -> usize {
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (idx, &value) in propensities.iter().enumerate() {
        cumulative += value;
        if value > 0.0 {
            if cumulative >= target {
                return idx;
            }
            last_positive = idx;
        }
    }
    last_positive
}
