use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use meval::{Context, ContextProvider, Expr};

use crate::SimError;

/// Signature of a caller-supplied propensity: `(rates, state) -> rate`.
pub type RateFn = dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync;

/// How a reaction's propensity is computed from the rate parameters and the
/// current state. Every variant must be a pure function of its inputs.
#[derive(Clone)]
pub enum Propensity {
    /// Arbitrary closure over `(rates, state)`.
    Custom(Arc<RateFn>),
    /// `rates[rate]` times the falling factorial of every reactant count.
    MassAction { rate: usize },
    /// Hill kinetics in `state[species]`; `vmax`, `k_half` and `hill_n` index
    /// into the rate vector.
    Hill {
        vmax: usize,
        species: usize,
        k_half: usize,
        hill_n: usize,
        repressive: bool,
    },
    /// Arithmetic expression over `s<i>` (species) and `r<i>` (rates).
    Expression(String),
}

impl Propensity {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn expression(expr: impl Into<String>) -> Self {
        Self::Expression(expr.into())
    }
}

impl fmt::Debug for Propensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::MassAction { rate } => f.debug_struct("MassAction").field("rate", rate).finish(),
            Self::Hill {
                vmax,
                species,
                k_half,
                hill_n,
                repressive,
            } => f
                .debug_struct("Hill")
                .field("vmax", vmax)
                .field("species", species)
                .field("k_half", k_half)
                .field("hill_n", hill_n)
                .field("repressive", repressive)
                .finish(),
            Self::Expression(expr) => f.debug_tuple("Expression").field(expr).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Reactant {
    species: usize,
    count: u32,
}

/// Validated form of a [`Propensity`], bound to one reaction.
#[derive(Clone)]
pub(crate) enum Kinetics {
    Custom(Arc<RateFn>),
    MassAction {
        rate: usize,
        reactants: Vec<Reactant>,
    },
    Hill {
        vmax: usize,
        species: usize,
        k_half: usize,
        hill_n: usize,
        repressive: bool,
    },
    Expression(Expr),
}

impl Kinetics {
    pub(crate) fn compile(
        propensity: &Propensity,
        reaction_idx: usize,
        reactant_column: &[f64],
        n_rates: usize,
    ) -> Result<Self, SimError> {
        let n_species = reactant_column.len();
        let check_rate = |idx: usize, what: &str| {
            if idx >= n_rates {
                Err(SimError::InvalidModel(format!(
                    "reaction {} {} index {} exceeds number of rates {}",
                    reaction_idx, what, idx, n_rates
                )))
            } else {
                Ok(())
            }
        };
        match propensity {
            Propensity::Custom(f) => Ok(Self::Custom(Arc::clone(f))),
            Propensity::MassAction { rate } => {
                check_rate(*rate, "rate")?;
                let mut reactants = Vec::new();
                for (species, &coeff) in reactant_column.iter().enumerate() {
                    if coeff == 0.0 {
                        continue;
                    }
                    let count = -coeff;
                    if count.fract() != 0.0 {
                        return Err(SimError::InvalidModel(format!(
                            "reaction {} uses mass-action kinetics but consumes a non-integral {} of species {}",
                            reaction_idx, count, species
                        )));
                    }
                    reactants.push(Reactant {
                        species,
                        count: count as u32,
                    });
                }
                Ok(Self::MassAction {
                    rate: *rate,
                    reactants,
                })
            }
            Propensity::Hill {
                vmax,
                species,
                k_half,
                hill_n,
                repressive,
            } => {
                check_rate(*vmax, "vmax")?;
                check_rate(*k_half, "k_half")?;
                check_rate(*hill_n, "hill_n")?;
                if *species >= n_species {
                    return Err(SimError::InvalidModel(format!(
                        "reaction {} Hill species index {} exceeds number of species {}",
                        reaction_idx, species, n_species
                    )));
                }
                Ok(Self::Hill {
                    vmax: *vmax,
                    species: *species,
                    k_half: *k_half,
                    hill_n: *hill_n,
                    repressive: *repressive,
                })
            }
            Propensity::Expression(source) => {
                let expr = Expr::from_str(source).map_err(|err| {
                    SimError::InvalidModel(format!(
                        "reaction {} expression parse error: {}",
                        reaction_idx, err
                    ))
                })?;
                collect_refs(source, b's', n_species, reaction_idx, "species")?;
                collect_refs(source, b'r', n_rates, reaction_idx, "rate")?;
                // Every identifier must resolve now, not at the first step.
                let (rates, state) = (vec![0.0; n_rates], vec![0.0; n_species]);
                let ctx = (
                    ExpressionContext {
                        rates: &rates,
                        state: &state,
                    },
                    Context::new(),
                );
                expr.eval_with_context(ctx).map_err(|err| {
                    SimError::InvalidModel(format!(
                        "reaction {} expression does not resolve: {}",
                        reaction_idx, err
                    ))
                })?;
                Ok(Self::Expression(expr))
            }
        }
    }

    #[inline]
    pub(crate) fn propensity(&self, rates: &[f64], state: &[f64]) -> f64 {
        match self {
            Self::Custom(f) => f(rates, state),
            Self::MassAction { rate, reactants } => {
                let mut propensity = rates[*rate];
                for reactant in reactants {
                    let available = state[reactant.species];
                    if available < reactant.count as f64 {
                        return 0.0;
                    }
                    propensity *= falling_factorial(available, reactant.count);
                }
                propensity
            }
            Self::Hill {
                vmax,
                species,
                k_half,
                hill_n,
                repressive,
            } => {
                let x = state[*species].max(0.0);
                let (vmax, k, n) = (rates[*vmax], rates[*k_half], rates[*hill_n]);
                if *repressive {
                    vmax * (1.0 / (1.0 + (x / k).powf(n)))
                } else {
                    let power = x.powf(n);
                    let denom = k.powf(n) + power;
                    if denom == 0.0 { 0.0 } else { vmax * power / denom }
                }
            }
            // A failed evaluation surfaces as NaN and is rejected by the engine.
            Self::Expression(expr) => {
                let ctx = (ExpressionContext { rates, state }, Context::new());
                expr.eval_with_context(ctx).unwrap_or(f64::NAN)
            }
        }
    }
}

struct ExpressionContext<'a> {
    rates: &'a [f64],
    state: &'a [f64],
}

impl ContextProvider for ExpressionContext<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        let (prefix, digits) = name.split_at_checked(1)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let idx = digits.parse::<usize>().ok()?;
        match prefix {
            "s" | "S" => self.state.get(idx).map(|v| v.max(0.0)),
            "r" | "R" => self.rates.get(idx).copied(),
            _ => None,
        }
    }
}

/// Indices referenced as `<prefix><digits>` in an expression, deduplicated
/// in order of first appearance.
pub(crate) fn collect_refs(
    expr_str: &str,
    prefix: u8,
    limit: usize,
    reaction_idx: usize,
    what: &str,
) -> Result<Vec<usize>, SimError> {
    let mut refs = Vec::new();
    let bytes = expr_str.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        let ch = bytes[idx];
        let at_boundary =
            idx == 0 || !(bytes[idx - 1].is_ascii_alphanumeric() || bytes[idx - 1] == b'_');
        if at_boundary && ch.eq_ignore_ascii_case(&prefix) {
            let mut end = idx + 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            let terminated = end == bytes.len()
                || !(bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_');
            if end > idx + 1 && terminated {
                let digits = &expr_str[idx + 1..end];
                let ref_idx = digits.parse::<usize>().map_err(|_| {
                    SimError::InvalidModel(format!(
                        "reaction {} expression contains invalid {} index '{}'",
                        reaction_idx, what, digits
                    ))
                })?;
                if ref_idx >= limit {
                    return Err(SimError::InvalidModel(format!(
                        "reaction {} expression {} index {} exceeds number of {}s {}",
                        reaction_idx, what, ref_idx, what, limit
                    )));
                }
                if !refs.contains(&ref_idx) {
                    refs.push(ref_idx);
                }
                idx = end;
                continue;
            }
        }
        idx += 1;
    }
    Ok(refs)
}

#[inline]
pub(crate) fn falling_factorial(value: f64, count: u32) -> f64 {
    match count {
        0 => 1.0,
        1 => value,
        _ if value < count as f64 => 0.0,
        _ => {
            let mut acc = 1.0;
            for i in 0..count {
                acc *= value - i as f64;
            }
            acc
        }
    }
}
