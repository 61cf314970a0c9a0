use crate::SimError;
use crate::propensity::{Kinetics, Propensity};

/// Raw, unvalidated description of a reaction network.
///
/// Stoichiometry follows the usual matrix layout: one row per species, one
/// column per reaction. `delays` and `consuming` may be left out, in which
/// case every reaction is instantaneous.
#[derive(Clone, Debug, Default)]
pub struct NetworkDescription {
    pub species: Vec<String>,
    pub rates: Vec<f64>,
    pub initial_state: Vec<f64>,
    pub reactants: Vec<Vec<f64>>,
    pub products: Vec<Vec<f64>>,
    pub delays: Option<Vec<f64>>,
    pub consuming: Option<Vec<bool>>,
    pub propensities: Vec<Propensity>,
}

pub struct Reaction {
    reactants: Vec<f64>,
    products: Vec<f64>,
    net: Vec<f64>,
    delay: f64,
    consuming: bool,
    kinetics: Kinetics,
}

impl Reaction {
    /// Reactant column, non-positive entries.
    pub fn reactants(&self) -> &[f64] {
        &self.reactants
    }

    pub fn products(&self) -> &[f64] {
        &self.products
    }

    pub fn net(&self) -> &[f64] {
        &self.net
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn is_delayed(&self) -> bool {
        self.delay > 0.0
    }

    pub fn is_consuming(&self) -> bool {
        self.consuming
    }

    #[inline]
    pub(crate) fn propensity(&self, rates: &[f64], state: &[f64]) -> f64 {
        self.kinetics.propensity(rates, state)
    }
}

/// Validated, immutable reaction network shared read-only by every replicate.
pub struct ReactionNetwork {
    species: Vec<String>,
    rates: Vec<f64>,
    initial_state: Vec<f64>,
    reactions: Vec<Reaction>,
}

impl ReactionNetwork {
    pub fn new(description: NetworkDescription) -> Result<Self, SimError> {
        let NetworkDescription {
            species,
            rates,
            initial_state,
            reactants,
            products,
            delays,
            consuming,
            propensities,
        } = description;

        let n_species = species.len();
        let n_reactions = propensities.len();
        if n_species == 0 || n_reactions == 0 {
            return Err(SimError::InvalidModel(
                "network must contain at least one species and one reaction".into(),
            ));
        }
        if initial_state.len() != n_species {
            return Err(SimError::InvalidModel(format!(
                "initial state length {} does not match number of species {}",
                initial_state.len(),
                n_species
            )));
        }
        if let Some((idx, value)) = initial_state
            .iter()
            .enumerate()
            .find(|&(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(SimError::InvalidModel(format!(
                "initial state of species {} must be finite and non-negative, got {}",
                idx, value
            )));
        }
        if let Some(idx) = rates.iter().position(|r| !r.is_finite()) {
            return Err(SimError::InvalidModel(format!(
                "rate {} must be finite",
                idx
            )));
        }

        let reactant_columns = columns(&reactants, n_species, n_reactions, "reactants")?;
        let product_columns = columns(&products, n_species, n_reactions, "products")?;
        let delays = delays.unwrap_or_else(|| vec![0.0; n_reactions]);
        if delays.len() != n_reactions {
            return Err(SimError::InvalidModel(format!(
                "delays length {} does not match reaction count {}",
                delays.len(),
                n_reactions
            )));
        }
        let consuming = consuming.unwrap_or_else(|| vec![false; n_reactions]);
        if consuming.len() != n_reactions {
            return Err(SimError::InvalidModel(format!(
                "consuming flags length {} does not match reaction count {}",
                consuming.len(),
                n_reactions
            )));
        }

        let mut reactions = Vec::with_capacity(n_reactions);
        for (idx, (reactant_col, product_col)) in reactant_columns
            .into_iter()
            .zip(product_columns)
            .enumerate()
        {
            if reactant_col.iter().any(|&v| v > 0.0) {
                return Err(SimError::InvalidModel(format!(
                    "reaction {} has a positive reactant coefficient",
                    idx
                )));
            }
            if product_col.iter().any(|&v| v < 0.0) {
                return Err(SimError::InvalidModel(format!(
                    "reaction {} has a negative product coefficient",
                    idx
                )));
            }
            let delay = delays[idx];
            if !delay.is_finite() || delay < 0.0 {
                return Err(SimError::InvalidModel(format!(
                    "reaction {} delay must be finite and non-negative, got {}",
                    idx, delay
                )));
            }
            let kinetics = Kinetics::compile(&propensities[idx], idx, &reactant_col, rates.len())?;
            let net = reactant_col
                .iter()
                .zip(&product_col)
                .map(|(r, p)| r + p)
                .collect();
            reactions.push(Reaction {
                reactants: reactant_col,
                products: product_col,
                net,
                delay,
                consuming: consuming[idx],
                kinetics,
            });
        }

        Ok(Self {
            species,
            rates,
            initial_state,
            reactions,
        })
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn initial_state(&self) -> &[f64] {
        &self.initial_state
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn reaction(&self, idx: usize) -> &Reaction {
        &self.reactions[idx]
    }

    pub fn has_delays(&self) -> bool {
        self.reactions.iter().any(Reaction::is_delayed)
    }
}

/// Transposes a species × reactions matrix into per-reaction columns.
fn columns(
    matrix: &[Vec<f64>],
    n_species: usize,
    n_reactions: usize,
    name: &str,
) -> Result<Vec<Vec<f64>>, SimError> {
    if matrix.len() != n_species {
        return Err(SimError::InvalidModel(format!(
            "{} matrix has {} rows, expected one per species ({})",
            name,
            matrix.len(),
            n_species
        )));
    }
    let mut cols = vec![Vec::with_capacity(n_species); n_reactions];
    for (species, row) in matrix.iter().enumerate() {
        if row.len() != n_reactions {
            return Err(SimError::InvalidModel(format!(
                "{} row {} has {} columns, expected one per reaction ({})",
                name,
                species,
                row.len(),
                n_reactions
            )));
        }
        for (col, &value) in cols.iter_mut().zip(row) {
            if !value.is_finite() {
                return Err(SimError::InvalidModel(format!(
                    "{} entry for species {} is not finite",
                    name, species
                )));
            }
            col.push(value);
        }
    }
    Ok(cols)
}
