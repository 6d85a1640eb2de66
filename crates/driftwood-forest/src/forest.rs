//! Adaptive random forest: online bagging over drift-aware Hoeffding trees.

use driftwood_tree::{HoeffdingTreeClassifier, HoeffdingTreeRegressor};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};
use tracing::{info, instrument, trace};

use crate::config::ForestConfig;
use crate::error::ForestError;
use crate::member::{ForestMember, MemberModel};

/// An adaptive random forest over members of type `M`.
///
/// Members are created on the first example, once the feature count is
/// known. Each example is learned by every member with a `Poisson(λ)`
/// weight; members replace themselves when their drift detector fires.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct AdaptiveRandomForest<M: MemberModel> {
    pub(crate) config: ForestConfig,
    pub(crate) members: Vec<ForestMember<M>>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) n_samples_seen: u64,
    pub(crate) n_features: Option<usize>,
    pub(crate) max_features: Option<usize>,
}

/// Adaptive random forest classifier.
pub type AdaptiveRandomForestClassifier = AdaptiveRandomForest<HoeffdingTreeClassifier>;

/// Adaptive random forest regressor.
pub type AdaptiveRandomForestRegressor = AdaptiveRandomForest<HoeffdingTreeRegressor>;

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

impl<M: MemberModel> AdaptiveRandomForest<M> {
    /// Build an empty forest.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::InvalidLambda`] | `lambda` not positive and finite |
    /// | [`ForestError::InvalidMaxFeatures`] | fractional `max_features` not finite |
    /// | [`ForestError::Drift`] | a detector prototype is misconfigured |
    /// | [`ForestError::Tree`] | the member tree settings are invalid |
    #[instrument(skip_all, fields(n_models = config.n_models))]
    pub fn new(config: ForestConfig) -> Result<Self, ForestError> {
        config.validate()?;
        M::build(&config, 1, 0)?;
        let rng = seeded_rng(config.seed);
        Ok(Self {
            config,
            members: Vec::new(),
            rng,
            n_samples_seen: 0,
            n_features: None,
            max_features: None,
        })
    }

    /// Learn one example.
    ///
    /// Every member first scores the example with its current model, then
    /// learns it with weight `k ~ Poisson(λ)` when `k > 0`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ZeroFeatures`] | `x` is empty |
    /// | [`ForestError::FeatureCountMismatch`] | width differs from the first example |
    /// | [`ForestError::NonFiniteValue`] | a present value is NaN or infinite |
    /// | [`ForestError::NonFiniteTarget`] | regression target is NaN or infinite |
    pub fn learn(&mut self, x: &[Option<f64>], y: M::Target) -> Result<(), ForestError> {
        self.check_features(x)?;
        M::check_target(y)?;

        self.n_samples_seen += 1;
        if self.members.is_empty() {
            self.init_ensemble(x.len())?;
        }

        let poisson = Poisson::new(self.config.lambda).map_err(|_| ForestError::InvalidLambda {
            lambda: self.config.lambda,
        })?;
        let weights: Vec<f64> = (0..self.members.len())
            .map(|_| poisson.sample(&mut self.rng))
            .collect();

        let n = self.n_samples_seen;
        if self.config.parallel {
            self.members
                .par_iter_mut()
                .zip(weights)
                .for_each(|(member, k)| member.step(x, y, k, n));
        } else {
            for (member, k) in self.members.iter_mut().zip(weights) {
                member.step(x, y, k, n);
            }
        }
        trace!(n_samples_seen = n, "example learned");
        Ok(())
    }

    #[instrument(skip(self), fields(n_models = self.config.n_models))]
    fn init_ensemble(&mut self, n_features: usize) -> Result<(), ForestError> {
        let max_features = self.config.max_features.resolve(n_features);
        let seeds: Vec<u64> = (0..self.config.n_models)
            .map(|_| self.rng.r#gen())
            .collect();

        let members = seeds
            .into_iter()
            .enumerate()
            .map(|(index, seed)| {
                Ok(ForestMember::new(
                    index,
                    M::build(&self.config, max_features, seed)?,
                    M::metric(&self.config),
                    self.config.drift_detector.clone(),
                    self.config.warning_detector.clone(),
                    self.n_samples_seen,
                ))
            })
            .collect::<Result<Vec<_>, ForestError>>()?;

        self.members = members;
        self.n_features = Some(n_features);
        self.max_features = Some(max_features);
        info!(n_features, max_features, "ensemble initialised");
        Ok(())
    }

    /// Validate the shape and values of an example.
    pub(crate) fn check_features(&self, x: &[Option<f64>]) -> Result<(), ForestError> {
        if x.is_empty() {
            return Err(ForestError::ZeroFeatures);
        }
        if let Some(expected) = self.n_features
            && x.len() != expected
        {
            return Err(ForestError::FeatureCountMismatch {
                expected,
                got: x.len(),
            });
        }
        if let Some(feature_index) = x.iter().position(|v| v.is_some_and(|v| !v.is_finite())) {
            return Err(ForestError::NonFiniteValue { feature_index });
        }
        Ok(())
    }

    /// Drop every member and counter and reseed from the configured seed.
    ///
    /// An unseeded forest draws a new entropy seed.
    pub fn reset(&mut self) {
        self.members.clear();
        self.n_samples_seen = 0;
        self.n_features = None;
        self.max_features = None;
        self.rng = seeded_rng(self.config.seed);
    }

    // --- Getters ---

    /// Return the forest configuration.
    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Return the members; empty before the first example.
    #[must_use]
    pub fn members(&self) -> &[ForestMember<M>] {
        &self.members
    }

    /// Return the number of examples learned.
    #[must_use]
    pub fn n_samples_seen(&self) -> u64 {
        self.n_samples_seen
    }

    /// Return the feature count fixed by the first example.
    #[must_use]
    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    /// Return the resolved per-leaf feature count, `None` before the first example.
    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    /// Return the drifts detected across all members.
    #[must_use]
    pub fn n_drifts_detected(&self) -> u64 {
        self.members.iter().map(ForestMember::n_drifts_detected).sum()
    }

    /// Return the warnings detected across all members.
    #[must_use]
    pub fn n_warnings_detected(&self) -> u64 {
        self.members.iter().map(ForestMember::n_warnings_detected).sum()
    }
}
