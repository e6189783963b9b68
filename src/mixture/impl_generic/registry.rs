//! Model identifier to constructor mapping.

use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::families::{Categorical, DiagonalGaussian, GammaModel, PoissonModel};
use crate::mixture::traits::density::{DensityModel, ModelId};
use std::collections::HashMap;
use std::fmt;

/// Constructor of a density model for a given number of clusters.
pub type ModelConstructor =
    Box<dyn Fn(usize) -> MixtureResult<Box<dyn DensityModel>> + Send + Sync>;

/// Registry of density model constructors.
///
/// [`ModelRegistry::with_defaults`] holds every family shipped with the
/// crate; hosts can register their own constructors under an existing id
/// to substitute an implementation.
pub struct ModelRegistry {
    constructors: HashMap<ModelId, ModelConstructor>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.constructors.keys().collect();
        ids.sort();
        f.debug_struct("ModelRegistry").field("models", &ids).finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ModelRegistry {
    /// Registry without any constructor.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with every built-in family.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for id in [
            ModelId::GaussianSjk,
            ModelId::GaussianSk,
            ModelId::GaussianSj,
            ModelId::GaussianS,
        ] {
            registry.register(id, move |k| {
                Ok(Box::new(DiagonalGaussian::new(id, k)?) as Box<dyn DensityModel>)
            });
        }
        for id in [ModelId::GammaAjkBjk, ModelId::GammaAkBk] {
            registry.register(id, move |k| {
                Ok(Box::new(GammaModel::new(id, k)?) as Box<dyn DensityModel>)
            });
        }
        for id in [ModelId::PoissonLjk, ModelId::PoissonLk] {
            registry.register(id, move |k| {
                Ok(Box::new(PoissonModel::new(id, k)?) as Box<dyn DensityModel>)
            });
        }
        registry.register(ModelId::CategoricalPjk, |k| {
            Ok(Box::new(Categorical::new(k)) as Box<dyn DensityModel>)
        });
        registry
    }

    /// Register (or replace) the constructor for `id`.
    pub fn register<F>(&mut self, id: ModelId, constructor: F)
    where
        F: Fn(usize) -> MixtureResult<Box<dyn DensityModel>> + Send + Sync + 'static,
    {
        self.constructors.insert(id, Box::new(constructor));
    }

    /// Whether `id` has a constructor.
    pub fn contains(&self, id: ModelId) -> bool {
        self.constructors.contains_key(&id)
    }

    /// New model for `id` sized for `n_cluster` clusters.
    pub fn create(&self, id: ModelId, n_cluster: usize) -> MixtureResult<Box<dyn DensityModel>> {
        let constructor = self
            .constructors
            .get(&id)
            .ok_or_else(|| MixtureError::UnknownModel {
                name: id.name().to_string(),
            })?;
        constructor(n_cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_model() {
        let registry = ModelRegistry::with_defaults();
        for id in ModelId::ALL {
            let model = registry.create(id, 3).unwrap();
            assert_eq!(model.id(), id);
            assert_eq!(model.n_cluster(), 3);
        }
    }

    #[test]
    fn test_unknown_and_replaced_models() {
        let mut registry = ModelRegistry::empty();
        assert!(matches!(
            registry.create(ModelId::PoissonLk, 2),
            Err(MixtureError::UnknownModel { .. })
        ));

        registry.register(ModelId::PoissonLk, |k| {
            Ok(Box::new(PoissonModel::new(ModelId::PoissonLjk, k)?) as Box<dyn DensityModel>)
        });
        assert!(registry.contains(ModelId::PoissonLk));
        assert_eq!(
            registry.create(ModelId::PoissonLk, 2).unwrap().id(),
            ModelId::PoissonLjk
        );
    }
}
