//! Running-mean accumulators for stochastic parameter averaging.
//!
//! SEM produces one noisy parameter estimate per iteration. The accumulator
//! folds each estimate into a per-leaf running mean; its shape is always the
//! owning model's [`ParameterLayout`], so no family needs its own
//! accumulator type.

use crate::mixture::error::MixtureResult;
use crate::mixture::traits::density::{ParameterLayout, ParameterSet};
use std::marker::PhantomData;

/// Numeric leaf type a running mean can average.
pub trait Leaf: Copy + Send + Sync + 'static {
    /// Widen to f64.
    fn to_f64(self) -> f64;
    /// Narrow from f64.
    fn from_f64(v: f64) -> Self;
}

impl Leaf for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl Leaf for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

/// Incremental mean of one leaf value.
///
/// Uses the Welford update `m += (x - m) / n`, which stays accurate over
/// long runs where summing then dividing would lose precision.
#[derive(Debug, Clone, Copy)]
pub struct RunningMean<T: Leaf = f64> {
    count: usize,
    mean: f64,
    _leaf: PhantomData<T>,
}

impl<T: Leaf> Default for RunningMean<T> {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            _leaf: PhantomData,
        }
    }
}

impl<T: Leaf> RunningMean<T> {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation.
    pub fn update(&mut self, value: T) {
        self.count += 1;
        self.mean += (value.to_f64() - self.mean) / self.count as f64;
    }

    /// Current mean, `None` before the first update.
    pub fn mean(&self) -> Option<T> {
        (self.count > 0).then(|| T::from_f64(self.mean))
    }

    /// Number of folded observations.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Reset to empty.
    pub fn release(&mut self) {
        *self = Self::default();
    }
}

/// One running mean per leaf of a parameter layout.
#[derive(Debug, Clone)]
pub struct ParameterAccumulator<T: Leaf = f64> {
    layout: ParameterLayout,
    cells: Vec<RunningMean<T>>,
}

impl<T: Leaf> ParameterAccumulator<T> {
    /// Empty accumulator mirroring `layout`.
    pub fn new(layout: ParameterLayout) -> Self {
        let cells = vec![RunningMean::new(); layout.len()];
        Self { layout, cells }
    }

    /// Shape being mirrored.
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Number of parameter sets folded since the last release.
    pub fn count(&self) -> usize {
        self.cells.first().map_or(0, RunningMean::count)
    }

    /// Whether nothing has been folded since the last release.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Re-shape to a new layout. Accumulated values are dropped.
    pub fn resize(&mut self, layout: ParameterLayout) {
        *self = Self::new(layout);
    }

    /// Fold one parameter snapshot into every leaf.
    pub fn update(&mut self, params: &ParameterSet) -> MixtureResult<()> {
        params.check_layout(&self.layout, "parameter accumulator")?;
        let leaves = params.arrays().iter().flat_map(|a| a.values.iter());
        for (cell, &v) in self.cells.iter_mut().zip(leaves) {
            cell.update(T::from_f64(v));
        }
        Ok(())
    }

    /// Snapshot of the running means, `None` before the first update.
    pub fn mean(&self) -> Option<ParameterSet> {
        if self.is_empty() {
            return None;
        }
        let flat: Vec<f64> = self
            .cells
            .iter()
            .map(|c| c.mean().map_or(f64::NAN, Leaf::to_f64))
            .collect();
        ParameterSet::from_flat(&self.layout, &flat).ok()
    }

    /// Reset every leaf to empty.
    pub fn release(&mut self) {
        self.cells.iter_mut().for_each(RunningMean::release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::traits::density::ParameterArray;

    fn set(mean: [f64; 2], sigma2: f64) -> ParameterSet {
        ParameterSet::new(vec![
            ParameterArray::new("mean", 1, 2, mean.to_vec()).unwrap(),
            ParameterArray::new("sigma2", 1, 1, vec![sigma2]).unwrap(),
        ])
    }

    #[test]
    fn test_running_mean_stable() {
        let mut m = RunningMean::<f64>::new();
        assert!(m.mean().is_none());
        for i in 0..1000 {
            m.update(1e9 + (i % 2) as f64);
        }
        assert_eq!(m.count(), 1000);
        assert!((m.mean().unwrap() - (1e9 + 0.5)).abs() < 1e-6);

        m.release();
        assert!(m.mean().is_none());
    }

    #[test]
    fn test_running_mean_f32_leaf() {
        let mut m = RunningMean::<f32>::new();
        m.update(1.0);
        m.update(2.0);
        assert!((m.mean().unwrap() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_accumulator_mirrors_layout() {
        let mut acc = ParameterAccumulator::<f64>::new(set([0.0, 0.0], 1.0).layout());
        assert!(acc.mean().is_none());

        acc.update(&set([1.0, 2.0], 1.0)).unwrap();
        acc.update(&set([3.0, 4.0], 3.0)).unwrap();
        let mean = acc.mean().unwrap();
        assert_eq!(mean.layout(), *acc.layout());
        assert_eq!(mean.require("mean").unwrap().values, vec![2.0, 3.0]);
        assert_eq!(mean.require("sigma2").unwrap().values, vec![2.0]);
        assert_eq!(acc.count(), 2);

        acc.release();
        assert!(acc.is_empty());
        assert!(acc.mean().is_none());
    }

    #[test]
    fn test_accumulator_rejects_other_shape() {
        let mut acc = ParameterAccumulator::<f64>::new(set([0.0, 0.0], 1.0).layout());
        let other = ParameterSet::new(vec![
            ParameterArray::new("mean", 2, 2, vec![0.0; 4]).unwrap(),
        ]);
        assert!(acc.update(&other).is_err());

        acc.resize(other.layout());
        assert!(acc.update(&other).is_ok());
        assert_eq!(acc.layout().len(), 4);
    }
}
