//! CPU implementation of mixture estimation.

use crate::mixture::impl_generic::{
    mixture_fit_impl, mixture_predict_impl, mixture_predict_proba_impl, mixture_select_impl,
};
use crate::mixture::traits::mixture::{
    MixtureAlgorithms, MixtureBlock, MixtureModel, MixtureOptions, MixtureSelection,
    SelectionOptions,
};
use numr::error::Result;
use numr::runtime::cpu::{CpuClient, CpuRuntime};
use numr::tensor::Tensor;

impl MixtureAlgorithms<CpuRuntime> for CpuClient {
    fn mixture_fit(
        &self,
        blocks: &[MixtureBlock<CpuRuntime>],
        options: &MixtureOptions,
    ) -> Result<MixtureModel<CpuRuntime>> {
        mixture_fit_impl(self, blocks, options)
    }

    fn mixture_select(
        &self,
        blocks: &[MixtureBlock<CpuRuntime>],
        options: &SelectionOptions,
    ) -> Result<MixtureSelection<CpuRuntime>> {
        mixture_select_impl(self, blocks, options)
    }

    fn mixture_predict_proba(
        &self,
        model: &MixtureModel<CpuRuntime>,
        blocks: &[MixtureBlock<CpuRuntime>],
    ) -> Result<Tensor<CpuRuntime>> {
        mixture_predict_proba_impl(self, model, blocks)
    }

    fn mixture_predict(
        &self,
        model: &MixtureModel<CpuRuntime>,
        blocks: &[MixtureBlock<CpuRuntime>],
    ) -> Result<Tensor<CpuRuntime>> {
        mixture_predict_impl(self, model, blocks)
    }
}
