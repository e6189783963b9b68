//! WebGPU implementation of mixture estimation.

use crate::mixture::impl_generic::{
    mixture_fit_impl, mixture_predict_impl, mixture_predict_proba_impl, mixture_select_impl,
};
use crate::mixture::traits::mixture::{
    MixtureAlgorithms, MixtureBlock, MixtureModel, MixtureOptions, MixtureSelection,
    SelectionOptions,
};
use numr::error::Result;
use numr::runtime::wgpu::{WgpuClient, WgpuRuntime};
use numr::tensor::Tensor;

impl MixtureAlgorithms<WgpuRuntime> for WgpuClient {
    fn mixture_fit(
        &self,
        blocks: &[MixtureBlock<WgpuRuntime>],
        options: &MixtureOptions,
    ) -> Result<MixtureModel<WgpuRuntime>> {
        mixture_fit_impl(self, blocks, options)
    }

    fn mixture_select(
        &self,
        blocks: &[MixtureBlock<WgpuRuntime>],
        options: &SelectionOptions,
    ) -> Result<MixtureSelection<WgpuRuntime>> {
        mixture_select_impl(self, blocks, options)
    }

    fn mixture_predict_proba(
        &self,
        model: &MixtureModel<WgpuRuntime>,
        blocks: &[MixtureBlock<WgpuRuntime>],
    ) -> Result<Tensor<WgpuRuntime>> {
        mixture_predict_proba_impl(self, model, blocks)
    }

    fn mixture_predict(
        &self,
        model: &MixtureModel<WgpuRuntime>,
        blocks: &[MixtureBlock<WgpuRuntime>],
    ) -> Result<Tensor<WgpuRuntime>> {
        mixture_predict_impl(self, model, blocks)
    }
}
