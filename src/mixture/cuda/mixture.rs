//! CUDA implementation of mixture estimation.

use crate::mixture::impl_generic::{
    mixture_fit_impl, mixture_predict_impl, mixture_predict_proba_impl, mixture_select_impl,
};
use crate::mixture::traits::mixture::{
    MixtureAlgorithms, MixtureBlock, MixtureModel, MixtureOptions, MixtureSelection,
    SelectionOptions,
};
use numr::error::Result;
use numr::runtime::cuda::{CudaClient, CudaRuntime};
use numr::tensor::Tensor;

impl MixtureAlgorithms<CudaRuntime> for CudaClient {
    fn mixture_fit(
        &self,
        blocks: &[MixtureBlock<CudaRuntime>],
        options: &MixtureOptions,
    ) -> Result<MixtureModel<CudaRuntime>> {
        mixture_fit_impl(self, blocks, options)
    }

    fn mixture_select(
        &self,
        blocks: &[MixtureBlock<CudaRuntime>],
        options: &SelectionOptions,
    ) -> Result<MixtureSelection<CudaRuntime>> {
        mixture_select_impl(self, blocks, options)
    }

    fn mixture_predict_proba(
        &self,
        model: &MixtureModel<CudaRuntime>,
        blocks: &[MixtureBlock<CudaRuntime>],
    ) -> Result<Tensor<CudaRuntime>> {
        mixture_predict_proba_impl(self, model, blocks)
    }

    fn mixture_predict(
        &self,
        model: &MixtureModel<CudaRuntime>,
        blocks: &[MixtureBlock<CudaRuntime>],
    ) -> Result<Tensor<CudaRuntime>> {
        mixture_predict_impl(self, model, blocks)
    }
}
