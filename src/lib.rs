//! mixr - Finite Mixture Models over Heterogeneous Data Blocks
//!
//! mixr clusters samples with generative mixture models. Each block of
//! variables (continuous, positive, count or categorical) gets its own
//! density family, and the blocks are combined into one joint mixture
//! estimated with EM, CEM or SEM. Missing cells are handled inside the
//! iteration, several starting points are tried with failure recovery, and
//! (families, K) candidates are ranked by AIC, BIC or ICL.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       mixr                               │
//! │  (composer, density families, EM/CEM/SEM, strategies)   │
//! └──────────────────────────┬──────────────────────────────┘
//!                            │ uses
//! ┌──────────────────────────▼──────────────────────────────┐
//! │                       numr                               │
//! │       (tensors, runtimes, special functions)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`mixture`] - Mixture estimation, density families, model selection
//!
//! # Backend Support
//!
//! [`MixtureAlgorithms`] is generic over numr's `Runtime` trait and is
//! implemented for CPU, CUDA and WebGPU clients.
//!
//! # Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `cuda`  | Enable CUDA GPU tensors | CUDA 12.x, numr/cuda |
//! | `wgpu`  | Enable WebGPU tensors | numr/wgpu |
//! | `serde` | Serialize options and fitted parameters | serde |
//!
//! ## Backend Limitations
//!
//! - **WebGPU**: Only supports F32 precision (no F64). Blocks are widened
//!   to F64 on the host, so F32 input works on every backend.
//! - **CUDA**: Requires CUDA 12.x toolkit installed
//!
//! # Example
//!
//! ```ignore
//! use mixr::mixture::{MixtureAlgorithms, MixtureBlock, MixtureOptions, ModelId};
//! use numr::runtime::cpu::{CpuClient, CpuDevice};
//! use numr::tensor::Tensor;
//!
//! let device = CpuDevice::new();
//! let client = CpuClient::new(device.clone());
//!
//! let data = Tensor::from_slice(&values, &[n, 2], &device);
//! let counts = Tensor::from_slice(&visits, &[n, 1], &device);
//! let blocks = [
//!     MixtureBlock::new("position", data, ModelId::GaussianSjk),
//!     MixtureBlock::new("visits", counts, ModelId::PoissonLk),
//! ];
//!
//! let model = client.mixture_fit(&blocks, &MixtureOptions::default()).unwrap();
//! let labels = client.mixture_predict(&model, &blocks).unwrap();
//! ```

pub mod mixture;

// Re-export main types for convenience
pub use mixture::{
    AlgorithmKind, AlgorithmOptions, CriterionKind, DataBlock, DensityModel, InitMethod,
    MixtureAlgorithms, MixtureBlock, MixtureError, MixtureModel, MixtureOptions, MixtureResult,
    MixtureSelection, ModelId, Proportions, SelectionOptions, StrategyOptions,
};

// Re-export numr types that users will commonly need
pub use numr::dtype::DType;
pub use numr::error::{Error, Result};
pub use numr::runtime::{Runtime, RuntimeClient};
pub use numr::tensor::Tensor;
