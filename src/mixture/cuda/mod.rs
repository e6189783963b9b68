//! CUDA implementation of mixture estimation.

mod mixture;
