//! WebGPU implementation of mixture estimation.

mod mixture;
