//! CPU implementation of mixture estimation.

mod mixture;
