//! Mixture estimation traits and option types.

pub mod algorithm;
pub mod criterion;
pub mod density;
pub mod mixture;
pub mod strategy;
