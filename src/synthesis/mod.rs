//! Synthesis stages: risk factors, then the composite score.

pub mod risk;
pub mod score;

pub use risk::synthesize;
pub use score::calculate;
