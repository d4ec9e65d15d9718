//! Analysis agents.
//!
//! Specialist tasks and the injected analysis capability they run against.

pub mod capability;
pub mod specialist;

pub use capability::{
    AnalysisCapability, EvidenceBundle, HeuristicCapability, OllamaCapability, OllamaConfig,
};
pub use specialist::{default_specialists, AnalysisTask, SpecialistAgent};
