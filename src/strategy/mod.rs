//! Strategy dispatch: a sum type over the three detection strategies, rather than an
//! inheritance tree, matching the design note that the orchestrator dispatches on a tag while
//! shared post-analysis work lives outside the strategy.

pub mod energy;
pub mod morph;
pub mod silence;
pub mod vad;

use std::path::Path;

use anyhow::Result;

use crate::model::AnalysisResult;

pub use energy::EnergyParams;
pub use silence::SilenceParams;
pub use vad::VadParams;

/// Per-strategy parameter bundle, keyed by strategy tag.
#[derive(Debug, Clone, Copy)]
pub struct StrategyParams {
    pub silence: SilenceParams,
    pub energy: EnergyParams,
    pub vad: VadParams,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            silence: SilenceParams::default(),
            energy: EnergyParams::default(),
            vad: VadParams::default(),
        }
    }
}

/// The three detection strategies, dispatched on by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Silence,
    Energy,
    Vad,
}

impl Strategy {
    pub fn analyze(
        self,
        audio_path: &Path,
        duration_sec: f64,
        params: &StrategyParams,
    ) -> Result<AnalysisResult> {
        match self {
            Strategy::Silence => silence::analyze(audio_path, duration_sec, params.silence),
            Strategy::Energy => energy::analyze(audio_path, duration_sec, params.energy),
            Strategy::Vad => vad::analyze(audio_path, duration_sec, params.vad),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silence" => Ok(Strategy::Silence),
            "energy" => Ok(Strategy::Energy),
            "vad" => Ok(Strategy::Vad),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Strategy::Silence => "silence",
            Strategy::Energy => "energy",
            Strategy::Vad => "vad",
        };
        f.write_str(s)
    }
}
