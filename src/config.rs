//! Sample-level morphology settings.
//!
//! Mirrors the reshaping/deformation keys of a sample configuration:
//!
//! ```toml
//! reshape_nerve = "circle"
//! deform = "physics"
//! morph_count = 36
//! deform_ratio = 1.0
//!
//! [boundary_separation]
//! fascicles = 10.0
//! nerve = 10.0
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{MorphError, MorphResult};

/// Canonical shape a nerve boundary is reshaped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReshapeMode {
    #[default]
    Circle,
    Ellipse,
}

impl FromStr for ReshapeMode {
    type Err = MorphError;

    fn from_str(s: &str) -> MorphResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "circle" => Ok(ReshapeMode::Circle),
            "ellipse" => Ok(ReshapeMode::Ellipse),
            other => Err(MorphError::UnsupportedMode(format!(
                "reshape mode '{other}' (expected circle or ellipse)"
            ))),
        }
    }
}

impl fmt::Display for ReshapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ReshapeMode::Circle => "circle",
                ReshapeMode::Ellipse => "ellipse",
            }
        )
    }
}

/// Deformation strategy selector as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeformMode {
    #[default]
    None,
    Jitter,
    Physics,
}

impl FromStr for DeformMode {
    type Err = MorphError;

    fn from_str(s: &str) -> MorphResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(DeformMode::None),
            "jitter" => Ok(DeformMode::Jitter),
            "physics" => Ok(DeformMode::Physics),
            other => Err(MorphError::UnsupportedMode(format!(
                "deformation mode '{other}' (expected physics, jitter or none)"
            ))),
        }
    }
}

/// Resolved deformation strategy with the parameters it needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeformStrategy {
    Physics {
        minimum_distance: f64,
    },
    Jitter {
        minimum_distance: f64,
        seed: Option<u64>,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BoundarySeparation {
    /// Minimum fascicle-to-fascicle distance (micrometres).
    pub fascicles: f64,
    /// Minimum fascicle-to-nerve distance (micrometres).
    pub nerve: f64,
}

impl Default for BoundarySeparation {
    fn default() -> Self {
        Self {
            fascicles: 10.0,
            nerve: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct JitterConfig {
    pub seed: Option<u64>,
    pub max_iterations: usize,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_iterations: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MorphologyConfig {
    pub reshape_nerve: ReshapeMode,
    pub deform: DeformMode,
    pub boundary_separation: BoundarySeparation,
    /// Number of intermediate boundary frames.
    pub morph_count: usize,
    /// Simulation loops per boundary frame.
    pub morph_index_step: usize,
    /// Fraction of the frames actually used, in `[0, 1]`.
    pub deform_ratio: f64,
    /// Extra simulation steps once the boundary stops moving.
    pub settle_steps: usize,
    pub jitter: JitterConfig,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            reshape_nerve: ReshapeMode::Circle,
            deform: DeformMode::None,
            boundary_separation: BoundarySeparation::default(),
            morph_count: 100,
            morph_index_step: 10,
            deform_ratio: 1.0,
            settle_steps: 200,
            jitter: JitterConfig::default(),
        }
    }
}

impl MorphologyConfig {
    pub fn from_toml_str(s: &str) -> MorphResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| MorphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> MorphResult<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| MorphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.toml` or `.json` file, picked by extension.
    pub fn load<P: AsRef<Path>>(path: P) -> MorphResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| MorphError::Config(format!("failed to read {}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(MorphError::Config(format!(
                "unrecognised configuration file type: {}",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> MorphResult<()> {
        let mut problems = Vec::new();

        if self.morph_count < 2 {
            problems.push(format!("morph_count must be at least 2, got {}", self.morph_count));
        }
        if self.morph_index_step == 0 {
            problems.push("morph_index_step must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.deform_ratio) {
            problems.push(format!("deform_ratio must be in [0, 1], got {}", self.deform_ratio));
        }
        let sep = &self.boundary_separation;
        if !(sep.fascicles.is_finite() && sep.fascicles >= 0.0) {
            problems.push(format!("boundary_separation.fascicles must be >= 0, got {}", sep.fascicles));
        }
        if !(sep.nerve.is_finite() && sep.nerve >= 0.0) {
            problems.push(format!("boundary_separation.nerve must be >= 0, got {}", sep.nerve));
        }
        if self.jitter.max_iterations == 0 {
            problems.push("jitter.max_iterations must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MorphError::Config(problems.join("; ")))
        }
    }

    pub fn strategy(&self) -> DeformStrategy {
        match self.deform {
            DeformMode::Physics => DeformStrategy::Physics {
                minimum_distance: self.boundary_separation.fascicles,
            },
            DeformMode::Jitter => DeformStrategy::Jitter {
                minimum_distance: self.boundary_separation.fascicles,
                seed: self.jitter.seed,
            },
            DeformMode::None => DeformStrategy::None,
        }
    }
}
