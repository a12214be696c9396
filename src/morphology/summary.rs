use serde::{Deserialize, Serialize};

use crate::error::MorphResult;
use crate::geometry::{Ellipse, Trace};

use super::slide::Slide;

/// Area and best-fit ellipse of one boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub area: f64,
    pub ellipse: Ellipse,
}

impl TraceSummary {
    pub fn of(trace: &Trace) -> MorphResult<Self> {
        Ok(Self {
            area: trace.area(),
            ellipse: trace.ellipse()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FascicleSummary {
    pub outer: TraceSummary,
    pub inners: Vec<TraceSummary>,
}

/// Per-slide morphology metrics, as written next to each processed sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphologySummary {
    pub nerve: Option<TraceSummary>,
    pub fascicles: Vec<FascicleSummary>,
}

impl MorphologySummary {
    pub fn of(slide: &Slide) -> MorphResult<Self> {
        let nerve = slide
            .nerve()
            .map(|n| TraceSummary::of(n.trace()))
            .transpose()?;
        let fascicles = slide
            .fascicles()
            .iter()
            .map(|f| {
                Ok(FascicleSummary {
                    outer: TraceSummary::of(f.outer())?,
                    inners: f
                        .inners()
                        .iter()
                        .map(TraceSummary::of)
                        .collect::<MorphResult<Vec<_>>>()?,
                })
            })
            .collect::<MorphResult<Vec<_>>>()?;
        Ok(Self { nerve, fascicles })
    }

    pub fn fascicle_area(&self) -> f64 {
        self.fascicles.iter().map(|f| f.outer.area).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
