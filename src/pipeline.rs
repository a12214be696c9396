use anyhow::{anyhow, Context, Result};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{DeformMode, DeformStrategy, MorphologyConfig, ReshapeMode};
use crate::deform::{CancelToken, DeformParams, Deformable, FrameObserver};
use crate::error::MorphResult;
use crate::geometry::{OffsetAmount, Trace, TransformCenter};
use crate::morphology::{Nerve, Slide};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FascicleMotion {
    pub movement: (f64, f64),
    /// CCW radians about the fascicle centroid.
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub strategy: DeformMode,
    pub reshape: ReshapeMode,
    pub motions: Vec<FascicleMotion>,
    pub nerve_area: f64,
    /// World steps simulated, for physics.
    pub simulation_steps: Option<usize>,
    /// Jitter steps taken, for jitter.
    pub jitter_steps: Option<usize>,
}

/// Best-fit circle or ellipse of `nerve`, rescaled to the nerve's own area and
/// sampled with its point count.
pub fn area_preserving_target(nerve: &Nerve, mode: ReshapeMode) -> MorphResult<Trace> {
    let shape = nerve.ellipse()?.reshaped(mode);
    let factor = (nerve.area() / shape.area()).sqrt();
    Trace::from_ellipse(&shape.scaled(factor), nerve.trace().count(), nerve.trace().z())
}

/// Reshapes the nerve of `slide` and moves its fascicles to fit, then centres
/// the slide on the origin and validates it.
pub fn normalize_slide(
    slide: &mut Slide,
    config: &MorphologyConfig,
    observer: &mut dyn FrameObserver,
    cancel: &CancelToken,
) -> Result<NormalizationReport> {
    config.validate().context("invalid morphology configuration")?;
    let strategy = config.strategy();

    let Some(nerve) = slide.nerve().cloned() else {
        if strategy != DeformStrategy::None {
            return Err(anyhow!(
                "cannot apply {:?} deformation to a slide without a nerve",
                config.deform
            ));
        }
        slide.move_center(&Vector2::zeros());
        slide
            .validation(true, true, None)
            .context("monofascicular slide is invalid")?;
        return Ok(NormalizationReport {
            strategy: config.deform,
            reshape: config.reshape_nerve,
            motions: idle_motions(slide),
            nerve_area: slide.boundary().area(),
            simulation_steps: None,
            jitter_steps: None,
        });
    };

    info!(
        "normalizing slide with {} fascicles: reshape {}, deform {:?}",
        slide.fascicles().len(),
        config.reshape_nerve,
        config.deform
    );
    let target = area_preserving_target(&nerve, config.reshape_nerve)
        .context("failed to build the reshaped nerve")?;

    let mut report = NormalizationReport {
        strategy: config.deform,
        reshape: config.reshape_nerve,
        motions: idle_motions(slide),
        nerve_area: 0.0,
        simulation_steps: None,
        jitter_steps: None,
    };

    let new_nerve = match strategy {
        DeformStrategy::Physics { minimum_distance } => {
            let separation = config.boundary_separation.nerve;
            let mut start = nerve.trace().clone();
            if separation > 0.0 {
                start
                    .offset(OffsetAmount::Distance(-separation))
                    .context("failed to shrink the nerve by the nerve separation")?;
            }
            let end_shape = target
                .ellipse()?
                .with_margin(-separation)
                .context("nerve separation collapses the target nerve")?;
            let end = Trace::from_ellipse(&end_shape, start.count(), start.z())?;

            let contents = slide.fascicles().iter().map(|f| f.outer().clone()).collect();
            let deformable =
                Deformable::new(start, end, contents).with_minimum_distance(minimum_distance);
            let params = DeformParams::from(config);
            let result = deformable
                .deform(&params, observer, cancel)
                .context("physics deformation failed")?;

            for (fascicle, (movement, rotation)) in slide
                .fascicles_mut()
                .iter_mut()
                .zip(result.movements.iter().zip(&result.rotations))
            {
                fascicle.shift(movement);
                fascicle.rotate(*rotation, TransformCenter::Centroid);
            }
            report.motions = result
                .movements
                .iter()
                .zip(&result.rotations)
                .map(|(m, r)| FascicleMotion {
                    movement: (m.x, m.y),
                    rotation: *r,
                })
                .collect();
            report.simulation_steps = Some(result.steps);

            if config.deform_ratio < 1.0 {
                let mut partial = deformable
                    .steps(params.morph_count, params.ratio)?
                    .pop()
                    .ok_or_else(|| anyhow!("partial deformation produced no boundary"))?;
                if separation > 0.0 {
                    partial
                        .offset(OffsetAmount::Distance(separation))
                        .context("failed to regrow the partially deformed nerve")?;
                }
                Nerve::new(partial)
            } else {
                Nerve::new(target)
            }
        }
        DeformStrategy::Jitter {
            minimum_distance,
            seed,
        } => {
            let before: Vec<Vector2<f64>> = slide.fascicles().iter().map(|f| f.centroid()).collect();
            let new_nerve = Nerve::new(target);
            let steps = slide
                .reposition_fascicles(
                    new_nerve.clone(),
                    minimum_distance,
                    seed,
                    config.jitter.max_iterations,
                )
                .context("jitter repositioning failed")?;
            report.motions = slide
                .fascicles()
                .iter()
                .zip(before)
                .map(|(f, c)| {
                    let m = f.centroid() - c;
                    FascicleMotion {
                        movement: (m.x, m.y),
                        rotation: 0.0,
                    }
                })
                .collect();
            report.jitter_steps = Some(steps);
            new_nerve
        }
        DeformStrategy::None => {
            warn!("no deformation is happening; the nerve is reshaped in place");
            Nerve::new(target)
        }
    };

    slide.set_nerve(new_nerve);
    slide.move_center(&Vector2::zeros());
    slide
        .validation(true, true, None)
        .context("slide is invalid after normalization")?;

    report.nerve_area = slide.boundary().area();
    info!("slide normalized, nerve area {:.1}", report.nerve_area);
    Ok(report)
}

fn idle_motions(slide: &Slide) -> Vec<FascicleMotion> {
    vec![
        FascicleMotion {
            movement: (0.0, 0.0),
            rotation: 0.0,
        };
        slide.fascicles().len()
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundarySeparation;
    use crate::deform::NoopObserver;
    use crate::morphology::Fascicle;
    use crate::utils::test_utils::{circle_trace, ellipse_trace};
    use approx::assert_relative_eq;

    fn fascicle_at(r: f64, center: (f64, f64)) -> Fascicle {
        Fascicle::new(
            circle_trace(r, 32, center),
            vec![circle_trace(r * 0.6, 24, center)],
            None,
        )
        .unwrap()
    }

    fn ellipse_slide(x: f64) -> Slide {
        Slide::new(
            vec![fascicle_at(100.0, (-x, 0.0)), fascicle_at(100.0, (x, 0.0))],
            Some(Nerve::new(ellipse_trace(1000.0, 600.0, 120, 0.0, (0.0, 0.0)))),
        )
        .unwrap()
    }

    fn physics_config() -> MorphologyConfig {
        MorphologyConfig {
            deform: DeformMode::Physics,
            morph_count: 10,
            morph_index_step: 5,
            settle_steps: 40,
            ..MorphologyConfig::default()
        }
    }

    fn run(slide: &mut Slide, config: &MorphologyConfig) -> Result<NormalizationReport> {
        normalize_slide(slide, config, &mut NoopObserver, &CancelToken::new())
    }

    #[test]
    fn test_area_preserving_circle_radius() {
        let nerve = Nerve::new(ellipse_trace(1000.0, 600.0, 120, 0.3, (50.0, 0.0)));
        let target = area_preserving_target(&nerve, ReshapeMode::Circle).unwrap();
        assert_eq!(target.count(), 120);
        assert_relative_eq!(target.area(), nerve.area(), epsilon = 1e-6 * nerve.area());
        assert_relative_eq!(target.mean_radius().unwrap(), (1000.0f64 * 600.0).sqrt(), epsilon = 1.0);
    }

    #[test]
    fn test_physics_on_symmetric_ellipse() {
        let mut slide = ellipse_slide(300.0);
        let report = run(&mut slide, &physics_config()).unwrap();

        let nerve = slide.nerve().unwrap();
        assert_relative_eq!(nerve.trace().mean_radius().unwrap(), (1000.0f64 * 600.0).sqrt(), epsilon = 1.0);
        assert_relative_eq!(nerve.centroid().norm(), 0.0, epsilon = 1e-6);
        let (a, b) = (&slide.fascicles()[0], &slide.fascicles()[1]);
        assert!(!a.intersects(b));
        assert!(a.within_nerve(nerve) && b.within_nerve(nerve));
        assert_eq!(report.motions.len(), 2);
        assert_eq!(report.simulation_steps, Some((10 * 5 + 40) * 2));
    }

    #[test]
    fn test_physics_pushes_fascicles_off_the_new_boundary() {
        let mut slide = ellipse_slide(700.0);
        let report = run(&mut slide, &physics_config()).unwrap();
        assert!(report.motions[0].movement.0 > 20.0);
        assert!(report.motions[1].movement.0 < -20.0);
        assert!(slide.validation(true, true, None).unwrap());
    }

    #[test]
    fn test_jitter_separates_close_fascicles() {
        let mut slide = Slide::new(
            vec![fascicle_at(100.0, (-102.5, 0.0)), fascicle_at(100.0, (102.5, 0.0))],
            Some(Nerve::new(circle_trace(500.0, 120, (0.0, 0.0)))),
        )
        .unwrap();
        let mut config = MorphologyConfig {
            deform: DeformMode::Jitter,
            boundary_separation: BoundarySeparation {
                fascicles: 10.0,
                nerve: 0.0,
            },
            ..MorphologyConfig::default()
        };
        config.jitter.seed = Some(11);
        let report = run(&mut slide, &config).unwrap();

        assert!(report.jitter_steps.unwrap() > 0);
        assert!(slide.fascicles()[0].min_distance(&slide.fascicles()[1]) >= 10.0);
    }

    #[test]
    fn test_no_deformation_only_reshapes() {
        let mut slide = ellipse_slide(300.0);
        let before = slide.fascicles()[1].centroid() - slide.nerve().unwrap().centroid();
        let report = run(&mut slide, &MorphologyConfig::default()).unwrap();
        assert_eq!(report.strategy, DeformMode::None);
        let after = slide.fascicles()[1].centroid();
        assert_relative_eq!(after.x, before.x, epsilon = 1e-6);
        assert!(report.motions.iter().all(|m| m.movement == (0.0, 0.0)));
    }

    #[test]
    fn test_missing_nerve_refuses_deformation() {
        let mut mono = Slide::new(vec![fascicle_at(50.0, (10.0, 10.0))], None).unwrap();
        assert!(run(&mut mono.clone(), &physics_config()).is_err());

        let report = run(&mut mono, &MorphologyConfig::default()).unwrap();
        assert_eq!(report.motions.len(), 1);
        assert_relative_eq!(mono.boundary().centroid().norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_report_serialises() {
        let mut slide = ellipse_slide(300.0);
        let report = run(&mut slide, &MorphologyConfig::default()).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: NormalizationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert!(json.contains("\"none\""));
    }

    #[test]
    fn test_partial_deformation_keeps_intermediate_nerve() {
        let mut slide = ellipse_slide(300.0);
        let config = MorphologyConfig {
            deform_ratio: 0.5,
            ..physics_config()
        };
        run(&mut slide, &config).unwrap();
        let ellipse = slide.nerve().unwrap().ellipse().unwrap();
        assert!(ellipse.semi_major < 1000.0 && ellipse.semi_major > 800.0);
        assert!(ellipse.semi_minor > 600.0);
    }
}
