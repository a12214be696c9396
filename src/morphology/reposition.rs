use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::{MorphError, MorphResult};

use super::fascicle::Fascicle;
use super::nerve::Nerve;
use super::slide::Slide;

/// Pull-in applied to the initial radial shift so fascicles start short of
/// the new boundary.
const RADIAL_DAMPING: f64 = 0.8;
/// Step multiplier for a fascicle that overlaps another.
const OVERLAP_BOOST: f64 = 20.0;

struct Jitter {
    rng: StdRng,
    minimum_distance: f64,
    steps: usize,
    max_steps: usize,
}

impl Jitter {
    fn new(seed: Option<u64>, minimum_distance: f64, max_steps: usize) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            minimum_distance,
            steps: 0,
            max_steps,
        }
    }

    /// Random step length in `[0, minimum_distance * boost)`; errors once the
    /// step budget is spent.
    fn step_length(&mut self, boost: f64) -> MorphResult<f64> {
        if self.steps >= self.max_steps {
            return Err(MorphError::Convergence {
                iterations: self.steps,
            });
        }
        self.steps += 1;
        Ok(self.rng.random_range(0.0..1.0) * self.minimum_distance * boost)
    }
}

fn unit_from_angle(angle: f64) -> Vector2<f64> {
    Vector2::new(angle.cos(), angle.sin())
}

fn clear_of_nerve(fascicle: &Fascicle, nerve: &Nerve, minimum_distance: f64) -> bool {
    fascicle.within_nerve(nerve) && fascicle.min_distance_to_nerve(nerve) >= minimum_distance
}

fn clear_of_each_other(a: &Fascicle, b: &Fascicle, minimum_distance: f64) -> bool {
    !overlapping(a, b) && a.min_distance(b) >= minimum_distance
}

fn overlapping(a: &Fascicle, b: &Fascicle) -> bool {
    a.intersects(b) || a.outer().within(b.outer()) || b.outer().within(a.outer())
}

impl Slide {
    /// Moves fascicles radially to follow the boundary change to `new_nerve`,
    /// installs `new_nerve`, then jitters fascicles until every pair and every
    /// fascicle/nerve gap is at least `minimum_distance`.
    ///
    /// Returns the number of jitter steps taken. Fails with
    /// [`MorphError::Convergence`] after `max_iterations` steps.
    pub fn reposition_fascicles(
        &mut self,
        new_nerve: Nerve,
        minimum_distance: f64,
        seed: Option<u64>,
        max_iterations: usize,
    ) -> MorphResult<usize> {
        if !(minimum_distance.is_finite() && minimum_distance >= 0.0) {
            return Err(MorphError::InvalidArgument(format!(
                "minimum distance must be >= 0, got {minimum_distance}"
            )));
        }
        let old_nerve = self.nerve().cloned().ok_or_else(|| {
            MorphError::Precondition("cannot reposition fascicles without a nerve".to_string())
        })?;

        self.radial_shift(&old_nerve, &new_nerve);
        self.set_nerve(new_nerve.clone());

        let mut jitter = Jitter::new(seed, minimum_distance, max_iterations);
        let mut sweeps = 0usize;
        while !self.is_valid(Some(minimum_distance)) {
            sweeps += 1;
            let mut order: Vec<usize> = (0..self.fascicles().len()).collect();
            order.shuffle(&mut jitter.rng);

            for &i in &order {
                self.jitter_into_nerve(i, &new_nerve, &mut jitter)?;
                for j in 0..self.fascicles().len() {
                    if j != i {
                        self.jitter_apart(i, j, &mut jitter)?;
                    }
                }
            }
            debug!("jitter sweep {sweeps}: {} steps so far", jitter.steps);
        }

        info!(
            "fascicles repositioned after {} jitter steps in {sweeps} sweeps",
            jitter.steps
        );
        Ok(jitter.steps)
    }

    /// Scales each fascicle's distance from the new nerve centroid by the
    /// ratio of new to old boundary radius along the same ray.
    fn radial_shift(&mut self, old_nerve: &Nerve, new_nerve: &Nerve) {
        let center = new_nerve.centroid();
        for fascicle in self.fascicles_mut() {
            let offset = fascicle.centroid() - center;
            if offset.norm() <= f64::EPSILON {
                continue;
            }
            let direction = offset.normalize();
            let hits = (
                old_nerve.trace().ray_intersection(&center, &direction),
                new_nerve.trace().ray_intersection(&center, &direction),
            );
            let (Some(old_hit), Some(new_hit)) = hits else {
                continue;
            };
            let r_old = (old_hit - center).norm();
            if r_old <= f64::EPSILON {
                continue;
            }
            let factor = (new_hit - center).norm() / r_old * RADIAL_DAMPING;
            fascicle.shift(&(offset * (factor - 1.0)));
        }
    }

    /// Steps fascicle `i` toward the nerve centre until it is inside with
    /// clearance. A step that carries an inside centroid out of the nerve is
    /// reversed; a fascicle whose centroid starts outside keeps stepping in.
    fn jitter_into_nerve(&mut self, i: usize, nerve: &Nerve, jitter: &mut Jitter) -> MorphResult<()> {
        let minimum_distance = jitter.minimum_distance;
        while !clear_of_nerve(&self.fascicles()[i], nerve, minimum_distance) {
            let fascicle = &mut self.fascicles_mut()[i];
            let toward = unit_from_angle(fascicle.outer().angle_to(nerve.trace()));
            let step = toward * jitter.step_length(1.0)?;
            let was_inside = nerve.trace().contains_point(&fascicle.centroid());
            fascicle.shift(&step);
            if was_inside && !nerve.trace().contains_point(&fascicle.centroid()) {
                fascicle.shift(&(-2.0 * step));
            }
        }
        Ok(())
    }

    /// Pushes fascicles `i` and `j` apart along the line through their
    /// centroids until they clear each other.
    fn jitter_apart(&mut self, i: usize, j: usize, jitter: &mut Jitter) -> MorphResult<()> {
        let minimum_distance = jitter.minimum_distance;
        loop {
            let (a, b) = (&self.fascicles()[i], &self.fascicles()[j]);
            if clear_of_each_other(a, b, minimum_distance) {
                return Ok(());
            }
            let boost = if overlapping(a, b) { OVERLAP_BOOST } else { 1.0 };
            let away = -unit_from_angle(a.angle_to(b));

            let step_i = away * jitter.step_length(boost)?;
            self.fascicles_mut()[i].shift(&step_i);
            let step_j = -away * jitter.step_length(boost)?;
            self.fascicles_mut()[j].shift(&step_j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::circle_trace;
    use approx::assert_relative_eq;

    fn fascicle_at(r: f64, center: (f64, f64)) -> Fascicle {
        Fascicle::new(
            circle_trace(r, 48, center),
            vec![circle_trace(r * 0.7, 32, center)],
            None,
        )
        .unwrap()
    }

    fn close_pair() -> Slide {
        Slide::new(
            vec![fascicle_at(100.0, (-102.5, 0.0)), fascicle_at(100.0, (102.5, 0.0))],
            Some(Nerve::new(circle_trace(500.0, 120, (0.0, 0.0)))),
        )
        .unwrap()
    }

    #[test]
    fn test_close_pair_is_separated() {
        let mut slide = close_pair();
        assert!(!slide.is_valid(Some(10.0)));

        let nerve = slide.nerve().cloned().unwrap();
        let steps = slide.reposition_fascicles(nerve, 10.0, Some(42), 100_000).unwrap();
        assert!(steps > 0);

        let (a, b) = (&slide.fascicles()[0], &slide.fascicles()[1]);
        assert!(a.min_distance(b) >= 10.0);
        let nerve = slide.nerve().unwrap();
        assert!(a.within_nerve(nerve));
        assert!(b.within_nerve(nerve));
        assert!(slide.validation(true, true, Some(10.0)).unwrap());
    }

    /// One r=50 fascicle at `x` on the axis, moved into a r=500 nerve from a
    /// r=400 one; the radial factor 500/400 * 0.8 leaves it where it starts.
    fn fascicle_near_new_boundary(x: f64) -> (Slide, Nerve) {
        let slide = Slide::new(
            vec![fascicle_at(50.0, (x, 0.0))],
            Some(Nerve::new(circle_trace(400.0, 120, (0.0, 0.0)))),
        )
        .unwrap();
        (slide, Nerve::new(circle_trace(500.0, 120, (0.0, 0.0))))
    }

    fn assert_clear_of_nerve(slide: &Slide, minimum_distance: f64) {
        let nerve = slide.nerve().unwrap();
        for fascicle in slide.fascicles() {
            assert!(fascicle.within_nerve(nerve));
            assert!(fascicle.min_distance_to_nerve(nerve) >= minimum_distance);
        }
        assert!(slide.validation(true, true, Some(minimum_distance)).unwrap());
    }

    #[test]
    fn test_fascicle_crossing_nerve_is_pulled_inside() {
        let (mut slide, nerve) = fascicle_near_new_boundary(470.0);
        assert!(slide.fascicles()[0].intersects_nerve(&nerve));

        let steps = slide.reposition_fascicles(nerve, 10.0, Some(5), 20_000).unwrap();
        assert!(steps > 0);
        assert_clear_of_nerve(&slide, 10.0);
    }

    #[test]
    fn test_fascicle_too_close_to_nerve_gains_clearance() {
        // outer vertex at 497, nerve vertex at 500
        let (mut slide, nerve) = fascicle_near_new_boundary(447.0);
        let start = &slide.fascicles()[0];
        assert!(start.within_nerve(&nerve));
        assert_relative_eq!(start.min_distance_to_nerve(&nerve), 3.0, epsilon = 1e-6);

        let steps = slide.reposition_fascicles(nerve, 10.0, Some(9), 20_000).unwrap();
        assert!(steps > 0);
        assert_clear_of_nerve(&slide, 10.0);
    }

    #[test]
    fn test_fascicle_outside_nerve_walks_back_in() {
        let mut slide = Slide::new(
            vec![fascicle_at(50.0, (0.0, 0.0))],
            Some(Nerve::new(circle_trace(500.0, 120, (0.0, 0.0)))),
        )
        .unwrap();
        slide.fascicles_mut()[0].shift(&Vector2::new(700.0, 0.0));
        let nerve = slide.nerve().cloned().unwrap();
        // the radial pull-in leaves the centroid at 560, still outside
        assert!(!nerve.trace().contains_point(&Vector2::new(560.0, 0.0)));

        slide.reposition_fascicles(nerve, 10.0, Some(1), 20_000).unwrap();
        assert_clear_of_nerve(&slide, 10.0);
        assert!(slide.fascicles()[0].centroid().x < 500.0);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let run = || {
            let mut slide = close_pair();
            let nerve = slide.nerve().cloned().unwrap();
            slide.reposition_fascicles(nerve, 10.0, Some(7), 100_000).unwrap();
            slide
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_radial_shift_follows_boundary() {
        let mut slide = Slide::new(
            vec![fascicle_at(50.0, (200.0, 0.0))],
            Some(Nerve::new(circle_trace(400.0, 120, (0.0, 0.0)))),
        )
        .unwrap();
        slide
            .reposition_fascicles(Nerve::new(circle_trace(800.0, 120, (0.0, 0.0))), 10.0, Some(1), 1000)
            .unwrap();
        // 200 * (800 / 400) * 0.8, already valid so no jitter
        assert_relative_eq!(slide.fascicles()[0].centroid().x, 320.0, epsilon = 1e-6);
    }

    #[test]
    fn test_impossible_packing_hits_iteration_cap() {
        let mut slide = Slide::new(
            vec![fascicle_at(90.0, (-95.0, 0.0)), fascicle_at(90.0, (95.0, 0.0))],
            Some(Nerve::new(circle_trace(200.0, 120, (0.0, 0.0)))),
        )
        .unwrap();
        let nerve = slide.nerve().cloned().unwrap();
        assert!(matches!(
            slide.reposition_fascicles(nerve, 50.0, Some(3), 500),
            Err(MorphError::Convergence { iterations: 500 })
        ));
    }

    #[test]
    fn test_requires_nerve() {
        let mut mono = Slide::new(vec![fascicle_at(10.0, (0.0, 0.0))], None).unwrap();
        let target = Nerve::new(circle_trace(100.0, 64, (0.0, 0.0)));
        assert!(matches!(
            mono.reposition_fascicles(target, 10.0, None, 10),
            Err(MorphError::Precondition(_))
        ));
    }
}
