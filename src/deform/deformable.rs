use nalgebra::Vector2;
use tracing::{debug, info};

use crate::config::{MorphologyConfig, ReshapeMode};
use crate::error::{MorphError, MorphResult};
use crate::geometry::{OffsetAmount, Point, Trace};
use crate::morphology::Slide;

use super::control::{CancelToken, FrameObserver};
use super::world::{BodyHandle, ContactWorld, Pose, RigidBodyWorld};

/// Physics time step.
pub const TIME_STEP: f64 = 1.0 / 120.0;
/// World steps per simulation loop.
pub const SUBSTEPS: usize = 2;

/// Knobs for [`Deformable::deform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeformParams {
    /// Number of boundary frames between start and end.
    pub morph_count: usize,
    /// Simulation loops spent on each frame.
    pub morph_index_step: usize,
    /// Loops run on the final frame after the boundary stops moving.
    pub settle_steps: usize,
    /// Overrides the clearance stored on the [`Deformable`].
    pub minimum_distance: Option<f64>,
    /// Fraction of frames to use, in `[0, 1]`.
    pub ratio: Option<f64>,
}

impl Default for DeformParams {
    fn default() -> Self {
        Self {
            morph_count: 100,
            morph_index_step: 10,
            settle_steps: 200,
            minimum_distance: None,
            ratio: None,
        }
    }
}

impl From<&MorphologyConfig> for DeformParams {
    fn from(config: &MorphologyConfig) -> Self {
        Self {
            morph_count: config.morph_count,
            morph_index_step: config.morph_index_step,
            settle_steps: config.settle_steps,
            minimum_distance: Some(config.boundary_separation.fascicles),
            ratio: Some(config.deform_ratio),
        }
    }
}

/// Per-content rigid motion, parallel to the contents list. Movements are
/// measured at each content's centroid; rotations are CCW radians about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Deformation {
    pub movements: Vec<Vector2<f64>>,
    pub rotations: Vec<f64>,
    /// World steps actually simulated.
    pub steps: usize,
}

/// Moves rigid contents from a start boundary to an end boundary by
/// simulating the boundary as a sequence of walls closing in on them.
#[derive(Debug, Clone)]
pub struct Deformable {
    start: Trace,
    end: Trace,
    contents: Vec<Trace>,
    minimum_distance: f64,
}

impl Deformable {
    pub fn new(start: Trace, end: Trace, contents: Vec<Trace>) -> Self {
        Self {
            start,
            end,
            contents,
            minimum_distance: 0.0,
        }
    }

    pub fn with_minimum_distance(mut self, minimum_distance: f64) -> Self {
        self.minimum_distance = minimum_distance;
        self
    }

    /// Start is the slide's nerve, end its best-fit `mode` shape grown by
    /// `nerve_add` and sampled with the same point count, contents the
    /// fascicle outers.
    pub fn from_slide(
        slide: &Slide,
        mode: ReshapeMode,
        minimum_distance: f64,
        nerve_add: f64,
    ) -> MorphResult<Self> {
        let start = slide
            .nerve()
            .ok_or_else(|| {
                MorphError::Precondition("deformation needs a slide with a nerve".to_string())
            })?
            .trace()
            .clone();
        let shape = start.ellipse()?.reshaped(mode).with_margin(nerve_add)?;
        let end = Trace::from_ellipse(&shape, start.count(), start.z())?;
        let contents = slide.fascicles().iter().map(|f| f.outer().clone()).collect();
        Ok(Self::new(start, end, contents).with_minimum_distance(minimum_distance))
    }

    pub fn start(&self) -> &Trace {
        &self.start
    }

    pub fn end(&self) -> &Trace {
        &self.end
    }

    pub fn contents(&self) -> &[Trace] {
        &self.contents
    }

    /// Boundary frames from `start` to `end`; see [`Deformable::deform_steps`].
    pub fn steps(&self, count: usize, ratio: Option<f64>) -> MorphResult<Vec<Trace>> {
        Self::deform_steps(&self.start, &self.end, count, ratio)
    }

    /// `count` boundaries interpolating linearly from `start` to `end`.
    ///
    /// Points are paired by walking both traces clockwise from their seam
    /// points, the vertices nearest to where the major axis of the start's
    /// best-fit ellipse leaves each boundary. Frames keep the point order of
    /// `start`, so the first frame equals it. With `ratio`, only the first
    /// `round(ratio * count)` frames (at least one) are returned.
    pub fn deform_steps(
        start: &Trace,
        end: &Trace,
        count: usize,
        ratio: Option<f64>,
    ) -> MorphResult<Vec<Trace>> {
        if start.count() != end.count() {
            return Err(MorphError::Precondition(format!(
                "start and end boundaries need equal point counts, got {} and {}",
                start.count(),
                end.count()
            )));
        }
        if count < 2 {
            return Err(MorphError::InvalidArgument(format!(
                "at least 2 deformation steps are needed, got {count}"
            )));
        }
        if let Some(r) = ratio {
            if !(0.0..=1.0).contains(&r) {
                return Err(MorphError::InvalidArgument(format!(
                    "deform ratio must be in [0, 1], got {r}"
                )));
            }
        }

        let ellipse = start.ellipse()?;
        let origin = ellipse.center();
        let axis = ellipse.major_axis_direction();
        let start_order = clockwise_from(start, seam_index(start, &origin, &axis)?);
        let end_order = clockwise_from(end, seam_index(end, &origin, &axis)?);

        let (a, b) = (start.xy(), end.xy());
        let displacement: Vec<Vector2<f64>> = start_order
            .iter()
            .zip(&end_order)
            .map(|(&i, &j)| b[j] - a[i])
            .collect();

        let kept = match ratio {
            Some(r) => ((r * count as f64).round() as usize).clamp(1, count),
            None => count,
        };
        let z = start.z();
        (0..kept)
            .map(|step| {
                let t = step as f64 / (count - 1) as f64;
                let mut frame = a.to_vec();
                for (&i, v) in start_order.iter().zip(&displacement) {
                    frame[i] += v * t;
                }
                Trace::new(frame.into_iter().map(|p| Point::from_xy(p, z)).collect())
            })
            .collect()
    }

    /// Runs the boundary deformation in a fresh [`ContactWorld`].
    pub fn deform(
        &self,
        params: &DeformParams,
        observer: &mut dyn FrameObserver,
        cancel: &CancelToken,
    ) -> MorphResult<Deformation> {
        let mut world = ContactWorld::new();
        self.deform_in(&mut world, params, observer, cancel)
    }

    /// Runs the boundary deformation in `world`.
    ///
    /// Contents are grown by half the minimum distance and added as bodies.
    /// Each boundary frame is installed as walls for `morph_index_step`
    /// loops; the last frame stays for `settle_steps` more. Movement and
    /// rotation are the pose change of each body over the whole run.
    pub fn deform_in<W: RigidBodyWorld + ?Sized>(
        &self,
        world: &mut W,
        params: &DeformParams,
        observer: &mut dyn FrameObserver,
        cancel: &CancelToken,
    ) -> MorphResult<Deformation> {
        let minimum_distance = params.minimum_distance.unwrap_or(self.minimum_distance);
        if !(minimum_distance.is_finite() && minimum_distance >= 0.0) {
            return Err(MorphError::InvalidArgument(format!(
                "minimum distance must be >= 0, got {minimum_distance}"
            )));
        }
        if params.morph_index_step == 0 {
            return Err(MorphError::InvalidArgument(
                "morph_index_step must be at least 1".to_string(),
            ));
        }

        let frames = self.steps(params.morph_count, params.ratio)?;

        let mut bodies = Vec::with_capacity(self.contents.len());
        for content in &self.contents {
            let mut body = content.clone();
            if minimum_distance > 0.0 {
                body.offset(OffsetAmount::Distance(minimum_distance / 2.0))?;
            }
            bodies.push(world.add_body(body.xy(), content.centroid()));
        }
        let initial = poses(&*world, &bodies)?;

        info!(
            "deforming {} bodies through {} of {} boundary frames",
            bodies.len(),
            frames.len(),
            params.morph_count
        );

        let mut steps = 0usize;
        let mut walls = None;
        for (index, frame) in frames.iter().enumerate() {
            if let Some(previous) = walls.take() {
                world.remove_static_walls(previous);
            }
            walls = Some(world.add_static_walls(frame));
            observer.on_frame(index, frame, &poses(&*world, &bodies)?);
            for _ in 0..params.morph_index_step {
                run_loop(world, cancel, &mut steps)?;
            }
            debug!("boundary frame {}/{} done after {steps} steps", index + 1, frames.len());
        }
        for _ in 0..params.settle_steps {
            run_loop(world, cancel, &mut steps)?;
        }
        if let Some(last) = walls {
            world.remove_static_walls(last);
        }

        let settled = poses(&*world, &bodies)?;
        observer.on_settled(&settled);

        let (movements, rotations) = initial
            .iter()
            .zip(&settled)
            .map(|(before, after)| (after.position - before.position, after.angle - before.angle))
            .unzip();
        Ok(Deformation {
            movements,
            rotations,
            steps,
        })
    }
}

fn run_loop<W: RigidBodyWorld + ?Sized>(
    world: &mut W,
    cancel: &CancelToken,
    steps: &mut usize,
) -> MorphResult<()> {
    if cancel.is_cancelled() {
        return Err(MorphError::Cancelled { steps: *steps });
    }
    for _ in 0..SUBSTEPS {
        world.step(TIME_STEP);
        *steps += 1;
    }
    Ok(())
}

fn poses<W: RigidBodyWorld + ?Sized>(world: &W, bodies: &[BodyHandle]) -> MorphResult<Vec<Pose>> {
    bodies
        .iter()
        .map(|h| {
            world
                .pose(*h)
                .ok_or_else(|| MorphError::Precondition(format!("unknown body {h:?}")))
        })
        .collect()
}

/// Vertex nearest to the farthest crossing of the ray with the boundary.
fn seam_index(trace: &Trace, origin: &Vector2<f64>, direction: &Vector2<f64>) -> MorphResult<usize> {
    let hit = trace.ray_intersection(origin, direction).ok_or_else(|| {
        MorphError::Geometry("major axis does not cross the boundary".to_string())
    })?;
    trace
        .xy()
        .iter()
        .enumerate()
        .min_by(|(_, p), (_, q)| (*p - hit).norm_squared().total_cmp(&(*q - hit).norm_squared()))
        .map(|(i, _)| i)
        .ok_or_else(|| MorphError::Geometry("empty boundary".to_string()))
}

/// Vertex indices in clockwise order starting at `seam`.
fn clockwise_from(trace: &Trace, seam: usize) -> Vec<usize> {
    let n = trace.count();
    let stride = if trace.is_ccw() { n - 1 } else { 1 };
    (0..n).map(|k| (seam + k * stride) % n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deform::control::NoopObserver;
    use crate::deform::world::WallsHandle;
    use crate::geometry::{Ellipse, TransformCenter};
    use crate::morphology::{Fascicle, Nerve};
    use crate::utils::test_utils::{circle_trace, ellipse_trace};
    use approx::assert_relative_eq;

    fn nerve_and_target(n: usize) -> (Trace, Trace) {
        let start = ellipse_trace(1000.0, 600.0, n, 0.0, (0.0, 0.0));
        let r = (1000.0f64 * 600.0).sqrt();
        let end = Trace::from_ellipse(&Ellipse::new(Vector2::zeros(), r, r, 0.0), n, 0.0).unwrap();
        (start, end)
    }

    fn quick_params(minimum_distance: f64) -> DeformParams {
        DeformParams {
            morph_count: 10,
            morph_index_step: 5,
            settle_steps: 40,
            minimum_distance: Some(minimum_distance),
            ratio: None,
        }
    }

    /// Moves every body one unit along x per step and records wall traffic.
    #[derive(Default)]
    struct DriftWorld {
        bodies: Vec<Vector2<f64>>,
        added_walls: usize,
        removed_walls: Vec<WallsHandle>,
        steps: usize,
    }

    impl RigidBodyWorld for DriftWorld {
        fn add_body(&mut self, _outline: &[Vector2<f64>], reference: Vector2<f64>) -> BodyHandle {
            self.bodies.push(reference);
            BodyHandle(self.bodies.len() - 1)
        }

        fn add_static_walls(&mut self, _frame: &Trace) -> WallsHandle {
            self.added_walls += 1;
            WallsHandle(self.added_walls - 1)
        }

        fn remove_static_walls(&mut self, walls: WallsHandle) {
            self.removed_walls.push(walls);
        }

        fn step(&mut self, _dt: f64) {
            self.steps += 1;
            self.bodies.iter_mut().for_each(|b| b.x += 1.0);
        }

        fn pose(&self, body: BodyHandle) -> Option<Pose> {
            self.bodies.get(body.0).map(|p| Pose {
                position: *p,
                angle: 0.01 * self.steps as f64,
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(usize, Vec<Pose>)>,
        settled: usize,
        cancel_at: Option<(usize, CancelToken)>,
    }

    impl FrameObserver for Recorder {
        fn on_frame(&mut self, index: usize, _boundary: &Trace, poses: &[Pose]) {
            self.frames.push((index, poses.to_vec()));
            if let Some((at, token)) = &self.cancel_at {
                if *at == index {
                    token.cancel();
                }
            }
        }

        fn on_settled(&mut self, _poses: &[Pose]) {
            self.settled += 1;
        }
    }

    #[test]
    fn test_deform_steps_endpoints_and_count() {
        let (start, end) = nerve_and_target(90);
        let frames = Deformable::deform_steps(&start, &end, 12, None).unwrap();
        assert_eq!(frames.len(), 12);
        assert!(frames.iter().all(|f| f.count() == 90));

        for (p, q) in frames[0].points().iter().zip(start.points()) {
            assert_relative_eq!(p.x, q.x, epsilon = 1e-9);
            assert_relative_eq!(p.y, q.y, epsilon = 1e-9);
        }
        let last = frames.last().unwrap();
        assert_relative_eq!(last.area(), end.area(), epsilon = 1e-6 * end.area());
        assert!(last.is_simple());
    }

    #[test]
    fn test_deform_steps_pairs_opposite_orientations() {
        let (start, end) = nerve_and_target(60);
        let mut reversed = end.points().to_vec();
        reversed.reverse();
        let end = Trace::new(reversed).unwrap();
        assert!(!end.is_ccw());

        let frames = Deformable::deform_steps(&start, &end, 5, None).unwrap();
        for frame in &frames {
            assert!(frame.is_simple());
        }
        assert_relative_eq!(frames[4].area(), end.area(), epsilon = 1e-6 * end.area());
    }

    #[test]
    fn test_deform_steps_preconditions() {
        let (start, _) = nerve_and_target(60);
        let other = circle_trace(500.0, 61, (0.0, 0.0));
        assert!(matches!(
            Deformable::deform_steps(&start, &other, 10, None),
            Err(MorphError::Precondition(_))
        ));
        assert!(matches!(
            Deformable::deform_steps(&start, &start, 1, None),
            Err(MorphError::InvalidArgument(_))
        ));
        assert!(matches!(
            Deformable::deform_steps(&start, &start, 10, Some(1.5)),
            Err(MorphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_deform_ratio_truncates() {
        let (start, end) = nerve_and_target(60);
        assert_eq!(Deformable::deform_steps(&start, &end, 10, Some(0.5)).unwrap().len(), 5);
        assert_eq!(Deformable::deform_steps(&start, &end, 10, Some(0.0)).unwrap().len(), 1);
        assert_eq!(Deformable::deform_steps(&start, &end, 10, Some(1.0)).unwrap().len(), 10);
    }

    #[test]
    fn test_static_boundary_moves_nothing() {
        let (start, _) = nerve_and_target(80);
        let contents = vec![
            circle_trace(100.0, 32, (-300.0, 0.0)),
            circle_trace(100.0, 32, (300.0, 50.0)),
        ];
        let deformable = Deformable::new(start.clone(), start, contents);
        let result = deformable
            .deform(&quick_params(10.0), &mut NoopObserver, &CancelToken::new())
            .unwrap();
        for (m, r) in result.movements.iter().zip(&result.rotations) {
            assert_relative_eq!(m.norm(), 0.0, epsilon = 1e-9);
            assert_relative_eq!(*r, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fake_world_bookkeeping() {
        let (start, end) = nerve_and_target(40);
        let deformable = Deformable::new(start, end, vec![circle_trace(50.0, 24, (0.0, 0.0))]);
        let params = quick_params(0.0);
        let mut world = DriftWorld::default();
        let result = deformable
            .deform_in(&mut world, &params, &mut NoopObserver, &CancelToken::new())
            .unwrap();

        let expected = (params.morph_count * params.morph_index_step + params.settle_steps) * SUBSTEPS;
        assert_eq!(result.steps, expected);
        assert_eq!(world.steps, expected);
        assert_relative_eq!(result.movements[0].x, expected as f64, epsilon = 1e-9);
        assert_relative_eq!(result.rotations[0], 0.01 * expected as f64, epsilon = 1e-9);
        assert_eq!(world.added_walls, params.morph_count);
        assert_eq!(world.removed_walls.len(), params.morph_count);
    }

    #[test]
    fn test_cancellation() {
        let (start, end) = nerve_and_target(40);
        let deformable = Deformable::new(start, end, vec![circle_trace(50.0, 24, (0.0, 0.0))]);

        let token = CancelToken::new();
        token.cancel();
        let err = deformable
            .deform_in(&mut DriftWorld::default(), &quick_params(0.0), &mut NoopObserver, &token)
            .unwrap_err();
        assert!(matches!(err, MorphError::Cancelled { steps: 0 }));

        let token = CancelToken::new();
        let mut recorder = Recorder {
            cancel_at: Some((3, token.clone())),
            ..Recorder::default()
        };
        let err = deformable
            .deform_in(&mut DriftWorld::default(), &quick_params(0.0), &mut recorder, &token)
            .unwrap_err();
        // frames 0..=2 ran in full
        assert!(matches!(err, MorphError::Cancelled { steps } if steps == 3 * 5 * SUBSTEPS));
        assert_eq!(recorder.settled, 0);
    }

    #[test]
    fn test_observer_does_not_change_result() {
        let (start, end) = nerve_and_target(80);
        let contents = vec![circle_trace(100.0, 32, (700.0, 0.0))];
        let deformable = Deformable::new(start, end, contents);
        let params = quick_params(10.0);

        let quiet = deformable.deform(&params, &mut NoopObserver, &CancelToken::new()).unwrap();
        let mut recorder = Recorder::default();
        let watched = deformable.deform(&params, &mut recorder, &CancelToken::new()).unwrap();

        assert_eq!(quiet, watched);
        assert_eq!(recorder.frames.len(), params.morph_count);
        assert_eq!(recorder.settled, 1);
    }

    #[test]
    fn test_contracting_boundary_pushes_fascicles_inward() {
        let (start, end) = nerve_and_target(100);
        let mut fascicles = vec![
            Fascicle::new(circle_trace(100.0, 32, (-700.0, 0.0)), vec![circle_trace(60.0, 24, (-700.0, 0.0))], None)
                .unwrap(),
            Fascicle::new(circle_trace(100.0, 32, (700.0, 0.0)), vec![circle_trace(60.0, 24, (700.0, 0.0))], None)
                .unwrap(),
        ];
        let contents = fascicles.iter().map(|f| f.outer().clone()).collect();
        let deformable = Deformable::new(start, end.clone(), contents);
        let result = deformable
            .deform(&quick_params(10.0), &mut NoopObserver, &CancelToken::new())
            .unwrap();

        assert!(result.movements[0].x > 20.0);
        assert!(result.movements[1].x < -20.0);

        for (f, (m, r)) in fascicles.iter_mut().zip(result.movements.iter().zip(&result.rotations)) {
            f.shift(m);
            f.rotate(*r, TransformCenter::Centroid);
        }
        let nerve = Nerve::new(end);
        assert!(fascicles.iter().all(|f| f.within_nerve(&nerve)));
        assert!(!fascicles[0].intersects(&fascicles[1]));
    }

    #[test]
    fn test_from_slide_keeps_point_count() {
        let slide = Slide::new(
            vec![Fascicle::new(circle_trace(50.0, 24, (0.0, 0.0)), vec![], Some(1.2)).unwrap()],
            Some(Nerve::new(ellipse_trace(400.0, 200.0, 77, 0.2, (10.0, 10.0)))),
        )
        .unwrap();
        let deformable = Deformable::from_slide(&slide, ReshapeMode::Circle, 10.0, 5.0).unwrap();
        assert_eq!(deformable.end().count(), 77);
        assert_relative_eq!(deformable.end().mean_radius().unwrap(), 305.0, epsilon = 1e-3);
        assert_eq!(deformable.contents().len(), 1);
    }
}
