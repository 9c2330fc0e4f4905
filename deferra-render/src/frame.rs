use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use cgmath::{Angle, InnerSpace, Matrix4, Point3, Rad, Vector3};
use static_assertions::assert_eq_size;

use crate::{resource::BackBuffer, settings::RenderSettings};

/// Maps the OpenGL clip space produced by `cgmath::perspective` to Vulkan's:
/// Y points down and depth goes from 0 to 1.
#[rustfmt::skip]
const OPENGL_TO_VULKAN: Matrix4<f32> = Matrix4::new(
    1.0,  0.0, 0.0, 0.0,
    0.0, -1.0, 0.0, 0.0,
    0.0,  0.0, 0.5, 0.0,
    0.0,  0.0, 0.5, 1.0,
);

/// Per-frame shader constants, pushed as-is.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

assert_eq_size!(FrameConstants, [u8; 128]);

/// A first-person camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    /// Rotation around the Y axis. Zero looks down negative Z.
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
    pub fov_y: Rad<f32>,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    const MAX_PITCH: Rad<f32> = Rad(std::f32::consts::FRAC_PI_2 - 0.01);

    pub fn new(fov_y: Rad<f32>, aspect_ratio: f32, near: f32, far: f32) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 0.0),
            yaw: Rad(0.0),
            pitch: Rad(0.0),
            fov_y,
            aspect_ratio,
            near,
            far,
        }
    }

    pub fn from_settings(settings: &RenderSettings, aspect_ratio: f32) -> Self {
        Self::new(
            Rad(settings.field_of_view),
            aspect_ratio,
            settings.near_plane,
            settings.far_plane,
        )
    }

    pub fn forward(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.sin_cos();
        Vector3::new(yaw_sin * pitch_cos, pitch_sin, -yaw_cos * pitch_cos).normalize()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.forward().cross(Vector3::unit_y()).normalize()
    }

    /// Moves along the view direction.
    pub fn walk(&mut self, distance: f32) {
        self.position += self.forward() * distance;
    }

    /// Moves sideways.
    pub fn strafe(&mut self, distance: f32) {
        self.position += self.right() * distance;
    }

    /// Turns the camera. Pitch stops short of straight up or down.
    pub fn rotate(&mut self, yaw: Rad<f32>, pitch: Rad<f32>) {
        self.yaw = (self.yaw + yaw).normalize();
        self.pitch = Rad((self.pitch + pitch).0.clamp(-Self::MAX_PITCH.0, Self::MAX_PITCH.0));
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_VULKAN * cgmath::perspective(self.fov_y, self.aspect_ratio, self.near, self.far)
    }

    pub fn constants(&self) -> FrameConstants {
        FrameConstants {
            view: self.view_matrix().into(),
            projection: self.projection_matrix().into(),
        }
    }
}

/// Updates the camera once per frame, before anything is recorded.
pub trait FrameUpdater: Send {
    fn update(&mut self, delta_seconds: f32, camera: &mut Camera);
}

impl<F> FrameUpdater for F
where
    F: FnMut(f32, &mut Camera) + Send,
{
    fn update(&mut self, delta_seconds: f32, camera: &mut Camera) {
        self(delta_seconds, camera)
    }
}

/// Runs an updater in fixed steps, catching up on the time that passed.
///
/// A frame shorter than one step updates nothing; a long frame updates as
/// many whole steps as fit and keeps the remainder for the next frame.
pub struct FixedTimestep<U> {
    inner: U,
    step: f32,
    accumulator: f32,
}

impl<U: FrameUpdater> FixedTimestep<U> {
    pub fn new(step_seconds: f32, inner: U) -> Self {
        assert!(step_seconds > 0.0, "fixed time step must be positive");
        Self {
            inner,
            step: step_seconds,
            accumulator: 0.0,
        }
    }
}

impl<U: FrameUpdater> FrameUpdater for FixedTimestep<U> {
    fn update(&mut self, delta_seconds: f32, camera: &mut Camera) {
        self.accumulator += delta_seconds;
        while self.accumulator >= self.step {
            self.inner.update(self.step, camera);
            self.accumulator -= self.step;
        }
    }
}

/// Measures time between frames.
pub struct FrameTimer {
    start: Instant,
    last: Instant,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now }
    }

    /// Returns the seconds since the previous tick and since creation.
    pub fn tick(&mut self) -> (f32, f32) {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        (delta, now.duration_since(self.start).as_secs_f32())
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything passes need to know about the frame being recorded.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub frame_number: u64,
    pub constants: FrameConstants,
    pub delta_seconds: f32,
    pub elapsed_seconds: f32,
    pub back_buffer_index: u32,
    pub back_buffer: BackBuffer,
}

#[cfg(test)]
mod tests {
    use std::{
        f32::consts::FRAC_PI_2,
        sync::{Arc, Mutex},
    };

    use cgmath::Vector4;

    use super::*;

    fn camera() -> Camera {
        Camera::new(Rad(FRAC_PI_2), 1.0, 1.0, 100.0)
    }

    fn project(constants: &FrameConstants, point: Point3<f32>) -> Vector4<f32> {
        let view = Matrix4::from(constants.view);
        let projection = Matrix4::from(constants.projection);
        projection * view * point.to_homogeneous()
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 1e-5, "{actual} != {expected}");
    }

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = camera();
        let forward = camera.forward();
        let right = camera.right();
        assert_close(forward.z, -1.0);
        assert_close(forward.x, 0.0);
        assert_close(right.x, 1.0);
        assert_close(right.z, 0.0);
    }

    #[test]
    fn test_walk_and_strafe() {
        let mut camera = camera();
        camera.walk(2.0);
        camera.strafe(-1.0);
        assert_close(camera.position.x, -1.0);
        assert_close(camera.position.y, 0.0);
        assert_close(camera.position.z, -2.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = camera();
        camera.rotate(Rad(0.0), Rad(10.0));
        assert!(camera.pitch.0 < FRAC_PI_2);
        assert!(camera.forward().y > 0.99);
    }

    #[test]
    fn test_depth_maps_to_zero_one() {
        let constants = camera().constants();

        let near = project(&constants, Point3::new(0.0, 0.0, -1.0));
        let far = project(&constants, Point3::new(0.0, 0.0, -100.0));

        assert_close(near.z / near.w, 0.0);
        assert_close(far.z / far.w, 1.0);
    }

    #[test]
    fn test_up_is_negative_y_in_clip_space() {
        let constants = camera().constants();
        let up = project(&constants, Point3::new(0.0, 1.0, -2.0));
        assert!(up.y / up.w < 0.0);
    }

    #[test]
    fn test_constants_are_128_bytes() {
        assert_eq!(bytemuck::bytes_of(&camera().constants()).len(), 128);
    }

    #[test]
    fn test_fixed_timestep_catches_up() {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let mut updater = FixedTimestep::new(0.5, {
            let steps = Arc::clone(&steps);
            move |delta: f32, _: &mut Camera| steps.lock().unwrap().push(delta)
        });
        let mut camera = camera();

        updater.update(0.25, &mut camera);
        assert!(steps.lock().unwrap().is_empty());

        updater.update(1.0, &mut camera);
        assert_eq!(*steps.lock().unwrap(), [0.5, 0.5]);

        updater.update(0.25, &mut camera);
        assert_eq!(steps.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_closure_updater_moves_camera() {
        let mut updater = |delta: f32, camera: &mut Camera| camera.walk(delta);
        let mut camera = camera();
        FrameUpdater::update(&mut updater, 3.0, &mut camera);
        assert_close(camera.position.z, -3.0);
    }
}
