use cgmath::{Matrix4, Point3, SquareMatrix, Vector3};

/// cgmath produces OpenGL clip space (z in -1..1); wgpu wants z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const FOV_MIN_DEG: f32 = 12.0;
const FOV_MAX_DEG: f32 = 90.0;

pub struct CameraMotion {
    pub move_speed: f32,
}

impl Default for CameraMotion {
    fn default() -> CameraMotion {
        CameraMotion { move_speed: 8.0 }
    }
}

/// Held key state, set by the input handler and integrated every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct CameraInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

/// Axis-aligned fly camera looking down +z.
pub struct CameraState {
    pub position: Point3<f32>,
    pub fov_deg: f32,
}

impl Default for CameraState {
    fn default() -> CameraState {
        CameraState {
            position: Point3::new(0.0, 0.0, -10.0),
            fov_deg: 45.0,
        }
    }
}

impl CameraState {
    pub fn update(&mut self, dt: f32, input: &CameraInput, motion: &CameraMotion) {
        let step = motion.move_speed * dt;
        if input.forward && !input.back {
            self.position.z += step;
        } else if input.back && !input.forward {
            self.position.z -= step;
        }
        if input.right && !input.left {
            self.position.x += step;
        } else if input.left && !input.right {
            self.position.x -= step;
        }
        if input.up && !input.down {
            self.position.y += step;
        } else if input.down && !input.up {
            self.position.y -= step;
        }
    }

    /// Mouse wheel zoom. Positive scroll narrows the field of view.
    pub fn zoom(&mut self, scroll_lines: f32) {
        self.fov_deg = (self.fov_deg - scroll_lines).clamp(FOV_MIN_DEG, FOV_MAX_DEG);
    }

    fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(
            self.position,
            self.position + Vector3::unit_z(),
            Vector3::unit_y(),
        )
    }

    pub fn view_proj(&self, aspect: f32) -> Matrix4<f32> {
        let proj = cgmath::perspective(cgmath::Deg(self.fov_deg), aspect, 0.1, 1000.0);
        OPENGL_TO_WGPU_MATRIX * proj * self.view()
    }

    /// Inverse view matrix; its columns carry the camera basis the billboard
    /// shader expands quads with.
    pub fn inv_view(&self) -> Matrix4<f32> {
        match self.view().invert() {
            Some(m) => m,
            None => Matrix4::identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasd_moves_along_axes() {
        let mut cam = CameraState::default();
        let motion = CameraMotion::default();
        let input = CameraInput {
            forward: true,
            right: true,
            ..CameraInput::default()
        };
        cam.update(0.5, &input, &motion);
        assert_eq!(cam.position.z, -10.0 + 4.0);
        assert_eq!(cam.position.x, 4.0);
        assert_eq!(cam.position.y, 0.0);
    }

    #[test]
    fn opposed_keys_cancel() {
        let mut cam = CameraState::default();
        let motion = CameraMotion::default();
        let input = CameraInput {
            up: true,
            down: true,
            ..CameraInput::default()
        };
        cam.update(1.0, &input, &motion);
        assert_eq!(cam.position.y, 0.0);
    }

    #[test]
    fn zoom_clamps_fov() {
        let mut cam = CameraState::default();
        cam.zoom(100.0);
        assert_eq!(cam.fov_deg, FOV_MIN_DEG);
        cam.zoom(-500.0);
        assert_eq!(cam.fov_deg, FOV_MAX_DEG);
    }

    #[test]
    fn inv_view_recovers_camera_position() {
        let cam = CameraState::default();
        let inv = cam.inv_view();
        // Translation column of the inverse view is the eye position.
        assert!((inv.w.x - cam.position.x).abs() < 1e-5);
        assert!((inv.w.y - cam.position.y).abs() < 1e-5);
        assert!((inv.w.z - cam.position.z).abs() < 1e-5);
    }
}
