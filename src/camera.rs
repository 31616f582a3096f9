use glam::{Mat4, Vec3};

/// Physical lens data used by depth of field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraLens {
    /// Focal length in millimetres.
    pub focal_length: f32,
    /// Aperture f-number. Zero or negative disables depth of field.
    pub f_stop: f32,
    /// Distance to the focal plane in world units.
    pub focus_distance: f32,
    /// Sensor width in millimetres.
    pub sensor_width: f32,
}

impl Default for CameraLens {
    fn default() -> Self {
        Self {
            focal_length: 50.0,
            f_stop: 2.8,
            focus_distance: 10.0,
            sensor_width: 36.0,
        }
    }
}

/// The view the effects are rendered for.
///
/// Besides the matrices, the effect modules care about *how* the scene is
/// being looked at: motion blur and depth of field only run when the view
/// looks through a scene camera, and temporal reprojection is skipped while
/// the user is navigating.
#[derive(Clone, Copy, Debug)]
pub struct CameraState {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// The view looks through a scene camera object (not a free viewport).
    pub camera_view: bool,
    /// The user is currently orbiting/panning the view.
    pub navigating: bool,
    pub lens: Option<CameraLens>,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2, // 90 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
            camera_view: false,
            navigating: false,
            lens: None,
        }
    }
}

impl CameraState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        self.forward = (Vec3::new(target_x, target_y, target_z) - self.position).normalize_or_zero();
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    /// Marks the view as looking through a scene camera with the given lens.
    pub fn through_camera(mut self, lens: Option<CameraLens>) -> Self {
        self.camera_view = true;
        self.lens = lens;
        self
    }

    pub fn navigating(mut self, navigating: bool) -> Self {
        self.navigating = navigating;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    /// Projection * view ("persmat").
    pub fn persmat(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Inverse of [`persmat`](Self::persmat).
    pub fn persinv(&self) -> Mat4 {
        self.persmat().inverse()
    }

    /// Whether the lens produces a visible blur.
    pub fn has_depth_of_field(&self) -> bool {
        self.lens.is_some_and(|lens| lens.f_stop > 0.0 && lens.focal_length > 0.0)
    }
}
