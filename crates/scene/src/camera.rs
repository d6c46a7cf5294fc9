/// Orbit camera looking at the height mesh.
///
/// The default is a fixed oblique view from the near (+z) edge of the grid.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OrbitCamera {
    pub yaw_rad: f64,
    pub pitch_rad: f64,
    pub distance: f64,
    pub target: [f64; 3],
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            yaw_rad: std::f64::consts::FRAC_PI_2,
            pitch_rad: 0.7,
            distance: 2.6,
            target: [0.0, 0.0, 0.0],
        }
    }
}

const ORBIT_SPEED: f64 = 0.005;
const PITCH_LIMIT: f64 = 1.55;

impl OrbitCamera {
    pub fn eye(&self) -> [f64; 3] {
        let (sin_p, cos_p) = self.pitch_rad.sin_cos();
        let (sin_y, cos_y) = self.yaw_rad.sin_cos();
        let [tx, ty, tz] = self.target;
        [
            tx + self.distance * cos_p * cos_y,
            ty + self.distance * sin_p,
            tz + self.distance * cos_p * sin_y,
        ]
    }

    /// Rotate by a pointer delta in pixels.
    pub fn orbit(&mut self, delta_x_px: f64, delta_y_px: f64) {
        self.yaw_rad += delta_x_px * ORBIT_SPEED;
        self.pitch_rad =
            (self.pitch_rad + delta_y_px * ORBIT_SPEED).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Dolly by a wheel `deltaY`.
    pub fn zoom(&mut self, wheel_delta_y: f64) {
        let zoom = (wheel_delta_y * 0.0015).exp();
        self.distance = (self.distance * zoom).clamp(0.25, 50.0);
    }

    /// View-projection matrix for a surface of the given size.
    ///
    /// Stored as four columns (`m[col][row]`), the layout WGSL expects for a
    /// `mat4x4<f32>` uniform. Clip depth runs from 0 at the near plane to 1.
    pub fn view_proj(&self, surface_width: f64, surface_height: f64) -> [[f32; 4]; 4] {
        let aspect = if surface_height <= 0.0 {
            1.0
        } else {
            (surface_width / surface_height).max(1e-6)
        };
        let view = look_at(self.eye(), self.target, [0.0, 1.0, 0.0]);
        let proj = perspective(45f64.to_radians(), aspect, 0.01, 100.0);
        mul(&proj, &view)
    }
}

type Mat4 = [[f32; 4]; 4];

fn mul(a: &Mat4, b: &Mat4) -> Mat4 {
    std::array::from_fn(|col| {
        std::array::from_fn(|row| (0..4).map(|k| a[k][row] * b[col][k]).sum())
    })
}

fn perspective(fov_y_rad: f64, aspect: f64, near: f64, far: f64) -> Mat4 {
    let focal = 1.0 / (0.5 * fov_y_rad).tan();
    let depth = far / (near - far);
    let mut m = [[0.0f32; 4]; 4];
    m[0][0] = (focal / aspect) as f32;
    m[1][1] = focal as f32;
    m[2][2] = depth as f32;
    m[2][3] = -1.0;
    m[3][2] = (near * depth) as f32;
    m
}

/// Right-handed view matrix; the camera looks down its local -z.
fn look_at(eye: [f64; 3], target: [f64; 3], up: [f64; 3]) -> Mat4 {
    let dot = |a: [f64; 3], b: [f64; 3]| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    let cross = |a: [f64; 3], b: [f64; 3]| {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    };
    let unit = |a: [f64; 3]| {
        let len = dot(a, a).sqrt();
        if len > 0.0 { a.map(|c| c / len) } else { [0.0; 3] }
    };

    let forward = unit(std::array::from_fn(|i| target[i] - eye[i]));
    let right = unit(cross(forward, up));
    let true_up = cross(right, forward);

    let mut m = [[0.0f32; 4]; 4];
    for i in 0..3 {
        m[i] = [
            right[i] as f32,
            true_up[i] as f32,
            -forward[i] as f32,
            0.0,
        ];
    }
    m[3] = [
        -dot(right, eye) as f32,
        -dot(true_up, eye) as f32,
        dot(forward, eye) as f32,
        1.0,
    ];
    m
}
