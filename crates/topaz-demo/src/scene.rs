//! Scene data written into the terrain's storage blocks.

use bytemuck::{Pod, Zeroable};

/// Column-major 4x4 matrix, as GLSL lays out `mat4`.
pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// One element of `mvp_element[]`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Mvp {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

/// The five vec4s of `scenery_block`, in declaration order.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Scenery {
    pub snow_colour: [f32; 4],
    pub terrain_colour: [f32; 4],
    pub water_colour: [f32; 4],
    pub tessellation_options: [f32; 4],
    /// displacement factor, snow threshold, water threshold, water exponent
    pub magic: [f32; 4],
}

impl Default for Scenery {
    fn default() -> Self {
        Self {
            snow_colour: [0.27, 0.0, 0.0, 1.0],
            terrain_colour: [0.0, 0.0, 0.0, 1.0],
            water_colour: [1.0, 0.47, 0.0, 1.0],
            tessellation_options: [64.0; 4],
            magic: [0.625, 8900.0, 4850.0, 64.0],
        }
    }
}

pub struct Camera {
    pub position: [f32; 3],
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0, 6000.0, 0.0],
            fov: 1.57,
            aspect_ratio: 1920.0 / 1080.0,
            near: 0.1,
            far: 20000.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        let [x, y, z] = self.position;
        translation([-x, -y, -z])
    }

    /// OpenGL-style perspective projection (clip z in -w..w).
    pub fn projection(&self) -> Mat4 {
        let f = 1.0 / (self.fov / 2.0).tan();
        let depth = self.near - self.far;
        [
            [f / self.aspect_ratio, 0.0, 0.0, 0.0],
            [0.0, f, 0.0, 0.0],
            [0.0, 0.0, (self.far + self.near) / depth, -1.0],
            [0.0, 0.0, 2.0 * self.far * self.near / depth, 0.0],
        ]
    }
}

pub fn translation(t: [f32; 3]) -> Mat4 {
    let mut m = IDENTITY;
    m[3] = [t[0], t[1], t[2], 1.0];
    m
}

pub fn scale(s: f32) -> Mat4 {
    let mut m = IDENTITY;
    for (i, column) in m.iter_mut().enumerate().take(3) {
        column[i] = s;
    }
    m
}

pub fn mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (c, column) in out.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = (0..4).map(|k| a[k][r] * b[c][k]).sum();
        }
    }
    out
}
