//! Phong light sources and how they are written into a program's uniforms.

use glam::{Mat4, Vec3};

use crate::camera::Camera;
use crate::uniforms::UniformSink;

/// Size of the `pointLights` array declared by the lit shaders.
pub const MAX_POINT_LIGHTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightColors {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

impl Default for LightColors {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.7),
            specular: Vec3::ONE,
        }
    }
}

/// Distance falloff `1 / (constant + linear * d + quadratic * d^2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    /// Covers roughly 100 units.
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.045,
            quadratic: 0.0075,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Directional {
        direction: Vec3,
        colors: LightColors,
    },
    Point {
        position: Vec3,
        colors: LightColors,
        attenuation: Attenuation,
    },
    Spot {
        position: Vec3,
        direction: Vec3,
        colors: LightColors,
        attenuation: Attenuation,
        /// Cosine of the inner cone angle.
        cut_off: f32,
        /// Cosine of the outer cone angle.
        outer_cut_off: f32,
    },
}

impl Light {
    pub fn directional(direction: Vec3) -> Self {
        Self::Directional {
            direction,
            colors: LightColors::default(),
        }
    }

    pub fn point(position: Vec3) -> Self {
        Self::Point {
            position,
            colors: LightColors::default(),
            attenuation: Attenuation::default(),
        }
    }

    /// Spot light with its cone given in degrees.
    pub fn spot(position: Vec3, direction: Vec3, inner_deg: f32, outer_deg: f32) -> Self {
        Self::Spot {
            position,
            direction,
            colors: LightColors::default(),
            attenuation: Attenuation::default(),
            cut_off: inner_deg.to_radians().cos(),
            outer_cut_off: outer_deg.to_radians().cos(),
        }
    }

    pub fn colors(&self) -> &LightColors {
        match self {
            Self::Directional { colors, .. }
            | Self::Point { colors, .. }
            | Self::Spot { colors, .. } => colors,
        }
    }

    pub fn position(&self) -> Option<Vec3> {
        match *self {
            Self::Directional { .. } => None,
            Self::Point { position, .. } | Self::Spot { position, .. } => Some(position),
        }
    }

    /// Writes every field of this light below `prefix`, e.g. `pointLights[1]`.
    pub fn wire(&self, sink: &mut impl UniformSink, prefix: &str) {
        let colors = self.colors();
        sink.set_vec3(&format!("{prefix}.ambient"), colors.ambient);
        sink.set_vec3(&format!("{prefix}.diffuse"), colors.diffuse);
        sink.set_vec3(&format!("{prefix}.specular"), colors.specular);

        match *self {
            Self::Directional { direction, .. } => {
                sink.set_vec3(&format!("{prefix}.direction"), direction);
            }
            Self::Point {
                position,
                attenuation,
                ..
            } => {
                sink.set_vec3(&format!("{prefix}.position"), position);
                wire_attenuation(sink, prefix, &attenuation);
            }
            Self::Spot {
                position,
                direction,
                attenuation,
                cut_off,
                outer_cut_off,
                ..
            } => {
                sink.set_vec3(&format!("{prefix}.position"), position);
                sink.set_vec3(&format!("{prefix}.direction"), direction);
                sink.set_f32(&format!("{prefix}.cutOff"), cut_off);
                sink.set_f32(&format!("{prefix}.outerCutOff"), outer_cut_off);
                wire_attenuation(sink, prefix, &attenuation);
            }
        }
    }
}

fn wire_attenuation(sink: &mut impl UniformSink, prefix: &str, attenuation: &Attenuation) {
    sink.set_f32(&format!("{prefix}.constant"), attenuation.constant);
    sink.set_f32(&format!("{prefix}.linear"), attenuation.linear);
    sink.set_f32(&format!("{prefix}.quadratic"), attenuation.quadratic);
}

/// Surface response. Diffuse color comes from texture unit 0 and the
/// specular map from unit 1; `specular` scales the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub specular: Vec3,
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            specular: Vec3::splat(0.5),
            shininess: 32.0,
        }
    }
}

impl Material {
    pub fn wire(&self, sink: &mut impl UniformSink) {
        sink.set_vec3("material.specular", self.specular);
        sink.set_f32("material.shininess", self.shininess);
    }
}

/// All lights of a scene.
///
/// `light` is the single point light of the one-light lesson; the others map
/// onto the multi-light shader's `dirLight`, `pointLights` and `spotLight`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightRig {
    pub directional: Option<Light>,
    pub points: Vec<Light>,
    pub spot: Option<Light>,
    pub light: Option<Light>,
}

impl LightRig {
    pub fn wire(&self, sink: &mut impl UniformSink) {
        if let Some(light) = &self.directional {
            light.wire(sink, "dirLight");
        }
        let count = self.points.len().min(MAX_POINT_LIGHTS);
        for (index, light) in self.points.iter().take(count).enumerate() {
            light.wire(sink, &format!("pointLights[{index}]"));
        }
        sink.set_i32("numPointLights", count as i32);
        if let Some(light) = &self.spot {
            light.wire(sink, "spotLight");
        }
        if let Some(light) = &self.light {
            light.wire(sink, "light");
        }
    }

    /// Moves the spot light onto the camera, pointing where it looks.
    pub fn follow_camera(&mut self, camera: &Camera) {
        if let Some(Light::Spot {
            position,
            direction,
            ..
        }) = &mut self.spot
        {
            *position = camera.position();
            *direction = camera.direction();
        }
    }

    /// Positions of every point light, used to place the lamp cubes.
    pub fn lamp_positions(&self) -> Vec<Vec3> {
        self.points
            .iter()
            .chain(self.light.iter())
            .filter_map(Light::position)
            .collect()
    }
}

/// Per-frame transforms shared by every draw of a program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_pos: Vec3,
}

impl FrameUniforms {
    pub fn from_camera(camera: &Camera, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection(aspect, near, far),
            view_pos: camera.position(),
        }
    }

    pub fn wire(&self, sink: &mut impl UniformSink) {
        sink.set_mat4("view", self.view);
        sink.set_mat4("projection", self.projection);
        sink.set_vec3("viewPos", self.view_pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat3, Vec2, Vec4};
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Mat4(Mat4),
        Vec3(Vec3),
        F32(f32),
        I32(i32),
    }

    #[derive(Default)]
    struct Recorder {
        values: HashMap<String, Value>,
    }

    impl UniformSink for Recorder {
        fn set_mat4(&mut self, name: &str, value: Mat4) {
            self.values.insert(name.into(), Value::Mat4(value));
        }
        fn set_mat3(&mut self, _: &str, _: Mat3) {}
        fn set_vec4(&mut self, _: &str, _: Vec4) {}
        fn set_vec3(&mut self, name: &str, value: Vec3) {
            self.values.insert(name.into(), Value::Vec3(value));
        }
        fn set_vec2(&mut self, _: &str, _: Vec2) {}
        fn set_f32(&mut self, name: &str, value: f32) {
            self.values.insert(name.into(), Value::F32(value));
        }
        fn set_i32(&mut self, name: &str, value: i32) {
            self.values.insert(name.into(), Value::I32(value));
        }
    }

    #[test]
    fn point_light_uses_indexed_prefix() {
        let mut sink = Recorder::default();
        Light::point(Vec3::new(1.0, 2.0, 3.0)).wire(&mut sink, "pointLights[2]");

        assert_eq!(
            sink.values["pointLights[2].position"],
            Value::Vec3(Vec3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(sink.values["pointLights[2].linear"], Value::F32(0.045));
        assert_eq!(sink.values["pointLights[2].quadratic"], Value::F32(0.0075));
        assert_eq!(sink.values["pointLights[2].ambient"], Value::Vec3(Vec3::splat(0.2)));
        assert!(!sink.values.contains_key("pointLights[2].direction"));
    }

    #[test]
    fn spot_cutoffs_are_cosines() {
        let mut sink = Recorder::default();
        Light::spot(Vec3::ZERO, Vec3::NEG_Z, 9.5, 12.5).wire(&mut sink, "spotLight");

        let Value::F32(inner) = sink.values["spotLight.cutOff"] else {
            panic!("cutOff not written");
        };
        let Value::F32(outer) = sink.values["spotLight.outerCutOff"] else {
            panic!("outerCutOff not written");
        };
        assert!((inner - 9.5f32.to_radians().cos()).abs() < 1e-6);
        assert!(inner > outer);
    }

    #[test]
    fn rig_writes_every_light_and_count() {
        let rig = LightRig {
            directional: Some(Light::directional(Vec3::NEG_Y)),
            points: (0..6).map(|i| Light::point(Vec3::splat(i as f32))).collect(),
            spot: Some(Light::spot(Vec3::ZERO, Vec3::NEG_Z, 9.5, 12.5)),
            light: None,
        };
        let mut sink = Recorder::default();
        rig.wire(&mut sink);

        assert_eq!(sink.values["numPointLights"], Value::I32(4));
        assert!(sink.values.contains_key("pointLights[3].position"));
        assert!(!sink.values.contains_key("pointLights[4].position"));
        assert_eq!(sink.values["dirLight.direction"], Value::Vec3(Vec3::NEG_Y));
        assert!(sink.values.contains_key("spotLight.outerCutOff"));
    }

    #[test]
    fn spot_follows_camera() {
        let mut rig = LightRig {
            spot: Some(Light::spot(Vec3::ZERO, Vec3::X, 9.5, 12.5)),
            ..LightRig::default()
        };
        let camera = Camera::new();
        rig.follow_camera(&camera);
        match rig.spot {
            Some(Light::Spot {
                position,
                direction,
                ..
            }) => {
                assert_eq!(position, camera.position());
                assert_eq!(direction, camera.direction());
            }
            other => panic!("unexpected spot {other:?}"),
        }
    }

    #[test]
    fn frame_uniforms_carry_camera_position() {
        let camera = Camera::new();
        let frame = FrameUniforms::from_camera(&camera, 685.0 / 500.0, 0.1, 100.0);
        let mut sink = Recorder::default();
        frame.wire(&mut sink);
        assert_eq!(sink.values["viewPos"], Value::Vec3(Vec3::new(0.0, 0.0, 3.0)));
        assert_eq!(sink.values["view"], Value::Mat4(camera.view_matrix()));
    }

    #[test]
    fn material_writes_shininess() {
        let mut sink = Recorder::default();
        Material::default().wire(&mut sink);
        assert_eq!(sink.values["material.shininess"], Value::F32(32.0));
    }
}
