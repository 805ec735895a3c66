use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use log::{info, warn};
use rand::Rng;
use thiserror::Error;

use crate::assets::{AssetRoot, ImageData};
use crate::camera::CameraMode;
use crate::lighting::{Light, LightRig, Material, MAX_POINT_LIGHTS};
use crate::mesh::{self, MeshData, MeshError};
use crate::shader::{load_program, LinkedProgram};

pub const BRICK_TEXTURE: &str = "texture/brick_01.png";
pub const SPECULAR_TEXTURE: &str = "texture/spec_img.png";

const CUBE_COUNT: usize = 10;
const LAMP_SCALE: f32 = 0.2;

/// One of the selectable scene configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lesson {
    Triangle,
    TexturedQuad,
    Cube,
    LitCube,
    #[default]
    MultiLight,
}

impl Lesson {
    pub const ALL: [Lesson; 5] = [
        Lesson::Triangle,
        Lesson::TexturedQuad,
        Lesson::Cube,
        Lesson::LitCube,
        Lesson::MultiLight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Triangle => "triangle",
            Self::TexturedQuad => "textured-quad",
            Self::Cube => "cube",
            Self::LitCube => "lit-cube",
            Self::MultiLight => "multi-light",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Triangle => "vertex-colored triangle",
            Self::TexturedQuad => "indexed quad with a brick texture",
            Self::Cube => "ten textured cubes, first-person camera",
            Self::LitCube => "Phong-lit cube next to its lamp",
            Self::MultiLight => "directional, four point and one spot light over ten cubes",
        }
    }

    pub fn camera_mode(self) -> CameraMode {
        match self {
            Self::Triangle | Self::TexturedQuad => CameraMode::Static,
            Self::Cube | Self::LitCube | Self::MultiLight => CameraMode::FirstPerson,
        }
    }
}

impl fmt::Display for Lesson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown lesson `{0}`; expected one of: triangle, textured-quad, cube, lit-cube, multi-light")]
pub struct UnknownLesson(pub String);

impl FromStr for Lesson {
    type Err = UnknownLesson;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lesson| lesson.name() == name)
            .ok_or_else(|| UnknownLesson(name.to_string()))
    }
}

/// Placement of one drawn instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneObject {
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl SceneObject {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let rotation = Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());
        let scale = Mat4::from_scale(self.scale);
        translation * rotation * scale
    }
}

/// Vertex and fragment source of a program, relative to the asset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSpec {
    /// `lamp` maps to `shader/lamp.vert.wgsl` and `shader/lamp.frag.wgsl`.
    pub fn named(name: &str) -> Self {
        Self {
            vertex: format!("shader/{name}.vert.wgsl"),
            fragment: format!("shader/{name}.frag.wgsl"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    Triangle,
    TexturedQuad,
    Cube,
    LampCube,
}

impl MeshKind {
    pub fn build(self) -> Result<MeshData, MeshError> {
        match self {
            Self::Triangle => mesh::triangle(),
            Self::TexturedQuad => mesh::textured_quad(),
            Self::Cube => mesh::cube(),
            Self::LampCube => mesh::lamp_cube(),
        }
    }
}

/// Which uniforms a group receives besides the model matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wiring {
    /// View and projection only.
    Transforms,
    /// Transforms, camera position, material and the light rig.
    Lit,
    /// Transforms and a flat light color.
    Lamp { color: Vec3 },
}

/// Every instance drawn with one program and one mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawGroup {
    pub program: ProgramSpec,
    pub mesh: MeshKind,
    /// Texture paths bound to units 0, 1, ...
    pub textures: Vec<String>,
    pub wiring: Wiring,
    pub instances: Vec<SceneObject>,
}

/// A lesson turned into data the render loop can walk.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDesc {
    pub lesson: Lesson,
    pub camera_mode: CameraMode,
    pub lights: LightRig,
    pub material: Material,
    pub groups: Vec<DrawGroup>,
}

impl SceneDesc {
    /// Builds the scene for `lesson`; random placements are drawn from `rng` once.
    pub fn build(lesson: Lesson, rng: &mut impl Rng) -> Self {
        let mut lights = LightRig::default();
        let groups = match lesson {
            Lesson::Triangle => vec![DrawGroup {
                program: ProgramSpec::named("triangle"),
                mesh: MeshKind::Triangle,
                textures: Vec::new(),
                wiring: Wiring::Transforms,
                instances: vec![SceneObject::default()],
            }],
            Lesson::TexturedQuad => vec![DrawGroup {
                program: ProgramSpec::named("textured"),
                mesh: MeshKind::TexturedQuad,
                textures: vec![BRICK_TEXTURE.to_string()],
                wiring: Wiring::Transforms,
                instances: vec![SceneObject::default()],
            }],
            Lesson::Cube => vec![DrawGroup {
                program: ProgramSpec::named("textured"),
                mesh: MeshKind::Cube,
                textures: vec![BRICK_TEXTURE.to_string()],
                wiring: Wiring::Transforms,
                instances: random_cubes(rng),
            }],
            Lesson::LitCube => {
                let light = Light::point(Vec3::new(1.2, 1.0, 2.0));
                lights.light = Some(light);
                vec![
                    DrawGroup {
                        program: ProgramSpec::named("lit_cube"),
                        mesh: MeshKind::Cube,
                        textures: vec![BRICK_TEXTURE.to_string()],
                        wiring: Wiring::Lit,
                        instances: vec![SceneObject::default()],
                    },
                    lamp_group(&lights),
                ]
            }
            Lesson::MultiLight => {
                lights.directional = Some(Light::directional(Vec3::NEG_Y));
                lights.points = (0..MAX_POINT_LIGHTS)
                    .map(|_| Light::point(random_vec3(rng, -5.0, 5.0)))
                    .collect();
                lights.spot = Some(Light::spot(Vec3::new(0.0, 0.0, 3.0), Vec3::NEG_Z, 9.5, 12.5));
                vec![
                    lamp_group(&lights),
                    DrawGroup {
                        program: ProgramSpec::named("main_cube"),
                        mesh: MeshKind::Cube,
                        textures: vec![BRICK_TEXTURE.to_string(), SPECULAR_TEXTURE.to_string()],
                        wiring: Wiring::Lit,
                        instances: random_cubes(rng),
                    },
                ]
            }
        };

        Self {
            lesson,
            camera_mode: lesson.camera_mode(),
            lights,
            material: Material::default(),
            groups,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.groups.iter().map(|group| group.instances.len()).sum()
    }
}

fn lamp_group(lights: &LightRig) -> DrawGroup {
    let instances = lights
        .lamp_positions()
        .into_iter()
        .map(|position| SceneObject {
            scale: Vec3::splat(LAMP_SCALE),
            ..SceneObject::at(position)
        })
        .collect();
    DrawGroup {
        program: ProgramSpec::named("lamp"),
        mesh: MeshKind::LampCube,
        textures: Vec::new(),
        wiring: Wiring::Lamp { color: Vec3::ONE },
        instances,
    }
}

fn random_cubes(rng: &mut impl Rng) -> Vec<SceneObject> {
    (0..CUBE_COUNT)
        .map(|_| SceneObject {
            position: random_vec3(rng, -3.0, 3.0),
            rotation: random_vec3(rng, 1.0, 45.0),
            scale: Vec3::ONE,
        })
        .collect()
}

fn random_vec3(rng: &mut impl Rng, min: f32, max: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(min..max),
        rng.gen_range(min..max),
        rng.gen_range(min..max),
    )
}

/// CPU-side resources of one draw group, validated against each other.
#[derive(Debug)]
pub struct LoadedGroup {
    pub program: LinkedProgram,
    pub mesh: MeshData,
}

/// Everything a lesson needs from disk, compiled, linked and decoded.
#[derive(Debug)]
pub struct LessonAssets {
    pub groups: Vec<LoadedGroup>,
    pub textures: BTreeMap<String, ImageData>,
}

impl LessonAssets {
    /// Loads and checks every program, mesh and texture of `scene`.
    pub fn load(scene: &SceneDesc, assets: &AssetRoot) -> Result<Self> {
        let mut programs: BTreeMap<(String, String), LinkedProgram> = BTreeMap::new();
        let mut textures = BTreeMap::new();
        let mut groups = Vec::with_capacity(scene.groups.len());

        for group in &scene.groups {
            let key = (group.program.vertex.clone(), group.program.fragment.clone());
            let program = match programs.get(&key) {
                Some(program) => program.clone(),
                None => {
                    let program = load_program(assets, &group.program.vertex, &group.program.fragment)
                        .with_context(|| {
                            format!(
                                "failed to build program {} + {} for lesson {}",
                                group.program.vertex, group.program.fragment, scene.lesson
                            )
                        })?;
                    programs.insert(key, program.clone());
                    program
                }
            };

            let mesh = group
                .mesh
                .build()
                .with_context(|| format!("failed to build {:?} mesh", group.mesh))?;
            program.check_layout(mesh.layout())?;

            let units = program.texture_units() as usize;
            if group.textures.len() > units {
                warn!(
                    "program {} samples {units} texture(s) but {} are bound; extra textures are ignored",
                    program.name(),
                    group.textures.len()
                );
            }
            for path in &group.textures {
                if !textures.contains_key(path) {
                    let image = assets
                        .load_image(path)
                        .with_context(|| format!("failed to load texture for lesson {}", scene.lesson))?;
                    textures.insert(path.clone(), image);
                }
            }

            groups.push(LoadedGroup { program, mesh });
        }

        info!(
            "lesson {} ready: {} group(s), {} texture(s)",
            scene.lesson,
            groups.len(),
            textures.len()
        );
        Ok(Self { groups, textures })
    }
}
