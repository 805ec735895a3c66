//! WGSL stage compilation, reflection and program linking.
//!
//! Stages are parsed and validated with naga. Linking checks the contract
//! between the two stages and the bind group convention the renderer relies
//! on:
//!
//! * `@group(0) @binding(0)` holds the program's single uniform block,
//! * `@group(1)` holds texture units, unit `k` being a `texture_2d<f32>` at
//!   binding `2k` and its sampler at `2k + 1`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{
    AddressSpace, ArraySize, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind,
    Type, TypeInner, VectorSize,
};
use thiserror::Error;

use crate::assets::{AssetError, AssetRoot};
use crate::mesh::VertexLayout;
use crate::uniforms::{UniformKind, UniformLayout, UniformSlot};

pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to compile {stage} shader {}:\n{diagnostic}", .path.display())]
    Compile {
        path: PathBuf,
        stage: ShaderStage,
        diagnostic: String,
    },
    #[error("{} must declare exactly one {stage} entry point, found {found}", .path.display())]
    MissingEntryPoint {
        path: PathBuf,
        stage: ShaderStage,
        found: usize,
    },
    #[error("failed to link program {program}: {reason}")]
    Link { program: String, reason: String },
    #[error("mesh layout does not match program {program} at @location({location}): {reason}")]
    LayoutMismatch {
        program: String,
        location: u32,
        reason: String,
    },
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Scalar type of a stage input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoScalar {
    Float,
    Sint,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoType {
    pub scalar: IoScalar,
    pub components: u32,
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scalar = match self.scalar {
            IoScalar::Float => "f32",
            IoScalar::Sint => "i32",
            IoScalar::Uint => "u32",
        };
        match self.components {
            1 => f.write_str(scalar),
            n => write!(f, "vec{n}<{scalar}>"),
        }
    }
}

/// A user-defined `@location` input or output of an entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceVar {
    pub location: u32,
    pub name: String,
    pub ty: IoType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    UniformBuffer,
    Texture2d,
    Sampler,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecl {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
}

/// One validated stage plus what reflection found in it.
#[derive(Debug)]
pub struct CompiledStage {
    stage: ShaderStage,
    path: PathBuf,
    source: String,
    entry_point: String,
    inputs: Vec<InterfaceVar>,
    outputs: Vec<InterfaceVar>,
    uniforms: Option<UniformLayout>,
    resources: Vec<ResourceDecl>,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn inputs(&self) -> &[InterfaceVar] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[InterfaceVar] {
        &self.outputs
    }

    pub fn uniforms(&self) -> Option<&UniformLayout> {
        self.uniforms.as_ref()
    }

    pub fn resources(&self) -> &[ResourceDecl] {
        &self.resources
    }
}

/// What the renderer keeps of a stage after linking.
#[derive(Debug, Clone)]
pub struct StageSource {
    pub path: PathBuf,
    pub source: String,
    pub entry_point: String,
}

/// A vertex/fragment pair that passed linking.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    name: String,
    vertex: StageSource,
    fragment: StageSource,
    vertex_inputs: Vec<InterfaceVar>,
    uniforms: Option<UniformLayout>,
    texture_units: u32,
}

impl LinkedProgram {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex(&self) -> &StageSource {
        &self.vertex
    }

    pub fn fragment(&self) -> &StageSource {
        &self.fragment
    }

    pub fn vertex_inputs(&self) -> &[InterfaceVar] {
        &self.vertex_inputs
    }

    pub fn uniforms(&self) -> Option<&UniformLayout> {
        self.uniforms.as_ref()
    }

    pub fn texture_units(&self) -> u32 {
        self.texture_units
    }

    /// Checks that a mesh supplies every vertex input this program reads.
    pub fn check_layout(&self, layout: &VertexLayout) -> Result<(), ShaderError> {
        for input in &self.vertex_inputs {
            let mismatch = |reason: String| ShaderError::LayoutMismatch {
                program: self.name.clone(),
                location: input.location,
                reason,
            };
            let attribute = layout.attribute_at(input.location).ok_or_else(|| {
                mismatch(format!("`{}` is not provided by the mesh", input.name))
            })?;
            let provided = IoType {
                scalar: IoScalar::Float,
                components: attribute.components,
            };
            if provided != input.ty {
                return Err(mismatch(format!(
                    "`{}` expects {} but the mesh provides {provided}",
                    input.name, input.ty
                )));
            }
        }
        Ok(())
    }
}

/// Parses and validates one stage, then reflects its interface.
pub fn compile_stage(
    path: impl Into<PathBuf>,
    source: impl Into<String>,
    stage: ShaderStage,
) -> Result<CompiledStage, ShaderError> {
    let path = path.into();
    let source = source.into();
    let compile_error = |diagnostic: String| ShaderError::Compile {
        path: path.clone(),
        stage,
        diagnostic,
    };

    let module = naga::front::wgsl::parse_str(&source)
        .map_err(|err| compile_error(err.emit_to_string_with_path(&source, &path)))?;
    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|err| {
            compile_error(err.emit_to_string_with_path(&source, &path.display().to_string()))
        })?;

    let entry_points: Vec<_> = module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == stage.naga())
        .collect();
    let [entry] = entry_points.as_slice() else {
        return Err(ShaderError::MissingEntryPoint {
            path,
            stage,
            found: entry_points.len(),
        });
    };

    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        let name = argument.name.clone().unwrap_or_default();
        collect_io(&module, argument.binding.as_ref(), argument.ty, name, &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_io(&module, result.binding.as_ref(), result.ty, String::new(), &mut outputs);
    }
    inputs.sort_by_key(|var| var.location);
    outputs.sort_by_key(|var| var.location);
    let entry_point = entry.name.clone();

    let resources = reflect_resources(&module);
    let uniforms = module
        .global_variables
        .iter()
        .find(|(_, var)| {
            var.space == AddressSpace::Uniform
                && var
                    .binding
                    .as_ref()
                    .is_some_and(|b| b.group == UNIFORM_GROUP && b.binding == 0)
        })
        .map(|(_, var)| reflect_uniforms(&module, var.ty, var.name.as_deref().unwrap_or("")));

    debug!(
        "compiled {stage} stage {} ({} inputs, {} outputs)",
        path.display(),
        inputs.len(),
        outputs.len()
    );
    Ok(CompiledStage {
        stage,
        path,
        source,
        entry_point,
        inputs,
        outputs,
        uniforms,
        resources,
    })
}

/// Checks that two stages agree and merges them into one program.
///
/// The stages are consumed; only their sources and entry points survive.
pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> Result<LinkedProgram, ShaderError> {
    let name = program_name(&vertex.path);
    let link_error = |reason: String| ShaderError::Link {
        program: name.clone(),
        reason,
    };

    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(link_error(format!(
            "expected a vertex and a fragment stage, got {} and {}",
            vertex.stage, fragment.stage
        )));
    }

    for input in &fragment.inputs {
        match vertex.outputs.iter().find(|out| out.location == input.location) {
            None => {
                return Err(link_error(format!(
                    "fragment input `{}` at @location({}) is not written by the vertex stage",
                    input.name, input.location
                )))
            }
            Some(output) if output.ty != input.ty => {
                return Err(link_error(format!(
                    "@location({}) is {} in the vertex stage but {} in the fragment stage",
                    input.location, output.ty, input.ty
                )))
            }
            Some(_) => {}
        }
    }
    if !fragment.outputs.iter().any(|out| out.location == 0) {
        return Err(link_error(
            "fragment stage does not write a color to @location(0)".to_string(),
        ));
    }

    let uniforms = match (vertex.uniforms, fragment.uniforms) {
        (Some(v), Some(f)) if v != f => {
            return Err(link_error(
                "vertex and fragment stages declare different uniform blocks".to_string(),
            ))
        }
        (v, f) => v.or(f),
    };

    let texture_units = check_bindings(&vertex.resources, &fragment.resources)
        .map_err(link_error)?;

    info!(
        "linked program {name} ({} uniforms, {texture_units} texture units)",
        uniforms.as_ref().map_or(0, UniformLayout::len)
    );
    Ok(LinkedProgram {
        name,
        vertex: StageSource {
            path: vertex.path,
            source: vertex.source,
            entry_point: vertex.entry_point,
        },
        fragment: StageSource {
            path: fragment.path,
            source: fragment.source,
            entry_point: fragment.entry_point,
        },
        vertex_inputs: vertex.inputs,
        uniforms,
        texture_units,
    })
}

/// Reads, compiles and links `vertex_path` and `fragment_path` below `assets`.
pub fn load_program(
    assets: &AssetRoot,
    vertex_path: &str,
    fragment_path: &str,
) -> Result<LinkedProgram, ShaderError> {
    let vertex_source = assets.read_text(vertex_path)?;
    let fragment_source = assets.read_text(fragment_path)?;
    let vertex = compile_stage(assets.resolve(vertex_path), vertex_source, ShaderStage::Vertex)?;
    let fragment = compile_stage(
        assets.resolve(fragment_path),
        fragment_source,
        ShaderStage::Fragment,
    )?;
    link(vertex, fragment)
}

/// `shader/lamp.vert.wgsl` names the program `lamp`.
fn program_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .unwrap_or("program")
        .to_string()
}

fn collect_io(
    module: &Module,
    binding: Option<&Binding>,
    ty: Handle<Type>,
    name: String,
    out: &mut Vec<InterfaceVar>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            if let Some(io) = io_type(&module.types[ty].inner) {
                out.push(InterfaceVar {
                    location: *location,
                    name,
                    ty: io,
                });
            }
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    let name = member.name.clone().unwrap_or_default();
                    collect_io(module, member.binding.as_ref(), member.ty, name, out);
                }
            }
        }
    }
}

fn io_type(inner: &TypeInner) -> Option<IoType> {
    let (scalar, components) = match *inner {
        TypeInner::Scalar(scalar) => (scalar, 1),
        TypeInner::Vector { size, scalar } => (scalar, vector_len(size)),
        _ => return None,
    };
    let scalar = match scalar.kind {
        ScalarKind::Float => IoScalar::Float,
        ScalarKind::Sint => IoScalar::Sint,
        ScalarKind::Uint => IoScalar::Uint,
        _ => return None,
    };
    Some(IoType { scalar, components })
}

fn vector_len(size: VectorSize) -> u32 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

fn reflect_resources(module: &Module) -> Vec<ResourceDecl> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            let kind = match (var.space, &module.types[var.ty].inner) {
                (AddressSpace::Uniform, _) => ResourceKind::UniformBuffer,
                (
                    AddressSpace::Handle,
                    TypeInner::Image {
                        dim: ImageDimension::D2,
                        arrayed: false,
                        class:
                            ImageClass::Sampled {
                                kind: ScalarKind::Float,
                                multi: false,
                            },
                    },
                ) => ResourceKind::Texture2d,
                (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => {
                    ResourceKind::Sampler
                }
                _ => ResourceKind::Other,
            };
            Some(ResourceDecl {
                name: var.name.clone().unwrap_or_default(),
                group: binding.group,
                binding: binding.binding,
                kind,
            })
        })
        .collect()
}

/// Validates the group layout of both stages and returns the texture unit count.
fn check_bindings(vertex: &[ResourceDecl], fragment: &[ResourceDecl]) -> Result<u32, String> {
    let mut textures: BTreeMap<u32, &ResourceDecl> = BTreeMap::new();
    for decl in vertex.iter().chain(fragment) {
        match decl.group {
            UNIFORM_GROUP => {
                if decl.binding != 0 || decl.kind != ResourceKind::UniformBuffer {
                    return Err(format!(
                        "`{}` at @group(0) @binding({}) must be the uniform block at binding 0",
                        decl.name, decl.binding
                    ));
                }
            }
            TEXTURE_GROUP => {
                let expected = if decl.binding % 2 == 0 {
                    ResourceKind::Texture2d
                } else {
                    ResourceKind::Sampler
                };
                if decl.kind != expected {
                    return Err(format!(
                        "`{}` at @group(1) @binding({}) must be a {}",
                        decl.name,
                        decl.binding,
                        if expected == ResourceKind::Texture2d {
                            "texture_2d<f32>"
                        } else {
                            "sampler"
                        }
                    ));
                }
                textures.insert(decl.binding, decl);
            }
            group => {
                return Err(format!(
                    "`{}` uses @group({group}); only groups 0 and 1 are supported",
                    decl.name
                ))
            }
        }
    }

    let count = textures.len() as u32;
    if count % 2 != 0 || textures.keys().copied().ne(0..count) {
        return Err("texture units must be contiguous texture/sampler pairs".to_string());
    }
    Ok(count / 2)
}

fn reflect_uniforms(module: &Module, ty: Handle<Type>, var_name: &str) -> UniformLayout {
    let inner = &module.types[ty].inner;
    let mut layout = UniformLayout::new(inner.size(module.to_ctx()));
    // Members of a struct block are addressed directly, like GLSL uniforms.
    let prefix = match inner {
        TypeInner::Struct { .. } => "",
        _ => var_name,
    };
    flatten(module, ty, prefix, 0, &mut layout);
    layout
}

fn flatten(module: &Module, ty: Handle<Type>, name: &str, offset: u32, layout: &mut UniformLayout) {
    let kind = match module.types[ty].inner {
        TypeInner::Scalar(scalar) => match (scalar.kind, scalar.width) {
            (ScalarKind::Float, 4) => Some(UniformKind::Float),
            (ScalarKind::Sint, 4) => Some(UniformKind::Int),
            (ScalarKind::Uint, 4) => Some(UniformKind::Uint),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => Some(UniformKind::Vec2),
            VectorSize::Tri => Some(UniformKind::Vec3),
            VectorSize::Quad => Some(UniformKind::Vec4),
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar.kind == ScalarKind::Float => Some(UniformKind::Mat4),
        TypeInner::Matrix {
            columns: VectorSize::Tri,
            rows: VectorSize::Tri,
            scalar,
        } if scalar.kind == ScalarKind::Float => Some(UniformKind::Mat3),
        TypeInner::Array {
            base,
            size: ArraySize::Constant(len),
            stride,
        } => {
            for i in 0..len.get() {
                flatten(module, base, &format!("{name}[{i}]"), offset + i * stride, layout);
            }
            return;
        }
        TypeInner::Struct { ref members, .. } => {
            for member in members {
                let member_name = member.name.as_deref().unwrap_or("");
                let path = if name.is_empty() {
                    member_name.to_string()
                } else {
                    format!("{name}.{member_name}")
                };
                flatten(module, member.ty, &path, offset + member.offset, layout);
            }
            return;
        }
        _ => None,
    };

    match kind {
        Some(kind) => layout.insert(name, UniformSlot { offset, kind }),
        None => debug!("uniform {name} has a type the staging block cannot address; skipping"),
    }
}
