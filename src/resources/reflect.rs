//! WGSL validation, stage linking and uniform block reflection
//!
//! Each stage is parsed and validated on its own. Linking then checks the
//! entry points, matches fragment inputs against vertex outputs by location
//! and merges the two stages' `@group(0) @binding(0)` uniform blocks into
//! the layout handed to the backend.

use crate::backend::types::{UniformBlockLayout, UniformField, UniformKind};
use crate::resources::shader::{ShaderError, ShaderStage};
use std::collections::BTreeMap;

pub const VERTEX_ENTRY_POINT: &str = "vs_main";
pub const FRAGMENT_ENTRY_POINT: &str = "fs_main";

/// Group and binding of the uniform block every program may declare
pub const UNIFORM_BLOCK_GROUP: u32 = 0;
pub const UNIFORM_BLOCK_BINDING: u32 = 0;

/// A parsed and validated shader stage
pub struct CompiledStage {
    pub stage: ShaderStage,
    module: naga::Module,
}

/// Parse and validate one stage's WGSL source
pub fn compile_stage(label: &str, stage: ShaderStage, source: &str) -> Result<CompiledStage, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Compile {
        label: label.to_string(),
        stage,
        message: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator.validate(&module).map_err(|e| ShaderError::Compile {
        label: label.to_string(),
        stage,
        message: e.emit_to_string(source),
    })?;

    Ok(CompiledStage { stage, module })
}

/// Check that a vertex and fragment stage form a usable program and return
/// the merged uniform block layout
pub fn link(
    label: &str,
    vertex: &CompiledStage,
    fragment: &CompiledStage,
) -> Result<UniformBlockLayout, ShaderError> {
    let link_error = |message: String| ShaderError::Link {
        label: label.to_string(),
        message,
    };

    let vs = find_entry_point(&vertex.module, naga::ShaderStage::Vertex, VERTEX_ENTRY_POINT)
        .ok_or_else(|| link_error(format!("vertex stage has no @vertex fn {}", VERTEX_ENTRY_POINT)))?;
    let fs = find_entry_point(&fragment.module, naga::ShaderStage::Fragment, FRAGMENT_ENTRY_POINT)
        .ok_or_else(|| {
            link_error(format!("fragment stage has no @fragment fn {}", FRAGMENT_ENTRY_POINT))
        })?;

    let outputs = vertex_outputs(&vertex.module, vs);
    for (location, input) in fragment_inputs(&fragment.module, fs) {
        match outputs.get(&location) {
            None => {
                return Err(link_error(format!(
                    "fragment input @location({}) is not written by the vertex stage",
                    location
                )))
            }
            Some(output) if *output != input => {
                return Err(link_error(format!(
                    "@location({}) is {:?} in the vertex stage but {:?} in the fragment stage",
                    location, output, input
                )))
            }
            Some(_) => {}
        }
    }

    let vertex_block = uniform_block(&vertex.module);
    let fragment_block = uniform_block(&fragment.module);
    merge_blocks(vertex_block, fragment_block).map_err(link_error)
}

fn find_entry_point<'a>(
    module: &'a naga::Module,
    stage: naga::ShaderStage,
    name: &str,
) -> Option<&'a naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == name)
}

/// Locations written by the vertex entry point and their types
fn vertex_outputs(module: &naga::Module, ep: &naga::EntryPoint) -> BTreeMap<u32, naga::TypeInner> {
    let mut outputs = BTreeMap::new();
    if let Some(result) = &ep.function.result {
        collect_locations(module, result.binding.as_ref(), result.ty, &mut outputs);
    }
    outputs
}

/// Locations read by the fragment entry point and their types
fn fragment_inputs(module: &naga::Module, ep: &naga::EntryPoint) -> BTreeMap<u32, naga::TypeInner> {
    let mut inputs = BTreeMap::new();
    for arg in &ep.function.arguments {
        collect_locations(module, arg.binding.as_ref(), arg.ty, &mut inputs);
    }
    inputs
}

fn collect_locations(
    module: &naga::Module,
    binding: Option<&naga::Binding>,
    ty: naga::Handle<naga::Type>,
    out: &mut BTreeMap<u32, naga::TypeInner>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location, module.types[ty].inner.clone());
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.binding.as_ref(), member.ty, out);
                }
            }
        }
    }
}

fn uniform_kind(inner: &naga::TypeInner) -> Option<UniformKind> {
    use naga::{ScalarKind, TypeInner, VectorSize};

    match inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Float => Some(UniformKind::Float),
            ScalarKind::Sint => Some(UniformKind::Int),
            _ => None,
        },
        TypeInner::Vector { size, scalar }
            if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
        {
            match size {
                VectorSize::Bi => Some(UniformKind::Vec2),
                VectorSize::Tri => Some(UniformKind::Vec3),
                VectorSize::Quad => Some(UniformKind::Vec4),
            }
        }
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar.width == 4 => Some(UniformKind::Mat4),
        _ => None,
    }
}

/// Reflect the members of the stage's uniform block, if it declares one
pub(crate) fn uniform_block(module: &naga::Module) -> Option<UniformBlockLayout> {
    let (_, global) = module.global_variables.iter().find(|(_, var)| {
        var.space == naga::AddressSpace::Uniform
            && matches!(
                var.binding,
                Some(naga::ResourceBinding { group, binding })
                    if group == UNIFORM_BLOCK_GROUP && binding == UNIFORM_BLOCK_BINDING
            )
    })?;

    let ty = &module.types[global.ty];
    let mut fields = Vec::new();
    let size = match &ty.inner {
        naga::TypeInner::Struct { members, span } => {
            for member in members {
                let Some(name) = member.name.clone() else {
                    continue;
                };
                match uniform_kind(&module.types[member.ty].inner) {
                    Some(kind) => fields.push(UniformField {
                        name,
                        offset: member.offset,
                        kind,
                    }),
                    None => log::debug!("Uniform member '{}' has no settable type", name),
                }
            }
            *span
        }
        other => {
            let kind = uniform_kind(other)?;
            fields.push(UniformField {
                name: global.name.clone().unwrap_or_default(),
                offset: 0,
                kind,
            });
            kind.size() as u32
        }
    };

    Some(UniformBlockLayout { size, fields })
}

fn merge_blocks(
    vertex: Option<UniformBlockLayout>,
    fragment: Option<UniformBlockLayout>,
) -> Result<UniformBlockLayout, String> {
    match (vertex, fragment) {
        (None, None) => Ok(UniformBlockLayout::default()),
        (Some(block), None) | (None, Some(block)) => Ok(block),
        (Some(mut merged), Some(other)) => {
            for field in other.fields {
                match merged.field(&field.name) {
                    Some(existing) if existing.offset != field.offset || existing.kind != field.kind => {
                        return Err(format!(
                            "uniform '{}' is {:?} at offset {} in the vertex stage but {:?} at offset {} in the fragment stage",
                            field.name, existing.kind, existing.offset, field.kind, field.offset
                        ));
                    }
                    Some(_) => {}
                    None => merged.fields.push(field),
                }
            }
            merged.size = merged.size.max(other.size);
            Ok(merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec4<f32>,
}
@group(0) @binding(0) var<uniform> uniforms: Uniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(2) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = uniforms.model * vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}
"#;

    const FS: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec4<f32>,
}
@group(0) @binding(0) var<uniform> uniforms: Uniforms;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return uniforms.tint * vec4<f32>(uv, 0.0, 1.0);
}
"#;

    #[test]
    fn reflects_block_offsets() {
        let vs = compile_stage("t", ShaderStage::Vertex, VS).unwrap();
        let fs = compile_stage("t", ShaderStage::Fragment, FS).unwrap();
        let layout = link("t", &vs, &fs).unwrap();

        let model = layout.field("model").unwrap();
        assert_eq!((model.offset, model.kind), (0, UniformKind::Mat4));
        let tint = layout.field("tint").unwrap();
        assert_eq!((tint.offset, tint.kind), (64, UniformKind::Vec4));
        assert_eq!(layout.size, 80);
    }

    #[test]
    fn syntax_error_names_the_stage() {
        let err = compile_stage("broken", ShaderStage::Fragment, "fn fs_main( {").err().unwrap();
        match err {
            ShaderError::Compile { stage, label, .. } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert_eq!(label, "broken");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_vertex_output_fails_link() {
        let fs = r#"
@fragment
fn fs_main(@location(3) color: vec4<f32>) -> @location(0) vec4<f32> {
    return color;
}
"#;
        let vs = compile_stage("t", ShaderStage::Vertex, VS).unwrap();
        let fs = compile_stage("t", ShaderStage::Fragment, fs).unwrap();
        assert!(matches!(link("t", &vs, &fs), Err(ShaderError::Link { .. })));
    }

    #[test]
    fn mismatched_uniform_blocks_fail_link() {
        let fs = r#"
struct Uniforms {
    tint: vec4<f32>,
}
@group(0) @binding(0) var<uniform> uniforms: Uniforms;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return uniforms.tint;
}
"#;
        let vs = compile_stage("t", ShaderStage::Vertex, VS).unwrap();
        let fs = compile_stage("t", ShaderStage::Fragment, fs).unwrap();
        assert!(matches!(link("t", &vs, &fs), Err(ShaderError::Link { .. })));
    }

    #[test]
    fn missing_entry_point_fails_link() {
        let fs = r#"
@fragment
fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;
        let vs = compile_stage("t", ShaderStage::Vertex, VS).unwrap();
        let fs = compile_stage("t", ShaderStage::Fragment, fs).unwrap();
        assert!(matches!(link("t", &vs, &fs), Err(ShaderError::Link { .. })));
    }
}
