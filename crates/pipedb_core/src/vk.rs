//! Name tables for render state and shader stages, resolved to raw Vulkan values.

use crate::errors::{PipeDbError, Result};
use ash::vk;
use std::path::Path;

fn lookup<T: Copy>(table: &[(&str, T)], what: &str, name: &str) -> Result<T> {
    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| *v)
        .ok_or_else(|| PipeDbError::parse(format!("unknown {what}: {name:?}")))
}

pub fn parse_polygon_mode(name: &str) -> Result<u32> {
    let table = [
        ("fill", vk::PolygonMode::FILL),
        ("line", vk::PolygonMode::LINE),
        ("point", vk::PolygonMode::POINT),
    ];
    lookup(&table, "polygon mode", name).map(|m| m.as_raw() as u32)
}

pub fn parse_cull_mode(name: &str) -> Result<u32> {
    let table = [
        ("none", vk::CullModeFlags::NONE),
        ("front", vk::CullModeFlags::FRONT),
        ("back", vk::CullModeFlags::BACK),
        ("front_and_back", vk::CullModeFlags::FRONT_AND_BACK),
    ];
    lookup(&table, "cull mode", name).map(|m| m.as_raw())
}

pub fn parse_topology(name: &str) -> Result<u32> {
    use vk::PrimitiveTopology as T;
    let table = [
        ("point_list", T::POINT_LIST),
        ("line_list", T::LINE_LIST),
        ("line_strip", T::LINE_STRIP),
        ("triangle_list", T::TRIANGLE_LIST),
        ("triangle_strip", T::TRIANGLE_STRIP),
        ("triangle_fan", T::TRIANGLE_FAN),
        ("line_list_with_adjacency", T::LINE_LIST_WITH_ADJACENCY),
        ("line_strip_with_adjacency", T::LINE_STRIP_WITH_ADJACENCY),
        ("triangle_list_with_adjacency", T::TRIANGLE_LIST_WITH_ADJACENCY),
        ("triangle_strip_with_adjacency", T::TRIANGLE_STRIP_WITH_ADJACENCY),
        ("patch_list", T::PATCH_LIST),
    ];
    lookup(&table, "topology", name).map(|t| t.as_raw() as u32)
}

pub fn parse_compare_op(name: &str) -> Result<u32> {
    use vk::CompareOp as C;
    let table = [
        ("never", C::NEVER),
        ("less", C::LESS),
        ("equal", C::EQUAL),
        ("less_or_equal", C::LESS_OR_EQUAL),
        ("greater", C::GREATER),
        ("not_equal", C::NOT_EQUAL),
        ("greater_or_equal", C::GREATER_OR_EQUAL),
        ("always", C::ALWAYS),
    ];
    lookup(&table, "depth compare op", name).map(|c| c.as_raw() as u32)
}

pub const DEFAULT_POLYGON_MODE: u32 = vk::PolygonMode::FILL.as_raw() as u32;
pub const DEFAULT_CULL_MODE: u32 = vk::CullModeFlags::NONE.as_raw();
pub const DEFAULT_TOPOLOGY: u32 = vk::PrimitiveTopology::TRIANGLE_LIST.as_raw() as u32;
pub const DEFAULT_DEPTH_OP: u32 = vk::CompareOp::LESS.as_raw() as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
    Task,
    Mesh,
}

impl StageKind {
    pub const ALL: [StageKind; 8] = [
        StageKind::Vertex,
        StageKind::TessControl,
        StageKind::TessEvaluation,
        StageKind::Geometry,
        StageKind::Fragment,
        StageKind::Compute,
        StageKind::Task,
        StageKind::Mesh,
    ];

    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            StageKind::Vertex => vk::ShaderStageFlags::VERTEX,
            StageKind::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            StageKind::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            StageKind::Geometry => vk::ShaderStageFlags::GEOMETRY,
            StageKind::Fragment => vk::ShaderStageFlags::FRAGMENT,
            StageKind::Compute => vk::ShaderStageFlags::COMPUTE,
            StageKind::Task => vk::ShaderStageFlags::TASK_EXT,
            StageKind::Mesh => vk::ShaderStageFlags::MESH_EXT,
        }
    }

    /// Value stored in a stage descriptor.
    pub fn as_raw(self) -> u32 { self.flags().as_raw() }

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_raw() == raw)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "vert" | "vsh" => StageKind::Vertex,
            "frag" | "fsh" => StageKind::Fragment,
            "geom" => StageKind::Geometry,
            "comp" => StageKind::Compute,
            "tesc" => StageKind::TessControl,
            "tese" => StageKind::TessEvaluation,
            "mesh" => StageKind::Mesh,
            "task" => StageKind::Task,
            _ => return None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| PipeDbError::UnknownShaderStage(path.display().to_string()))
    }

    /// Macro defined for every compile of this stage.
    pub fn macro_name(self) -> &'static str {
        match self {
            StageKind::Vertex => "VERTEX_SHADER",
            StageKind::TessControl => "TESS_CONTROL_SHADER",
            StageKind::TessEvaluation => "TESS_EVALUATION_SHADER",
            StageKind::Geometry => "GEOMETRY_SHADER",
            StageKind::Fragment => "FRAGMENT_SHADER",
            StageKind::Compute => "COMPUTE_SHADER",
            StageKind::Task => "TASK_SHADER",
            StageKind::Mesh => "MESH_SHADER",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StageKind::Vertex => "vertex",
            StageKind::TessControl => "tess_control",
            StageKind::TessEvaluation => "tess_evaluation",
            StageKind::Geometry => "geometry",
            StageKind::Fragment => "fragment",
            StageKind::Compute => "compute",
            StageKind::Task => "task",
            StageKind::Mesh => "mesh",
        }
    }
}
