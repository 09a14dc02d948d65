//! Material descriptions.
//!
//! A material file is JSON: either `{ "pipelines": [ {..}, .. ] }` or a single
//! pipeline object. Recognized pipeline keys:
//!
//! ```json
//! {
//!   "name": "mat_a",
//!   "renderpass": "forward",
//!   "vertex_input": "pos_uv",
//!   "depth_test": true,
//!   "depth_write": true,
//!   "polygon_mode": "line",
//!   "topology_mode": "triangle_list",
//!   "cull_mode": "back",
//!   "depth_op": "less_or_equal",
//!   "compiler_definitions": { "USE_FOG": "1" },
//!   "shader_files": ["a.vert", "a.frag"]
//! }
//! ```
//!
//! Unknown keys are ignored. Shader paths are resolved against the material's
//! directory.

use crate::errors::{PipeDbError, Result};
use crate::vk;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Macro name/value pairs, in declaration order.
pub type Definitions = Vec<(String, String)>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineDesc {
    pub name: Option<String>,
    pub renderpass: Option<String>,
    pub vertex_input: Option<String>,
    pub depth_test: Option<bool>,
    pub depth_write: Option<bool>,
    pub polygon_mode: Option<u32>,
    pub topology: Option<u32>,
    pub cull_mode: Option<u32>,
    pub depth_op: Option<u32>,
    pub definitions: Definitions,
    pub shader_files: Vec<PathBuf>,
}

impl PipelineDesc {
    pub fn from_json(val: &Value, material_dir: &Path) -> Result<Self> {
        let obj = val
            .as_object()
            .ok_or_else(|| PipeDbError::parse("pipeline description must be an object"))?;

        let mut desc = PipelineDesc {
            name: get_str(obj, "name")?,
            renderpass: get_str(obj, "renderpass")?,
            vertex_input: get_str(obj, "vertex_input")?,
            depth_test: get_bool(obj, "depth_test")?,
            depth_write: get_bool(obj, "depth_write")?,
            polygon_mode: get_str(obj, "polygon_mode")?.map(|s| vk::parse_polygon_mode(&s)).transpose()?,
            topology: get_str(obj, "topology_mode")?.map(|s| vk::parse_topology(&s)).transpose()?,
            cull_mode: get_str(obj, "cull_mode")?.map(|s| vk::parse_cull_mode(&s)).transpose()?,
            depth_op: get_str(obj, "depth_op")?.map(|s| vk::parse_compare_op(&s)).transpose()?,
            ..Default::default()
        };

        if let Some(defs) = obj.get("compiler_definitions") {
            desc.definitions = parse_definitions(defs)?;
        }

        if let Some(files) = obj.get("shader_files") {
            let files = files
                .as_array()
                .ok_or_else(|| PipeDbError::parse("shader_files must be an array"))?;
            for f in files {
                let f = f
                    .as_str()
                    .ok_or_else(|| PipeDbError::parse("shader_files entries must be strings"))?;
                desc.shader_files.push(material_dir.join(f));
            }
        }
        Ok(desc)
    }
}

/// The pipeline objects of a material document.
pub fn pipelines_of(root: &Value) -> Result<Vec<&Value>> {
    match root.get("pipelines") {
        Some(Value::Array(arr)) => Ok(arr.iter().collect()),
        Some(_) => Err(PipeDbError::parse("\"pipelines\" must be an array")),
        None if root.is_object() => Ok(vec![root]),
        None => Err(PipeDbError::parse("material must be a JSON object")),
    }
}

fn get_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(PipeDbError::parse(format!("{key}: expected string, got {other}"))),
    }
}

fn get_bool(obj: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(PipeDbError::parse(format!("{key}: expected bool, got {other}"))),
    }
}

fn scalar_to_string(v: &Value) -> Result<String> {
    Ok(match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => return Err(PipeDbError::parse(format!("definition value must be a scalar, got {other}"))),
    })
}

/// Accepts `{ "NAME": value, .. }`, or an array whose entries are `"NAME"`,
/// `["NAME", value]` or `{ "name": "NAME", "value": value }`.
pub fn parse_definitions(v: &Value) -> Result<Definitions> {
    match v {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), scalar_to_string(v)?)))
            .collect(),
        Value::Array(items) => items.iter().map(parse_definition_entry).collect(),
        other => Err(PipeDbError::parse(format!("compiler_definitions: unexpected {other}"))),
    }
}

fn parse_definition_entry(item: &Value) -> Result<(String, String)> {
    match item {
        Value::String(name) => Ok((name.clone(), String::new())),
        Value::Array(pair) => match pair.as_slice() {
            [Value::String(name)] => Ok((name.clone(), String::new())),
            [Value::String(name), value] => Ok((name.clone(), scalar_to_string(value)?)),
            _ => Err(PipeDbError::parse("definition pair must be [name, value]")),
        },
        Value::Object(obj) => {
            let name = get_str(obj, "name")?.ok_or_else(|| PipeDbError::parse("definition without name"))?;
            let value = obj.get("value").map(scalar_to_string).transpose()?.unwrap_or_default();
            Ok((name, value))
        }
        other => Err(PipeDbError::parse(format!("bad definition entry {other}"))),
    }
}

/// Parse `NAME=VALUE` (or bare `NAME`) as given on a command line.
pub fn parse_define_arg(s: &str) -> Result<(String, String)> {
    let (name, value) = s.split_once('=').unwrap_or((s, ""));
    if name.trim().is_empty() {
        return Err(PipeDbError::parse(format!("bad definition {s:?}")));
    }
    Ok((name.trim().to_string(), value.to_string()))
}
