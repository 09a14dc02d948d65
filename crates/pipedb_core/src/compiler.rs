//! Shader compiler seam.
//!
//! The builder only needs "source file + macros in, 32-bit words out".
//! [`NagaGlslCompiler`] implements that with naga's GLSL frontend and SPIR-V
//! backend; tests plug in their own implementation.

use crate::arena::{Arena, Span};
use crate::errors::{PipeDbError, Result};
use crate::material::Definitions;
use crate::vk::StageKind;
use std::path::Path;

pub trait ShaderCompiler {
    /// Compile one stage. `definitions` are forwarded in order; later entries
    /// win on duplicate names.
    fn compile(&mut self, path: &Path, stage: StageKind, definitions: &Definitions) -> Result<Vec<u32>>;
}

impl<C: ShaderCompiler + ?Sized> ShaderCompiler for Box<C> {
    fn compile(&mut self, path: &Path, stage: StageKind, definitions: &Definitions) -> Result<Vec<u32>> {
        (**self).compile(path, stage, definitions)
    }
}

impl<C: ShaderCompiler + ?Sized> ShaderCompiler for &mut C {
    fn compile(&mut self, path: &Path, stage: StageKind, definitions: &Definitions) -> Result<Vec<u32>> {
        (**self).compile(path, stage, definitions)
    }
}

pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Read `path` into `scratch` and splice every `#include "file"` in place.
/// `file` is resolved against the directory of the file that names it.
/// `#include <file>` lines are passed through untouched.
pub fn expand_includes(scratch: &mut Arena, path: &Path) -> Result<String> {
    let mut out = String::new();
    let mut open = Vec::new();
    splice(scratch, path, &mut open, &mut out)?;
    Ok(out)
}

fn splice(scratch: &mut Arena, path: &Path, open: &mut Vec<Span>, out: &mut String) -> Result<()> {
    let name = path.to_string_lossy();
    for span in open.iter() {
        if scratch.str(*span)? == name {
            return Err(PipeDbError::parse(format!("include cycle through {name}")));
        }
    }
    if open.len() >= MAX_INCLUDE_DEPTH {
        return Err(PipeDbError::parse(format!("includes nested deeper than {MAX_INCLUDE_DEPTH} at {name}")));
    }

    let (name_span, _) = scratch.copy_str(&name)?;
    let source = scratch.read_file(path)?;
    open.push(name_span);

    let dir = path.parent().unwrap_or(Path::new(""));
    let mut pos = 0;
    while pos < source.len {
        let rest = &scratch.bytes(source)[pos..];
        let end = rest.iter().position(|&b| b == b'\n').map_or(rest.len(), |i| i + 1);
        let line = std::str::from_utf8(&rest[..end]).map_err(|e| PipeDbError::parse(format!("{name}: {e}")))?;
        pos += end;
        match include_target(line) {
            Some(target) => {
                let target = dir.join(target);
                splice(scratch, &target, open, out)?;
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            None => out.push_str(line),
        }
    }

    open.pop();
    Ok(())
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start().strip_prefix("include")?;
    let rest = rest.trim_start().strip_prefix('"')?;
    rest.split_once('"').map(|(target, _)| target)
}

#[cfg(feature = "naga")]
pub use self::naga_glsl::NagaGlslCompiler;

#[cfg(feature = "naga")]
mod naga_glsl {
    use super::{expand_includes, ShaderCompiler};
    use crate::arena::Arena;
    use crate::errors::{PipeDbError, Result};
    use crate::material::Definitions;
    use crate::vk::StageKind;
    use naga::back::spv;
    use naga::front::glsl;
    use naga::valid::{Capabilities, ValidationFlags, Validator};
    use std::path::Path;
    use tracing::debug;

    /// GLSL -> SPIR-V 1.5 through naga. Quoted includes are expanded first.
    /// Geometry, tessellation, task and mesh stages are rejected.
    pub struct NagaGlslCompiler {
        scratch: Arena,
        frontend: glsl::Frontend,
    }

    impl NagaGlslCompiler {
        /// `scratch_capacity` bounds one source file together with its includes.
        pub fn new(scratch_capacity: usize) -> Self {
            Self { scratch: Arena::with_capacity(scratch_capacity), frontend: glsl::Frontend::default() }
        }
    }

    impl ShaderCompiler for NagaGlslCompiler {
        fn compile(&mut self, path: &Path, stage: StageKind, definitions: &Definitions) -> Result<Vec<u32>> {
            let fail = |message: String| PipeDbError::StageCompileFailed { path: path.to_path_buf(), message };

            let naga_stage = match stage {
                StageKind::Vertex => naga::ShaderStage::Vertex,
                StageKind::Fragment => naga::ShaderStage::Fragment,
                StageKind::Compute => naga::ShaderStage::Compute,
                other => return Err(fail(format!("{} shaders are not supported", other.label()))),
            };

            self.scratch.reset();
            let source = expand_includes(&mut self.scratch, path).map_err(|e| fail(e.to_string()))?;

            let mut options = glsl::Options::from(naga_stage);
            options.defines.insert(stage.macro_name().to_string(), String::new());
            for (name, value) in definitions {
                options.defines.insert(name.clone(), value.clone());
            }

            let module = self
                .frontend
                .parse(&options, &source)
                .map_err(|e| fail(format!("GLSL parse error: {e:?}")))?;

            let info = Validator::new(ValidationFlags::all(), Capabilities::all())
                .validate(&module)
                .map_err(|e| fail(format!("validation error: {e}")))?;

            let mut spv_options = spv::Options::default();
            spv_options.lang_version = (1, 5);
            let pipeline_options = spv::PipelineOptions { shader_stage: naga_stage, entry_point: "main".to_string() };

            let words = spv::write_vec(&module, &info, &spv_options, Some(&pipeline_options))
                .map_err(|e| fail(format!("SPIR-V generation error: {e}")))?;
            debug!(path = %path.display(), stage = stage.label(), words = words.len(), "compiled");
            Ok(words)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn quoted_includes_resolve_against_including_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/common.glsl"), "#include \"consts.glsl\"\nfloat f() { return K; }").unwrap();
        fs::write(dir.path().join("lib/consts.glsl"), "const float K = 2.0;\n").unwrap();
        let main = dir.path().join("main.vert");
        fs::write(&main, "#version 450\n  #  include \"lib/common.glsl\"\nvoid main() {}\n").unwrap();

        let mut scratch = Arena::with_capacity(1 << 12);
        let out = expand_includes(&mut scratch, &main).unwrap();
        assert_eq!(out, "#version 450\nconst float K = 2.0;\nfloat f() { return K; }\nvoid main() {}\n");
    }

    #[test]
    fn system_includes_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.frag");
        fs::write(&p, "#include <engine.glsl>\nvoid main() {}\n").unwrap();
        let mut scratch = Arena::with_capacity(1 << 12);
        assert_eq!(expand_includes(&mut scratch, &p).unwrap(), "#include <engine.glsl>\nvoid main() {}\n");
    }

    #[test]
    fn include_cycles_and_missing_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.glsl"), "#include \"b.glsl\"\n").unwrap();
        fs::write(dir.path().join("b.glsl"), "#include \"a.glsl\"\n").unwrap();
        let mut scratch = Arena::with_capacity(1 << 12);
        let err = expand_includes(&mut scratch, &dir.path().join("a.glsl")).unwrap_err();
        assert!(matches!(err, PipeDbError::Parse(ref m) if m.contains("cycle")), "{err}");

        fs::write(dir.path().join("c.glsl"), "#include \"nope.glsl\"\n").unwrap();
        let err = expand_includes(&mut scratch, &dir.path().join("c.glsl")).unwrap_err();
        assert!(matches!(err, PipeDbError::Io(_)));
    }

    #[test]
    fn includes_count_against_scratch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.glsl"), "x".repeat(256)).unwrap();
        let p = dir.path().join("a.vert");
        fs::write(&p, "#include \"big.glsl\"\n").unwrap();
        let mut scratch = Arena::with_capacity(128);
        assert!(matches!(expand_includes(&mut scratch, &p), Err(PipeDbError::OutOfSpace { .. })));
    }
}
