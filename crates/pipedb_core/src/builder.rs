//! Builds a pipeline database from material descriptions.
//!
//! One record is produced per pipeline entry. Records are assembled in the
//! builder's data arena; stage bytecode is appended straight behind its record
//! so a finished record is one contiguous byte range, ready to be written out
//! verbatim by [`crate::image`].
//!
//! Failures scoped to a material, a pipeline or a stage are recorded as
//! [`Diagnostic`]s and the batch continues. Running out of data arena space
//! is returned to the caller; a material too large for the scratch arena is
//! only skipped.

use crate::arena::{Arena, Span};
use crate::compiler::ShaderCompiler;
use crate::config::{BuildConfig, StageFailurePolicy};
use crate::consts::MAX_STAGES;
use crate::errors::{PipeDbError, Result};
use crate::image;
use crate::material::{pipelines_of, Definitions, PipelineDesc};
use crate::record::{PipelineView, RecordWriter};
use crate::vk::StageKind;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    Io,
    Parse,
    StageCompileFailed,
    StageLimitExceeded,
    UnknownShaderStage,
    PipelineRejected,
    Truncated,
    DuplicateName,
    Other,
}

impl DiagnosticCode {
    fn of(err: &PipeDbError) -> Self {
        match err {
            PipeDbError::Io(_) | PipeDbError::OutOfSpace { .. } => DiagnosticCode::Io,
            PipeDbError::Json(_) | PipeDbError::Parse(_) => DiagnosticCode::Parse,
            PipeDbError::StageCompileFailed { .. } => DiagnosticCode::StageCompileFailed,
            PipeDbError::StageLimitExceeded { .. } => DiagnosticCode::StageLimitExceeded,
            PipeDbError::UnknownShaderStage(_) => DiagnosticCode::UnknownShaderStage,
            _ => DiagnosticCode::Other,
        }
    }

    /// Warnings leave the affected record in the database.
    pub fn is_warning(self) -> bool {
        matches!(self, DiagnosticCode::Truncated | DiagnosticCode::DuplicateName)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Material file (or caller-supplied label) the problem came from.
    pub source: PathBuf,
    pub pipeline: Option<String>,
    pub code: DiagnosticCode,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = if self.code.is_warning() { "warning" } else { "error" };
        write!(f, "{level}: {}", self.source.display())?;
        if let Some(p) = &self.pipeline {
            write!(f, " [{p}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

pub struct PipelineDbBuilder<C: ShaderCompiler> {
    config: BuildConfig,
    compiler: C,
    data: Arena,
    scratch: Arena,
    records: Vec<Span>,
    names: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<C: ShaderCompiler> PipelineDbBuilder<C> {
    pub fn new(config: BuildConfig, compiler: C) -> Self {
        Self {
            data: Arena::with_capacity(config.data_capacity),
            scratch: Arena::with_capacity(config.scratch_capacity),
            config,
            compiler,
            records: Vec::new(),
            names: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn config(&self) -> &BuildConfig { &self.config }

    /// Number of finished records.
    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// Bytes of the data arena in use.
    pub fn data_used(&self) -> usize { self.data.used() }

    pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> { std::mem::take(&mut self.diagnostics) }

    /// Finished records in build order.
    pub fn records(&self) -> impl Iterator<Item = PipelineView<'_>> + '_ {
        self.records.iter().filter_map(move |s| PipelineView::new(self.data.bytes(*s)).ok())
    }

    /// Forget all records. Views handed out earlier must not outlive this.
    pub fn clear(&mut self) {
        self.data.reset();
        self.records.clear();
        self.names.clear();
        self.diagnostics.clear();
    }

    /// Compile every pipeline of one material file. Returns how many records
    /// were added; an unreadable, oversized or malformed file adds none and is
    /// recorded as a diagnostic.
    pub fn compile_material_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or(Path::new("."));

        // Scratch exhaustion only concerns this file; the data arena is untouched.
        self.scratch.reset();
        let parsed = self
            .scratch
            .read_file(path)
            .and_then(|span| Ok(serde_json::from_slice::<Value>(self.scratch.bytes(span))?));
        let root = match parsed {
            Ok(root) => root,
            Err(e) => {
                warn!(material = %path.display(), "skipping material: {e}");
                self.push_diag(path, None, DiagnosticCode::of(&e), e.to_string());
                return Ok(0);
            }
        };
        self.compile_material(&root, dir, path)
    }

    /// Compile an already-parsed material document. `dir` resolves shader
    /// paths, `source` labels diagnostics.
    pub fn compile_material(&mut self, root: &Value, dir: &Path, source: &Path) -> Result<usize> {
        let pipelines = match pipelines_of(root) {
            Ok(p) => p,
            Err(e) => {
                warn!(material = %source.display(), "skipping material: {e}");
                self.push_diag(source, None, DiagnosticCode::of(&e), e.to_string());
                return Ok(0);
            }
        };

        let mut added = 0;
        for val in pipelines {
            let label = val.get("name").and_then(Value::as_str).map(str::to_string);
            let outcome = PipelineDesc::from_json(val, dir).and_then(|desc| self.compile_pipeline(&desc, source));
            match outcome {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(material = %source.display(), pipeline = ?label, "error while compiling pipeline: {e}");
                    self.push_diag(source, label, DiagnosticCode::of(&e), e.to_string());
                }
            }
        }
        info!(material = %source.display(), pipelines = added, "material compiled");
        Ok(added)
    }

    /// Build one record. Returns `false` if the pipeline was rejected under
    /// [`StageFailurePolicy::RejectPipeline`].
    pub fn compile_pipeline(&mut self, desc: &PipelineDesc, source: &Path) -> Result<bool> {
        let Self { config, compiler, data, records, names, diagnostics, .. } = self;
        let label = desc.name.clone().unwrap_or_else(|| "null".to_string());
        let mut diag = |code: DiagnosticCode, message: String| {
            diagnostics.push(Diagnostic { source: source.to_path_buf(), pipeline: Some(label.clone()), code, message });
        };

        let mut w = RecordWriter::begin(data)?;

        let mut truncated = Vec::new();
        if let Some(v) = &desc.name {
            if w.set_name(v) { truncated.push(("name", v)); }
        }
        if let Some(v) = &desc.renderpass {
            if w.set_renderpass(v) { truncated.push(("renderpass", v)); }
        }
        if let Some(v) = &desc.vertex_input {
            if w.set_vertex_input(v) { truncated.push(("vertex_input", v)); }
        }

        let st = w.state_mut();
        if let Some(v) = desc.depth_test { st.depth_test = v; }
        if let Some(v) = desc.depth_write { st.depth_write = v; }
        if let Some(v) = desc.polygon_mode { st.polygon_mode = v; }
        if let Some(v) = desc.topology { st.topology = v; }
        if let Some(v) = desc.cull_mode { st.cull_mode = v; }
        if let Some(v) = desc.depth_op { st.depth_op = v; }

        let definitions: Definitions =
            config.definitions.iter().chain(desc.definitions.iter()).cloned().collect();

        for path in &desc.shader_files {
            if w.stage_count() >= MAX_STAGES {
                let e = PipeDbError::StageLimitExceeded { limit: MAX_STAGES };
                warn!(pipeline = %label, shader = %path.display(), "{e}");
                diag(DiagnosticCode::of(&e), format!("{}: {e}", path.display()));
                continue;
            }

            let compiled = StageKind::from_path(path).and_then(|stage| {
                let words = compiler.compile(path, stage, &definitions).map_err(|e| as_stage_error(path, e))?;
                if words.is_empty() {
                    return Err(as_stage_error(path, PipeDbError::parse("compiler produced no output")));
                }
                Ok((stage, words))
            });

            match compiled {
                Ok((stage, words)) => {
                    let s = w.append_stage(stage, &words)?;
                    debug!(pipeline = %label, shader = %path.display(), offset = s.offset, size = s.size, "stage appended");
                }
                Err(e) => {
                    warn!(pipeline = %label, "{e}");
                    diag(DiagnosticCode::of(&e), e.to_string());
                    if config.stage_failure_policy == StageFailurePolicy::RejectPipeline {
                        diag(DiagnosticCode::PipelineRejected, "pipeline rejected after stage failure".to_string());
                        return Ok(false);
                    }
                }
            }
        }

        for (field, v) in truncated {
            warn!(pipeline = %label, field, "value truncated");
            diag(DiagnosticCode::Truncated, format!("{field} {v:?} truncated"));
        }

        let stored = w.header().name().into_owned();
        let span = w.finish();
        if !names.insert(stored) {
            warn!(pipeline = %label, "duplicate pipeline name, later record wins on load");
            diag(DiagnosticCode::DuplicateName, "duplicate name; the later record wins on load".to_string());
        }
        records.push(span);
        Ok(true)
    }

    pub fn dump_to_vec(&self) -> Result<Vec<u8>> {
        image::encode_image(self.records.iter().map(|s| self.data.bytes(*s)))
    }

    /// Write the database atomically to `path`.
    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let out = image::write_image_to_file(path, self.records.iter().map(|s| self.data.bytes(*s)))?;
        info!(path = %out.display(), records = self.records.len(), "database written");
        Ok(out)
    }

    fn push_diag(&mut self, source: &Path, pipeline: Option<String>, code: DiagnosticCode, message: String) {
        self.diagnostics.push(Diagnostic { source: source.to_path_buf(), pipeline, code, message });
    }
}

#[cfg(feature = "naga")]
impl PipelineDbBuilder<crate::compiler::NagaGlslCompiler> {
    /// Builder backed by the bundled GLSL compiler.
    pub fn with_naga(config: BuildConfig) -> Self {
        let compiler = crate::compiler::NagaGlslCompiler::new(config.scratch_capacity);
        Self::new(config, compiler)
    }
}

fn as_stage_error(path: &Path, e: PipeDbError) -> PipeDbError {
    match e {
        e @ (PipeDbError::StageCompileFailed { .. } | PipeDbError::UnknownShaderStage(_)) => e,
        other => PipeDbError::StageCompileFailed { path: path.to_path_buf(), message: other.to_string() },
    }
}
