pub mod consts;
pub mod errors;
pub mod utils;
pub mod arena;
pub mod vk;
pub mod record;
pub mod image;
pub mod material;
pub mod config;
pub mod compiler;
pub mod builder;
pub mod loader;

pub use arena::{Arena, Span};
pub use builder::{Diagnostic, DiagnosticCode, PipelineDbBuilder};
pub use compiler::ShaderCompiler;
#[cfg(feature = "naga")]
pub use compiler::NagaGlslCompiler;
pub use config::{BuildConfig, StageFailurePolicy};
pub use errors::{PipeDbError, Result};
pub use loader::PipelineDb;
pub use material::{Definitions, PipelineDesc};
pub use record::{PipelineRecord, PipelineView, RecordWriter, RenderState, StageDesc};
pub use vk::StageKind;
