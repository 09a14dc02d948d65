use crate::errors::Result;
use crate::material::Definitions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// What to do with a pipeline when one of its stages fails to compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFailurePolicy {
    /// Drop the failed stage, keep the pipeline with its remaining stages.
    #[default]
    SkipStage,
    /// Drop the whole pipeline.
    RejectPipeline,
}

/// Builder configuration. Every field is optional in the JSON form:
///
/// ```json
/// {
///   "data_capacity": 67108864,
///   "scratch_capacity": 16777216,
///   "stage_failure_policy": "reject_pipeline",
///   "definitions": [["ENGINE_VERSION", "3"]]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Bytes reserved for compiled records.
    pub data_capacity: usize,
    /// Bytes reserved for per-material scratch (file contents).
    pub scratch_capacity: usize,
    pub stage_failure_policy: StageFailurePolicy,
    /// Prepended to every pipeline's own `compiler_definitions`.
    pub definitions: Definitions,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            data_capacity: 64 << 20,
            scratch_capacity: 16 << 20,
            stage_failure_policy: StageFailurePolicy::SkipStage,
            definitions: vec![],
        }
    }
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&s)?)
    }

    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let c: BuildConfig = serde_json::from_str(r#"{ "stage_failure_policy": "reject_pipeline" }"#).unwrap();
        assert_eq!(c.stage_failure_policy, StageFailurePolicy::RejectPipeline);
        assert_eq!(c.data_capacity, BuildConfig::default().data_capacity);
        assert!(c.definitions.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("pipedb.json");
        let c = BuildConfig {
            data_capacity: 1024,
            definitions: vec![("A".into(), "1".into())],
            ..Default::default()
        };
        c.save_atomic(&p).unwrap();
        assert_eq!(BuildConfig::load(&p).unwrap(), c);
        assert!(BuildConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
