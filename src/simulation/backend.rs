use crate::core::{Metrics, SimulationResult};
use crate::error::BackendError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Environment override for the backend program.
pub const BACKEND_PROGRAM_ENV: &str = "ACSS_SIM_BACKEND";
pub const DEFAULT_BACKEND_PROGRAM: &str = "matlab";
pub const DEFAULT_BACKEND_ARGS: &[&str] = &["-batch", "acss_build_and_run('{payload}','{output}')"];
/// Result document the backend is expected to write into the iteration directory.
pub const BACKEND_RESULT_FILE: &str = "backend_result.json";

/// External simulation collaborator.
pub trait SimulationBackend {
    fn name(&self) -> &str;

    /// Build and simulate the model described by `payload`, writing outputs into `out_dir`.
    fn run(&self, payload: &Path, out_dir: &Path) -> Result<SimulationResult, BackendError>;
}

/// How to launch the backend process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    pub program: String,
    /// Argument template; `{payload}` and `{output}` are substituted per run.
    pub args: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_BACKEND_PROGRAM.to_string(),
            args: DEFAULT_BACKEND_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BackendConfig {
    /// Defaults with the program taken from `ACSS_SIM_BACKEND` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(program) = std::env::var(BACKEND_PROGRAM_ENV) {
            if !program.trim().is_empty() {
                config.program = program.trim().to_string();
            }
        }
        config
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn render_args(&self, payload: &Path, output: &Path) -> Vec<String> {
        let payload = payload.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{payload}", &payload).replace("{output}", &output))
            .collect()
    }
}

/// Runs the backend as a child process and reads its result document.
///
/// There is no timeout: a hung backend blocks the run.
pub struct ProcessBackend {
    config: BackendConfig,
}

impl ProcessBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

impl SimulationBackend for ProcessBackend {
    fn name(&self) -> &str {
        &self.config.program
    }

    fn run(&self, payload: &Path, out_dir: &Path) -> Result<SimulationResult, BackendError> {
        let output_path = out_dir.join(BACKEND_RESULT_FILE);
        let args = self.config.render_args(payload, &output_path);
        debug!(program = %self.config.program, ?args, "launching simulation backend");

        let output = Command::new(&self.config.program)
            .args(&args)
            .current_dir(out_dir)
            .output()
            .map_err(|source| BackendError::Launch {
                program: self.config.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackendError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !output_path.exists() {
            return Err(BackendError::MissingOutput(output_path));
        }
        let text = std::fs::read_to_string(&output_path)
            .map_err(|e| BackendError::InvalidOutput(format!("{}: {}", output_path.display(), e)))?;
        parse_result_document(&text, out_dir)
    }
}

/// Decode a backend result document.
///
/// `metrics` must carry all four required keys. The whole document becomes
/// `raw`, with `mode: "backend"` and `validation: "trusted"` filled in when the
/// backend did not tag itself. Relative waveform paths are taken relative to
/// `out_dir`.
pub fn parse_result_document(text: &str, out_dir: &Path) -> Result<SimulationResult, BackendError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| BackendError::InvalidOutput(e.to_string()))?;
    let Value::Object(mut raw) = doc else {
        return Err(BackendError::InvalidOutput("result document is not an object".into()));
    };

    let metrics_value = raw
        .get("metrics")
        .cloned()
        .ok_or_else(|| BackendError::InvalidOutput("missing 'metrics'".into()))?;
    let metrics: Metrics = serde_json::from_value(metrics_value)
        .map_err(|e| BackendError::InvalidOutput(format!("metrics: {}", e)))?;

    let waveform_files = string_list(raw.get("waveform_files"))
        .into_iter()
        .map(|f| resolve_against(out_dir, &f))
        .collect();
    let code_files = string_list(raw.get("code_files"));

    raw.entry("mode").or_insert_with(|| Value::from("backend"));
    raw.entry("validation").or_insert_with(|| Value::from("trusted"));

    Ok(SimulationResult {
        metrics,
        waveform_files,
        code_files,
        raw: Value::Object(raw),
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

fn resolve_against(dir: &Path, file: &str) -> String {
    let path = PathBuf::from(file);
    if path.is_absolute() {
        file.to_string()
    } else {
        dir.join(path).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValidationMode;

    #[test]
    fn renders_placeholders() {
        let config = BackendConfig::default();
        let args = config.render_args(Path::new("/r/model_payload.json"), Path::new("/r/out.json"));
        assert_eq!(args[0], "-batch");
        assert_eq!(args[1], "acss_build_and_run('/r/model_payload.json','/r/out.json')");
    }

    #[test]
    fn result_defaults_to_trusted_backend() {
        let text = r#"{"metrics": {"overshoot_pct": 1.0, "settling_time_ms": 2.0,
                       "ripple_v_pp": 0.1, "efficiency_pct": 97.0, "thd_pct": 2.5},
                       "waveform_files": ["wave.json"]}"#;
        let result = parse_result_document(text, Path::new("/tmp/iter_00")).unwrap();
        assert_eq!(result.raw["mode"], "backend");
        assert_eq!(result.validation_mode(), ValidationMode::Trusted);
        assert_eq!(result.metrics.extra.get("thd_pct"), Some(&2.5));
        assert_eq!(result.waveform_files, vec!["/tmp/iter_00/wave.json".to_string()]);
    }

    #[test]
    fn backend_tags_are_kept() {
        let text = r#"{"metrics": {"overshoot_pct": 1.0, "settling_time_ms": 2.0,
                       "ripple_v_pp": 0.1, "efficiency_pct": 97.0},
                       "mode": "simulink", "validation": "untrusted"}"#;
        let result = parse_result_document(text, Path::new(".")).unwrap();
        assert_eq!(result.raw["mode"], "simulink");
        assert_eq!(result.validation_mode(), ValidationMode::Untrusted);
        assert!(result.waveform_files.is_empty());
    }

    #[test]
    fn incomplete_metrics_are_rejected() {
        let text = r#"{"metrics": {"overshoot_pct": 1.0}}"#;
        assert!(matches!(
            parse_result_document(text, Path::new(".")),
            Err(BackendError::InvalidOutput(_))
        ));
        assert!(parse_result_document("[]", Path::new(".")).is_err());
        assert!(parse_result_document("{}", Path::new(".")).is_err());
    }

    #[test]
    fn launch_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ProcessBackend::new(BackendConfig::default().with_program("acss-no-such-backend-binary"));
        let err = backend.run(&dir.path().join("p.json"), dir.path()).unwrap_err();
        assert!(matches!(err, BackendError::Launch { .. }));
    }
}
