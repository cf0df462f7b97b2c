use crate::simulation::BackendConfig;
use std::path::PathBuf;

pub const DEFAULT_OUT_DIR: &str = "runs";
pub const DEFAULT_TEMPLATE_DIR: &str = "templates";

/// Run-level settings.
#[derive(Clone, Debug, PartialEq)]
pub struct OrchestratorConfig {
    /// Root under which each run gets its own timestamped directory.
    pub out_dir: PathBuf,
    /// Explicit template; a missing file is fatal.
    pub template_path: Option<PathBuf>,
    /// Searched recursively for `*.slx` when no explicit template is given.
    pub template_dir: PathBuf,
    pub use_backend: bool,
    pub backend: BackendConfig,
    pub require_trusted_backend: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            template_path: None,
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            use_backend: true,
            backend: BackendConfig::from_env(),
            require_trusted_backend: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    pub fn with_template(mut self, path: Option<PathBuf>) -> Self {
        self.template_path = path;
        self
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    pub fn with_backend_enabled(mut self, enabled: bool) -> Self {
        self.use_backend = enabled;
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_trusted_backend_required(mut self, required: bool) -> Self {
        self.require_trusted_backend = required;
        self
    }
}
