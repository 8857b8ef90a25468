use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use taskfarm_dispatch::DispatchConfig;

use crate::error::MandelbrotError;
use crate::task::GridParams;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "TASKFARM_CONFIG";

/// Application config: the dispatch layer plus the grid and output sections.
///
/// ```toml
/// [dispatch.manager]
/// port = 5570
///
/// [grid]
/// max_iterations = 500
/// real_points = 600
/// imaginary_points = 400
///
/// [output]
/// path = "out/mandelbrot.dat"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MandelbrotConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub grid: GridParams,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination of the `.dat` grid file.
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("mandelbrot.dat")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

impl MandelbrotConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, MandelbrotError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MandelbrotError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from the file named by `TASKFARM_CONFIG`, or defaults when unset.
    pub fn load() -> Result<Self, MandelbrotError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                info!(path = %path, "loading config file");
                Self::from_file(path)
            }
            Err(_) => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Dispatch overrides plus `TASKFARM_OUTPUT_PATH` → `output.path`.
    pub fn apply_env_overrides(&mut self) {
        self.dispatch.apply_env_overrides();
        if let Ok(v) = std::env::var("TASKFARM_OUTPUT_PATH") {
            self.output.path = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), MandelbrotError> {
        self.dispatch.validate()?;
        self.grid.validate()?;
        if self.output.path.as_os_str().is_empty() {
            return Err(MandelbrotError::Config("output.path must not be empty".into()));
        }
        Ok(())
    }
}
