//! Run configuration: defaults, optional JSON file, then command line.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::compute::{
    DeviceClass, DispatchParameters, StorageMode, DEFAULT_MAX_ITERATIONS, DEFAULT_SIZE, DEFAULT_TARGET_ITEMS,
};
use crate::stats::DEFAULT_REPORT_INTERVAL;
use crate::util::Result;

/// Requested transfer path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Shared when the renderer's device fits, staged otherwise.
    #[default]
    Auto,
    Shared,
    Staged,
}

impl TransferMode {
    /// Explicit storage mode, `None` for auto.
    pub fn forced(self) -> Option<StorageMode> {
        match self {
            Self::Auto => None,
            Self::Shared => Some(StorageMode::Shared),
            Self::Staged => Some(StorageMode::Staged),
        }
    }
}

/// Settings read at startup. Never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Device
    pub device: DeviceClass,
    pub transfer: TransferMode,

    // Canvas
    pub width: u32,
    pub height: u32,
    pub max_iterations: u32,

    // Kernel
    pub kernel_path: Option<PathBuf>,
    pub target_items_per_group: u32,

    // Stats
    pub report_interval: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: DeviceClass::Gpu,
            transfer: TransferMode::Auto,
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            kernel_path: None,
            target_items_per_group: DEFAULT_TARGET_ITEMS,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl Settings {
    /// Settings file location
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("mandel-interop");
            p.push("settings.json");
            p
        })
    }

    /// Load from the config directory, falling back to defaults.
    pub fn load() -> Self {
        match Self::path().filter(|p| p.exists()) {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Load from an explicit file. Missing keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text).map_err(std::io::Error::from)?;
        Ok(settings.sanitized())
    }

    /// Replace zero sizes and counts with defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.width == 0 {
            self.width = defaults.width;
        }
        if self.height == 0 {
            self.height = defaults.height;
        }
        if self.max_iterations == 0 {
            self.max_iterations = defaults.max_iterations;
        }
        if self.target_items_per_group == 0 {
            self.target_items_per_group = defaults.target_items_per_group;
        }
        if self.report_interval == 0 {
            self.report_interval = defaults.report_interval;
        }
        self
    }

    /// Apply command-line overrides. Returns arguments that were not consumed.
    ///
    /// Recognized: `gpu`, `cpu`, `--shared`, `--staged`, `--width N`,
    /// `--height N`, `--iterations N`, `--kernel PATH`, `--items N`.
    pub fn apply_args<S: AsRef<str>>(&mut self, args: &[S]) -> std::result::Result<Vec<String>, String> {
        let mut rest = Vec::new();
        let mut it = args.iter().map(|s| s.as_ref());
        while let Some(arg) = it.next() {
            match arg {
                "gpu" | "--gpu" => self.device = DeviceClass::Gpu,
                "cpu" | "--cpu" => self.device = DeviceClass::Cpu,
                "--shared" => self.transfer = TransferMode::Shared,
                "--staged" => self.transfer = TransferMode::Staged,
                "--width" | "-W" => self.width = positive(arg, it.next())?,
                "--height" | "-H" => self.height = positive(arg, it.next())?,
                "--iterations" | "-n" => self.max_iterations = positive(arg, it.next())?,
                "--items" => self.target_items_per_group = positive(arg, it.next())?,
                "--kernel" | "-k" => {
                    let path = it.next().ok_or_else(|| format!("{} expects a path", arg))?;
                    self.kernel_path = Some(PathBuf::from(path));
                }
                other => rest.push(other.to_string()),
            }
        }
        Ok(rest)
    }

    /// Initial kernel parameters for the configured canvas.
    pub fn params(&self) -> DispatchParameters {
        let mut params = DispatchParameters::new(self.width, self.height);
        params.set_max_iterations(self.max_iterations);
        params
    }
}

fn positive(flag: &str, value: Option<&str>) -> std::result::Result<u32, String> {
    let value = value.ok_or_else(|| format!("{} expects a value", flag))?;
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{} expects a positive integer, got '{}'", flag, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.device, DeviceClass::Gpu);
        assert_eq!(s.transfer, TransferMode::Auto);
        assert_eq!((s.width, s.height), (512, 512));
        assert_eq!(s.target_items_per_group, 32);
        assert_eq!(s.report_interval, 30);
    }

    #[test]
    fn test_apply_args() {
        let mut s = Settings::default();
        let rest = s
            .apply_args(&["cpu", "--staged", "--width", "64", "--height", "32", "render", "--out", "x.png"])
            .unwrap();
        assert_eq!(s.device, DeviceClass::Cpu);
        assert_eq!(s.transfer.forced(), Some(StorageMode::Staged));
        assert_eq!((s.width, s.height), (64, 32));
        assert_eq!(rest, vec!["render", "--out", "x.png"]);
    }

    #[test]
    fn test_apply_args_rejects_bad_values() {
        let mut s = Settings::default();
        assert!(s.apply_args(&["--width"]).is_err());
        assert!(s.apply_args(&["--width", "0"]).is_err());
        assert!(s.apply_args(&["--iterations", "many"]).is_err());
        assert_eq!(s.width, 512);
    }

    #[test]
    fn test_params_from_settings() {
        let s = Settings { width: 100, height: 50, max_iterations: 200, ..Default::default() };
        let p = s.params();
        assert_eq!(p.size(), (100, 50));
        assert_eq!(p.max_iterations(), 200);
        assert!(p.is_dirty());
    }
}
