// src/types.rs

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

/// Raster format written by the image exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Png,
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Jpg
    }
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "png" => Ok(ImageFormat::Png),
            other => Err(format!(
                "invalid image format: {other} (expected \"jpg\" or \"png\")"
            )),
        }
    }
}

/// How the exporter maps data values onto the colour gradient.
///
/// - `Full`: use the full data range.
/// - `Adaptive`: adapt to the value histogram (exporter default).
/// - `Auto`: let the exporter cut outliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Full,
    Adaptive,
    Auto,
}

impl Default for Colormap {
    fn default() -> Self {
        Colormap::Adaptive
    }
}

impl Colormap {
    pub fn as_str(&self) -> &'static str {
        match self {
            Colormap::Full => "full",
            Colormap::Adaptive => "adaptive",
            Colormap::Auto => "auto",
        }
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colormap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Colormap::Full),
            "adaptive" => Ok(Colormap::Adaptive),
            "auto" => Ok(Colormap::Auto),
            other => Err(format!(
                "invalid colormap: {other} (expected \"full\", \"adaptive\" or \"auto\")"
            )),
        }
    }
}

/// How chatty the command builder and the process queues are.
///
/// This is handed to the components that build and run commands instead of a
/// process-wide debug switch. It only decides at which `tracing` level those
/// components report; the subscriber's filter still applies on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Only warnings and failures.
    Quiet,
    /// Built commands and job transitions at `info`.
    #[default]
    Normal,
    /// Everything, including per-chunk output accounting, at `info`.
    Debug,
}

impl Verbosity {
    /// Whether routine events (commands, job transitions) go out at `info`.
    pub fn announces(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Whether low-level detail (output chunks, promotions) goes out at `info`.
    pub fn is_debug(&self) -> bool {
        matches!(self, Verbosity::Debug)
    }
}
