// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::queue::DEFAULT_MAX_PROCESSES;
use crate::types::{Colormap, ImageFormat};

/// Exporter plug-in whose output the image phase reads instead of the raw
/// data folder.
pub const FLATTENER_EXPORTER: &str = "Flattener";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [run]
/// max_processes = 2
/// recursive = false
/// overwrite = false
///
/// [flatten]
/// enabled = true
/// program = "VernissageCmd.exe"
/// flags = "-path {path} -outdir {outdir} -exporter {exporter}"
/// exporter = "Flattener"
/// out_folder = "vernissage_out"
///
/// [image]
/// enabled = true
/// program = "gwyexport"
/// format = "jpg"
/// colormap = "adaptive"
/// out_folder = "img_out"
/// ```
///
/// All sections are optional and default to the values above. This is the
/// unvalidated form; turn it into a [`ConfigFile`] with `TryFrom`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub flatten: FlattenSection,

    #[serde(default)]
    pub image: ImageSection,
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    /// Concurrency limit applied to each phase's queue.
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,

    /// Also convert every sub-directory of each input folder.
    #[serde(default)]
    pub recursive: bool,

    /// Reuse output folders that already exist.
    ///
    /// Files inside them may be overwritten by the external tools.
    #[serde(default)]
    pub overwrite: bool,
}

fn default_max_processes() -> usize {
    DEFAULT_MAX_PROCESSES
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_processes: default_max_processes(),
            recursive: false,
            overwrite: false,
        }
    }
}

/// `[flatten]` section: phase 1, exporting raw data with the vendor tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlattenSection {
    pub enabled: bool,
    pub program: String,
    /// Binds `{path}`, `{outdir}` and `{exporter}`.
    pub flags: String,
    /// Exporter plug-in name passed as `{exporter}`.
    pub exporter: String,
    pub out_folder: PathBuf,
}

impl Default for FlattenSection {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "VernissageCmd.exe".to_string(),
            flags: "-path {path} -outdir {outdir} -exporter {exporter}".to_string(),
            exporter: FLATTENER_EXPORTER.to_string(),
            out_folder: PathBuf::from("vernissage_out"),
        }
    }
}

impl FlattenSection {
    /// Whether the image phase should read this phase's output.
    pub fn feeds_image_phase(&self) -> bool {
        self.enabled && self.exporter == FLATTENER_EXPORTER
    }
}

/// `[image]` section: phase 2, rendering images with the exporter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSection {
    pub enabled: bool,
    pub program: String,
    /// Binds `{exportformat}`, `{outputpath}`, `{filterlist}`, `{gradient}`,
    /// `{colormap}`, `{inputfolder}` and `{inputfiles}`.
    pub flags: String,
    pub format: ImageFormat,
    /// Semicolon-separated filter/module list.
    pub filters: String,
    /// Colour gradient name.
    pub gradient: String,
    pub colormap: Colormap,
    pub out_folder: PathBuf,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "gwyexport".to_string(),
            flags: "-s -f {exportformat} -m -o {outputpath} --filters {filterlist} \
                    --gradient {gradient} --colormap {colormap} {inputfiles}"
                .to_string(),
            format: ImageFormat::default(),
            filters: "pc;melc;sr;melc;pc".to_string(),
            gradient: "Wrappmono".to_string(),
            colormap: Colormap::default(),
            out_folder: PathBuf::from("img_out"),
        }
    }
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so holders can rely on
/// `max_processes >= 1`, at least one enabled phase, and a program for every
/// enabled phase.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    run: RunSection,
    flatten: FlattenSection,
    image: ImageSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        run: RunSection,
        flatten: FlattenSection,
        image: ImageSection,
    ) -> Self {
        Self {
            run,
            flatten,
            image,
        }
    }

    pub fn run(&self) -> &RunSection {
        &self.run
    }

    pub fn flatten(&self) -> &FlattenSection {
        &self.flatten
    }

    pub fn image(&self) -> &ImageSection {
        &self.image
    }
}
