// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RawConfigFile;
use crate::types::{Colormap, ImageFormat, Verbosity};

/// Command-line arguments for `autoconvert`.
///
/// Every option that also exists in the config file overrides the file's
/// value when given.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "autoconvert",
    version,
    about = "Batch-convert scanning probe data: flatten with the vendor exporter, then render images.",
    long_about = None
)]
pub struct CliArgs {
    /// Folders containing the data to convert.
    #[arg(value_name = "INPUT_FOLDERS", required = true)]
    pub input_folders: Vec<PathBuf>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Autoconvert.toml` in the current working directory, if it
    /// exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Convert also the data in all sub-folders.
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Reuse output folders that already exist. Files in them may be
    /// overwritten.
    #[arg(long)]
    pub overwrite: bool,

    /// Maximum number of external processes running at once, per phase.
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_processes: Option<u32>,

    /// Skip the flatten phase.
    #[arg(long)]
    pub no_flatten: bool,

    /// Flatten phase output folder.
    #[arg(long, value_name = "DIR")]
    pub flatten_out: Option<PathBuf>,

    /// Flatten executable.
    #[arg(long, value_name = "PROGRAM")]
    pub flatten_cmd: Option<String>,

    /// Flatten flag template; binds {path}, {outdir} and {exporter}.
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    pub flatten_flags: Option<String>,

    /// Exporter plug-in name passed to the flatten tool.
    #[arg(long, value_name = "NAME")]
    pub exporter: Option<String>,

    /// Skip the image phase.
    #[arg(long)]
    pub no_image: bool,

    /// Image phase output folder.
    #[arg(long, value_name = "DIR")]
    pub image_out: Option<PathBuf>,

    /// Image exporter executable.
    #[arg(long, value_name = "PROGRAM")]
    pub image_cmd: Option<String>,

    /// Image flag template; binds {exportformat}, {outputpath}, {filterlist},
    /// {gradient}, {colormap}, {inputfolder} and {inputfiles}.
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    pub image_flags: Option<String>,

    /// Image output format.
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<ImageFormat>,

    /// Filter/module list separated by semicolons.
    #[arg(long, value_name = "LIST")]
    pub filters: Option<String>,

    /// Colour gradient name.
    #[arg(long, value_name = "NAME")]
    pub gradient: Option<String>,

    /// Colour scale adaptation.
    #[arg(long, value_enum)]
    pub colormap: Option<Colormap>,

    /// Only report warnings, failures and the final summary.
    #[arg(long)]
    pub quiet: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AUTOCONVERT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Plan and print every command, but don't run or create anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Overlay the options given on the command line onto `raw`.
    pub fn apply_to(&self, raw: &mut RawConfigFile) {
        if self.recursive {
            raw.run.recursive = true;
        }
        if self.overwrite {
            raw.run.overwrite = true;
        }
        if let Some(n) = self.max_processes {
            raw.run.max_processes = n as usize;
        }

        let flatten = &mut raw.flatten;
        if self.no_flatten {
            flatten.enabled = false;
        }
        override_with(&mut flatten.out_folder, &self.flatten_out);
        override_with(&mut flatten.program, &self.flatten_cmd);
        override_with(&mut flatten.flags, &self.flatten_flags);
        override_with(&mut flatten.exporter, &self.exporter);

        let image = &mut raw.image;
        if self.no_image {
            image.enabled = false;
        }
        override_with(&mut image.out_folder, &self.image_out);
        override_with(&mut image.program, &self.image_cmd);
        override_with(&mut image.flags, &self.image_flags);
        override_with(&mut image.format, &self.format);
        override_with(&mut image.filters, &self.filters);
        override_with(&mut image.gradient, &self.gradient);
        override_with(&mut image.colormap, &self.colormap);
    }

    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if matches!(self.log_level, Some(LogLevel::Debug | LogLevel::Trace)) {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

fn override_with<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_config_values() {
        let args = CliArgs::parse_from([
            "autoconvert",
            "-R",
            "-j",
            "4",
            "--no-flatten",
            "--image-flags",
            "-f {exportformat} {inputfiles}",
            "-f",
            "png",
            "/data",
        ]);

        let mut raw = RawConfigFile::default();
        args.apply_to(&mut raw);

        assert!(raw.run.recursive);
        assert_eq!(raw.run.max_processes, 4);
        assert!(!raw.flatten.enabled);
        assert_eq!(raw.image.flags, "-f {exportformat} {inputfiles}");
        assert_eq!(raw.image.format, ImageFormat::Png);
        assert_eq!(raw.image.gradient, "Wrappmono");
        assert_eq!(args.input_folders, vec![PathBuf::from("/data")]);
    }

    #[test]
    fn zero_processes_is_rejected() {
        assert!(CliArgs::try_parse_from(["autoconvert", "-j", "0", "/data"]).is_err());
    }

    #[test]
    fn quiet_wins_over_debug_logging() {
        let args = CliArgs::parse_from(["autoconvert", "--quiet", "--log-level", "debug", "/d"]);
        assert_eq!(args.verbosity(), Verbosity::Quiet);
    }
}
