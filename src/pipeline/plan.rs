// src/pipeline/plan.rs

//! Turning input folders into per-phase work.
//!
//! Every input folder (and, when recursive, every sub-directory below it) is
//! one unit of work: one flatten job and one image job, each writing into the
//! phase's output folder at the same relative position.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::command::{ArgValue, CommandBuilder, CommandTemplate, ValueMap, build};
use crate::config::ConfigFile;
use crate::errors::{AutoconvertError, Result};
use crate::fs::FileSystem;
use crate::queue::Job;

use super::Phase;

/// Placeholder tokens bound by the planner.
pub mod placeholder {
    pub const PATH: &str = "{path}";
    pub const OUTDIR: &str = "{outdir}";
    pub const EXPORTER: &str = "{exporter}";

    pub const EXPORT_FORMAT: &str = "{exportformat}";
    pub const OUTPUT_PATH: &str = "{outputpath}";
    pub const FILTER_LIST: &str = "{filterlist}";
    pub const GRADIENT: &str = "{gradient}";
    pub const COLORMAP: &str = "{colormap}";
    pub const INPUT_FOLDER: &str = "{inputfolder}";
    pub const INPUT_FILES: &str = "{inputfiles}";
}

/// A directory that will not be converted, and why.
#[derive(Debug)]
pub struct PlanIssue {
    pub dir: PathBuf,
    pub error: AutoconvertError,
}

/// An image job whose file list is only known once phase 1 has run.
#[derive(Debug, Clone)]
pub struct ImageTarget {
    /// Directory the images are rendered from.
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub label: String,
    template: CommandTemplate,
    /// Every binding except `{inputfiles}`.
    values: ValueMap,
}

impl ImageTarget {
    /// List the input folder now and build the job.
    pub fn resolve(&self, fs: &dyn FileSystem, builder: &CommandBuilder) -> Result<Job> {
        let files: Vec<String> = fs
            .files(&self.input_folder)?
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        debug!(
            folder = %self.input_folder.display(),
            files = files.len(),
            "resolved image input files"
        );

        let mut values = self.values.clone();
        values.insert(placeholder::INPUT_FILES.to_string(), ArgValue::List(files));
        builder.build_job(&self.template, &values, None, self.label.clone())
    }
}

/// Everything the pipeline needs to run.
#[derive(Debug, Default)]
pub struct Plan {
    /// Phase 1 jobs, in discovery order.
    pub flatten: Vec<Job>,
    /// Phase 2 targets, in discovery order.
    pub image: Vec<ImageTarget>,
    pub skipped: Vec<PlanIssue>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.flatten.is_empty() && self.image.is_empty()
    }

    /// Whether any directory was dropped because a flag template references
    /// a placeholder the planner does not bind.
    pub fn has_binding_errors(&self) -> bool {
        self.skipped.iter().any(|issue| {
            matches!(
                issue.error,
                AutoconvertError::MissingPlaceholderBinding { .. }
            )
        })
    }
}

/// Builds a [`Plan`] from a validated config.
pub struct Planner<'a> {
    fs: &'a dyn FileSystem,
    config: &'a ConfigFile,
    builder: CommandBuilder,
    create_dirs: bool,
}

impl<'a> Planner<'a> {
    pub fn new(fs: &'a dyn FileSystem, config: &'a ConfigFile, builder: CommandBuilder) -> Self {
        Self {
            fs,
            config,
            builder,
            create_dirs: true,
        }
    }

    /// Whether to create output folders while planning (off for dry runs).
    pub fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }

    /// Build each enabled phase's command once with placeholder values, so a
    /// template referencing an unbound placeholder fails before any
    /// directory is touched.
    pub fn check_templates(&self) -> Result<()> {
        let sample = Path::new("sample");
        if self.config.flatten().enabled {
            self.flatten_job(sample, sample)?;
        }
        if self.config.image().enabled {
            self.image_target(sample, sample.to_path_buf(), sample)?;
        }
        Ok(())
    }

    pub fn plan(&self, inputs: &[PathBuf]) -> Plan {
        let mut plan = Plan::default();

        for root in inputs {
            if !self.fs.is_dir(root) {
                warn!(path = %root.display(), "input is not a directory; skipping");
                plan.skipped.push(PlanIssue {
                    dir: root.clone(),
                    error: AutoconvertError::InputNotADirectory(root.clone()),
                });
                continue;
            }

            let dirs = match self.discover(root) {
                Ok(dirs) => dirs,
                Err(error) => {
                    plan.skipped.push(PlanIssue {
                        dir: root.clone(),
                        error,
                    });
                    continue;
                }
            };

            for dir in dirs {
                let rel = dir.strip_prefix(root).unwrap_or(Path::new("")).to_path_buf();
                if let Err(error) = self.plan_dir(&dir, &rel, &mut plan) {
                    debug!(dir = %dir.display(), %error, "directory skipped");
                    plan.skipped.push(PlanIssue { dir, error });
                }
            }
        }

        plan
    }

    /// `root` first, then (if recursive) every sub-directory depth first in
    /// name order.
    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = vec![root.to_path_buf()];
        if self.config.run().recursive {
            self.collect_subdirs(root, &mut dirs)?;
        }
        Ok(dirs)
    }

    fn collect_subdirs(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for child in self.fs.subdirs(dir)? {
            out.push(child.clone());
            self.collect_subdirs(&child, out)?;
        }
        Ok(())
    }

    fn plan_dir(&self, dir: &Path, rel: &Path, plan: &mut Plan) -> Result<()> {
        let flatten_cfg = self.config.flatten();
        let image_cfg = self.config.image();

        let flatten_out = flatten_cfg
            .enabled
            .then(|| nest(&flatten_cfg.out_folder, rel));
        let image_out = image_cfg.enabled.then(|| nest(&image_cfg.out_folder, rel));

        for out in flatten_out.iter().chain(image_out.iter()) {
            self.check_output_folder(out, rel)?;
        }

        let flatten_job = match &flatten_out {
            Some(out) => Some(self.flatten_job(dir, out)?),
            None => None,
        };
        let image_target = match &image_out {
            Some(out) => {
                let input = match &flatten_out {
                    Some(flat) if flatten_cfg.feeds_image_phase() => flat.clone(),
                    _ => dir.to_path_buf(),
                };
                Some(self.image_target(dir, input, out)?)
            }
            None => None,
        };

        if self.create_dirs {
            for out in flatten_out.iter().chain(image_out.iter()) {
                self.fs.create_dir_all(out)?;
            }
        }

        plan.flatten.extend(flatten_job);
        plan.image.extend(image_target);
        Ok(())
    }

    fn check_output_folder(&self, out: &Path, rel: &Path) -> Result<()> {
        let top_level = rel.as_os_str().is_empty();
        if !top_level && !self.config.run().overwrite && self.fs.exists(out) {
            return Err(AutoconvertError::OutputFolderConflict(out.to_path_buf()));
        }
        Ok(())
    }

    fn flatten_job(&self, dir: &Path, out: &Path) -> Result<Job> {
        let cfg = self.config.flatten();
        let template = CommandTemplate::new(cfg.program.clone(), cfg.flags.clone());

        let mut values = ValueMap::new();
        // The job runs inside `dir`; some flatteners reject absolute paths.
        values.insert(placeholder::PATH.to_string(), ".".into());
        values.insert(placeholder::OUTDIR.to_string(), out.into());
        values.insert(placeholder::EXPORTER.to_string(), cfg.exporter.as_str().into());

        self.builder.build_job(
            &template,
            &values,
            Some(dir.to_path_buf()),
            label(Phase::Flatten, dir),
        )
    }

    fn image_target(&self, dir: &Path, input: PathBuf, out: &Path) -> Result<ImageTarget> {
        let cfg = self.config.image();
        let template = CommandTemplate::new(cfg.program.clone(), cfg.flags.clone());

        let mut values = ValueMap::new();
        values.insert(placeholder::EXPORT_FORMAT.to_string(), cfg.format.as_str().into());
        values.insert(placeholder::OUTPUT_PATH.to_string(), out.into());
        values.insert(placeholder::FILTER_LIST.to_string(), cfg.filters.as_str().into());
        values.insert(placeholder::GRADIENT.to_string(), cfg.gradient.as_str().into());
        values.insert(placeholder::COLORMAP.to_string(), cfg.colormap.as_str().into());
        values.insert(placeholder::INPUT_FOLDER.to_string(), input.as_path().into());

        // Surface binding errors now rather than after phase 1.
        let mut trial = values.clone();
        trial.insert(placeholder::INPUT_FILES.to_string(), ArgValue::List(Vec::new()));
        build(&template.program, &template.flags, &trial)?;

        Ok(ImageTarget {
            input_folder: input,
            output_folder: out.to_path_buf(),
            label: label(Phase::Image, dir),
            template,
            values,
        })
    }
}

fn nest(base: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

fn label(phase: Phase, dir: &Path) -> String {
    format!("{phase}: {}", dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfigFile;
    use crate::fs::mock::MockFileSystem;

    fn config(edit: impl FnOnce(&mut RawConfigFile)) -> ConfigFile {
        let mut raw = RawConfigFile::default();
        raw.flatten.out_folder = PathBuf::from("/out/flat");
        raw.image.out_folder = PathBuf::from("/out/img");
        edit(&mut raw);
        ConfigFile::try_from(raw).unwrap()
    }

    #[test]
    fn recursive_discovery_is_depth_first_and_sorted() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data/b");
        fs.add_dir("/data/a/z");
        fs.add_file("/data/a/scan.mtrx", "x");

        let cfg = config(|raw| raw.run.recursive = true);
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default()).plan(&[PathBuf::from("/data")]);

        let dirs: Vec<_> = plan
            .flatten
            .iter()
            .map(|j| j.working_dir.clone().unwrap())
            .collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/data"),
                PathBuf::from("/data/a"),
                PathBuf::from("/data/a/z"),
                PathBuf::from("/data/b"),
            ]
        );
        assert!(fs.is_dir(Path::new("/out/img/a/z")));
    }

    #[test]
    fn recursive_discovery_skips_linked_folders() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data/run1");
        fs.add_symlink("/data/run1/back", "/data");

        let cfg = config(|raw| raw.run.recursive = true);
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default()).plan(&[PathBuf::from("/data")]);

        assert_eq!(plan.flatten.len(), 2);
        assert!(!fs.exists(Path::new("/out/flat/run1/back")));
    }

    #[test]
    fn flatten_job_runs_in_the_data_folder() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data");

        let cfg = config(|_| {});
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default()).plan(&[PathBuf::from("/data")]);

        let job = &plan.flatten[0];
        assert_eq!(job.program, "VernissageCmd.exe");
        assert_eq!(
            job.args,
            vec!["-path", ".", "-outdir", "/out/flat", "-exporter", "Flattener"]
        );
        assert_eq!(job.label, "flatten: /data");
        assert_eq!(plan.image[0].input_folder, PathBuf::from("/out/flat"));
    }

    #[test]
    fn existing_subfolder_output_is_a_conflict_without_overwrite() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data/run1");
        fs.add_dir("/out/img/run1");

        let cfg = config(|raw| raw.run.recursive = true);
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default()).plan(&[PathBuf::from("/data")]);

        // Top level is planned, run1 is skipped for both phases.
        assert_eq!(plan.flatten.len(), 1);
        assert_eq!(plan.image.len(), 1);
        assert!(matches!(
            plan.skipped[0].error,
            AutoconvertError::OutputFolderConflict(ref p) if p == Path::new("/out/img/run1")
        ));
        assert!(!fs.exists(Path::new("/out/flat/run1")));

        let cfg = config(|raw| {
            raw.run.recursive = true;
            raw.run.overwrite = true;
        });
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default()).plan(&[PathBuf::from("/data")]);
        assert_eq!(plan.flatten.len(), 2);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn unknown_placeholder_is_reported_before_running() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data");

        let cfg = config(|raw| raw.image.flags = "-o {outputpath} {nosuchthing}".to_string());
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default())
            .create_dirs(false)
            .plan(&[PathBuf::from("/data")]);

        assert!(plan.is_empty());
        assert!(plan.has_binding_errors());
        assert!(!fs.exists(Path::new("/out/flat")));
    }

    #[test]
    fn image_target_lists_files_at_resolve_time() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data");

        let cfg = config(|raw| {
            raw.flatten.enabled = false;
            raw.image.flags = "-f {exportformat} {inputfiles}".to_string();
        });
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default()).plan(&[PathBuf::from("/data")]);
        assert!(plan.flatten.is_empty());

        fs.add_file("/data/b.sxm", "b");
        fs.add_file("/data/a.sxm", "a");
        fs.add_dir("/data/sub");

        let job = plan.image[0]
            .resolve(&fs, &CommandBuilder::default())
            .unwrap();
        assert_eq!(job.args, vec!["-f", "jpg", "/data/a.sxm", "/data/b.sxm"]);
    }

    #[test]
    fn non_directory_input_is_skipped() {
        let fs = MockFileSystem::new();
        fs.add_file("/data/readme.txt", "hi");
        fs.add_dir("/other");

        let cfg = config(|_| {});
        let plan = Planner::new(&fs, &cfg, CommandBuilder::default())
            .plan(&[PathBuf::from("/data/readme.txt"), PathBuf::from("/other")]);

        assert_eq!(plan.flatten.len(), 1);
        assert!(matches!(
            plan.skipped[0].error,
            AutoconvertError::InputNotADirectory(_)
        ));
    }
}
