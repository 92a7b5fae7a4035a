#![allow(dead_code)]

use std::path::Path;

use autoconvert::config::{ConfigFile, RawConfigFile};
use autoconvert::queue::Job;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the built-in defaults.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Put both phases' output folders under `root`.
    pub fn out_under(mut self, root: &Path) -> Self {
        self.config.flatten.out_folder = root.join("flat");
        self.config.image.out_folder = root.join("img");
        self
    }

    pub fn recursive(mut self, val: bool) -> Self {
        self.config.run.recursive = val;
        self
    }

    pub fn overwrite(mut self, val: bool) -> Self {
        self.config.run.overwrite = val;
        self
    }

    pub fn max_processes(mut self, n: usize) -> Self {
        self.config.run.max_processes = n;
        self
    }

    pub fn flatten(mut self, program: &str, flags: &str) -> Self {
        self.config.flatten.enabled = true;
        self.config.flatten.program = program.to_string();
        self.config.flatten.flags = flags.to_string();
        self
    }

    pub fn exporter(mut self, name: &str) -> Self {
        self.config.flatten.exporter = name.to_string();
        self
    }

    pub fn no_flatten(mut self) -> Self {
        self.config.flatten.enabled = false;
        self
    }

    pub fn image(mut self, program: &str, flags: &str) -> Self {
        self.config.image.enabled = true;
        self.config.image.program = program.to_string();
        self.config.image.flags = flags.to_string();
        self
    }

    pub fn no_image(mut self) -> Self {
        self.config.image.enabled = false;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A job whose label doubles as its identity in fake executor scripts.
pub fn labelled(label: &str) -> Job {
    Job::new("fake-tool").label(label)
}

/// A `sh -c <script>` job.
pub fn sh(label: &str, script: &str) -> Job {
    Job::new("sh").args(["-c", script]).label(label)
}
