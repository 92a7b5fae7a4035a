// tests/planner_tempfile.rs

mod common;
use crate::common::{TestResult, init_tracing};

use std::fs;
use std::path::PathBuf;

use autoconvert::command::CommandBuilder;
use autoconvert::config::{load_and_validate, load_from_path, load_or_default};
use autoconvert::errors::AutoconvertError;
use autoconvert::fs::RealFileSystem;
use autoconvert::pipeline::Planner;
use autoconvert::types::{Colormap, ImageFormat};
use autoconvert_test_utils::builders::ConfigFileBuilder;
use tempfile::tempdir;

#[test]
fn config_file_overrides_only_what_it_names() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("Autoconvert.toml");
    fs::write(
        &path,
        r#"
[run]
max_processes = 4
recursive = true

[flatten]
exporter = "Other"

[image]
format = "png"
colormap = "full"
out_folder = "pictures"
"#,
    )?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.run().max_processes, 4);
    assert!(cfg.run().recursive);
    assert!(!cfg.run().overwrite);

    assert!(cfg.flatten().enabled);
    assert_eq!(cfg.flatten().program, "VernissageCmd.exe");
    assert!(!cfg.flatten().feeds_image_phase());

    assert_eq!(cfg.image().format, ImageFormat::Png);
    assert_eq!(cfg.image().colormap, Colormap::Full);
    assert_eq!(cfg.image().out_folder, PathBuf::from("pictures"));
    assert_eq!(cfg.image().gradient, "Wrappmono");
    Ok(())
}

#[test]
fn malformed_and_invalid_configs_are_rejected() -> TestResult {
    let dir = tempdir()?;

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[run\nmax_processes = 2")?;
    assert!(matches!(
        load_from_path(&broken),
        Err(AutoconvertError::TomlError(_))
    ));

    let bad_format = dir.path().join("format.toml");
    fs::write(&bad_format, "[image]\nformat = \"gif\"\n")?;
    assert!(matches!(
        load_from_path(&bad_format),
        Err(AutoconvertError::TomlError(_))
    ));

    let zero = dir.path().join("zero.toml");
    fs::write(&zero, "[run]\nmax_processes = 0\n")?;
    assert!(matches!(
        load_and_validate(&zero),
        Err(AutoconvertError::ConfigError(_))
    ));

    let nothing = dir.path().join("nothing.toml");
    fs::write(&nothing, "[flatten]\nenabled = false\n[image]\nenabled = false\n")?;
    assert!(matches!(
        load_and_validate(&nothing),
        Err(AutoconvertError::ConfigError(_))
    ));
    Ok(())
}

#[test]
fn explicit_config_path_must_exist() -> TestResult {
    let dir = tempdir()?;
    let missing = dir.path().join("missing.toml");
    assert!(load_or_default(&RealFileSystem, Some(missing.as_path())).is_err());
    Ok(())
}

#[test]
fn planner_creates_mirrored_output_folders() -> TestResult {
    init_tracing();

    let root = tempdir()?;
    let data = root.path().join("data");
    fs::create_dir_all(data.join("run1"))?;
    fs::create_dir_all(data.join("run2/deep"))?;
    fs::write(data.join("run1/scan.mtrx"), "x")?;

    let out = root.path().join("out");
    let cfg = ConfigFileBuilder::new().out_under(&out).recursive(true).build();
    let plan = Planner::new(&RealFileSystem, &cfg, CommandBuilder::default()).plan(&[data.clone()]);

    assert!(plan.skipped.is_empty());
    let dirs: Vec<_> = plan
        .flatten
        .iter()
        .map(|job| job.working_dir.clone().unwrap())
        .collect();
    assert_eq!(
        dirs,
        vec![
            data.clone(),
            data.join("run1"),
            data.join("run2"),
            data.join("run2/deep"),
        ]
    );

    for rel in ["", "run1", "run2", "run2/deep"] {
        assert!(out.join("flat").join(rel).is_dir(), "missing flat/{rel}");
        assert!(out.join("img").join(rel).is_dir(), "missing img/{rel}");
    }
    Ok(())
}

#[cfg(unix)]
#[test]
fn recursive_planning_does_not_follow_a_looping_link() -> TestResult {
    init_tracing();

    let root = tempdir()?;
    let data = root.path().join("data");
    fs::create_dir_all(data.join("run1"))?;
    std::os::unix::fs::symlink(&data, data.join("run1/back"))?;

    let out = root.path().join("out");
    let cfg = ConfigFileBuilder::new().out_under(&out).recursive(true).build();
    let plan = Planner::new(&RealFileSystem, &cfg, CommandBuilder::default())
        .create_dirs(false)
        .plan(&[data.clone()]);

    assert!(plan.skipped.is_empty());
    let dirs: Vec<_> = plan
        .flatten
        .iter()
        .map(|job| job.working_dir.clone().unwrap())
        .collect();
    assert_eq!(dirs, vec![data.clone(), data.join("run1")]);
    assert_eq!(plan.image.len(), 2);
    Ok(())
}

#[test]
fn second_run_without_overwrite_only_replans_the_top_level() -> TestResult {
    init_tracing();

    let root = tempdir()?;
    let data = root.path().join("data");
    fs::create_dir_all(data.join("run1"))?;

    let out = root.path().join("out");
    let cfg = ConfigFileBuilder::new().out_under(&out).recursive(true).build();
    let planner = Planner::new(&RealFileSystem, &cfg, CommandBuilder::default());

    let first = planner.plan(&[data.clone()]);
    assert_eq!(first.flatten.len(), 2);

    let second = planner.plan(&[data.clone()]);
    assert_eq!(second.flatten.len(), 1);
    assert_eq!(second.skipped.len(), 1);
    assert_eq!(second.skipped[0].dir, data.join("run1"));
    assert!(matches!(
        second.skipped[0].error,
        AutoconvertError::OutputFolderConflict(_)
    ));
    Ok(())
}

#[test]
fn image_target_lists_regular_files_in_name_order() -> TestResult {
    let root = tempdir()?;
    let data = root.path().join("data");
    fs::create_dir_all(data.join("nested"))?;
    fs::write(data.join("b.sxm"), "b")?;
    fs::write(data.join("a.sxm"), "a")?;

    let cfg = ConfigFileBuilder::new()
        .out_under(&root.path().join("out"))
        .no_flatten()
        .image("render", "{inputfiles}")
        .build();
    let plan = Planner::new(&RealFileSystem, &cfg, CommandBuilder::default()).plan(&[data.clone()]);

    let job = plan.image[0].resolve(&RealFileSystem, &CommandBuilder::default())?;
    assert_eq!(job.program, "render");
    assert_eq!(
        job.args,
        vec![
            data.join("a.sxm").to_string_lossy().into_owned(),
            data.join("b.sxm").to_string_lossy().into_owned(),
        ]
    );
    assert_eq!(job.working_dir, None);
    Ok(())
}
