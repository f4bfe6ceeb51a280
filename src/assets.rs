//! Compiled front-end assets.
//!
//! The site's CSS/JS bundle is produced by an external build step into
//! `assets.source_dir`. Before pages are written, [`AssetsManager::ensure`]
//! makes sure that bundle exists (running the build when it doesn't) and
//! mirrors it into `<output>/assets/`.
//!
//! A missing bundle after a build attempt is fatal to the run: pages would
//! reference stylesheets that do not exist.

use crate::command::CommandRunner;
use crate::config::AssetsConfig;
use crate::paths;
use crate::writer::{WriteStatus, write_if_changed};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("asset build failed: {0}")]
    BuildFailed(String),
    #[error("assets are missing after precompile: {0}")]
    Missing(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetsOutcome {
    /// Mirrored into the output tree.
    Copied { written: usize, removed: usize },
    /// The source already is `<output>/assets`.
    InPlace,
    /// Missing and precompilation disabled.
    Skipped,
}

pub struct AssetsManager<'a> {
    config: &'a AssetsConfig,
    runner: &'a dyn CommandRunner,
    /// Relative paths in the config are resolved against this directory.
    work_dir: &'a Path,
}

impl<'a> AssetsManager<'a> {
    pub fn new(config: &'a AssetsConfig, runner: &'a dyn CommandRunner, work_dir: &'a Path) -> Self {
        Self {
            config,
            runner,
            work_dir,
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.work_dir.join(&self.config.source_dir)
    }

    /// Make the bundle available under `<output_dir>/assets`.
    ///
    /// `precompile` is ANDed with `assets.precompile`.
    pub fn ensure(&self, output_dir: &Path, precompile: bool) -> Result<AssetsOutcome, AssetError> {
        let source = self.source_dir();
        if !assets_present(&source) {
            if precompile && self.config.precompile && !self.config.build_command.is_empty() {
                self.precompile()?;
            } else {
                warn!(
                    event = "assets.missing",
                    source = %source.display(),
                    "compiled assets missing and precompile disabled"
                );
                return Ok(AssetsOutcome::Skipped);
            }
        }
        if !assets_present(&source) {
            error!(
                event = "assets.missing",
                source = %source.display(),
                "assets still missing after precompile"
            );
            return Err(AssetError::Missing(source));
        }

        let dest = output_dir.join(paths::ASSETS_DIR);
        if same_dir(&source, &dest) {
            return Ok(AssetsOutcome::InPlace);
        }
        let (written, removed) = mirror_dir(&source, &dest)?;
        info!(
            event = "assets.copied",
            destination = %dest.display(),
            written,
            removed,
            "copied assets"
        );
        Ok(AssetsOutcome::Copied { written, removed })
    }

    fn precompile(&self) -> Result<(), AssetError> {
        info!(
            event = "assets.precompile_started",
            command = %self.config.build_command.join(" "),
            "building assets"
        );
        let result = self.runner.run(&self.config.build_command, self.work_dir);
        match result {
            Ok(out) if out.success => {
                info!(event = "assets.precompile_complete", "assets built");
                Ok(())
            }
            Ok(out) => {
                let message = out.output.trim().to_string();
                error!(event = "assets.precompile_failed", error = %message, "asset build failed");
                Err(AssetError::BuildFailed(message))
            }
            Err(e) => {
                error!(event = "assets.precompile_failed", error = %e, "could not start asset build");
                Err(AssetError::BuildFailed(e.to_string()))
            }
        }
    }
}

/// A manifest file, or failing that any regular file, marks a built bundle.
pub fn assets_present(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    let has_manifest = entries.flatten().any(|e| {
        let name = e.file_name();
        let name = name.to_string_lossy();
        name == ".manifest.json" || (name.starts_with(".sprockets-manifest") && name.ends_with(".json"))
    });
    has_manifest
        || walkdir::WalkDir::new(dir)
            .into_iter()
            .flatten()
            .any(|e| e.file_type().is_file())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Regular files under `dir` as `/`-separated relative paths, sorted.
pub fn relative_files(dir: &Path) -> Result<Vec<String>, walkdir::Error> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(dir) {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(parts.join("/"));
        }
    }
    Ok(files)
}

/// Make `dest` hold exactly the files of `source`. Returns (written, removed).
fn mirror_dir(source: &Path, dest: &Path) -> Result<(usize, usize), AssetError> {
    let wanted = relative_files(source)?;
    let mut written = 0;
    for rel in &wanted {
        let bytes = fs::read(source.join(rel))?;
        if write_if_changed(&dest.join(rel), &bytes)? == WriteStatus::Written {
            written += 1;
        }
    }
    let wanted: BTreeSet<&String> = wanted.iter().collect();
    let mut removed = 0;
    for rel in relative_files(dest)? {
        if !wanted.contains(&rel) {
            fs::remove_file(dest.join(&rel))?;
            removed += 1;
        }
    }
    Ok((written, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutput, argv};
    use std::io;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Runner that optionally "builds" by creating a file.
    struct FakeBuild {
        creates: Option<PathBuf>,
        succeed: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeBuild {
        fn new(creates: Option<PathBuf>, succeed: bool) -> Self {
            Self {
                creates,
                succeed,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CommandRunner for FakeBuild {
        fn run(&self, argv: &[String], _cwd: &Path) -> io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(argv.to_vec());
            if let Some(path) = &self.creates {
                fs::create_dir_all(path.parent().unwrap())?;
                fs::write(path, "body{}")?;
            }
            Ok(if self.succeed {
                CommandOutput::ok("built")
            } else {
                CommandOutput::failed("npm ERR! missing script: build")
            })
        }
    }

    fn config() -> AssetsConfig {
        AssetsConfig {
            source_dir: PathBuf::from("build/assets"),
            precompile: true,
            build_command: argv(["npm", "run", "build"]),
        }
    }

    #[test]
    fn present_with_manifest_or_any_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("assets");
        assert!(!assets_present(&dir));
        fs::create_dir_all(dir.join("nested")).unwrap();
        assert!(!assets_present(&dir));
        fs::write(dir.join("nested/app.css"), "x").unwrap();
        assert!(assets_present(&dir));
    }

    #[test]
    fn existing_assets_are_mirrored_without_building() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let src = tmp.path().join("build/assets");
        fs::create_dir_all(src.join("js")).unwrap();
        fs::write(src.join("app.css"), "a").unwrap();
        fs::write(src.join("js/app.js"), "b").unwrap();
        let out = tmp.path().join("public");
        fs::create_dir_all(out.join("assets")).unwrap();
        fs::write(out.join("assets/stale.css"), "old").unwrap();

        let runner = FakeBuild::new(None, true);
        let manager = AssetsManager::new(&cfg, &runner, tmp.path());
        let outcome = manager.ensure(&out, true).unwrap();

        assert_eq!(outcome, AssetsOutcome::Copied { written: 2, removed: 1 });
        assert_eq!(runner.call_count(), 0);
        assert_eq!(fs::read_to_string(out.join("assets/js/app.js")).unwrap(), "b");
        assert!(!out.join("assets/stale.css").exists());

        // Second pass writes nothing.
        assert_eq!(
            manager.ensure(&out, true).unwrap(),
            AssetsOutcome::Copied { written: 0, removed: 0 }
        );
    }

    #[test]
    fn missing_assets_trigger_build() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let runner = FakeBuild::new(Some(tmp.path().join("build/assets/app.css")), true);
        let manager = AssetsManager::new(&cfg, &runner, tmp.path());
        let out = tmp.path().join("public");

        manager.ensure(&out, true).unwrap();
        assert_eq!(runner.call_count(), 1);
        assert!(out.join("assets/app.css").exists());
    }

    #[test]
    fn build_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let runner = FakeBuild::new(None, false);
        let manager = AssetsManager::new(&cfg, &runner, tmp.path());
        let err = manager.ensure(&tmp.path().join("public"), true).unwrap_err();
        assert!(matches!(err, AssetError::BuildFailed(msg) if msg.contains("missing script")));
    }

    #[test]
    fn build_that_produces_nothing_is_missing() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let runner = FakeBuild::new(None, true);
        let manager = AssetsManager::new(&cfg, &runner, tmp.path());
        let err = manager.ensure(&tmp.path().join("public"), true).unwrap_err();
        assert!(matches!(err, AssetError::Missing(_)));
    }

    #[test]
    fn missing_without_precompile_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let cfg = config();
        let runner = FakeBuild::new(None, true);
        let manager = AssetsManager::new(&cfg, &runner, tmp.path());
        assert_eq!(
            manager.ensure(&tmp.path().join("public"), false).unwrap(),
            AssetsOutcome::Skipped
        );
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn source_inside_output_is_left_in_place() {
        let tmp = TempDir::new().unwrap();
        let cfg = AssetsConfig {
            source_dir: PathBuf::from("public/assets"),
            ..config()
        };
        fs::create_dir_all(tmp.path().join("public/assets")).unwrap();
        fs::write(tmp.path().join("public/assets/app.css"), "x").unwrap();
        let runner = FakeBuild::new(None, true);
        let manager = AssetsManager::new(&cfg, &runner, tmp.path());
        assert_eq!(
            manager.ensure(&tmp.path().join("public"), true).unwrap(),
            AssetsOutcome::InPlace
        );
    }

    #[test]
    fn relative_files_are_sorted_and_slash_separated() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("b/c")).unwrap();
        fs::write(tmp.path().join("b/c/d.txt"), "").unwrap();
        fs::write(tmp.path().join("a.txt"), "").unwrap();
        assert_eq!(relative_files(tmp.path()).unwrap(), vec!["a.txt", "b/c/d.txt"]);
        assert!(relative_files(&tmp.path().join("nope")).unwrap().is_empty());
    }
}
