//! Publishing to a real (local, bare) git repository.
//!
//! Skipped when no `git` binary is on PATH.

mod common;

use common::*;
use staticpress::command::{CommandRunner, SystemRunner, argv};
use staticpress::config::DeployProvider;
use staticpress::content::Snapshot;
use staticpress::deploy::DeployStatus;
use staticpress::generate::{GenerationRunner, RunOptions};
use staticpress::types::Target;
use std::path::Path;

fn git(args: &[&str], cwd: &Path) -> String {
    let mut command = argv(["git"]);
    command.extend(args.iter().map(|a| a.to_string()));
    let out = SystemRunner.run(&command, cwd).unwrap();
    assert!(out.success, "git {args:?} failed: {}", out.output);
    out.output
}

fn git_available() -> bool {
    SystemRunner
        .run(&argv(["git", "--version"]), Path::new("."))
        .map(|o| o.success)
        .unwrap_or(false)
}

#[test]
fn generated_site_is_pushed_to_empty_remote() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let site = Site::new(Snapshot {
        articles: vec![article(1, "hello", "<p>Hello</p>")],
        ..Snapshot::default()
    });
    let remote = site.tmp.path().join("remote.git");
    git(&["init", "--bare", "-q", remote.to_str().unwrap()], site.tmp.path());

    let mut config = site.config();
    config.deploy.provider = DeployProvider::Github;
    config.deploy.repo_url = Some(remote.to_string_lossy().into_owned());
    config.deploy.branch = "gh-pages".into();
    let generator = site.generator_with(config).with_options(RunOptions {
        precompile: false,
        deploy: true,
    });

    let report = generator.run(&Target::All).unwrap();
    let deploy = report.deploy.expect("deploy outcome");
    assert!(deploy.success, "{}", deploy.message);
    assert_eq!(deploy.status, DeployStatus::Pushed);

    let log = git(&["log", "--format=%s", "gh-pages"], &remote);
    assert!(log.starts_with("Deploy - "), "{log}");
    let tree = git(&["ls-tree", "-r", "--name-only", "gh-pages"], &remote);
    assert!(tree.lines().any(|l| l == "index.html"), "{tree}");
    assert!(tree.lines().any(|l| l == "hello.html"), "{tree}");

    // Nothing changed, so the second deploy has nothing to commit.
    let again = generator.deploy_only().unwrap();
    assert_eq!(again.status, DeployStatus::NoChanges);
}
