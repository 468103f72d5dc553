//! Stamps the daemon with where and when it was built
//!
//! `INDEXER_BUILD_ID` is the short commit, suffixed `-dirty` when the work tree has
//! uncommitted changes, or `unknown` outside a git checkout. `INDEXER_BUILT_AT` is
//! UTC and `INDEXER_BUILD_PROFILE` is cargo's profile name.

use chrono::{SecondsFormat, Utc};
use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|stdout| stdout.trim().to_owned())
}

fn build_id() -> String {
    let Some(commit) = git(&["rev-parse", "--short=8", "HEAD"]) else {
        return "unknown".to_owned();
    };
    match git(&["status", "--porcelain", "--untracked-files=no"]) {
        Some(changes) if !changes.is_empty() => format!("{commit}-dirty"),
        _ => commit,
    }
}

fn main() {
    if let Some(git_dir) = git(&["rev-parse", "--git-dir"]) {
        println!("cargo:rerun-if-changed={git_dir}/HEAD");
        println!("cargo:rerun-if-changed={git_dir}/index");
    }
    println!("cargo:rerun-if-changed=build.rs");

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_owned());

    println!("cargo:rustc-env=INDEXER_BUILD_ID={}", build_id());
    println!(
        "cargo:rustc-env=INDEXER_BUILT_AT={}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    println!("cargo:rustc-env=INDEXER_BUILD_PROFILE={profile}");
}
