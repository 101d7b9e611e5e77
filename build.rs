//! Build script: embeds the git commit hash as `GIT_HASH`
//!
//! Source tarballs have no `.git`; `ZONE_TRACKER_GIT_HASH` can supply it instead.

use std::env;
use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

fn main() {
    let git_hash = env::var("ZONE_TRACKER_GIT_HASH")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={git_hash}");
    println!("cargo:rerun-if-env-changed=ZONE_TRACKER_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
