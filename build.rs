// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=WATCHPOST_VERSION");

    // Packaged builds (no .git) pass the version in explicitly
    let version = match std::env::var("WATCHPOST_VERSION") {
        Ok(v) => v,
        Err(_) => build_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version string shown in logs and `watchpost --version`
///
/// - exact tag `v0.1.0` becomes `0.1.0-abcdef1`
/// - `v0.1.0-5-gabcdef1` (commits after a tag) becomes `0.1.0-dirty-abcdef1`
/// - no git at all falls back to the crate version
fn build_version() -> String {
    let pkg_version = env!("CARGO_PKG_VERSION").to_string();

    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

    let Some(described) = described else {
        return pkg_version;
    };
    let described = described.strip_prefix('v').unwrap_or(&described);

    let commit_hash = commit_hash().unwrap_or_else(|| "unknown".to_string());

    if !described.contains('.') {
        // `--always` returned a bare hash: no release tag yet
        return format!("{}-{}", pkg_version, commit_hash);
    }

    if described.contains('-') {
        let parts: Vec<&str> = described.rsplitn(3, '-').collect();
        if parts.len() >= 3 {
            let hash = parts[0].strip_prefix('g').unwrap_or(parts[0]);
            return format!("{}-dirty-{}", parts[2], hash);
        }
        return described.to_string();
    }

    format!("{}-{}", described, commit_hash)
}

fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
