// Records version and build provenance for `islet doctor` and the pinned
// framework requirement.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/runtime/js/");
    watch_git_head();

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR is not set"))?;
    fs::write(out_dir.join("build_info.rs"), build_info())
}

/// Reruns when HEAD moves so `GIT_HASH` follows commits and checkouts.
fn watch_git_head() {
    let head = Path::new(".git/HEAD");
    if !head.is_file() {
        return;
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    if let Some(reference) = fs::read_to_string(head)
        .ok()
        .and_then(|text| text.strip_prefix("ref: ").map(|r| r.trim().to_string()))
    {
        println!("cargo:rerun-if-changed=.git/{}", reference);
    }
}

fn build_info() -> String {
    let var = |name: &str| env::var(name).unwrap_or_else(|_| "unknown".to_string());
    format!(
        r#"
pub const GIT_HASH: &str = "{}";
pub const BUILD_TIME: &str = "{}";
pub const TARGET: &str = "{}";
pub const PROFILE: &str = "{}";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
"#,
        short_commit().unwrap_or_else(|| "unknown".to_string()),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        var("TARGET"),
        var("PROFILE"),
    )
}

fn short_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
