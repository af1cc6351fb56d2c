// Rejects lint-suppression attributes ("#[" + "allow" + ...) anywhere in the stockcore sources.
// Set STOCKCORE_CHECK_NO_ALLOW=0 to skip the scan.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SCANNED_DIRS: [&str; 3] = ["src", "tests", "benches"];
const SKIPPED_DIRS: [&str; 3] = ["target", ".git", "vendor"];

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-env-changed=STOCKCORE_CHECK_NO_ALLOW");
    for dir in SCANNED_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if env::var("STOCKCORE_CHECK_NO_ALLOW").is_ok_and(|v| v == "0") {
        return Ok(());
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").map_err(io::Error::other)?);

    let mut violations = Vec::new();
    for dir in SCANNED_DIRS {
        let path = manifest_dir.join(dir);
        if path.exists() {
            collect_violations(&path, &mut violations)?;
        }
    }

    if violations.is_empty() {
        return Ok(());
    }

    for (file, line, content) in &violations {
        println!(
            "cargo:warning=suppression attribute at {}:{}: {}",
            file.display(),
            line,
            content.trim()
        );
    }
    Err(io::Error::other(format!(
        "{} lint suppression attribute(s) found in stockcore",
        violations.len()
    )))
}

fn collect_violations(path: &Path, violations: &mut Vec<(PathBuf, usize, String)>) -> io::Result<()> {
    if path.is_dir() {
        if SKIPPED_DIRS.iter().any(|d| path.ends_with(d)) {
            return Ok(());
        }
        for entry in fs::read_dir(path)? {
            collect_violations(&entry?.path(), violations)?;
        }
        return Ok(());
    }

    if path.extension().is_none_or(|ext| ext != "rs") {
        return Ok(());
    }

    let content = fs::read_to_string(path)?;
    let needle = ["#[", "allow"].concat();
    let inner_needle = ["#![", "allow"].concat();
    for (idx, line) in content.lines().enumerate() {
        if line.contains(&needle) || line.contains(&inner_needle) {
            violations.push((path.to_path_buf(), idx + 1, line.to_string()));
        }
    }
    Ok(())
}
