//! Fixture-driven tests: every directory under `tests/fixtures/scenarios`
//! holds an `input/` tree, a `patch.txt`, and the `expected/` tree after
//! running `apply_patch`. An optional `exit_code` file pins the status.

use assert_cmd::prelude::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_apply_patch_scenarios() -> anyhow::Result<()> {
    let mut scenarios: Vec<PathBuf> = fs::read_dir("tests/fixtures/scenarios")?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    scenarios.retain(|path| path.is_dir());
    scenarios.sort();
    assert!(!scenarios.is_empty(), "no scenarios found");

    for scenario in scenarios {
        run_scenario(&scenario)?;
    }
    Ok(())
}

fn run_scenario(dir: &Path) -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let input_dir = dir.join("input");
    if input_dir.is_dir() {
        copy_tree(&input_dir, tmp.path())?;
    }

    let patch = fs::read_to_string(dir.join("patch.txt"))?;
    let output = Command::cargo_bin("apply_patch")?
        .arg(patch)
        .current_dir(tmp.path())
        .output()?;

    let exit_code_file = dir.join("exit_code");
    if exit_code_file.is_file() {
        let expected: i32 = fs::read_to_string(&exit_code_file)?.trim().parse()?;
        assert_eq!(
            output.status.code(),
            Some(expected),
            "scenario {} exited unexpectedly; stderr: {}",
            dir.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    assert_eq!(
        snapshot(tmp.path())?,
        snapshot(&dir.join("expected"))?,
        "scenario {} did not produce the expected tree",
        dir.display()
    );
    Ok(())
}

/// Maps every file below `root` to its bytes; directories map to `None`.
fn snapshot(root: &Path) -> anyhow::Result<BTreeMap<PathBuf, Option<Vec<u8>>>> {
    let mut entries = BTreeMap::new();
    if !root.is_dir() {
        return Ok(entries);
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let rel = path.strip_prefix(root)?.to_path_buf();
            if path.is_dir() {
                entries.insert(rel, None);
                pending.push(path);
            } else {
                entries.insert(rel, Some(fs::read(&path)?));
            }
        }
    }
    Ok(entries)
}

fn copy_tree(src: &Path, dst: &Path) -> anyhow::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
