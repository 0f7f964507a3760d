use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn run_in(dir: &Path) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("apply_patch")?;
    cmd.current_dir(dir);
    Ok(cmd)
}

#[test]
fn patch_argument_adds_then_moves_a_file() -> anyhow::Result<()> {
    let tmp = tempdir()?;

    run_in(tmp.path())?
        .arg("*** Begin Patch\n*** Add File: notes.md\n+draft\n+body\n*** End Patch")
        .assert()
        .success()
        .stdout("Success. Updated the following files:\nA notes.md\n");

    run_in(tmp.path())?
        .arg(
            "*** Begin Patch\n*** Update File: notes.md\n*** Move to: docs/notes.md\n@@\n-draft\n+final\n body\n*** End Patch",
        )
        .assert()
        .success()
        .stdout("Success. Updated the following files:\nM docs/notes.md\n");

    assert!(!tmp.path().join("notes.md").exists());
    assert_eq!(
        fs::read_to_string(tmp.path().join("docs/notes.md"))?,
        "final\nbody\n"
    );
    Ok(())
}

#[test]
fn patch_on_stdin_deletes_a_file() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    fs::write(tmp.path().join("stale.log"), "old\n")?;

    run_in(tmp.path())?
        .write_stdin("*** Begin Patch\n*** Delete File: stale.log\n*** End Patch\n")
        .assert()
        .success()
        .stdout("Success. Updated the following files:\nD stale.log\n");

    assert!(!tmp.path().join("stale.log").exists());
    Ok(())
}

#[test]
fn text_without_envelope_is_rejected() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    run_in(tmp.path())?
        .arg("not a patch")
        .assert()
        .failure()
        .stderr("Invalid patch: The first line of the patch must be '*** Begin Patch'\n");
    Ok(())
}

#[test]
fn failing_hunk_leaves_earlier_files_untouched() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    fs::write(tmp.path().join("a.txt"), "one\n")?;

    run_in(tmp.path())?
        .arg(
            "*** Begin Patch\n*** Update File: a.txt\n@@\n-one\n+ONE\n*** Update File: missing.txt\n@@\n-x\n+y\n*** End Patch",
        )
        .assert()
        .failure()
        .stderr("Cannot update missing.txt: file does not exist\n");

    assert_eq!(fs::read_to_string(tmp.path().join("a.txt"))?, "one\n");
    Ok(())
}

#[test]
fn empty_stdin_exits_with_usage() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    run_in(tmp.path())?.write_stdin("").assert().code(2);
    Ok(())
}

#[test]
fn extra_arguments_are_refused() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    run_in(tmp.path())?
        .args(["*** Begin Patch\n*** End Patch", "extra"])
        .assert()
        .code(2)
        .stderr("Error: apply_patch accepts exactly one argument.\n");
    Ok(())
}
