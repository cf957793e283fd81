use assert_fs::TempDir;
use assert_fs::prelude::*;
use common::command::run_indexv5_command;
use common::fixture::{git_dir_with, legacy_bytes, legacy_index, readme_and_main};
use indexv5::areas::legacy_index::LegacyIndex;
use predicates::prelude::predicate;
use rstest::rstest;

mod common;

#[rstest]
fn verify_accepts_fresh_conversion(readme_and_main: LegacyIndex) -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let git_dir = git_dir_with(&dir, &readme_and_main);
    run_indexv5_command(&git_dir, &["convert"])
        .assert()
        .success();

    run_indexv5_command(&git_dir, &["verify"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("OK "));

    Ok(())
}

#[rstest]
fn verify_reports_stale_conversion(readme_and_main: LegacyIndex) -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let git_dir = git_dir_with(&dir, &readme_and_main);
    run_indexv5_command(&git_dir, &["convert"])
        .assert()
        .success();

    let changed = legacy_index(&["docs/readme.txt", "src/lib.c", "src/main.c"]);
    dir.child(".git/index").write_binary(&legacy_bytes(&changed))?;

    run_indexv5_command(&git_dir, &["verify"])
        .assert()
        .failure()
        .stdout(predicate::str::starts_with("FAILED "))
        .stdout(predicate::str::contains("2 files, expected 3"));

    Ok(())
}

#[rstest]
fn verify_detects_damaged_record(readme_and_main: LegacyIndex) -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let git_dir = git_dir_with(&dir, &readme_and_main);
    run_indexv5_command(&git_dir, &["convert"])
        .assert()
        .success();

    let converted = dir.child(".git/index-v5");
    let mut data = std::fs::read(converted.path())?;
    let last = data.len() - 10;
    data[last] ^= 0xff;
    converted.write_binary(&data)?;

    run_indexv5_command(&git_dir, &["verify"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("checksum mismatch for file src/main.c"));

    Ok(())
}
