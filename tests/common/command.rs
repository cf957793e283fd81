use assert_cmd::Command;
use std::path::Path;

pub fn run_indexv5_command(git_dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("indexv5").expect("Failed to find indexv5 binary");
    cmd.arg("--git-dir")
        .arg(git_dir)
        .args(args)
        .env_remove("GIT_DIR")
        .env_remove("GIT_INDEX_FILE")
        .env("NO_COLOR", "1");
    cmd
}
