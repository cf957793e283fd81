use std::cell::{RefCell, RefMut};
use std::path::{Path, PathBuf};

/// Name of the legacy index inside the metadata directory
const INDEX_FILE: &str = "index";

/// Name of the converted index inside the metadata directory
const INDEX_V5_FILE: &str = "index-v5";

pub struct Repository {
    git_dir: Box<Path>,
    writer: RefCell<Box<dyn std::io::Write>>,
}

impl Repository {
    /// The directory only has to exist once a default path inside it is used
    pub fn new(git_dir: &Path, writer: Box<dyn std::io::Write>) -> Self {
        Repository {
            git_dir: git_dir.into(),
            writer: RefCell::new(writer),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    /// Legacy index to read, `<git-dir>/index` unless overridden
    pub fn legacy_index_path(&self, input: Option<&Path>) -> PathBuf {
        input.map_or_else(|| self.git_dir.join(INDEX_FILE), Path::to_path_buf)
    }

    /// Version 5 index to write or read, `<git-dir>/index-v5` unless overridden
    pub fn index_v5_path(&self, output: Option<&Path>) -> PathBuf {
        output.map_or_else(|| self.git_dir.join(INDEX_V5_FILE), Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;

    #[test]
    fn paths_default_into_the_git_dir() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::new(dir.path(), Box::new(std::io::sink()));

        assert_eq!(repository.legacy_index_path(None), dir.path().join("index"));
        assert_eq!(repository.index_v5_path(None), dir.path().join("index-v5"));
        assert_eq!(
            repository.index_v5_path(Some(Path::new("/tmp/out"))),
            PathBuf::from("/tmp/out")
        );
    }
}
