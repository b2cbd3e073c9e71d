use std::{io::Write, path::Path};

use crate::{file_error, matching_files, Result};

/// Extension of the class files the compiler leaves next to the sources
pub const COMPILED_EXTENSION: &str = "class";
/// Extension of recorded fixtures (`hello.wtr.txt`)
pub const RECORDED_EXTENSION: &str = "txt";

pub fn clean_compiled(directory: &Path, log: &mut impl Write) -> Result<usize> {
    remove_matching(directory, COMPILED_EXTENSION, "class", log)
}

pub fn clean_recorded(directory: &Path, log: &mut impl Write) -> Result<usize> {
    remove_matching(directory, RECORDED_EXTENSION, "test", log)
}

fn remove_matching(
    directory: &Path,
    extension: &str,
    kind: &str,
    log: &mut impl Write,
) -> Result<usize> {
    let paths = matching_files(directory, extension)?;
    for path in &paths {
        writeln!(log, "Cleaning {kind} file {}", path.display())?;
        std::fs::remove_file(path).map_err(file_error(path))?;
    }
    Ok(paths.len())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn populate(dir: &Path) {
        for name in ["hello.wtr", "hello.wtr.txt", "helloWtr.class", "notes.md", "b.txt"] {
            fs::write(dir.join(name), "").unwrap();
        }
    }

    fn remaining(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn removes_only_class_files() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let mut log = Vec::new();

        let removed = clean_compiled(dir.path(), &mut log).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(
            remaining(dir.path()),
            vec!["b.txt", "hello.wtr", "hello.wtr.txt", "notes.md"]
        );
        assert_eq!(
            String::from_utf8(log).unwrap(),
            format!(
                "Cleaning class file {}\n",
                dir.path().join("helloWtr.class").display()
            )
        );
    }

    #[test]
    fn removes_only_recorded_files() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let mut log = Vec::new();

        let removed = clean_recorded(dir.path(), &mut log).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            remaining(dir.path()),
            vec!["hello.wtr", "helloWtr.class", "notes.md"]
        );
        assert_eq!(String::from_utf8(log).unwrap().lines().count(), 2);
    }

    #[test]
    fn nothing_to_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = Vec::new();

        assert_eq!(clean_compiled(dir.path(), &mut log).unwrap(), 0);
        assert!(log.is_empty());
    }
}
