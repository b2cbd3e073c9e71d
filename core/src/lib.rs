#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

mod clean;
mod compare;
mod config;
mod golden;
mod normalize;
mod runner;
mod suite;

#[cfg(test)]
mod testing;

pub use clean::{clean_compiled, clean_recorded, COMPILED_EXTENSION, RECORDED_EXTENSION};
pub use compare::{Engine, Failure, Mode, Report, ReportPolicy, Verdict};
pub use config::{Config, ConfigError, Libraries};
pub use golden::{Fixture, ESCAPED_HEADER, SEPARATOR};
pub use normalize::{Normalizer, Rule};
pub use runner::{CapturedOutput, Invocation, JavaToolchain, Stage, Toolchain};
pub use suite::{Reporter, Suite, SuiteResult};

use std::path::{Path, PathBuf};

/*****************************************************************************************
 * Error Types
 */

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Spawn {
        program: String,
        source: std::io::Error,
    },
    ModulePath(std::env::JoinPathsError),
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    IOError(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(inner) => {
                write!(f, "Invalid configuration: {inner}")
            }
            Error::Spawn { program, source } => {
                write!(f, "Failed to launch {program}: {source}")
            }
            Error::ModulePath(inner) => {
                write!(f, "Library paths cannot be joined into a module path: {inner}")
            }
            Error::File { path, source } => {
                write!(f, "{}: {source}", path.display())
            }
            Error::IOError(inner) => {
                write!(f, "IOError: {inner}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(inner: ConfigError) -> Self {
        Self::Config(inner)
    }
}

impl From<std::env::JoinPathsError> for Error {
    fn from(inner: std::env::JoinPathsError) -> Self {
        Self::ModulePath(inner)
    }
}

impl From<std::io::Error> for Error {
    fn from(inner: std::io::Error) -> Self {
        Self::IOError(inner)
    }
}

// attach the offending path to an io error
pub(crate) fn file_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::File {
        path: path.to_path_buf(),
        source,
    }
}

/*****************************************************************************************
 * Common Types / Constants
 */

pub const SOURCE_EXTENSION: &str = "wtr";
pub const GOLDEN_SUFFIX: &str = ".txt";
pub const PROGRAM_SUFFIX: &str = "Wtr";

/// A stdout/stderr pair, either freshly normalized or read back from a fixture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    // both streams joined by a newline with surrounding whitespace removed
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_owned()
    }
}

/// A single test source file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestCase {
    source: PathBuf,
}

impl TestCase {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn directory(&self) -> &Path {
        match self.source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Name of the program the compiler produces for this source, `hello.wtr` -> `helloWtr`
    pub fn program(&self) -> String {
        let stem = self
            .source
            .file_stem()
            .map(|stem| stem.to_string_lossy())
            .unwrap_or_default();
        format!("{stem}{PROGRAM_SUFFIX}")
    }

    /// Fixture path, the source path with `.txt` appended: `hello.wtr` -> `hello.wtr.txt`
    pub fn golden_path(&self) -> PathBuf {
        let mut path = self.source.clone().into_os_string();
        path.push(GOLDEN_SUFFIX);
        path.into()
    }
}

impl std::fmt::Display for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source.display())
    }
}

// Flat, glob-like listing: regular files with the given extension, dotfiles excluded, sorted
pub(crate) fn matching_files(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory).map_err(file_error(directory))? {
        let entry = entry.map_err(file_error(directory))?;
        let path = entry.path();

        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let matches = path.extension().and_then(|ext| ext.to_str()) == Some(extension);
        if hidden || !matches || !path.is_file() {
            continue;
        }

        paths.push(path);
    }
    paths.sort_unstable();
    Ok(paths)
}
