use std::{
    collections::HashMap,
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use nom::{
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{char, one_of},
    combinator::{map, rest},
    sequence::{delimited, tuple},
    IResult,
};

use crate::{file_error, Result};

const LIBRARIES: &str = "Libraries";
const TOOLCHAIN: &str = "Toolchain";

const DEFAULT_JAVA: &str = "java";
const DEFAULT_MODULE: &str = "water.compiler/water.compiler.Main";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    FileNotFound { path: PathBuf },
    MissingSection { section: &'static str },
    MissingKey { section: &'static str, key: &'static str },
    InvalidValue { section: &'static str, key: &'static str, value: String },
    Syntax { line: usize, content: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound { path } => {
                write!(f, "configuration file {} not found", path.display())
            }
            ConfigError::MissingSection { section } => {
                write!(f, "section [{section}] is missing")
            }
            ConfigError::MissingKey { section, key } => {
                write!(f, "key `{key}` is missing from section [{section}]")
            }
            ConfigError::InvalidValue {
                section,
                key,
                value,
            } => {
                write!(f, "invalid value {value:?} for `{key}` in section [{section}]")
            }
            ConfigError::Syntax { line, content } => {
                write!(f, "cannot parse line {line}: {content:?}")
            }
        }
    }
}

/// Paths of the four modules the compiler needs on its module path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Libraries {
    pub jcommander: PathBuf,
    pub asm: PathBuf,
    pub runtime: PathBuf,
    pub compiler: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub libraries: Libraries,
    /// Launcher used for both the compiler and the compiled programs
    pub java: String,
    /// Main module of the compiler, passed with `-m`
    pub module: String,
    /// Working directory of the compiler invocation
    pub build_dir: PathBuf,
    /// Per-invocation limit, `None` waits forever
    pub timeout: Option<Duration>,
}

impl Config {
    pub const FILE_NAME: &'static str = ".env";

    pub fn load(path: &Path) -> Result<Self> {
        let input = match std::fs::read_to_string(path) {
            Ok(input) => input,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let path = path.to_path_buf();
                return Err(ConfigError::FileNotFound { path }.into());
            }
            Err(err) => return Err(file_error(path)(err)),
        };
        log::debug!("loaded configuration from {}", path.display());
        Ok(Self::parse(&input)?)
    }

    pub fn parse(input: &str) -> std::result::Result<Self, ConfigError> {
        let ini = Ini::parse(input)?;

        let libraries = ini
            .section(LIBRARIES)
            .ok_or(ConfigError::MissingSection { section: LIBRARIES })?;
        let library = |key: &'static str| {
            libraries
                .get(key)
                .map(PathBuf::from)
                .ok_or(ConfigError::MissingKey {
                    section: LIBRARIES,
                    key,
                })
        };
        let libraries = Libraries {
            jcommander: library("jcommander")?,
            asm: library("asm")?,
            runtime: library("runtime")?,
            compiler: library("compiler")?,
        };

        let toolchain = ini.section(TOOLCHAIN);
        let setting = |key: &str| toolchain.and_then(|section| section.get(key));

        let timeout = match setting("timeout") {
            None => Some(DEFAULT_TIMEOUT),
            Some(value) => match value.parse::<u64>() {
                Ok(0) => None,
                Ok(seconds) => Some(Duration::from_secs(seconds)),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        section: TOOLCHAIN,
                        key: "timeout",
                        value: value.clone(),
                    })
                }
            },
        };

        Ok(Config {
            libraries,
            java: setting("java").map_or(DEFAULT_JAVA, String::as_str).to_owned(),
            module: setting("module").map_or(DEFAULT_MODULE, String::as_str).to_owned(),
            build_dir: setting("build_dir").map_or_else(|| PathBuf::from("."), PathBuf::from),
            timeout,
        })
    }

    /// The libraries joined with the platform path-list separator, the `-p` argument
    pub fn module_path(&self) -> Result<OsString> {
        let Libraries {
            jcommander,
            asm,
            runtime,
            compiler,
        } = &self.libraries;
        Ok(std::env::join_paths([jcommander, asm, runtime, compiler])?)
    }
}

/*****************************************************************************************
 * INI parsing
 */

// section name -> (lowercased key -> value)
#[derive(Debug, Default)]
struct Ini(HashMap<String, HashMap<String, String>>);

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Section(&'a str),
    Entry { key: &'a str, value: &'a str },
}

impl Ini {
    fn parse(input: &str) -> std::result::Result<Self, ConfigError> {
        let mut ini = Ini::default();
        let mut current = None;

        for (index, raw) in input.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let syntax_error = || ConfigError::Syntax {
                line: index + 1,
                content: raw.to_owned(),
            };

            let (_, parsed) = line(trimmed).map_err(|_| syntax_error())?;
            match parsed {
                Line::Section(name) => {
                    ini.0.entry(name.to_owned()).or_default();
                    current = Some(name.to_owned());
                }
                Line::Entry { key, value } => {
                    // entries before any section header have nowhere to go
                    let section = current.as_ref().ok_or_else(syntax_error)?;
                    if key.is_empty() {
                        return Err(syntax_error());
                    }
                    ini.0
                        .entry(section.clone())
                        .or_default()
                        .insert(key.to_lowercase(), value.to_owned());
                }
            }
        }

        Ok(ini)
    }

    fn section(&self, name: &str) -> Option<&HashMap<String, String>> {
        self.0.get(name)
    }
}

fn section(i: &str) -> IResult<&str, Line> {
    map(
        delimited(char('['), take_till1(|c| c == ']'), char(']')),
        |name: &str| Line::Section(name.trim()),
    )(i)
}

fn entry(i: &str) -> IResult<&str, Line> {
    map(
        tuple((take_till1(|c| c == '=' || c == ':'), one_of("=:"), rest)),
        |(key, _, value): (&str, char, &str)| Line::Entry {
            key: key.trim(),
            value: value.trim(),
        },
    )(i)
}

fn line(i: &str) -> IResult<&str, Line> {
    alt((section, entry))(i)
}
