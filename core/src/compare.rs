use std::{path::PathBuf, time::Duration};

use crate::{
    golden::{self, Fixture},
    Invocation, Normalizer, Output, Result, Stage, TestCase, Toolchain,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Overwrite fixtures with freshly captured output
    Record,
    /// Compare freshly captured output against the fixtures
    Replay,
}

/// How a mismatch is presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportPolicy {
    /// Both streams joined and trimmed, expected next to actual
    #[default]
    Combined,
    /// Each differing stream on its own
    Separate,
    /// Line diff of the joined streams
    Diff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Mismatch { expected: Output, actual: Output },
    MissingFixture { path: PathBuf },
    MalformedFixture { path: PathBuf, separators: usize },
    TimedOut { stage: Stage, after: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(Failure),
    RecordWritten,
}

/// Evaluates single test cases: run, normalize, then record or compare
pub struct Engine<T> {
    toolchain: T,
    normalizer: Normalizer,
}

impl<T: Toolchain> Engine<T> {
    pub fn new(toolchain: T) -> Self {
        Self {
            toolchain,
            normalizer: Normalizer::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn evaluate(&self, case: &TestCase, mode: Mode) -> Result<Verdict> {
        let captured = match self.toolchain.compile_and_run(case)? {
            Invocation::Completed(captured) => captured,
            Invocation::TimedOut { stage, after } => {
                return Ok(Verdict::Fail(Failure::TimedOut { stage, after }))
            }
        };
        let actual = self.normalizer.normalize(captured);

        if mode == Mode::Record {
            golden::save(case, &actual)?;
            return Ok(Verdict::RecordWritten);
        }

        let verdict = match golden::load(case)? {
            Fixture::Found(expected) if expected == actual => Verdict::Pass,
            Fixture::Found(expected) => Verdict::Fail(Failure::Mismatch { expected, actual }),
            Fixture::Missing => Verdict::Fail(Failure::MissingFixture {
                path: case.golden_path(),
            }),
            Fixture::Malformed { separators } => Verdict::Fail(Failure::MalformedFixture {
                path: case.golden_path(),
                separators,
            }),
        };
        Ok(verdict)
    }
}

/// Diagnostic for a failed case, rendered through `Display`
pub struct Report<'a> {
    case: &'a TestCase,
    failure: &'a Failure,
    policy: ReportPolicy,
}

impl<'a> Report<'a> {
    pub fn new(case: &'a TestCase, failure: &'a Failure, policy: ReportPolicy) -> Self {
        Self {
            case,
            failure,
            policy,
        }
    }
}

impl std::fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let case = self.case;
        let (expected, actual) = match self.failure {
            Failure::Mismatch { expected, actual } => (expected, actual),
            Failure::MissingFixture { path } => {
                return write!(
                    f,
                    "Test in file {case} failed:\nMissing fixture {}; record it with --output-record",
                    path.display()
                )
            }
            Failure::MalformedFixture { path, separators } => {
                return write!(
                    f,
                    "Test in file {case} failed:\nMalformed fixture {}: expected exactly one \
                     $stderr: separator, found {separators}",
                    path.display()
                )
            }
            Failure::TimedOut { stage, after } => {
                return write!(
                    f,
                    "Test in file {case} failed:\n{stage} timed out after {}s",
                    after.as_secs_f64()
                )
            }
        };

        match self.policy {
            ReportPolicy::Separate => {
                let streams = [
                    ("Stdout", &expected.stdout, &actual.stdout),
                    ("Stderr", &expected.stderr, &actual.stderr),
                ];
                let mut first = true;
                for (name, expected, actual) in streams {
                    if expected == actual {
                        continue;
                    }
                    if !first {
                        writeln!(f)?;
                    }
                    first = false;
                    write!(
                        f,
                        "Test in file {case} failed:\n{name} Expected:\n{expected}\nGot:\n{actual}"
                    )?;
                }
                Ok(())
            }
            ReportPolicy::Combined => {
                write!(
                    f,
                    "Test in file {case} failed:\nExpected Output:\n{}\nGot:\n{}\n(Output is stripped)",
                    expected.combined(),
                    actual.combined()
                )
            }
            ReportPolicy::Diff => {
                let expected = expected.combined();
                let actual = actual.combined();
                write!(
                    f,
                    "Test in file {case} failed:\nDiff < expected / actual >:\n{}",
                    pretty_assertions::StrComparison::new(&expected, &actual)
                )
            }
        }
    }
}
