use std::{
    io::Write,
    path::{Path, PathBuf},
};

use owo_colors::OwoColorize;

use crate::{
    matching_files, Engine, Error, Mode, Report, ReportPolicy, Result, TestCase, Toolchain,
    Verdict, SOURCE_EXTENSION,
};

/// Pass/fail totals of one run, folded from the verdicts of its cases
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SuiteResult {
    pub total: usize,
    pub passing: usize,
    pub failing: usize,
    /// Record-mode cases whose fixture could not be written, kept out of the replay counters
    pub unrecorded: usize,
}

impl SuiteResult {
    // recording counts nothing except cases it failed to record
    pub fn tally(self, mode: Mode, verdict: &Verdict) -> Self {
        if mode == Mode::Record {
            return match verdict {
                Verdict::Fail(_) => Self {
                    unrecorded: self.unrecorded + 1,
                    ..self
                },
                _ => self,
            };
        }
        match verdict {
            Verdict::Pass => Self {
                total: self.total + 1,
                passing: self.passing + 1,
                ..self
            },
            Verdict::Fail(_) => Self {
                total: self.total + 1,
                failing: self.failing + 1,
                ..self
            },
            Verdict::RecordWritten => self,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failing == 0 && self.unrecorded == 0
    }
}

impl std::fmt::Display for SuiteResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ran all tests [{} of {} succeeded] [{} of {} failed]",
            self.passing, self.total, self.failing, self.total
        )
    }
}

/// Writes progress lines to `out` and failure reports to `err`
pub struct Reporter<O, E> {
    out: O,
    err: E,
    policy: ReportPolicy,
    color: bool,
}

impl<O: Write, E: Write> Reporter<O, E> {
    pub fn new(out: O, err: E, policy: ReportPolicy) -> Self {
        Self {
            out,
            err,
            policy,
            color: false,
        }
    }

    /// Colour reports and the summary, only sensible when writing to a terminal
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }

    fn started(&mut self, case: &TestCase, mode: Mode) -> std::io::Result<()> {
        match mode {
            Mode::Record => writeln!(self.out, "Generating tests for {case}..."),
            Mode::Replay => writeln!(self.out, "Running tests for {case}..."),
        }
    }

    fn finished(&mut self, case: &TestCase, verdict: &Verdict) -> std::io::Result<()> {
        if let Verdict::Fail(failure) = verdict {
            // flush progress first so the report lands after its "Running" line
            self.out.flush()?;
            let report = Report::new(case, failure, self.policy);
            if self.color {
                writeln!(self.err, "{}", report.red())?;
            } else {
                writeln!(self.err, "{report}")?;
            }
        }
        Ok(())
    }

    fn summary(&mut self, result: &SuiteResult) -> std::io::Result<()> {
        writeln!(self.out)?;
        match (self.color, result.succeeded()) {
            (false, _) => writeln!(self.out, "{result}"),
            (true, true) => writeln!(self.out, "{}", result.green()),
            (true, false) => writeln!(self.out, "{}", result.red()),
        }
    }
}

/// The test sources found in one directory
#[derive(Debug, Clone)]
pub struct Suite {
    directory: PathBuf,
    cases: Vec<TestCase>,
}

impl Suite {
    /// Flat scan for `*.wtr` files
    pub fn discover(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        let cases = matching_files(&directory, SOURCE_EXTENSION)?
            .into_iter()
            .map(TestCase::new)
            .collect::<Vec<_>>();
        log::debug!("found {} test(s) in {}", cases.len(), directory.display());
        Ok(Self { directory, cases })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Evaluates every case in order. Per-case failures are reported and counted, anything
    /// returned as `Err` stops the run
    pub fn run<T, O, E>(
        &self,
        engine: &Engine<T>,
        mode: Mode,
        reporter: &mut Reporter<O, E>,
    ) -> Result<SuiteResult>
    where
        T: Toolchain,
        O: Write,
        E: Write,
    {
        let result = self
            .cases
            .iter()
            .try_fold(SuiteResult::default(), |result, case| {
                reporter.started(case, mode)?;
                let verdict = engine.evaluate(case, mode)?;
                reporter.finished(case, &verdict)?;
                Ok::<_, Error>(result.tally(mode, &verdict))
            })?;

        if mode == Mode::Replay {
            reporter.summary(&result)?;
        }

        Ok(result)
    }
}
