use std::{
    ffi::OsString,
    io::{IsTerminal, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::Context;
use water_tester_core::{
    clean_compiled, clean_recorded, Config, Engine, JavaToolchain, Mode, ReportPolicy, Reporter,
    Suite, SuiteResult, Toolchain,
};

#[derive(Debug, clap::Parser)]
#[command(about = "Record and replay the output of Water test programs")]
struct Args {
    /// The directory containing test files
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// Record the outputs of files into .txt files
    #[arg(long, short = 'o')]
    output_record: bool,

    /// Outputs stdout and stderr separately on failure
    #[arg(long, short = 's')]
    separate_output: bool,

    /// Shows a line diff of the outputs on failure
    #[arg(long, conflicts_with = "separate_output")]
    diff: bool,

    /// Remove .class files from test folder
    #[arg(long, short = 'c')]
    clean: bool,

    /// Remove .txt files from test folder, also spelled -ct
    #[arg(long, visible_alias = "ct")]
    clean_tests: bool,

    /// Remove .txt and .class files from test folder, also spelled -ca
    #[arg(long, visible_alias = "ca")]
    clean_all: bool,

    /// Runs tests even if clean is set
    #[arg(long, short = 'r')]
    run: bool,

    /// Seconds each compiler or program invocation may take, 0 waits forever. Overrides the
    /// config file
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Log subprocess invocations
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn mode(&self) -> Mode {
        if self.output_record {
            Mode::Record
        } else {
            Mode::Replay
        }
    }

    fn report_policy(&self) -> ReportPolicy {
        if self.separate_output {
            ReportPolicy::Separate
        } else if self.diff {
            ReportPolicy::Diff
        } else {
            ReportPolicy::Combined
        }
    }

    fn clean_compiled(&self) -> bool {
        self.clean || self.clean_all
    }

    fn clean_recorded(&self) -> bool {
        self.clean_tests || self.clean_all
    }

    // any clean flag turns the invocation into a clean-only one unless --run is given
    fn should_run(&self) -> bool {
        self.run || !(self.clean || self.clean_tests || self.clean_all)
    }

    fn timeout(&self, config: &Config) -> Option<Duration> {
        match self.timeout {
            Some(0) => None,
            Some(seconds) => Some(Duration::from_secs(seconds)),
            None => config.timeout,
        }
    }
}

// `-ct` and `-ca` are whole flags, clap would read them as the clusters `-c -t` and `-c -a`
fn expand_flags(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-ct") => OsString::from("--clean-tests"),
            Some("-ca") => OsString::from("--clean-all"),
            _ => arg,
        })
        .collect()
}

fn main() -> anyhow::Result<ExitCode> {
    use clap::Parser;

    let args = Args::parse_from(expand_flags(std::env::args_os()));
    init_logger(args.verbose);

    let directory = resolve_directory(&args.directory)?;
    log::debug!("testing {}", directory.display());

    let toolchain = || -> anyhow::Result<JavaToolchain> {
        let config = Config::load(Path::new(Config::FILE_NAME))
            .context("failed to load the toolchain configuration")?;
        Ok(JavaToolchain::new(&config)?.timeout(args.timeout(&config)))
    };
    let color = std::io::stdout().is_terminal() && std::io::stderr().is_terminal();
    let result = execute(
        &args,
        &directory,
        toolchain,
        std::io::stdout().lock(),
        std::io::stderr().lock(),
        color,
    )?;

    Ok(match result {
        Some(result) if !result.succeeded() => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

/// Cleans what the flags ask for, then runs the suite unless the invocation is clean-only.
/// The toolchain is only built when tests run, `None` means nothing ran
fn execute<T, O, E>(
    args: &Args,
    directory: &Path,
    toolchain: impl FnOnce() -> anyhow::Result<T>,
    mut out: O,
    err: E,
    color: bool,
) -> anyhow::Result<Option<SuiteResult>>
where
    T: Toolchain,
    O: Write,
    E: Write,
{
    if args.clean_compiled() {
        clean_compiled(directory, &mut out)?;
    }
    if args.clean_recorded() {
        clean_recorded(directory, &mut out)?;
    }
    if !args.should_run() {
        return Ok(None);
    }

    let engine = Engine::new(toolchain()?);
    let suite = Suite::discover(directory)?;
    let mut reporter = Reporter::new(out, err, args.report_policy()).color(color);
    Ok(Some(suite.run(&engine, args.mode(), &mut reporter)?))
}

fn init_logger(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or("warn");
    let mut builder = env_logger::Builder::from_env(env);
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}

// relative paths are tried against the working directory first, then next to the executable
fn resolve_directory(directory: &Path) -> anyhow::Result<PathBuf> {
    if directory.is_absolute() {
        return Ok(directory.to_path_buf());
    }

    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let from_cwd = cwd.join(directory);
    if from_cwd.is_dir() {
        return Ok(from_cwd);
    }

    let exe = std::env::current_exe().context("failed to locate the tester executable")?;
    let base = exe.parent().map_or(cwd, Path::to_path_buf);
    Ok(base.join(directory))
}
