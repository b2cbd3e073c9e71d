use std::{
    ffi::OsString,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{Config, Error, Result, TestCase};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Compiles a test case and runs the resulting program
pub trait Toolchain {
    fn compile_and_run(&self, case: &TestCase) -> Result<Invocation>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Compile => write!(f, "Compilation"),
            Stage::Run => write!(f, "Program run"),
        }
    }
}

/// Raw output of the compiler, followed by the program's output if compilation succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub compiled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Completed(CapturedOutput),
    TimedOut { stage: Stage, after: Duration },
}

// Runs the Water compiler and the compiled programs through the java launcher
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    java: String,
    module_path: OsString,
    module: String,
    build_dir: PathBuf,
    timeout: Option<Duration>,
}

impl JavaToolchain {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            java: config.java.clone(),
            module_path: config.module_path()?,
            module: config.module.clone(),
            build_dir: config.build_dir.clone(),
            timeout: config.timeout,
        })
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    // java -p <module path> -m <module> <source>
    fn compile_command(&self, source: &Path) -> Command {
        let mut command = Command::new(&self.java);
        command
            .arg("-p")
            .arg(&self.module_path)
            .arg("-m")
            .arg(&self.module)
            .arg(source)
            .current_dir(&self.build_dir);
        command
    }

    // java <program>, from the directory holding the compiled class
    fn run_command(&self, program: &str, directory: &Path) -> Command {
        let mut command = Command::new(&self.java);
        command.arg(program).current_dir(directory);
        command
    }
}

impl Toolchain for JavaToolchain {
    fn compile_and_run(&self, case: &TestCase) -> Result<Invocation> {
        // the compiler runs elsewhere, so relative sources must be anchored first
        let source = absolute(case.source())?;
        let directory = absolute(case.directory())?;

        let compile = match execute(self.compile_command(&source), self.timeout)? {
            Exit::Finished(finished) => finished,
            Exit::TimedOut(after) => {
                return Ok(Invocation::TimedOut {
                    stage: Stage::Compile,
                    after,
                })
            }
        };

        let mut captured = CapturedOutput {
            stdout: compile.stdout,
            stderr: compile.stderr,
            compiled: compile.status.success(),
        };
        if !captured.compiled {
            log::debug!("{case} did not compile ({})", compile.status);
            return Ok(Invocation::Completed(captured));
        }

        let program = case.program();
        match execute(self.run_command(&program, &directory), self.timeout)? {
            Exit::Finished(run) => {
                log::debug!("{program} exited with {}", run.status);
                captured.stdout.push_str(&run.stdout);
                captured.stderr.push_str(&run.stderr);
                Ok(Invocation::Completed(captured))
            }
            Exit::TimedOut(after) => Ok(Invocation::TimedOut {
                stage: Stage::Run,
                after,
            }),
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir()?;
        Ok(cwd.join(path))
    }
}

/*****************************************************************************************
 * Process execution
 */

#[derive(Debug)]
struct Finished {
    stdout: String,
    stderr: String,
    status: ExitStatus,
}

#[derive(Debug)]
enum Exit {
    Finished(Finished),
    TimedOut(Duration),
}

fn execute(mut command: Command, timeout: Option<Duration>) -> Result<Exit> {
    let program = command.get_program().to_string_lossy().into_owned();
    if let Some(dir) = command.get_current_dir() {
        log::debug!("running {command:?} in {}", dir.display());
    } else {
        log::debug!("running {command:?}");
    }

    let mut proc = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

    // drain both pipes while waiting so a chatty child can't block on a full pipe
    let stdout = drain(proc.stdout.take());
    let stderr = drain(proc.stderr.take());

    let Some(status) = wait(&mut proc, timeout)? else {
        // if killing the child fails, just ignore it, the OS cleans up after us.
        // the reader threads are left detached since grandchildren may still hold the pipes
        let _ = proc.kill();
        let _ = proc.wait();
        let after = timeout.unwrap_or_default();
        log::warn!("{program} timed out after {after:?}");
        return Ok(Exit::TimedOut(after));
    };

    Ok(Exit::Finished(Finished {
        stdout: collect(stdout)?,
        stderr: collect(stderr)?,
        status,
    }))
}

// None when the deadline passed before the child exited
fn wait(proc: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return Ok(Some(proc.wait()?));
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = proc.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> std::io::Result<String> {
    let bytes = handle.join().unwrap_or_else(|_| {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "pipe reader panicked",
        ))
    })?;
    Ok(decode(&bytes))
}

// captured text is compared line by line, so windows line endings are folded
pub(crate) fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use pretty_assertions::assert_eq;

    use super::*;

    fn toolchain() -> JavaToolchain {
        let config = Config::parse(
            "[Libraries]\njcommander = /l/jc.jar\nasm = /l/asm.jar\nruntime = /l/rt\ncompiler = /l/cc\n\
             [Toolchain]\nbuild_dir = /water/out/Compiler\n",
        )
        .unwrap();
        JavaToolchain::new(&config).unwrap()
    }

    #[test]
    fn compile_command_line() {
        let command = toolchain().compile_command(Path::new("/tests/hello.wtr"));

        let args: Vec<_> = command.get_args().collect();
        let module_path = std::env::join_paths(["/l/jc.jar", "/l/asm.jar", "/l/rt", "/l/cc"])
            .unwrap();
        assert_eq!(command.get_program(), "java");
        assert_eq!(
            args,
            vec![
                OsStr::new("-p"),
                module_path.as_os_str(),
                OsStr::new("-m"),
                OsStr::new("water.compiler/water.compiler.Main"),
                OsStr::new("/tests/hello.wtr"),
            ]
        );
        assert_eq!(command.get_current_dir(), Some(Path::new("/water/out/Compiler")));
    }

    #[test]
    fn run_command_line() {
        let command = toolchain().run_command("helloWtr", Path::new("/tests"));

        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec!["helloWtr"]);
        assert_eq!(command.get_current_dir(), Some(Path::new("/tests")));
    }

    #[test]
    fn decode_folds_crlf() {
        assert_eq!(decode(b"a\r\nb\r\n"), "a\nb\n");
        assert_eq!(decode(b"lone\rcr"), "lone\rcr");
    }

    #[test]
    fn spawn_failure_is_fatal() {
        let command = Command::new("./definitely-not-a-real-launcher");

        let err = execute(command, None).unwrap_err();

        assert!(matches!(err, Error::Spawn { program, .. } if program == "./definitely-not-a-real-launcher"));
    }

    #[cfg(unix)]
    #[test]
    fn captures_both_streams_and_status() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo out; echo err >&2; exit 3"]);

        let Exit::Finished(finished) = execute(command, Some(Duration::from_secs(10))).unwrap()
        else {
            panic!("Expected Exit::Finished")
        };

        assert_eq!(finished.stdout, "out\n");
        assert_eq!(finished.stderr, "err\n");
        assert_eq!(finished.status.code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn large_output_does_not_block() {
        let mut command = Command::new("sh");
        command.args(["-c", "i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done"]);

        let Exit::Finished(finished) = execute(command, None).unwrap() else {
            panic!("Expected Exit::Finished")
        };

        assert_eq!(finished.stdout.lines().count(), 20000);
    }

    #[cfg(unix)]
    #[test]
    fn slow_process_times_out() {
        let mut command = Command::new("sh");
        command.args(["-c", "exec sleep 5"]);

        let started = Instant::now();
        let exit = execute(command, Some(Duration::from_millis(100))).unwrap();

        assert!(matches!(exit, Exit::TimedOut(after) if after == Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
