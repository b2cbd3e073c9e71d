use std::{cell::RefCell, collections::HashMap, rc::Rc, time::Duration};

use crate::{CapturedOutput, Invocation, Result, Stage, TestCase, Toolchain};

pub(crate) const SCRIPTED_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Script {
    // source file name -> what the toolchain reports for it
    invocations: HashMap<String, Invocation>,
    calls: usize,
}

// Toolchain double keyed by source file name. Clones share the same script so a test
// can change the behaviour of a toolchain already owned by an `Engine`
#[derive(Debug, Clone, Default)]
pub(crate) struct Scripted(Rc<RefCell<Script>>);

impl Scripted {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn set(&self, file: &str, invocation: Invocation) -> Self {
        self.0
            .borrow_mut()
            .invocations
            .insert(file.to_owned(), invocation);
        self.clone()
    }

    pub(crate) fn prints(&self, file: &str, stdout: &str) -> Self {
        self.warns(file, stdout, "")
    }

    pub(crate) fn warns(&self, file: &str, stdout: &str, stderr: &str) -> Self {
        self.set(
            file,
            Invocation::Completed(CapturedOutput {
                stdout: stdout.into(),
                stderr: stderr.into(),
                compiled: true,
            }),
        )
    }

    pub(crate) fn fails_to_compile(&self, file: &str, stderr: &str) -> Self {
        self.set(
            file,
            Invocation::Completed(CapturedOutput {
                stdout: String::new(),
                stderr: stderr.into(),
                compiled: false,
            }),
        )
    }

    pub(crate) fn hangs(&self, file: &str, stage: Stage) -> Self {
        self.set(
            file,
            Invocation::TimedOut {
                stage,
                after: SCRIPTED_TIMEOUT,
            },
        )
    }

    pub(crate) fn calls(&self) -> usize {
        self.0.borrow().calls
    }
}

impl Toolchain for Scripted {
    fn compile_and_run(&self, case: &TestCase) -> Result<Invocation> {
        let file = case
            .source()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut script = self.0.borrow_mut();
        script.calls += 1;
        match script.invocations.get(&file) {
            Some(invocation) => Ok(invocation.clone()),
            None => panic!("No scripted output for {file}"),
        }
    }
}
