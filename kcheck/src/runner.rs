//! Test execution driver.
//!
//! Resolves a test under the registry lock, then runs it with the lock
//! released: once per value of its registered range, all iterations sharing
//! one [`Reporter`] that is flushed when the run ends.

use alloc::string::String;
use alloc::vec::Vec;

use crate::case::FunctionHook;
use crate::config::DebugMask;
use crate::error::RegistryError;
use crate::kc_trace;
use crate::registry::Registry;
use crate::report::{Reporter, TestContext};
use crate::wire::MessageBuffer;

/// Outcome counts of one test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Times the body was invoked.
    pub iterations: u32,
    /// Checks that passed.
    pub passed: u32,
    /// Checks that failed.
    pub failed: u32,
    /// Records that did not fit in the buffer.
    pub dropped: u32,
}

impl RunSummary {
    /// No check failed.
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Run `hook` over its range, reporting into `buf`.
pub fn run_hook(hook: &FunctionHook, value: u32, buf: &mut MessageBuffer) -> RunSummary {
    kc_trace!(DebugMask::DEBUG, "kcheck: running {}.{}", hook.group(), hook.name());

    let mut iterations = 0;
    let mut reporter = Reporter::new(buf);
    for iteration in hook.range() {
        let mut ctx = TestContext {
            hook,
            iteration,
            value,
            reporter,
        };
        hook.call(&mut ctx);
        reporter = ctx.reporter;
        iterations += 1;
    }
    reporter.flush();

    RunSummary {
        iterations,
        passed: reporter.passed(),
        failed: reporter.failed(),
        dropped: reporter.dropped(),
    }
}

/// Run test `group.test` from `registry`.
pub fn run_test(
    registry: &Registry,
    group: &str,
    test: &str,
    value: u32,
    buf: &mut MessageBuffer,
) -> Result<RunSummary, RegistryError> {
    let hook = registry
        .find_test(group, test)
        .ok_or_else(|| RegistryError::NotFound {
            group: String::from(group),
            test: Some(String::from(test)),
        })?;
    Ok(run_hook(&hook, value, buf))
}

/// Run every test of `group` in list order.
pub fn run_group(
    registry: &Registry,
    group: &str,
    value: u32,
    buf: &mut MessageBuffer,
) -> Result<Vec<(String, RunSummary)>, RegistryError> {
    let hooks = registry.tests(group).ok_or_else(|| RegistryError::NotFound {
        group: String::from(group),
        test: None,
    })?;
    Ok(hooks
        .iter()
        .map(|hook| (String::from(hook.name()), run_hook(hook, value, buf)))
        .collect())
}
