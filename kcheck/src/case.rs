//! Test sets and registered test function entries.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use crate::report::TestContext;

/// Callable test body supplied by the registering unit.
pub type TestFn = Box<dyn Fn(&mut TestContext<'_>) + Send + Sync>;

/// Registration scope identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(pub u32);

/// Registered test entry identifier, unique within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(pub u64);

/// Declaration of one test, as produced by the registering unit.
pub struct TestDescriptor {
    /// Test name.
    pub name: String,
    /// Test set the test belongs to.
    pub group: String,
    /// Source file the test was declared in.
    pub file: &'static str,
    /// Test body.
    pub fun: TestFn,
}

impl TestDescriptor {
    /// Describe test `group.name` declared in `file`.
    pub fn new<F>(group: &str, name: &str, file: &'static str, fun: F) -> Self
    where
        F: Fn(&mut TestContext<'_>) + Send + Sync + 'static,
    {
        Self {
            name: String::from(name),
            group: String::from(group),
            file,
            fun: Box::new(fun),
        }
    }
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("group", &self.group)
            .field("name", &self.name)
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Per-registration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Signal the test is expected to raise, 0 for none.
    pub signal: i32,
    /// Exit value the test is allowed to finish with.
    pub allowed_exit_value: i32,
    /// Parameter range; the body runs once per value.
    pub range: Range<u32>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            signal: 0,
            allowed_exit_value: 0,
            range: 0..1,
        }
    }
}

impl RegisterOptions {
    /// Run the body once per value in `range`.
    pub fn range(range: Range<u32>) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }
}

/// One registered test function.
///
/// Owned by the [`Handle`](crate::handle::Handle) that registered it and
/// indexed, without ownership, by its [`TestCase`].
pub struct FunctionHook {
    pub(crate) id: HookId,
    pub(crate) name: String,
    pub(crate) group: String,
    pub(crate) file: &'static str,
    pub(crate) fun: TestFn,
    pub(crate) options: RegisterOptions,
    pub(crate) handle: HandleId,
}

impl FunctionHook {
    /// Entry id.
    pub fn id(&self) -> HookId {
        self.id
    }

    /// Test name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning test set name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Declaring source file.
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Parameter range.
    pub fn range(&self) -> Range<u32> {
        self.options.range.clone()
    }

    /// Expected signal, 0 for none.
    pub fn signal(&self) -> i32 {
        self.options.signal
    }

    /// Allowed exit value.
    pub fn allowed_exit_value(&self) -> i32 {
        self.options.allowed_exit_value
    }

    /// Handle that registered this entry.
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub(crate) fn call(&self, ctx: &mut TestContext<'_>) {
        (self.fun)(ctx)
    }
}

impl fmt::Debug for FunctionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHook")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("name", &self.name)
            .field("range", &self.options.range)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// A named test set.
///
/// `functions` keeps registration order. Entries are weak: the owning
/// handle decides when they go away, and always unlinks them here first.
pub(crate) struct TestCase {
    pub(crate) name: String,
    pub(crate) functions: Vec<(HookId, Weak<FunctionHook>)>,
}

impl TestCase {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            functions: Vec::new(),
        }
    }

    /// Live entries in list order.
    pub(crate) fn hooks(&self) -> impl Iterator<Item = Arc<FunctionHook>> + '_ {
        self.functions.iter().filter_map(|(_, hook)| hook.upgrade())
    }

    /// Unlink `id`; returns whether it was present.
    pub(crate) fn unlink(&mut self, id: HookId) -> bool {
        match self.functions.iter().position(|(hid, _)| *hid == id) {
            Some(pos) => {
                self.functions.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn info(&self) -> CaseInfo {
        CaseInfo {
            name: self.name.clone(),
            tests: self
                .hooks()
                .map(|hook| TestInfo {
                    name: hook.name.clone(),
                    handle: hook.handle,
                })
                .collect(),
        }
    }
}

/// Snapshot of a test set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInfo {
    /// Test set name.
    pub name: String,
    /// Tests in list order.
    pub tests: Vec<TestInfo>,
}

impl CaseInfo {
    /// Names of the tests in list order.
    pub fn test_names(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|t| t.name.as_str())
    }
}

/// Snapshot of one registered test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInfo {
    /// Test name.
    pub name: String,
    /// Handle that registered it.
    pub handle: HandleId,
}
