//! The test set registry.
//!
//! One coarse lock guards the name map, every test set's function list and,
//! through [`Handle`], every handle's function list. Lookups take the same
//! lock so they never observe a half-linked entry.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use hashbrown::HashMap;
use spin::{Lazy, Mutex, MutexGuard};

use crate::case::{CaseInfo, FunctionHook, HandleId, HookId, TestCase};
use crate::config::{DebugMask, MAX_NAME_LEN, PROTOCOL_VERSION};
use crate::error::{BufferError, RegistryError};
use crate::handle::Handle;
use crate::kc_trace;
use crate::wire::{AttrKind, MessageBuffer};

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// The process-wide registry.
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// Check a group or test name.
pub(crate) fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(RegistryError::InvalidName {
            name: String::from(name),
        });
    }
    Ok(())
}

/// Lock-protected registry contents.
pub(crate) struct RegistryState {
    pub(crate) cases: HashMap<String, TestCase>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            cases: HashMap::new(),
        }
    }

    /// Build an empty test set keyed by `name`, not yet inserted.
    fn create(&self, name: &str) -> Result<TestCase, RegistryError> {
        validate_name(name)?;
        if self.cases.contains_key(name) {
            return Err(RegistryError::Duplicate {
                name: String::from(name),
            });
        }
        let mut key = String::new();
        key.try_reserve_exact(name.len())
            .map_err(|_| RegistryError::OutOfMemory)?;
        key.push_str(name);
        Ok(TestCase::new(key))
    }

    fn insert(&mut self, case: TestCase) -> Result<(), RegistryError> {
        if self.cases.contains_key(case.name.as_str()) {
            return Err(RegistryError::Duplicate { name: case.name });
        }
        self.cases
            .try_reserve(1)
            .map_err(|_| RegistryError::OutOfMemory)?;
        kc_trace!(DebugMask::DEBUG, "kcheck: Added test set {}", case.name);
        self.cases.insert(case.name.clone(), case);
        Ok(())
    }

    pub(crate) fn find_or_create(&mut self, name: &str) -> Result<&mut TestCase, RegistryError> {
        if !self.cases.contains_key(name) {
            let case = self.create(name)?;
            self.insert(case)?;
        }
        self.cases
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound {
                group: String::from(name),
                test: None,
            })
    }
}

/// Map from test set name to test set.
pub struct Registry {
    state: Mutex<RegistryState>,
    next_hook: AtomicU64,
    next_handle: AtomicU32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::new()),
            next_hook: AtomicU64::new(1),
            next_handle: AtomicU32::new(1),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock()
    }

    pub(crate) fn next_hook_id(&self) -> HookId {
        HookId(self.next_hook.fetch_add(1, Ordering::Relaxed))
    }

    /// Open a new registration scope.
    pub fn handle(&self) -> Handle<'_> {
        let id = HandleId(self.next_handle.fetch_add(1, Ordering::Relaxed));
        Handle::new(self, id)
    }

    /// Number of test sets.
    pub fn size(&self) -> usize {
        self.lock().cases.len()
    }

    /// Look up a test set by exact name.
    pub fn find(&self, name: &str) -> Option<CaseInfo> {
        self.lock().cases.get(name).map(TestCase::info)
    }

    /// Create and insert an empty test set.
    ///
    /// Fails with [`RegistryError::Duplicate`] if `name` is taken.
    pub fn create(&self, name: &str) -> Result<CaseInfo, RegistryError> {
        let mut state = self.lock();
        let case = state.create(name)?;
        let info = case.info();
        state.insert(case)?;
        Ok(info)
    }

    /// Look up a test set, creating it if absent.
    pub fn find_or_create(&self, name: &str) -> Result<CaseInfo, RegistryError> {
        let mut state = self.lock();
        state.find_or_create(name).map(|case| case.info())
    }

    /// Remove every test set.
    ///
    /// Callers must make sure no set still holds tests; use
    /// [`shutdown`](Self::shutdown) for the checked variant.
    pub fn delete_all(&self) {
        self.lock().cases.clear();
    }

    /// Tear the registry down if no tests remain.
    ///
    /// Returns [`RegistryError::Busy`] naming a remaining test otherwise,
    /// leaving the registry untouched.
    pub fn shutdown(&self) -> Result<(), RegistryError> {
        let mut state = self.lock();
        for case in state.cases.values() {
            if let Some((_, hook)) = case.functions.first() {
                let test = hook
                    .upgrade()
                    .map(|hook| hook.name.clone())
                    .unwrap_or_else(|| String::from("<released>"));
                log::warn!(
                    "kcheck: (memory leak) test set {} still active with test {} at unload!",
                    case.name,
                    test
                );
                return Err(RegistryError::Busy {
                    group: case.name.clone(),
                    test,
                });
            }
        }
        state.cases.clear();
        Ok(())
    }

    /// Live tests of `group` in list order.
    pub fn tests(&self, group: &str) -> Option<Vec<Arc<FunctionHook>>> {
        self.lock().cases.get(group).map(|case| case.hooks().collect())
    }

    /// Look up test `group.name`.
    pub fn find_test(&self, group: &str, name: &str) -> Option<Arc<FunctionHook>> {
        self.lock()
            .cases
            .get(group)?
            .hooks()
            .find(|hook| hook.name == name)
    }

    /// Test set names, sorted.
    pub fn case_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().cases.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Write a listing of every test set and test to `buf`.
    ///
    /// The listing is written whole or not at all: on error `buf` holds
    /// exactly what it held before the call.
    pub fn describe(&self, buf: &mut MessageBuffer) -> Result<(), BufferError> {
        let start = buf.len();
        let result = self.put_listing(buf);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    fn put_listing(&self, buf: &mut MessageBuffer) -> Result<(), BufferError> {
        let state = self.lock();
        let mut cases: Vec<&TestCase> = state.cases.values().collect();
        cases.sort_unstable_by(|a, b| a.name.cmp(&b.name));

        buf.put_u32(AttrKind::Version, PROTOCOL_VERSION)?;
        buf.put_u32(AttrKind::Num, count_u32(cases.len()))?;
        for case in cases {
            let hooks: Vec<Arc<FunctionHook>> = case.hooks().collect();
            buf.put_string(AttrKind::Snam, &case.name)?;
            buf.put_u32(AttrKind::Num, count_u32(hooks.len()))?;
            for hook in hooks {
                buf.put_string(AttrKind::Tnam, &hook.name)?;
                buf.put_u32(AttrKind::Hid, hook.handle.0)?;
            }
        }
        Ok(())
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::case::{RegisterOptions, TestDescriptor};
    use alloc::vec;
    use std::thread;

    fn noop(group: &str, name: &str) -> TestDescriptor {
        TestDescriptor::new(group, name, file!(), |_| {})
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let registry = Registry::new();
        assert_eq!(registry.size(), 0);
        assert!(registry.find("net").is_none());

        let first = registry.find_or_create("net").unwrap();
        let second = registry.find_or_create("net").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.size(), 1);
        assert!(registry.find("net").unwrap().tests.is_empty());
    }

    #[test]
    fn test_create_rejects_duplicate_and_bad_names() {
        let registry = Registry::new();
        registry.create("net").unwrap();
        assert_eq!(
            registry.create("net"),
            Err(RegistryError::Duplicate { name: "net".into() })
        );
        assert!(matches!(
            registry.create(""),
            Err(RegistryError::InvalidName { .. })
        ));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            registry.find_or_create(&long),
            Err(RegistryError::InvalidName { .. })
        ));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_concurrent_find_or_create_keeps_one_set() {
        let registry = Registry::new();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        registry.find_or_create("shared").unwrap();
                    }
                });
            }
        });
        assert_eq!(registry.size(), 1);
        assert_eq!(registry.case_names(), vec![String::from("shared")]);
    }

    #[test]
    fn test_shutdown_refuses_while_tests_registered() {
        let registry = Registry::new();
        let mut handle = registry.handle();
        handle
            .register_test(noop("net", "t1"), RegisterOptions::default())
            .unwrap();
        registry.find_or_create("empty").unwrap();

        let err = registry.shutdown().unwrap_err();
        assert_eq!(
            err,
            RegistryError::Busy {
                group: "net".into(),
                test: "t1".into()
            }
        );
        assert!(err.is_busy());
        assert_eq!(registry.size(), 2);
        assert_eq!(registry.tests("net").unwrap().len(), 1);

        handle.cleanup();
        registry.shutdown().unwrap();
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_registry_usable_after_shutdown() {
        let registry = Registry::new();
        registry.find_or_create("a").unwrap();
        registry.shutdown().unwrap();

        let mut handle = registry.handle();
        handle
            .register_test(noop("a", "again"), RegisterOptions::default())
            .unwrap();
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn test_find_test() {
        let registry = Registry::new();
        let mut handle = registry.handle();
        handle
            .register_test(noop("net", "t1"), RegisterOptions::range(2..5))
            .unwrap();

        let hook = registry.find_test("net", "t1").unwrap();
        assert_eq!(hook.group(), "net");
        assert_eq!(hook.range(), 2..5);
        assert_eq!(hook.handle(), handle.id());
        assert!(registry.find_test("net", "t2").is_none());
        assert!(registry.find_test("fs", "t1").is_none());
    }

    #[test]
    fn test_describe_lists_sets_in_name_order() {
        let registry = Registry::new();
        let mut h1 = registry.handle();
        let mut h2 = registry.handle();
        h1.register_test(noop("net", "t1"), RegisterOptions::default())
            .unwrap();
        h2.register_test(noop("net", "t2"), RegisterOptions::default())
            .unwrap();
        h2.register_test(noop("fs", "open"), RegisterOptions::default())
            .unwrap();

        let mut buf = MessageBuffer::new();
        registry.describe(&mut buf).unwrap();
        let (version, cases) = crate::wire::parse_listing(buf.as_bytes()).unwrap();

        assert_eq!(version, PROTOCOL_VERSION);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name, "fs");
        assert_eq!(cases[1].name, "net");
        let net: Vec<&str> = cases[1].test_names().collect();
        assert_eq!(net, vec!["t1", "t2"]);
        assert_eq!(cases[1].tests[0].handle, h1.id());
        assert_eq!(cases[1].tests[1].handle, h2.id());
    }

    #[test]
    fn test_failed_describe_leaves_buffer_unchanged() {
        let registry = Registry::new();
        let mut handle = registry.handle();
        for name in ["t1", "t2", "t3", "t4"] {
            handle
                .register_test(noop("net", name), RegisterOptions::default())
                .unwrap();
        }

        let mut buf = MessageBuffer::with_capacity(48);
        buf.put_u32(AttrKind::Stat, 7).unwrap();
        let before = buf.as_bytes().to_vec();

        assert!(matches!(registry.describe(&mut buf), Err(BufferError::Full { .. })));
        assert_eq!(buf.as_bytes(), &before[..]);

        let mut big = MessageBuffer::new();
        registry.describe(&mut big).unwrap();
        let (_, cases) = crate::wire::parse_listing(big.as_bytes()).unwrap();
        assert_eq!(cases[0].tests.len(), 4);
    }

    #[test]
    fn test_global_registry_is_shared() {
        assert!(core::ptr::eq(global(), global()));
    }
}
