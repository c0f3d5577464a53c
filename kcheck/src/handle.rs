//! Registration scopes.
//!
//! A [`Handle`] stands for everything one unit registered. It owns those
//! entries and is the only place they are freed: [`Handle::cleanup`] (or
//! dropping the handle) unlinks each entry from its test set and releases it
//! while holding the registry lock.
//!
//! Running a test and cleaning up the handle that owns it must be
//! serialized by the caller. A run in flight keeps its entry alive, but the
//! entry is no longer listed once cleanup returns.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use crate::case::{FunctionHook, HandleId, HookId, RegisterOptions, TestDescriptor};
use crate::config::DebugMask;
use crate::error::RegistryError;
use crate::kc_trace;
use crate::registry::{validate_name, Registry};

/// Registration scope of one unit.
pub struct Handle<'r> {
    id: HandleId,
    registry: &'r Registry,
    hooks: Vec<Arc<FunctionHook>>,
}

impl<'r> Handle<'r> {
    pub(crate) fn new(registry: &'r Registry, id: HandleId) -> Self {
        Self {
            id,
            registry,
            hooks: Vec::new(),
        }
    }

    /// Handle id.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Registry this handle registers into.
    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Number of tests this handle owns.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether this handle owns no tests.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// `(group, name)` of every owned test, in registration order.
    pub fn test_names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hooks.iter().map(|hook| (hook.group(), hook.name()))
    }

    /// Register a test under `descriptor.group`, creating the set if needed.
    ///
    /// Registration is best effort: on failure nothing is linked anywhere,
    /// the reason is logged and returned, and the caller may carry on.
    /// Growing the set and handle lists is fallible; allocating the entry
    /// itself (`Arc::new`, and `Box::new` in [`TestDescriptor::new`]) still
    /// aborts on exhaustion like any other `alloc` allocation.
    pub fn register_test(
        &mut self,
        descriptor: TestDescriptor,
        options: RegisterOptions,
    ) -> Result<HookId, RegistryError> {
        let TestDescriptor {
            name,
            group,
            file,
            fun,
        } = descriptor;

        let result = validate_name(&name).and_then(|()| {
            let hook = Arc::new(FunctionHook {
                id: self.registry.next_hook_id(),
                name,
                group,
                file,
                fun,
                options,
                handle: self.id,
            });
            self.link(hook)
        });

        if let Err(err) = &result {
            log::error!("kcheck: failed to add test from {}: {}", file, err);
        }
        result
    }

    fn link(&mut self, hook: Arc<FunctionHook>) -> Result<HookId, RegistryError> {
        let registry = self.registry;
        let mut state = registry.lock();
        let case = state.find_or_create(&hook.group)?;

        case.functions
            .try_reserve(1)
            .map_err(|_| RegistryError::OutOfMemory)?;
        self.hooks
            .try_reserve(1)
            .map_err(|_| RegistryError::OutOfMemory)?;

        kc_trace!(
            DebugMask::LIST,
            "kcheck: Added test \"{}.{}\" start = {}, end = {}",
            hook.group,
            hook.name,
            hook.options.range.start,
            hook.options.range.end
        );
        let id = hook.id;
        case.functions.push((id, Arc::downgrade(&hook)));
        self.hooks.push(hook);
        Ok(id)
    }

    /// Unlink and free every test this handle owns.
    ///
    /// Returns how many tests were removed. Calling it on an empty handle
    /// does nothing.
    pub fn cleanup(&mut self) -> usize {
        if self.hooks.is_empty() {
            return 0;
        }
        let removed = {
            let mut state = self.registry.lock();
            let hooks = mem::take(&mut self.hooks);
            for hook in &hooks {
                kc_trace!(DebugMask::LIST, "kcheck: delete test {}.{}", hook.group, hook.name);
                if let Some(case) = state.cases.get_mut(hook.group.as_str()) {
                    case.unlink(hook.id);
                }
            }
            hooks
        };
        // Test bodies are dropped with the lock released.
        let count = removed.len();
        drop(removed);
        count
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        if !self.hooks.is_empty() {
            kc_trace!(
                DebugMask::INFO,
                "kcheck: handle {} dropped with {} tests, cleaning up",
                self.id.0,
                self.hooks.len()
            );
            self.cleanup();
        }
    }
}
