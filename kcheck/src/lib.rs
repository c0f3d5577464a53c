//! kcheck: kernel-resident test registry and assertion reporting.
//!
//! Loadable units register named test functions into named test sets
//! through a [`Handle`]; the handle is the unit of cleanup when the unit
//! goes away. An execution driver runs registered tests and streams their
//! results to a controlling client as compact attribute records, batching
//! passing checks into a single count.
//!
//! # Modules
//!
//! - `registry`: the name to test set map, lookups and checked shutdown
//! - `handle`: registration scopes and scoped cleanup
//! - `report`: per-invocation assertion batching and check macros
//! - `runner`: runs a test or a whole set into a result buffer
//! - `wire`: the attribute stream format and client-side decoding
//! - `config`: limits and the runtime debug mask
//!
//! # Example
//!
//! ```
//! use kcheck::{kc_check, runner, MessageBuffer, RegisterOptions, Registry, TestDescriptor};
//!
//! let registry = Registry::new();
//! let mut handle = registry.handle();
//! let _ = handle.register_test(
//!     TestDescriptor::new("net", "checksum", file!(), |ctx| {
//!         kc_check!(ctx, 1 + 1 == 2);
//!     }),
//!     RegisterOptions::default(),
//! );
//!
//! let mut buf = MessageBuffer::new();
//! let summary = runner::run_test(&registry, "net", "checksum", 0, &mut buf).unwrap();
//! assert!(summary.succeeded());
//!
//! handle.cleanup();
//! registry.shutdown().unwrap();
//! ```

#![no_std]
extern crate alloc;

pub mod case;
pub mod config;
pub mod error;
pub mod handle;
pub mod registry;
pub mod report;
pub mod runner;
pub mod wire;

pub use case::{CaseInfo, FunctionHook, HandleId, HookId, RegisterOptions, TestDescriptor, TestFn, TestInfo};
pub use config::DebugMask;
pub use error::{BufferError, DecodeError, RegistryError};
pub use handle::Handle;
pub use registry::{global, Registry};
pub use report::{Reporter, SourceLocation, TestContext};
pub use runner::RunSummary;
pub use wire::{AttrKind, MessageBuffer, Record};

#[doc(hidden)]
pub use log as __log;
