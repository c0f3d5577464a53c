//! kcheck configuration constants and the runtime debug mask.
//!
//! Values here bound names, formatted messages and result buffers. The
//! debug mask is the only setting that can change at runtime.

use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

/// Maximum length of a group or test name in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Capacity of the assertion message format buffer, terminator included.
pub const MAX_PRINTF: usize = 4096;

/// Default capacity of an outgoing result buffer in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Listing protocol version reported by `Registry::describe`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Attribute alignment on the wire.
pub const NLA_ALIGNTO: usize = 4;

bitflags! {
    /// Diagnostic categories enabled for kcheck tracing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebugMask: u32 {
        /// General lifecycle messages.
        const INFO = 1 << 0;
        /// Assertion failures.
        const ERROR = 1 << 1;
        /// Group creation and success-count flushes.
        const DEBUG = 1 << 2;
        /// Per-test add/delete tracing.
        const LIST = 1 << 3;
    }
}

impl Default for DebugMask {
    fn default() -> Self {
        DebugMask::INFO | DebugMask::ERROR
    }
}

static DEBUG_MASK: AtomicU32 = AtomicU32::new(DebugMask::INFO.bits() | DebugMask::ERROR.bits());

/// Current debug mask.
pub fn debug_mask() -> DebugMask {
    DebugMask::from_bits_truncate(DEBUG_MASK.load(Ordering::Relaxed))
}

/// Replace the debug mask, returning the previous one.
pub fn set_debug_mask(mask: DebugMask) -> DebugMask {
    DebugMask::from_bits_truncate(DEBUG_MASK.swap(mask.bits(), Ordering::Relaxed))
}

/// Whether any category in `mask` is enabled.
#[inline]
pub fn debug_enabled(mask: DebugMask) -> bool {
    debug_mask().intersects(mask)
}

/// Emit a `log::debug!` line when the given mask category is enabled.
#[macro_export]
macro_rules! kc_trace {
    ($mask:expr, $($arg:tt)*) => {
        if $crate::config::debug_enabled($mask) {
            $crate::__log::debug!($($arg)*);
        }
    };
}
