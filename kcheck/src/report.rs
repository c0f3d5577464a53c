//! Batched assertion reporting.
//!
//! Passing checks are only counted. The count goes out as one `STAT`
//! record when a check fails or when the reporter is flushed, so a
//! data-driven test with thousands of passing checks costs one attribute.
//! Every failure is written in full.
//!
//! Each test invocation gets its own [`Reporter`], so concurrent runs never
//! share a counter or a buffer.

use alloc::string::String;
use core::fmt::{self, Write};
use core::panic::Location;

use crate::case::FunctionHook;
use crate::config::{debug_enabled, DebugMask, MAX_PRINTF};
use crate::error::BufferError;
use crate::kc_trace;
use crate::wire::{attr_size, AttrKind, MessageBuffer};

/// Where a check was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    /// Source file.
    pub file: &'a str,
    /// Source line.
    pub line: u32,
}

impl<'a> SourceLocation<'a> {
    /// Location at `file:line`.
    pub const fn new(file: &'a str, line: u32) -> Self {
        Self { file, line }
    }
}

impl SourceLocation<'static> {
    /// Location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for SourceLocation<'static> {
    fn from(loc: &'static Location<'static>) -> Self {
        Self::new(loc.file(), loc.line())
    }
}

/// Writes at most `limit` bytes, cutting on a char boundary.
struct BoundedWriter {
    out: String,
    limit: usize,
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.out.len();
        if s.len() <= room {
            self.out.push_str(s);
            return Ok(());
        }
        let mut end = room;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.out.push_str(&s[..end]);
        self.limit = self.out.len();
        Err(fmt::Error)
    }
}

/// Format `args` into at most `MAX_PRINTF - 1` bytes; the terminator is
/// added on the wire. Returns `None` if the buffer cannot be allocated.
pub fn format_bounded(args: fmt::Arguments<'_>) -> Option<String> {
    let limit = MAX_PRINTF - 1;
    let mut out = String::new();
    out.try_reserve_exact(limit).ok()?;
    let mut writer = BoundedWriter { out, limit };
    // Err only signals truncation.
    let _ = writer.write_fmt(args);
    Some(writer.out)
}

/// Per-invocation assertion state bound to one outgoing buffer.
pub struct Reporter<'b> {
    buf: &'b mut MessageBuffer,
    pending: u32,
    passed: u32,
    failed: u32,
    dropped: u32,
}

impl<'b> Reporter<'b> {
    /// Start reporting into `buf`.
    pub fn new(buf: &'b mut MessageBuffer) -> Self {
        Self {
            buf,
            pending: 0,
            passed: 0,
            failed: 0,
            dropped: 0,
        }
    }

    /// Record the outcome of one check and return it unchanged.
    ///
    /// Non-zero is success and is only counted. Zero flushes pending
    /// successes, then writes a failure record with `location` and the
    /// formatted `args`.
    pub fn record(&mut self, outcome: u32, location: SourceLocation<'_>, args: fmt::Arguments<'_>) -> u32 {
        if outcome != 0 {
            self.pending = self.pending.saturating_add(1);
            self.passed = self.passed.saturating_add(1);
            return outcome;
        }

        self.flush();
        self.failed = self.failed.saturating_add(1);

        let message = format_bounded(args).unwrap_or_else(|| {
            log::warn!("kcheck: no memory for failure message at {}:{}", location.file, location.line);
            String::new()
        });

        if debug_enabled(DebugMask::ERROR) {
            log::error!(
                "kcheck: file {} line {}: result {} ({})",
                location.file,
                location.line,
                outcome,
                message
            );
        }

        if let Err(err) = self.put_failure(outcome, location, &message) {
            self.dropped = self.dropped.saturating_add(1);
            log::warn!("kcheck: failure record dropped: {}", err);
        }
        outcome
    }

    /// Boolean form of [`record`](Self::record).
    pub fn check(&mut self, cond: bool, location: SourceLocation<'_>, args: fmt::Arguments<'_>) -> bool {
        self.record(u32::from(cond), location, args) != 0
    }

    /// Write one failure record; on error the buffer is left as it was.
    fn put_failure(&mut self, outcome: u32, location: SourceLocation<'_>, message: &str) -> Result<(), BufferError> {
        let needed = attr_size(4)
            + attr_size(location.file.len() + 1)
            + attr_size(4)
            + attr_size(message.len() + 1);
        let available = self.buf.remaining();
        if needed > available {
            return Err(BufferError::Full { needed, available });
        }

        let start = self.buf.len();
        let result = self
            .buf
            .put_u32(AttrKind::Stat, outcome)
            .and_then(|()| self.buf.put_string(AttrKind::File, location.file))
            .and_then(|()| self.buf.put_u32(AttrKind::Num, location.line))
            .and_then(|()| self.buf.put_string(AttrKind::Str, message));
        if result.is_err() {
            self.buf.truncate(start);
        }
        result
    }

    /// Write the pending success count, if any, and reset it.
    pub fn flush(&mut self) {
        if self.pending == 0 {
            return;
        }
        kc_trace!(DebugMask::DEBUG, "kcheck: update: {} asserts", self.pending);
        if let Err(err) = self.buf.put_u32(AttrKind::Stat, self.pending) {
            self.dropped = self.dropped.saturating_add(1);
            log::warn!("kcheck: success count {} dropped: {}", self.pending, err);
        }
        self.pending = 0;
    }

    /// Successes not yet written.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Checks that passed so far.
    pub fn passed(&self) -> u32 {
        self.passed
    }

    /// Checks that failed so far.
    pub fn failed(&self) -> u32 {
        self.failed
    }

    /// Records that did not fit in the buffer.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

/// What a running test body sees.
pub struct TestContext<'a> {
    pub(crate) hook: &'a FunctionHook,
    pub(crate) iteration: u32,
    pub(crate) value: u32,
    pub(crate) reporter: Reporter<'a>,
}

impl<'a> TestContext<'a> {
    /// Test set name.
    pub fn group(&self) -> &str {
        self.hook.group()
    }

    /// Test name.
    pub fn test(&self) -> &str {
        self.hook.name()
    }

    /// Current value from the registered range.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Value supplied by whoever requested the run.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// The reporter for this invocation.
    pub fn reporter(&mut self) -> &mut Reporter<'a> {
        &mut self.reporter
    }

    /// See [`Reporter::record`].
    pub fn record(&mut self, outcome: u32, location: SourceLocation<'_>, args: fmt::Arguments<'_>) -> u32 {
        self.reporter.record(outcome, location, args)
    }

    /// See [`Reporter::check`].
    pub fn check(&mut self, cond: bool, location: SourceLocation<'_>, args: fmt::Arguments<'_>) -> bool {
        self.reporter.check(cond, location, args)
    }

    /// Check `cond` at the caller's location.
    #[track_caller]
    pub fn check_here(&mut self, cond: bool) -> bool {
        self.reporter
            .check(cond, SourceLocation::caller(), format_args!("check failed"))
    }
}

/// Check a condition through a [`TestContext`] or [`Reporter`].
///
/// Evaluates to the condition, so it can guard the rest of a test body.
/// Without a message the condition's source text is reported.
#[macro_export]
macro_rules! kc_check {
    ($ctx:expr, $cond:expr $(,)?) => {
        $ctx.check(
            $cond,
            $crate::report::SourceLocation::new(file!(), line!()),
            format_args!("{}", stringify!($cond)),
        )
    };
    ($ctx:expr, $cond:expr, $($arg:tt)+) => {
        $ctx.check(
            $cond,
            $crate::report::SourceLocation::new(file!(), line!()),
            format_args!($($arg)+),
        )
    };
}

/// Check two values for equality through a [`TestContext`] or [`Reporter`].
#[macro_export]
macro_rules! kc_check_eq {
    ($ctx:expr, $left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                $ctx.check(
                    *left == *right,
                    $crate::report::SourceLocation::new(file!(), line!()),
                    format_args!(
                        "{} == {} failed: {:?} != {:?}",
                        stringify!($left),
                        stringify!($right),
                        left,
                        right
                    ),
                )
            }
        }
    };
}
