//! Panic recovery boundary around the inner service future.
//!
//! # Responsibilities
//! - Catch panics raised while polling the inner future
//! - Capture a filtered call stack for them through a chained panic hook
//! - Tell the abort sentinel apart from ordinary panics
//!
//! # Design Decisions
//! - Outcomes are a tagged result (`Outcome`), re-raising is explicit
//!   (`Fault::resume`) and happens only after the record was written
//! - Stacks are captured only while a guarded future is being polled on the
//!   current thread; other panics in the process are left alone

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use crate::audit::SourceLocation;

/// Panic payload meaning "tear down this connection on purpose".
///
/// Raised with `std::panic::panic_any(AbortHandler)`. It is always re-raised
/// after the record is written and never gets a stack trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortHandler;

thread_local! {
    static ARMED: Cell<u32> = const { Cell::new(0) };
    static CAPTURED: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// What the hook saw for the last panic on this thread.
struct Captured {
    trace: Backtrace,
    location: Option<(String, u32)>,
}

/// Install the stack-capturing panic hook, chaining the current one.
///
/// Safe to call more than once; only the first call installs.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let abort = info.payload().is::<AbortHandler>();
            if !abort && ARMED.with(Cell::get) > 0 {
                let captured = Captured {
                    trace: Backtrace::force_capture(),
                    location: info.location().map(|l| (l.file().to_string(), l.line())),
                };
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(captured));
            }
            if !abort {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as polling a guarded future.
struct Armed;

impl Armed {
    fn enter() -> Self {
        ARMED.with(|a| a.set(a.get() + 1));
        Armed
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        ARMED.with(|a| a.set(a.get().saturating_sub(1)));
    }
}

/// A recovered panic.
pub struct Fault {
    payload: Box<dyn Any + Send>,
    message: String,
    stack: Option<Vec<String>>,
    location: Option<SourceLocation>,
}

impl std::fmt::Debug for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message)
            .field("abort", &self.is_abort())
            .finish()
    }
}

impl Fault {
    fn new(payload: Box<dyn Any + Send>, captured: Option<Captured>, depth: usize) -> Self {
        let message = panic_message(payload.as_ref());
        if payload.is::<AbortHandler>() {
            return Self {
                payload,
                message,
                stack: None,
                location: None,
            };
        }

        let (stack, location) = match captured {
            Some(Captured { trace, location }) => {
                (parse_frames(&trace.to_string(), depth), location)
            }
            None => (Vec::new(), None),
        };
        let location = location.map(|(file, line)| SourceLocation {
            file,
            line,
            function: stack.first().map(|frame| frame_function(frame).to_string()),
        });
        Self {
            payload,
            message,
            stack: Some(stack),
            location,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&[String]> {
        self.stack.as_deref()
    }

    pub fn is_abort(&self) -> bool {
        self.payload.is::<AbortHandler>()
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub(crate) fn take_stack(&mut self) -> Option<Vec<String>> {
        self.stack.take()
    }

    pub(crate) fn take_location(&mut self) -> Option<SourceLocation> {
        self.location.take()
    }

    /// Continue unwinding with the original payload.
    pub fn resume(self) -> ! {
        resume_unwind(self.payload)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if payload.is::<AbortHandler>() {
        "request handler aborted".to_string()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Result of polling a guarded future to completion.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Panicked(Fault),
}

/// Future wrapper that turns panics into [`Outcome::Panicked`].
pub struct PanicGuard<F> {
    inner: Pin<Box<F>>,
    depth: usize,
}

impl<F: Future> PanicGuard<F> {
    pub fn new(inner: F, depth: usize) -> Self {
        Self {
            inner: Box::pin(inner),
            depth,
        }
    }
}

impl<F: Future> Future for PanicGuard<F> {
    type Output = Outcome<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let polled = {
            let _armed = Armed::enter();
            catch_unwind(AssertUnwindSafe(|| this.inner.as_mut().poll(cx)))
        };

        match polled {
            Ok(Poll::Ready(output)) => Poll::Ready(Outcome::Completed(output)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => {
                let captured = CAPTURED.with(|slot| slot.borrow_mut().take());
                Poll::Ready(Outcome::Panicked(Fault::new(payload, captured, this.depth)))
            }
        }
    }
}

/// Frames that belong to the panic runtime or to this recovery machinery.
const RUNTIME_FRAMES: &[&str] = &[
    "std::panicking",
    "core::panicking",
    "std::panic::",
    "core::panic::",
    "std::backtrace",
    "std::sys::backtrace",
    "std::sys_common::backtrace",
    "std::rt::lang_start",
    "rust_begin_unwind",
    "__rust_",
    "__rustc::",
    "core::ops::function::",
    "alloc::boxed::Box<F,A> as core::ops::function",
    "request_audit::http::panic",
];

fn is_runtime_frame(function: &str) -> bool {
    let function = function.trim_start_matches('<');
    RUNTIME_FRAMES.iter().any(|p| function.starts_with(p))
}

/// Strip a trailing `::h0123456789abcdef` symbol hash.
fn strip_hash(function: &str) -> &str {
    match function.rsplit_once("::") {
        Some((head, tail))
            if tail.len() == 17
                && tail.starts_with('h')
                && tail[1..].bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            head
        }
        _ => function,
    }
}

/// Strip the trailing `:column` of a `file:line:column` location.
fn strip_column(location: &str) -> &str {
    match location.rsplit_once(':') {
        Some((head, col)) if head.contains(':') && col.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => location,
    }
}

/// Function part of a `function (file:line)` frame.
fn frame_function(frame: &str) -> &str {
    match frame.rsplit_once(" (") {
        Some((function, location)) if location.ends_with(')') => function,
        _ => frame,
    }
}

/// Parse the `Display` rendering of a backtrace into at most `depth`
/// application frames formatted as `function (file:line)`.
pub fn parse_frames(text: &str, depth: usize) -> Vec<String> {
    let mut frames: Vec<(&str, Option<&str>)> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                if last.1.is_none() {
                    last.1 = Some(strip_column(location.trim()));
                }
            }
            continue;
        }
        if let Some((index, function)) = line.split_once(": ") {
            if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
                frames.push((strip_hash(function.trim()), None));
            }
        }
    }

    frames
        .into_iter()
        .filter(|(function, _)| !is_runtime_frame(function))
        .take(depth)
        .map(|(function, location)| match location {
            Some(location) => format!("{function} ({location})"),
            None => function.to_string(),
        })
        .collect()
}
