//! Resumable units of work
//!
//! A routine is a poll-driven unit of work transported by the scheduler as
//! a boxed trait object. The scheduler only moves the box; it never clones,
//! copies, or inspects routine state. The ring hands a routine to exactly
//! one poller at a time, so `poll` is never invoked concurrently on the
//! same routine.

use crate::exec::ExecContext;

/// A resumable unit of work
///
/// `poll` runs the routine for one step. Unless the routine cancels itself
/// or stages a replacement through the [`ExecContext`], the same routine is
/// re-enqueued on whichever scheduler the context references when `poll`
/// returns.
pub trait Routine: Send {
    fn poll(&mut self, cx: &mut ExecContext<'_>);
}

/// Closure-backed routine
///
/// Created by [`routine_fn`].
pub struct FnRoutine<F> {
    f: F,
}

impl<F> Routine for FnRoutine<F>
where
    F: FnMut(&mut ExecContext<'_>) + Send,
{
    fn poll(&mut self, cx: &mut ExecContext<'_>) {
        (self.f)(cx)
    }
}

/// Wrap a closure as a boxed routine.
///
/// ```ignore
/// let routine = routine_fn(|cx| {
///     // one step of work, then stop
///     cx.cancel();
/// });
/// scheduler.try_schedule(routine).unwrap();
/// ```
pub fn routine_fn<F>(f: F) -> Box<dyn Routine>
where
    F: FnMut(&mut ExecContext<'_>) + Send + 'static,
{
    Box::new(FnRoutine { f })
}
