//! Execution context handed to a routine during one poll
//!
//! The context is ephemeral: it is built by [`Scheduler::poll`], lives for
//! exactly one `Routine::poll` invocation, and is consumed when that call
//! returns. Through it a routine can replace itself, cancel itself, or
//! migrate to another scheduler.
//!
//! The context tracks which scheduler currently holds the routine's
//! capacity reservation. Migration moves that single reservation unit from
//! the old scheduler to the new one; cancellation releases it. A routine
//! therefore occupies exactly one reservation slot for its whole lifetime,
//! no matter how many schedulers it transits.

use std::any::Any;
use std::sync::Arc;

use crate::routine::Routine;
use crate::scheduler::Scheduler;

/// Per-poll execution context
///
/// Valid only during the enclosing poll call.
pub struct ExecContext<'a> {
    /// Scheduler holding this routine's reservation; none once cancelled
    scheduler: Option<Arc<Scheduler>>,

    /// Routine staged to be enqueued instead of the running one
    replacement: Option<Box<dyn Routine>>,

    /// Caller-supplied poll argument
    user_arg: &'a mut dyn Any,
}

impl<'a> ExecContext<'a> {
    pub(crate) fn new(scheduler: Arc<Scheduler>, user_arg: &'a mut dyn Any) -> Self {
        ExecContext {
            scheduler: Some(scheduler),
            replacement: None,
            user_arg,
        }
    }

    /// Scheduler that will receive the routine when poll returns, if any.
    pub fn scheduler(&self) -> Option<&Arc<Scheduler>> {
        self.scheduler.as_ref()
    }

    /// Check whether the routine cancelled itself.
    pub fn is_cancelled(&self) -> bool {
        self.scheduler.is_none()
    }

    /// Routine staged by [`set_routine`](ExecContext::set_routine), if any.
    ///
    /// The running routine itself is `self` inside `poll`; this accessor
    /// only sees a staged replacement.
    pub fn pending_routine(&self) -> Option<&dyn Routine> {
        self.replacement.as_deref()
    }

    /// Stage `routine` to be enqueued instead of the running routine.
    ///
    /// Returns the previously staged replacement, if any. The running
    /// routine is dropped when poll returns with a replacement staged —
    /// state to keep must be moved into the replacement.
    pub fn set_routine(&mut self, routine: Box<dyn Routine>) -> Option<Box<dyn Routine>> {
        self.replacement.replace(routine)
    }

    /// Cancel the routine.
    ///
    /// Releases the reservation on the current scheduler and clears the
    /// context's scheduler reference. The routine is not re-enqueued;
    /// ownership returns to the poll caller via `Polled::Cancelled`.
    pub fn cancel(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.routine_retired();
        }
    }

    /// Migrate the routine to `new_scheduler`.
    ///
    /// Fails if `new_scheduler` is the current scheduler or has no
    /// reservable capacity; the routine then stays where it is, unmodified.
    /// On success the old scheduler's reservation is released, the new
    /// scheduler's is held, and the routine is pushed there once poll
    /// returns.
    pub fn try_switch_scheduler(&mut self, new_scheduler: &Arc<Scheduler>) -> bool {
        if let Some(current) = &self.scheduler {
            if Arc::ptr_eq(current, new_scheduler) {
                return false;
            }
        }
        if !new_scheduler.try_reserve_routine() {
            return false;
        }
        if let Some(old) = self.scheduler.take() {
            old.routine_retired();
        }
        self.scheduler = Some(Arc::clone(new_scheduler));
        true
    }

    /// Caller-supplied poll argument.
    pub fn user_arg(&mut self) -> &mut dyn Any {
        &mut *self.user_arg
    }

    /// Caller-supplied poll argument downcast to a concrete type.
    pub fn user_arg_as<A: Any>(&mut self) -> Option<&mut A> {
        self.user_arg.downcast_mut()
    }

    /// Tear the context down into the target scheduler and the staged
    /// replacement.
    pub(crate) fn finish(self) -> (Option<Arc<Scheduler>>, Option<Box<dyn Routine>>) {
        (self.scheduler, self.replacement)
    }
}
