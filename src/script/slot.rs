use crate::context::ExecContext;
use std::cell::RefCell;

/// The execution context a runtime is currently serving.
///
/// Binding returns a guard; dropping it puts the previous binding back, so
/// nested calls unwind correctly on every exit path.
#[derive(Default)]
pub struct ContextSlot {
    current: RefCell<Option<ExecContext>>,
}

impl ContextSlot {
    #[must_use = "the binding is undone when the guard is dropped"]
    pub fn bind(&self, ctx: &ExecContext) -> SlotGuard<'_> {
        let saved = self.current.replace(Some(ctx.clone()));
        SlotGuard { slot: self, saved }
    }

    pub fn current(&self) -> Option<ExecContext> {
        self.current.borrow().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.current.borrow().is_some()
    }
}

pub struct SlotGuard<'a> {
    slot: &'a ContextSlot,
    saved: Option<ExecContext>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.current.replace(self.saved.take());
    }
}
