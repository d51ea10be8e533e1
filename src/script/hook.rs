//! Script-settable shell hooks.
//!
//! Each hook is a slot holding whatever the script stored in it. Installing
//! the registry on a shell wraps the shell's current hooks in adapters that
//! call the slot's function when there is one and otherwise fall back to the
//! hook they replaced.

use crate::context::ExecContext;
use crate::error::Error;
use crate::script::value::{Function, Table, Value, to_argv};
use crate::shell::{ArgsHook, NotFoundHook, Shell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// The value a script stored for one hook.
#[derive(Debug, Default)]
pub struct HookSlot {
    current: Mutex<Value>,
}

impl HookSlot {
    pub fn get(&self) -> Value {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store `value`, returning what was there.
    pub fn set(&self, value: Value) -> Value {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, value)
    }

    fn function(&self) -> Option<Function> {
        self.get().as_function().cloned()
    }
}

#[derive(Debug, Default)]
pub struct HookRegistry {
    args_filter: Arc<HookSlot>,
    command_not_found: Arc<HookSlot>,
    installed: AtomicBool,
}

impl HookRegistry {
    pub fn args_filter(&self) -> &Arc<HookSlot> {
        &self.args_filter
    }

    pub fn command_not_found(&self) -> &Arc<HookSlot> {
        &self.command_not_found
    }

    /// Chain the adapters in front of the shell's current hooks.
    ///
    /// Happens once; returns false when the adapters are already in place.
    pub fn install(&self, shell: &Shell) -> bool {
        if self.installed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let slot = Arc::clone(&self.args_filter);
        let previous = shell.args_filter();
        let adapter: ArgsHook = Rc::new(move |ctx: &ExecContext, args: Vec<String>| match filter_args(&slot, ctx, &args) {
            Some(replaced) => previous(ctx, replaced),
            None => previous(ctx, args),
        });
        shell.set_args_filter(adapter);

        let slot = Arc::clone(&self.command_not_found);
        let previous = shell.command_not_found();
        let adapter: NotFoundHook = Rc::new(move |ctx: &ExecContext, err: Error| {
            if handle_not_found(&slot, ctx) {
                Ok(())
            } else {
                previous(ctx, err)
            }
        });
        shell.set_command_not_found(adapter);
        true
    }

    /// Clear both slots. Installed adapters stay and fall through.
    pub fn reset(&self) {
        self.args_filter.set(Value::Nil);
        self.command_not_found.set(Value::Nil);
    }
}

/// Call the script's argument filter. `None` means it declined.
fn filter_args(slot: &HookSlot, ctx: &ExecContext, args: &[String]) -> Option<Vec<String>> {
    let function = slot.function()?;
    let Some(runtime) = ctx.runtime() else {
        debug!("no runtime for this context, skipping argsfilter");
        return None;
    };
    let argv = Value::Table(Table::from_args(args));
    let result = runtime
        .call_in(ctx, &function, vec![argv], 1)
        .and_then(|mut results| match results.pop() {
            Some(Value::Table(table)) => to_argv(&table).map(Some),
            _ => Ok(None),
        });
    match result {
        Ok(replaced) => replaced,
        Err(err) => {
            warn!(%err, "argsfilter failed");
            None
        }
    }
}

/// Call the script's not-found handler; true when it handled the command.
fn handle_not_found(slot: &HookSlot, ctx: &ExecContext) -> bool {
    let Some(function) = slot.function() else {
        return false;
    };
    let Some(runtime) = ctx.runtime() else {
        debug!("no runtime for this context, skipping on_command_not_found");
        return false;
    };
    let argv = Value::Table(Table::from_args(&ctx.args));
    match runtime.call_in(ctx, &function, vec![argv], 1) {
        Ok(results) => results.first().is_some_and(Value::is_truthy),
        Err(err) => {
            warn!(%err, "on_command_not_found failed");
            false
        }
    }
}
