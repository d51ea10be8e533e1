//! Bridge between the shell and an embedded scripting runtime.
//!
//! A [`Runtime`] pairs one [`ScriptEngine`] with the shell it serves. It
//! installs the `sh` and `share` globals, chains the script hooks in front of
//! the shell's own and keeps track of which execution context a script call
//! is running for.

mod alias;
mod capsule;
mod dispatch;
mod engine;
mod hook;
mod namespace;
mod share;
mod slot;
#[cfg(test)]
pub(crate) mod testing;
mod value;

pub use alias::AliasCommand;
pub use capsule::{AutomationObject, AutomationProvider, HandleCapsule};
pub use engine::ScriptEngine;
pub use hook::{HookRegistry, HookSlot};
pub use namespace::ShNamespace;
pub use share::{ShareNamespace, SharedTable};
pub use slot::{ContextSlot, SlotGuard};
pub use value::{
    Function, Handle, HostObject, HostTable, HostValue, Table, TableKey, Value, to_argv, to_host,
    to_host_slice, to_script,
};

use crate::context::ExecContext;
use crate::error::Result;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// State the bridge keeps outside the engine.
///
/// The shared table may be handed to several bridges; everything else belongs
/// to one runtime.
#[derive(Default)]
pub struct Bridge {
    pub shared: Arc<SharedTable>,
    pub hooks: HookRegistry,
    automation: Option<Arc<dyn AutomationProvider>>,
    silent: AtomicBool,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `shared` instead of a private table.
    pub fn with_shared(mut self, shared: Arc<SharedTable>) -> Self {
        self.shared = shared;
        self
    }

    pub fn with_automation(mut self, provider: Arc<dyn AutomationProvider>) -> Self {
        self.automation = Some(provider);
        self
    }

    pub fn automation(&self) -> Option<&Arc<dyn AutomationProvider>> {
        self.automation.as_ref()
    }

    /// `sh.silentmode`. Scripts set and read it; the shell itself never
    /// consults it.
    pub fn silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Relaxed);
    }

    /// Clear the shared table, the hook slots and the flags.
    pub fn reset(&self) {
        self.shared.reset();
        self.hooks.reset();
        self.set_silent(false);
    }
}

/// One scripting runtime attached to a shell.
pub struct Runtime {
    engine: Box<dyn ScriptEngine>,
    slot: ContextSlot,
    bridge: Bridge,
    root: ExecContext,
}

impl Runtime {
    /// Attach `engine` to the shell of `root`.
    ///
    /// `root` is the context host functions fall back to when no command is
    /// running; the runtime keeps its own copy of it.
    pub fn new(engine: Box<dyn ScriptEngine>, root: &ExecContext, bridge: Bridge) -> Rc<Self> {
        let runtime = Rc::new_cyclic(|weak| {
            let mut root = root.clone();
            root.set_runtime_weak(weak.clone());
            Runtime {
                engine,
                slot: ContextSlot::default(),
                bridge,
                root,
            }
        });

        runtime.bridge.hooks.install(runtime.root.shell());
        runtime
            .engine
            .set_global("sh", Value::Handle(Arc::new(ShNamespace::new())));
        runtime.engine.set_global(
            "share",
            Value::Handle(Arc::new(ShareNamespace::new(Arc::clone(
                &runtime.bridge.shared,
            )))),
        );
        debug!("scripting runtime attached");
        runtime
    }

    pub fn engine(&self) -> &dyn ScriptEngine {
        self.engine.as_ref()
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn slot(&self) -> &ContextSlot {
        &self.slot
    }

    pub fn root(&self) -> &ExecContext {
        &self.root
    }

    /// The context of the command being served, or the root context.
    pub fn current_context(&self) -> ExecContext {
        self.slot.current().unwrap_or_else(|| self.root.clone())
    }

    pub fn load(&self, name: &str, chunk: &[u8]) -> Result<Function> {
        self.engine.load(name, chunk)
    }

    pub fn dump(&self, function: &Function) -> Result<Vec<u8>> {
        self.engine.dump(function)
    }

    /// Call `function` and keep exactly `nresults` results, padding with nil.
    pub fn call(&self, function: &Function, args: Vec<Value>, nresults: usize) -> Result<Vec<Value>> {
        let mut results = function.call(self, args)?;
        results.resize(nresults, Value::Nil);
        Ok(results)
    }

    /// [`Runtime::call`] with `ctx` bound as the current context.
    pub fn call_in(
        &self,
        ctx: &ExecContext,
        function: &Function,
        args: Vec<Value>,
        nresults: usize,
    ) -> Result<Vec<Value>> {
        let _bound = self.slot.bind(ctx);
        self.call(function, args, nresults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::testing::{TestShell, recording_shell, test_runtime};

    #[test]
    fn globals_are_installed() {
        let rt = test_runtime();
        assert!(matches!(rt.engine().global("sh"), Value::Handle(_)));
        assert!(matches!(rt.engine().global("share"), Value::Handle(_)));
    }

    #[test]
    fn call_truncates_and_pads_results() {
        let rt = test_runtime();
        let many = Function::new("many", |_, _| Ok(vec![1.into(), 2.into(), 3.into()]));
        assert_eq!(rt.call(&many, Vec::new(), 1).unwrap(), vec![Value::Integer(1)]);
        assert_eq!(
            rt.call(&many, Vec::new(), 4).unwrap(),
            vec![1.into(), 2.into(), 3.into(), Value::Nil]
        );
    }

    #[test]
    fn call_in_binds_the_context() {
        let TestShell { mut ctx, runtime, .. } = recording_shell(0);
        ctx.set_args(vec!["bound".into()]);
        let inspect = Function::new("inspect", |rt, _| {
            Ok(vec![rt.current_context().args.first().cloned().into()])
        });

        let inside = runtime.call_in(&ctx, &inspect, Vec::new(), 1).unwrap();
        assert_eq!(inside, vec![Value::from("bound")]);
        let outside = runtime.call(&inspect, Vec::new(), 1).unwrap();
        assert_eq!(outside, vec![Value::Nil]);
        assert!(!runtime.slot().is_bound());
    }

    #[test]
    fn root_context_points_back_at_runtime() {
        let rt = test_runtime();
        let from_root = rt.root().runtime().unwrap();
        assert!(Rc::ptr_eq(&from_root, &rt));
    }

    #[test]
    fn bridge_reset_clears_state() {
        let bridge = Bridge::new();
        bridge.shared.publish("k", &Value::Integer(1));
        bridge.hooks.args_filter().set(Value::from("x"));
        bridge.set_silent(true);

        bridge.reset();
        assert_eq!(bridge.shared.get("k"), None);
        assert!(bridge.hooks.args_filter().get().is_nil());
        assert!(!bridge.silent());
    }
}
