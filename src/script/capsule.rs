//! Automation objects wrapped for scripts.

use crate::error::{Error, Result};
use crate::script::Runtime;
use crate::script::dispatch::{self, Verb};
use crate::script::value::{HostObject, HostValue, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// One external automation object, as the provider hands it out.
pub trait AutomationObject: Send {
    fn invoke(&mut self, name: &str, args: &[HostValue]) -> Result<HostValue>;

    fn get(&mut self, name: &str, keys: &[HostValue]) -> Result<HostValue>;

    fn set(&mut self, name: &str, keys: &[HostValue], value: HostValue) -> Result<()>;

    /// Give up the external reference. Called exactly once.
    fn release(&mut self);
}

/// Source of automation objects, e.g. a COM-style object broker.
pub trait AutomationProvider: Send + Sync {
    fn create_object(&self, name: &str) -> Result<Box<dyn AutomationObject>>;
}

/// Exclusive owner of one automation object.
///
/// The object is released once, either explicitly or when the last handle is
/// dropped. A released capsule refuses every dispatch with
/// [`Error::ReleasedHandle`].
pub struct HandleCapsule {
    object: Mutex<Option<Box<dyn AutomationObject>>>,
}

impl HandleCapsule {
    pub fn new(object: Box<dyn AutomationObject>) -> Arc<Self> {
        Arc::new(Self {
            object: Mutex::new(Some(object)),
        })
    }

    pub fn is_released(&self) -> bool {
        self.object
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Release the object. Returns false when it was already released.
    pub fn release(&self) -> bool {
        let taken = self
            .object
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(mut object) => {
                object.release();
                debug!("released automation object");
                true
            }
            None => false,
        }
    }

    /// Run `f` on the live object; `verb` names the failing operation.
    pub(crate) fn with_object<R>(
        &self,
        verb: &'static str,
        f: impl FnOnce(&mut Box<dyn AutomationObject>) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.object.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(object) => f(object),
            None => Err(Error::ReleasedHandle(verb)),
        }
    }
}

impl Drop for HandleCapsule {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for HandleCapsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCapsule")
            .field("released", &self.is_released())
            .finish()
    }
}

impl HostObject for HandleCapsule {
    fn type_name(&self) -> &'static str {
        "automation object"
    }

    /// Only the dispatch verbs are visible; every other member reads as nil.
    fn index(&self, _rt: &Runtime, key: &str) -> Result<Value> {
        Ok(match Verb::from_member(key) {
            Some(verb) => Value::Function(dispatch::verb_function(verb)),
            None => Value::Nil,
        })
    }

    fn into_capsule(self: Arc<Self>) -> Option<Arc<HandleCapsule>> {
        Some(self)
    }
}
