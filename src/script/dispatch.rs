//! The `_call`, `_get` and `_set` members of automation handles.
//!
//! Scripts call them with the handle as the first argument
//! (`obj:_call("Method", ...)`). Failures come back as `(nil, message)`.

use crate::error::{Error, Result};
use crate::script::capsule::HandleCapsule;
use crate::script::value::{Function, HostValue, Value, failure, to_host, to_script};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verb {
    Call,
    Get,
    Set,
}

impl Verb {
    pub(crate) fn from_member(name: &str) -> Option<Verb> {
        match name {
            "_call" => Some(Verb::Call),
            "_get" => Some(Verb::Get),
            "_set" => Some(Verb::Set),
            _ => None,
        }
    }

    fn member(self) -> &'static str {
        match self {
            Verb::Call => "_call",
            Verb::Get => "_get",
            Verb::Set => "_set",
        }
    }
}

pub(crate) fn verb_function(verb: Verb) -> Function {
    Function::new(verb.member(), move |_rt, args| {
        Ok(match dispatch(verb, args) {
            Ok(value) => vec![value],
            Err(err) => failure(err),
        })
    })
}

fn receiver(verb: Verb, value: Option<Value>) -> Result<Arc<HandleCapsule>> {
    match value {
        Some(Value::Handle(handle)) => handle
            .into_capsule()
            .ok_or(Error::NullReceiver(verb.member())),
        _ => Err(Error::NullReceiver(verb.member())),
    }
}

/// Route one verb onto the receiver's automation object.
pub(crate) fn dispatch(verb: Verb, args: Vec<Value>) -> Result<Value> {
    let mut args = args.into_iter();
    let capsule = receiver(verb, args.next())?;
    let name = args.next().unwrap_or_default().to_text()?;
    let mut params: Vec<HostValue> = args.map(|v| to_host(&v)).collect();

    match verb {
        Verb::Call => capsule
            .with_object(verb.member(), |object| object.invoke(&name, &params))
            .map(to_script),
        Verb::Get => capsule
            .with_object(verb.member(), |object| object.get(&name, &params))
            .map(to_script),
        Verb::Set => {
            let value = params.pop().unwrap_or_default();
            capsule.with_object(verb.member(), |object| object.set(&name, &params, value))?;
            Ok(Value::Bool(true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::capsule::tests::MapObject;
    use crate::script::value::Handle;

    fn handle() -> (Arc<HandleCapsule>, Value) {
        let capsule = HandleCapsule::new(Box::new(MapObject::default()));
        let handle: Handle = capsule.clone();
        (capsule, Value::Handle(handle))
    }

    #[test]
    fn set_then_get() {
        let (_capsule, obj) = handle();
        let ok = dispatch(Verb::Set, vec![obj.clone(), "Visible".into(), true.into()]).unwrap();
        assert_eq!(ok, Value::Bool(true));
        let got = dispatch(Verb::Get, vec![obj, "Visible".into()]).unwrap();
        assert_eq!(got, Value::Bool(true));
    }

    #[test]
    fn call_passes_arguments_and_wraps_objects() {
        let (_capsule, obj) = handle();
        let echoed = dispatch(Verb::Call, vec![obj.clone(), "Echo".into(), 5.into()]).unwrap();
        assert_eq!(echoed, Value::Integer(5));

        let child = dispatch(Verb::Call, vec![obj.clone(), "Child".into()]).unwrap();
        let Value::Handle(child) = child else {
            panic!("expected a handle");
        };
        assert!(child.into_capsule().is_some());
    }

    #[test]
    fn null_receiver_is_a_script_failure() {
        let f = verb_function(Verb::Call);
        let rt = crate::script::testing::test_runtime();
        let out = f.call(&rt, vec![Value::Nil, "Echo".into()]).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_nil());
        assert_eq!(out[1], Value::from("_call: the receiver is null"));

        let out = f.call(&rt, vec!["not a handle".into()]).unwrap();
        assert!(out[0].is_nil());
    }

    #[test]
    fn released_capsule_refuses_dispatch() {
        let (capsule, obj) = handle();
        capsule.release();
        let err = dispatch(Verb::Get, vec![obj, "Visible".into()]).unwrap_err();
        assert!(matches!(err, Error::ReleasedHandle("_get")));
    }

    #[test]
    fn provider_errors_are_returned() {
        let (_capsule, obj) = handle();
        let err = dispatch(Verb::Call, vec![obj, "Missing".into()]).unwrap_err();
        assert!(matches!(err, Error::Automation(_)));
    }
}
