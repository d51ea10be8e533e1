//! Script values and their conversion to and from host values.

use crate::error::{Error, Result};
use crate::script::Runtime;
use crate::script::capsule::HandleCapsule;
use crate::script::share::ShareBinding;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A dynamic value as the scripting runtime sees it.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    /// Numbers are 64-bit integers; there is no float representation.
    Integer(i64),
    String(String),
    Bytes(Vec<u8>),
    Table(Table),
    Function(Function),
    Handle(Handle),
}

/// A host object exposed to scripts; member access is routed to it.
pub type Handle = Arc<dyn HostObject>;

/// Host-side object reachable from scripts through member reads and writes.
pub trait HostObject: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// `object.key`
    fn index(&self, rt: &Runtime, key: &str) -> Result<Value>;

    /// `object.key = value`
    fn new_index(&self, _rt: &Runtime, key: &str, _value: Value) -> Result<()> {
        Err(Error::Script(format!(
            "{key}: {} members are read-only",
            self.type_name()
        )))
    }

    /// The capsule behind this handle, if it wraps an automation object.
    fn into_capsule(self: Arc<Self>) -> Option<Arc<HandleCapsule>> {
        None
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Handle(h) => h.type_name(),
        }
    }

    /// Everything except `nil` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Read the value as text.
    ///
    /// Strings and integers convert; bytes convert when they are valid UTF-8.
    pub fn to_text(&self) -> Result<String> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|e| Error::Decode(format!("bytes ({e})"))),
            other => Err(Error::Decode(other.type_name().to_string())),
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Copy the value, recursing into tables.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Table(t) => Value::Table(t.deep_copy()),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "bytes{b:?}"),
            Value::Table(t) => write!(f, "{t:?}"),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::Handle(h) => write!(f, "{}: {:p}", h.type_name(), Arc::as_ptr(h)),
        }
    }
}

/// Scalars compare by value, tables, functions and handles by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Handle(a), Value::Handle(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Value::Handle(h)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

/// Key of a table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKey {
    Index(i64),
    Name(String),
}

impl From<i64> for TableKey {
    fn from(i: i64) -> Self {
        TableKey::Index(i)
    }
}

impl From<i32> for TableKey {
    fn from(i: i32) -> Self {
        TableKey::Index(i64::from(i))
    }
}

impl From<&str> for TableKey {
    fn from(s: &str) -> Self {
        TableKey::Name(s.to_string())
    }
}

impl From<String> for TableKey {
    fn from(s: String) -> Self {
        TableKey::Name(s)
    }
}

#[derive(Default)]
struct TableData {
    array: BTreeMap<i64, Value>,
    dict: BTreeMap<String, Value>,
    binding: Option<ShareBinding>,
}

/// A script table: integer-keyed and string-keyed entries under one identity.
///
/// Cloning shares the table. Storing `nil` removes the entry.
#[derive(Clone, Default)]
pub struct Table(Arc<Mutex<TableData>>);

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence with its first element at index 1.
    pub fn from_seq<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let table = Self::new();
        {
            let mut data = table.lock();
            for (i, item) in (1..).zip(items) {
                let item: Value = item.into();
                if !item.is_nil() {
                    data.array.insert(i, item);
                }
            }
        }
        table
    }

    /// An argument vector: `args[0]` at index 0, the arguments at 1..N.
    pub fn from_args(args: &[String]) -> Self {
        let table = Self::new();
        {
            let mut data = table.lock();
            for (i, arg) in (0..).zip(args) {
                data.array.insert(i, Value::String(arg.clone()));
            }
        }
        table
    }

    fn lock(&self) -> MutexGuard<'_, TableData> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: impl Into<TableKey>) -> Value {
        let data = self.lock();
        match key.into() {
            TableKey::Index(i) => data.array.get(&i),
            TableKey::Name(s) => data.dict.get(&s),
        }
        .cloned()
        .unwrap_or_default()
    }

    /// Store without offering the write to a shared entry.
    pub fn raw_set(&self, key: impl Into<TableKey>, value: impl Into<Value>) {
        let value = value.into();
        let mut data = self.lock();
        match (key.into(), value) {
            (TableKey::Index(i), Value::Nil) => {
                data.array.remove(&i);
            }
            (TableKey::Name(s), Value::Nil) => {
                data.dict.remove(&s);
            }
            (TableKey::Index(i), v) => {
                data.array.insert(i, v);
            }
            (TableKey::Name(s), v) => {
                data.dict.insert(s, v);
            }
        }
    }

    /// Store a member. When the table is a view of a shared entry the write is
    /// also offered to the shared table.
    pub fn set(&self, key: impl Into<TableKey>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        self.raw_set(key.clone(), value.clone());
        let binding = self.lock().binding.clone();
        if let Some(binding) = binding {
            binding.commit(&key, &value);
        }
    }

    /// Length of the sequence part: the last index before the first gap from 1.
    pub fn len(&self) -> usize {
        let data = self.lock();
        (1..).take_while(|i| data.array.contains_key(i)).count()
    }

    pub fn is_empty(&self) -> bool {
        let data = self.lock();
        data.array.is_empty() && data.dict.is_empty()
    }

    /// The values at 1..N, stopping at the first gap.
    pub fn sequence(&self) -> Vec<Value> {
        let data = self.lock();
        (1..).map_while(|i| data.array.get(&i).cloned()).collect()
    }

    /// The string-keyed entries, in key order.
    pub fn fields(&self) -> Vec<(String, Value)> {
        let data = self.lock();
        data.dict.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn ptr_eq(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Copy the table and every table reachable from it. Shared and cyclic
    /// references keep their shape in the copy. The copy is not bound to any
    /// shared entry.
    pub fn deep_copy(&self) -> Table {
        self.deep_copy_with(&mut HashMap::new())
    }

    fn deep_copy_with(&self, seen: &mut HashMap<*const Mutex<TableData>, Table>) -> Table {
        if let Some(copy) = seen.get(&Arc::as_ptr(&self.0)) {
            return copy.clone();
        }
        let copy = Table::new();
        seen.insert(Arc::as_ptr(&self.0), copy.clone());

        let (array, dict) = {
            let data = self.lock();
            (data.array.clone(), data.dict.clone())
        };
        let array: BTreeMap<_, _> = array
            .into_iter()
            .map(|(k, v)| (k, copy_value(v, seen)))
            .collect();
        let dict: BTreeMap<_, _> = dict
            .into_iter()
            .map(|(k, v)| (k, copy_value(v, seen)))
            .collect();
        {
            let mut data = copy.lock();
            data.array = array;
            data.dict = dict;
        }
        copy
    }

    pub(crate) fn bind(&self, binding: ShareBinding) {
        self.lock().binding = Some(binding);
    }
}

fn copy_value(value: Value, seen: &mut HashMap<*const Mutex<TableData>, Table>) -> Value {
    match value {
        Value::Table(t) => Value::Table(t.deep_copy_with(seen)),
        other => other,
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: {:p}", Arc::as_ptr(&self.0))
    }
}

type NativeFn = dyn Fn(&Runtime, Vec<Value>) -> Result<Vec<Value>> + Send + Sync;

/// A callable value: a loaded script chunk or a host function.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    body: Arc<NativeFn>,
}

impl Function {
    pub fn new<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(&Runtime, Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call with every result the function produces. Use [`Runtime::call`]
    /// to get a fixed number of results.
    pub fn call(&self, rt: &Runtime, args: Vec<Value>) -> Result<Vec<Value>> {
        (self.body)(rt, args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.body), Arc::as_ptr(&other.body))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {}", self.name)
    }
}

/// A value on the host side of the bridge.
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    /// Absence: script `nil`, or anything with no host form.
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Table(HostTable),
    Object(Arc<HandleCapsule>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostTable {
    /// The sequence part, from index 1 up to the first gap.
    pub items: Vec<HostValue>,
    pub fields: BTreeMap<String, HostValue>,
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Empty, HostValue::Empty) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => a == b,
            (HostValue::Table(a), HostValue::Table(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Convert a script value for the host.
///
/// Functions and handles other than automation capsules have no host form
/// and become [`HostValue::Empty`], as does a table that contains itself.
pub fn to_host(value: &Value) -> HostValue {
    to_host_inner(value, &mut HashSet::new())
}

fn to_host_inner(value: &Value, path: &mut HashSet<*const Mutex<TableData>>) -> HostValue {
    match value {
        Value::Nil | Value::Function(_) => HostValue::Empty,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Integer(i) => HostValue::Int(*i),
        Value::String(s) => HostValue::Str(s.clone()),
        Value::Bytes(b) => HostValue::Bytes(b.clone()),
        Value::Handle(h) => Arc::clone(h)
            .into_capsule()
            .map_or(HostValue::Empty, HostValue::Object),
        Value::Table(t) => {
            let id = Arc::as_ptr(&t.0);
            if !path.insert(id) {
                return HostValue::Empty;
            }
            let items = t
                .sequence()
                .iter()
                .map(|v| to_host_inner(v, path))
                .collect();
            let fields = t
                .fields()
                .into_iter()
                .map(|(k, v)| (k, to_host_inner(&v, path)))
                .collect();
            path.remove(&id);
            HostValue::Table(HostTable { items, fields })
        }
    }
}

/// Convert a host value for scripts. Automation objects become new handles.
pub fn to_script(value: HostValue) -> Value {
    match value {
        HostValue::Empty => Value::Nil,
        HostValue::Bool(b) => Value::Bool(b),
        HostValue::Int(i) => Value::Integer(i),
        HostValue::Str(s) => Value::String(s),
        HostValue::Bytes(b) => Value::Bytes(b),
        HostValue::Object(capsule) => Value::Handle(capsule),
        HostValue::Table(HostTable { items, fields }) => {
            let table = Table::from_seq(items.into_iter().map(to_script));
            for (k, v) in fields {
                table.raw_set(k, to_script(v));
            }
            Value::Table(table)
        }
    }
}

/// The sequence part of `table` as host values.
pub fn to_host_slice(table: &Table) -> Vec<HostValue> {
    table.sequence().iter().map(to_host).collect()
}

/// Read an argument vector back from a table.
///
/// A non-empty string at index 0 is the command name; the arguments follow
/// from index 1 up to the first gap.
pub fn to_argv(table: &Table) -> Result<Vec<String>> {
    let mut argv = Vec::new();
    if let Value::String(name) = table.get(0) {
        if !name.is_empty() {
            argv.push(name);
        }
    }
    for value in table.sequence() {
        argv.push(value.to_text()?);
    }
    Ok(argv)
}

/// The `(nil, message)` pair host functions return on failure.
pub(crate) fn failure(err: impl fmt::Display) -> Vec<Value> {
    vec![Value::Nil, Value::String(err.to_string())]
}
