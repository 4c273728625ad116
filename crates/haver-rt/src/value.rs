//! The universal runtime value.
//!
//! Every datum a compiled program touches is a [`Value`]. Scalars (nil,
//! bool, int, float) are stored inline; heap values carry a shared
//! reference so that copying a `Value` aliases the same list, dict, or
//! byte buffer, exactly as the language's reference semantics require.
//!
//! ## Design
//!
//! Heap payloads use `Arc` plus a `parking_lot::Mutex` rather than `Rc`
//! because values cross thread boundaries (thread arguments, channel
//! payloads, join results). The locks make each individual operation
//! memory-safe; they do not make a sequence of operations atomic, so
//! concurrent mutation of a shared list from several threads still needs
//! a script-level mutex.
//!
//! Locks on collection payloads are never held while recursing into
//! element values: operations that walk elements take a snapshot first.
//! That keeps self-referential structures from deadlocking on re-entry.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::panic::type_error;

/// Discriminant of a [`Value`], with the numbering used by generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Str = 4,
    List = 5,
    Dict = 6,
    Function = 7,
    Class = 8,
    Instance = 9,
    Range = 10,
    Set = 11,
    Closure = 12,
    Bytes = 13,
}

impl Tag {
    /// Canonical lowercase type name, as returned by `type_of`.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Nil => "naething",
            Tag::Bool => "bool",
            Tag::Int => "integer",
            Tag::Float => "float",
            Tag::Str => "string",
            Tag::List => "list",
            Tag::Dict => "dict",
            Tag::Function | Tag::Closure => "function",
            Tag::Class => "class",
            Tag::Instance => "instance",
            Tag::Range => "range",
            Tag::Set => "creel",
            Tag::Bytes => "bytes",
        }
    }
}

/// Entry point of a compiled function. Arguments arrive as a slice.
pub type NativeFn = fn(&[Value]) -> Value;

/// A compiled function value.
#[derive(Debug)]
pub struct Function {
    name: Arc<str>,
    entry: NativeFn,
}

impl Function {
    pub fn new(name: &str, entry: NativeFn) -> Self {
        Function {
            name: Arc::from(name),
            entry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.entry)(args)
    }
}

/// A function paired with the values it captured at creation time.
/// Captures are passed ahead of the explicit arguments.
#[derive(Debug)]
pub struct Closure {
    pub function: Arc<Function>,
    pub captures: Vec<Value>,
}

/// A user-defined class. Opaque to the runtime apart from its name.
#[derive(Debug)]
pub struct Class {
    pub name: Arc<str>,
}

/// An instance of a [`Class`]. Compared by identity.
///
/// Fields live in an ordinary dict value. Adding a field swaps in the
/// fresh dict that `collections::dict::set` returns.
#[derive(Debug)]
pub struct Instance {
    pub class: Arc<Class>,
    fields: Mutex<Value>,
}

impl Instance {
    pub fn get_field(&self, name: &Value) -> Value {
        let fields = self.fields.lock().clone();
        crate::collections::dict::get(&fields, name)
    }

    pub fn set_field(&self, name: &Value, value: &Value) {
        let fields = self.fields.lock().clone();
        let updated = crate::collections::dict::set(&fields, name, value);
        *self.fields.lock() = updated;
    }

    pub fn fields(&self) -> Value {
        self.fields.lock().clone()
    }
}

/// A half-open integer range `start..end` advancing by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

pub type ListRef = Arc<Mutex<Vec<Value>>>;
pub type DictRef = Arc<Mutex<Vec<(Value, Value)>>>;
pub type SetRef = Arc<Vec<Value>>;
pub type BytesRef = Arc<Mutex<Vec<u8>>>;

/// A tagged runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(ListRef),
    /// Flat entry buffer. Updating an existing key mutates it in place;
    /// inserting a new key produces a fresh buffer (see `collections::dict`).
    Dict(DictRef),
    Function(Arc<Function>),
    Class(Arc<Class>),
    Instance(Arc<Instance>),
    Range(Range),
    /// Immutable membership buffer; every insert or removal that changes
    /// membership builds a new one.
    Set(SetRef),
    Closure(Arc<Closure>),
    Bytes(BytesRef),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Bool(_) => Tag::Bool,
            Value::Int(_) => Tag::Int,
            Value::Float(_) => Tag::Float,
            Value::Str(_) => Tag::Str,
            Value::List(_) => Tag::List,
            Value::Dict(_) => Tag::Dict,
            Value::Function(_) => Tag::Function,
            Value::Class(_) => Tag::Class,
            Value::Instance(_) => Tag::Instance,
            Value::Range(_) => Tag::Range,
            Value::Set(_) => Tag::Set,
            Value::Closure(_) => Tag::Closure,
            Value::Bytes(_) => Tag::Bytes,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.tag().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

// ── Constructors ────────────────────────────────────────────────────

pub fn make_nil() -> Value {
    Value::Nil
}

pub fn make_bool(b: bool) -> Value {
    Value::Bool(b)
}

pub fn make_int(n: i64) -> Value {
    Value::Int(n)
}

pub fn make_float(f: f64) -> Value {
    Value::Float(f)
}

/// Build a string value. The text is copied into storage obtained from
/// the installed collector.
pub fn make_string(s: &str) -> Value {
    Value::Str(crate::runtime::collector().duplicate_string(s))
}

/// Build an empty list with room for `capacity` items (8 when `capacity`
/// is not positive).
pub fn make_list(capacity: i64) -> Value {
    crate::collections::list::with_capacity(capacity)
}

pub fn make_function(name: &str, entry: NativeFn) -> Value {
    Value::Function(Arc::new(Function::new(name, entry)))
}

pub fn make_closure(function: Arc<Function>, captures: Vec<Value>) -> Value {
    Value::Closure(Arc::new(Closure { function, captures }))
}

pub fn make_class(name: &str) -> Value {
    Value::Class(Arc::new(Class {
        name: Arc::from(name),
    }))
}

/// Instantiate `class`. Anything other than a class value is a type error.
pub fn make_instance(class: &Value) -> Value {
    match class {
        Value::Class(c) => Value::Instance(Arc::new(Instance {
            class: c.clone(),
            fields: Mutex::new(crate::collections::dict::empty()),
        })),
        other => type_error("instance", other, None),
    }
}

pub fn make_range(start: i64, end: i64, step: i64) -> Value {
    Value::Range(Range { start, end, step })
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        make_string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        make_string(&s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        crate::collections::list::from_values(items)
    }
}

// ── Introspection ───────────────────────────────────────────────────

/// Truthiness: nil is false, bools are themselves, numbers are true when
/// nonzero, strings/lists/bytes/creels when nonempty; dicts and every
/// other object are always true.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Nil => false,
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::List(l) => !l.lock().is_empty(),
        Value::Bytes(b) => !b.lock().is_empty(),
        Value::Set(s) => !s.is_empty(),
        Value::Dict(_) => true,
        _ => true,
    }
}

/// The canonical type name of `v`, as a string value.
pub fn type_of(v: &Value) -> Value {
    make_string(v.type_name())
}

/// Key identity used by dicts and creels: same tag and same content.
/// Strings compare by text, scalars by value (floats bitwise), heap
/// objects by identity. Unlike [`crate::ops::eq`] there is no numeric
/// promotion, so `1` and `1.0` are distinct keys.
pub fn key_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Range(x), Value::Range(y)) => x == y,
        _ => same_object(a, b),
    }
}

/// Reference identity for heap values. Scalars are never "the same object".
pub fn same_object(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Arc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Arc::ptr_eq(x, y),
        (Value::Bytes(x), Value::Bytes(y)) => Arc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Arc::ptr_eq(x, y),
        (Value::Closure(x), Value::Closure(y)) => Arc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
        (Value::Instance(x), Value::Instance(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// Read an integer argument, truncating floats. Other types are a type
/// error attributed to `op`.
pub(crate) fn int_arg(op: &'static str, v: &Value) -> i64 {
    match v {
        Value::Int(n) => *n,
        Value::Float(f) => *f as i64,
        other => type_error(op, other, None),
    }
}

// ── Formatting ──────────────────────────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "naething"),
            Value::Bool(true) => write!(f, "aye"),
            Value::Bool(false) => write!(f, "nae"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{}", format_g(*x)),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(l) => {
                let items = l.lock().clone();
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Bytes(b) => write!(f, "bytes[{}]", b.lock().len()),
            Value::Set(s) => {
                let mut items: Vec<String> = s.iter().map(|v| v.to_string()).collect();
                items.sort();
                write!(f, "creel{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{item}\"")?;
                }
                write!(f, "}}")
            }
            Value::Dict(d) => {
                let entries = d.lock().clone();
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{k}\": {v}")?;
                }
                write!(f, "}}")
            }
            _ => write!(f, "<object>"),
        }
    }
}

/// Format a float the way C's `%g` does: six significant digits, trailing
/// zeros dropped, exponent form outside `1e-4 ..< 1e6`.
pub(crate) fn format_g(x: f64) -> String {
    const PRECISION: i32 = 6;

    if x.is_nan() {
        return if x.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Round to the target precision first; the decimal exponent of the
    // rounded value decides between fixed and exponent notation.
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", strip_fraction_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        strip_fraction_zeros(&format!("{:.*}", decimals, x))
    }
}

fn strip_fraction_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

impl PartialEq for Value {
    /// Language-level equality, see [`crate::ops::eq`].
    fn eq(&self, other: &Self) -> bool {
        crate::ops::values_equal(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_generated_code_numbering() {
        assert_eq!(Tag::Nil as u8, 0);
        assert_eq!(Tag::Range as u8, 10);
        assert_eq!(Tag::Set as u8, 11);
        assert_eq!(Tag::Closure as u8, 12);
        assert_eq!(Tag::Bytes as u8, 13);
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Nil.type_name(), "naething");
        assert_eq!(Value::Int(1).type_name(), "integer");
        assert_eq!(make_string("x").type_name(), "string");
        assert_eq!(make_list(0).type_name(), "list");
        assert_eq!(crate::collections::set::empty().type_name(), "creel");
        fn id(args: &[Value]) -> Value {
            args.first().cloned().unwrap_or_default()
        }
        let f = make_function("id", id);
        assert_eq!(f.type_name(), "function");
        if let Value::Function(func) = &f {
            let c = make_closure(func.clone(), vec![Value::Int(1)]);
            assert_eq!(c.type_name(), "function");
        }
        assert_eq!(type_of(&Value::Float(1.0)).as_str(), Some("float"));
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&Value::Nil));
        assert!(!truthy(&Value::Bool(false)));
        assert!(!truthy(&Value::Int(0)));
        assert!(!truthy(&Value::Float(0.0)));
        assert!(!truthy(&make_string("")));
        assert!(!truthy(&make_list(4)));
        assert!(!truthy(&crate::collections::set::empty()));
        assert!(!truthy(&crate::collections::bytes::new(&Value::Int(0))));
        assert!(truthy(&crate::collections::dict::empty()));
        assert!(truthy(&Value::Int(-3)));
        assert!(truthy(&make_string("a")));
        assert!(truthy(&make_class("Coo")));
    }

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Nil.to_string(), "naething");
        assert_eq!(Value::Bool(true).to_string(), "aye");
        assert_eq!(Value::Bool(false).to_string(), "nae");
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(make_class("Coo").to_string(), "<object>");
    }

    #[test]
    fn format_g_matches_c() {
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(0.1), "0.1");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(0.00001), "1e-05");
        assert_eq!(format_g(123456.0), "123456");
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(3.14159265), "3.14159");
        assert_eq!(format_g(-2.5), "-2.5");
        assert_eq!(format_g(f64::INFINITY), "inf");
        assert_eq!(format_g(0.0), "0");
    }

    #[test]
    fn display_collections() {
        let list = Value::from(vec![Value::Int(1), make_string("b"), Value::Nil]);
        assert_eq!(list.to_string(), "[1, b, naething]");

        let d = crate::collections::dict::empty();
        let d = crate::collections::dict::set(&d, &make_string("a"), &Value::Int(1));
        let d = crate::collections::dict::set(&d, &Value::Int(2), &Value::Bool(true));
        assert_eq!(d.to_string(), "{\"a\": 1, \"2\": aye}");

        let s = crate::collections::set::make_creel(&Value::from(vec![
            make_string("pear"),
            make_string("apple"),
        ]));
        assert_eq!(s.to_string(), "creel{\"apple\", \"pear\"}");

        let b = crate::collections::bytes::new(&Value::Int(3));
        assert_eq!(b.to_string(), "bytes[3]");
    }

    #[test]
    fn key_eq_has_no_numeric_promotion() {
        assert!(key_eq(&Value::Int(1), &Value::Int(1)));
        assert!(!key_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(key_eq(&make_string("k"), &make_string("k")));
        let a = make_list(0);
        let b = make_list(0);
        assert!(key_eq(&a, &a.clone()));
        assert!(!key_eq(&a, &b));
    }

    #[test]
    fn make_instance_of_class() {
        let class = make_class("Coo");
        let inst = make_instance(&class);
        assert_eq!(inst.type_name(), "instance");
        match &inst {
            Value::Instance(i) => {
                assert_eq!(&*i.class.name, "Coo");
                i.set_field(&make_string("legs"), &Value::Int(4));
                i.set_field(&make_string("legs"), &Value::Int(3));
                assert_eq!(i.get_field(&make_string("legs")), Value::Int(3));
                assert_eq!(crate::collections::dict::len(&i.fields()), 1);
            }
            other => panic!("expected instance, got {other:?}"),
        }
    }
}
