//! Runtime values held by the operand stack, locals, and field maps.
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::class::ClassFile;

/// Advisory tag carried by every stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackTag {
    Integer,
    Float,
    Reference,
    Return,
}

/// Shared handle to a heap instance. There is no collector, instances live
/// until the process exits.
pub type ObjectRef = Rc<RefCell<Instance>>;

/// JVM value payloads.
#[derive(Clone)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    /// Returns the tag a freshly pushed value of this kind carries.
    pub fn tag(&self) -> StackTag {
        match self {
            Self::Int(_) | Self::Long(_) => StackTag::Integer,
            Self::Float(_) | Self::Double(_) => StackTag::Float,
            Self::Null | Self::String(_) | Self::Object(_) => StackTag::Reference,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Int(x) => write!(f, "Int({x})"),
            Self::Long(x) => write!(f, "Long({x})"),
            Self::Float(x) => write!(f, "Float({x:?})"),
            Self::Double(x) => write!(f, "Double({x:?})"),
            Self::String(s) => write!(f, "String({s:?})"),
            // Fields are left out, instances may refer to themselves.
            Self::Object(object) => write!(f, "Object({})", object_label(object)),
        }
    }
}

/// Formats values the way the console natives print them.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Int(x) => write!(f, "{x}"),
            Self::Long(x) => write!(f, "{x}"),
            Self::Float(x) => write_floating(f, *x),
            Self::Double(x) => write_floating(f, *x),
            Self::String(s) => write!(f, "{s}"),
            Self::Object(object) => write!(f, "{}", object_label(object)),
        }
    }
}

fn write_floating<T>(f: &mut fmt::Formatter, x: T) -> fmt::Result
where
    T: Into<f64> + fmt::Display + Copy,
{
    let wide: f64 = x.into();
    if wide.is_nan() {
        write!(f, "NaN")
    } else if wide.is_infinite() {
        write!(f, "{}Infinity", if wide < 0.0 { "-" } else { "" })
    } else if wide.fract() == 0.0 && wide.abs() < 1e7 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

fn object_label(object: &ObjectRef) -> String {
    let name = match object.try_borrow() {
        Ok(instance) => instance.class_name(),
        Err(_) => "<busy>".to_string(),
    };
    format!("{name}@{:x}", Rc::as_ptr(object) as usize)
}

/// A tagged operand stack or local variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct StackValue {
    pub tag: StackTag,
    pub value: Value,
}

impl StackValue {
    /// Wraps `value`, deriving the tag from its kind.
    pub fn new(value: Value) -> Self {
        Self {
            tag: value.tag(),
            value,
        }
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn int(x: i32) -> Self {
        Self::new(Value::Int(x))
    }

    pub fn string(s: &str) -> Self {
        Self::new(Value::String(Rc::from(s)))
    }

    pub fn object(object: ObjectRef) -> Self {
        Self::new(Value::Object(object))
    }

    /// Number of local variable slots the value occupies.
    pub fn width(&self) -> usize {
        match self.value {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Default for StackValue {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for StackValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

/// An allocated object: its class and a field map keyed by field name.
pub struct Instance {
    class: Rc<ClassFile>,
    fields: HashMap<Vec<u8>, StackValue>,
}

impl Instance {
    pub fn new(class: Rc<ClassFile>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn class_name(&self) -> String {
        self.class
            .name()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .unwrap_or_else(|_| "?".to_string())
    }

    pub fn get_field(&self, name: &[u8]) -> Option<&StackValue> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: &[u8], value: StackValue) {
        self.fields.insert(name.to_vec(), value);
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut names: Vec<_> = self.fields.keys().collect();
        names.sort();
        let mut s = f.debug_struct(&self.class_name());
        for name in names {
            s.field(&String::from_utf8_lossy(name), &self.fields[name].value);
        }
        s.finish()
    }
}
