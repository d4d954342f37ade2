use std::fmt;
use std::sync::Arc;

use serde_json::{Number as JsonNumber, Value as JsonValue};
use vista_ids::ObjectId;

/// The dynamically-typed value every property slot holds.
///
/// Arithmetic on two `Int`s stays integral; any `Real` operand promotes the
/// result to `Real`. Strings and lists are cheaply cloneable (`Arc`).
#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    String(Arc<str>),
    /// Handle to another object in the graph.
    ObjectRef(ObjectId),
    List(Vec<Variant>),
}

impl Default for Variant {
    fn default() -> Self {
        Variant::Null
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Bool(v) => write!(f, "{v}"),
            Variant::Int(v) => write!(f, "{v}"),
            Variant::Real(v) => write!(f, "{v}"),
            Variant::String(v) => write!(f, "{:?}", v.as_ref()),
            Variant::ObjectRef(v) => write!(f, "object({v})"),
            Variant::List(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// -------------------- Constructors --------------------

impl Variant {
    #[inline]
    pub const fn null() -> Self {
        Variant::Null
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    #[inline]
    pub fn string<S: AsRef<str>>(s: S) -> Self {
        Variant::String(Arc::<str>::from(s.as_ref()))
    }

    #[inline]
    pub fn list() -> Self {
        Variant::List(Vec::new())
    }
}

// -------------------- Accessors --------------------

impl Variant {
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Variant::Bool(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Variant::Int(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_real(&self) -> Option<f64> {
        match *self {
            Variant::Real(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<ObjectId> {
        match *self {
            Variant::ObjectRef(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Variant]> {
        match self {
            Variant::List(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Variant>> {
        match self {
            Variant::List(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric coercion: succeeds for `Int` and `Real`.
    #[inline]
    pub fn to_real(&self) -> Option<f64> {
        match *self {
            Variant::Int(v) => Some(v as f64),
            Variant::Real(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Variant::Int(_) | Variant::Real(_))
    }

    /// Truthiness used by conditionals: null, false, 0, 0.0 and the empty
    /// string are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Variant::Null => false,
            Variant::Bool(v) => *v,
            Variant::Int(v) => *v != 0,
            Variant::Real(v) => *v != 0.0,
            Variant::String(s) => !s.is_empty(),
            Variant::ObjectRef(id) => !id.is_nil(),
            Variant::List(_) => true,
        }
    }

    /// Short type tag for diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Variant::Null => "null",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Real(_) => "real",
            Variant::String(_) => "string",
            Variant::ObjectRef(_) => "object",
            Variant::List(_) => "list",
        }
    }
}

// -------------------- From impls --------------------

impl From<bool> for Variant {
    #[inline]
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}
impl From<i32> for Variant {
    #[inline]
    fn from(v: i32) -> Self {
        Variant::Int(v as i64)
    }
}
impl From<i64> for Variant {
    #[inline]
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}
impl From<f32> for Variant {
    #[inline]
    fn from(v: f32) -> Self {
        Variant::Real(v as f64)
    }
}
impl From<f64> for Variant {
    #[inline]
    fn from(v: f64) -> Self {
        Variant::Real(v)
    }
}
impl From<&str> for Variant {
    #[inline]
    fn from(v: &str) -> Self {
        Variant::String(Arc::<str>::from(v))
    }
}
impl From<String> for Variant {
    #[inline]
    fn from(v: String) -> Self {
        Variant::String(Arc::<str>::from(v))
    }
}
impl From<Arc<str>> for Variant {
    #[inline]
    fn from(v: Arc<str>) -> Self {
        Variant::String(v)
    }
}
impl From<ObjectId> for Variant {
    #[inline]
    fn from(v: ObjectId) -> Self {
        Variant::ObjectRef(v)
    }
}
impl From<Vec<Variant>> for Variant {
    #[inline]
    fn from(v: Vec<Variant>) -> Self {
        Variant::List(v)
    }
}

// -------------------- JSON conversion --------------------

impl Variant {
    pub fn from_json_value(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Variant::Null,
            JsonValue::Bool(v) => Variant::Bool(v),
            JsonValue::Number(v) => {
                if let Some(i) = v.as_i64() {
                    Variant::Int(i)
                } else if let Some(f) = v.as_f64() {
                    Variant::Real(f)
                } else {
                    Variant::Null
                }
            }
            JsonValue::String(v) => Variant::from(v),
            JsonValue::Array(values) => {
                Variant::List(values.into_iter().map(Variant::from_json_value).collect())
            }
            // Objects have no graph identity when they arrive as raw JSON.
            JsonValue::Object(_) => Variant::Null,
        }
    }

    pub fn to_json_value(&self) -> JsonValue {
        match self {
            Variant::Null => JsonValue::Null,
            Variant::Bool(v) => JsonValue::Bool(*v),
            Variant::Int(v) => JsonValue::Number(JsonNumber::from(*v)),
            Variant::Real(v) => match JsonNumber::from_f64(*v) {
                Some(n) => JsonValue::Number(n),
                None => JsonValue::Null,
            },
            Variant::String(v) => JsonValue::String(v.as_ref().to_string()),
            Variant::ObjectRef(v) => JsonValue::String(format!("{:016x}", v.as_u64())),
            Variant::List(v) => JsonValue::Array(v.iter().map(Variant::to_json_value).collect()),
        }
    }
}
