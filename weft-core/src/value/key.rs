//! Property keys.
//!
//! A property is addressed either by name or by a [`Symbol`]. Array indices
//! are names whose text is the canonical decimal form of an index, so `"0"`
//! and `0usize` address the same slot.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Largest valid array index, mirroring the 32-bit array length limit.
const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// A unique property key that never collides with a name.
///
/// Symbols compare by identity. Built-in symbols are never tracked as
/// dependencies when read through a reactive proxy.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolInner>);

struct SymbolInner {
    description: Option<Arc<str>>,
    builtin: bool,
}

struct WellKnown {
    iterator: Symbol,
    async_iterator: Symbol,
    has_instance: Symbol,
    to_primitive: Symbol,
    to_string_tag: Symbol,
    iterate: Symbol,
}

fn well_known() -> &'static WellKnown {
    static WELL_KNOWN: OnceLock<WellKnown> = OnceLock::new();
    WELL_KNOWN.get_or_init(|| WellKnown {
        iterator: Symbol::builtin("Symbol.iterator"),
        async_iterator: Symbol::builtin("Symbol.asyncIterator"),
        has_instance: Symbol::builtin("Symbol.hasInstance"),
        to_primitive: Symbol::builtin("Symbol.toPrimitive"),
        to_string_tag: Symbol::builtin("Symbol.toStringTag"),
        iterate: Symbol::new(Some("iterate")),
    })
}

impl Symbol {
    /// Create a fresh symbol.
    pub fn new(description: Option<&str>) -> Self {
        Self(Arc::new(SymbolInner {
            description: description.map(Arc::from),
            builtin: false,
        }))
    }

    fn builtin(description: &str) -> Self {
        Self(Arc::new(SymbolInner {
            description: Some(Arc::from(description)),
            builtin: true,
        }))
    }

    pub fn iterator() -> Self {
        well_known().iterator.clone()
    }

    pub fn async_iterator() -> Self {
        well_known().async_iterator.clone()
    }

    pub fn has_instance() -> Self {
        well_known().has_instance.clone()
    }

    pub fn to_primitive() -> Self {
        well_known().to_primitive.clone()
    }

    pub fn to_string_tag() -> Self {
        well_known().to_string_tag.clone()
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    /// Whether this is one of the well-known built-in symbols.
    pub fn is_builtin(&self) -> bool {
        self.0.builtin
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

/// Key of a property on an object or array.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(Arc<str>),
    Symbol(Symbol),
}

impl PropKey {
    /// The key arrays use for their element count.
    pub fn length() -> Self {
        PropKey::Name(Arc::from("length"))
    }

    /// Sentinel key tracked by key enumeration on plain objects.
    pub(crate) fn iterate() -> Self {
        PropKey::Symbol(well_known().iterate.clone())
    }

    /// Parse the key as an array index.
    ///
    /// Only canonical forms qualify: `"1"` is an index, `"01"` and `"+1"`
    /// are ordinary names.
    pub fn as_index(&self) -> Option<usize> {
        let PropKey::Name(name) = self else {
            return None;
        };
        let bytes = name.as_bytes();
        if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        if bytes.len() > 1 && bytes[0] == b'0' {
            return None;
        }
        name.parse::<usize>()
            .ok()
            .filter(|index| *index <= MAX_ARRAY_INDEX)
    }

    pub fn is_integer_key(&self) -> bool {
        self.as_index().is_some()
    }

    pub fn is_length(&self) -> bool {
        matches!(self, PropKey::Name(name) if &**name == "length")
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PropKey::Name(name) => Some(name),
            PropKey::Symbol(_) => None,
        }
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(Arc::from(name))
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Name(Arc::from(name))
    }
}

impl From<&String> for PropKey {
    fn from(name: &String) -> Self {
        PropKey::Name(Arc::from(name.as_str()))
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Name(Arc::from(index.to_string()))
    }
}

impl From<Symbol> for PropKey {
    fn from(symbol: Symbol) -> Self {
        PropKey::Symbol(symbol)
    }
}

impl From<&PropKey> for PropKey {
    fn from(key: &PropKey) -> Self {
        key.clone()
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(name) => f.write_str(name),
            PropKey::Symbol(symbol) => write!(f, "{:?}", symbol),
        }
    }
}

impl fmt::Debug for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(name) => write!(f, "{:?}", name),
            PropKey::Symbol(symbol) => write!(f, "{:?}", symbol),
        }
    }
}
