//! Array Instrumentation
//!
//! Plain forwarding breaks two families of array methods on a proxy:
//!
//! - Searches (`indexOf`, `includes`, `lastIndexOf`) compare by identity, but
//!   elements read through a proxy come back wrapped while the caller may hold
//!   either the wrapped or the raw form. Searches run against the raw array,
//!   retrying with the raw needle, after tracking `length` and every index.
//!
//! - Bulk mutations (`push`, `pop`, `shift`, `unshift`, `splice`) read and
//!   write the array many times in one call. They run with tracking paused so
//!   the internal reads never subscribe whatever effect happens to be
//!   current; the writes still go through the proxy and notify normally.
//!
//! The same operations are available as methods on [`Proxy`], and, for
//! dynamic callers, as [`Function`] values returned by `Proxy::get` under the
//! usual method names.

use super::context::PauseGuard;
use super::proxy::{to_raw, Proxy};
use super::runtime::{track, TrackOp};
use crate::error::ReactiveError;
use crate::value::{same_value_zero, strict_equals, Function, Object, PropKey, Value};

const INDEX_OF: &str = "indexOf";
const INCLUDES: &str = "includes";
const LAST_INDEX_OF: &str = "lastIndexOf";
const PUSH: &str = "push";
const POP: &str = "pop";
const SHIFT: &str = "shift";
const UNSHIFT: &str = "unshift";
const SPLICE: &str = "splice";

const MUTATORS: [&str; 5] = [PUSH, POP, SHIFT, UNSHIFT, SPLICE];

/// Resolve an instrumented method name to a function bound to `proxy`.
///
/// Read-only proxies resolve only the mutators, bound to themselves, so every
/// write those methods make is ignored even when the proxy wraps a mutable
/// one.
pub(crate) fn instrumented(proxy: &Proxy, key: &PropKey) -> Option<Value> {
    let name = key.as_name()?;
    if proxy.is_readonly() && !MUTATORS.contains(&name) {
        return None;
    }
    let proxy = proxy.clone();
    let method = match name {
        INDEX_OF => Function::new(move |args| {
            let found = proxy.search(Search::IndexOf, arg(args, 0), from_arg(args, 1));
            found.map_or(Value::from(-1), Value::from)
        }),
        LAST_INDEX_OF => Function::new(move |args| {
            let found = proxy.search(Search::LastIndexOf, arg(args, 0), from_arg(args, 1));
            found.map_or(Value::from(-1), Value::from)
        }),
        INCLUDES => Function::new(move |args| {
            let found = proxy.search(Search::Includes, arg(args, 0), from_arg(args, 1));
            Value::Bool(found.is_some())
        }),
        PUSH => Function::new(move |args| Value::from(proxy.push_unchecked(args.to_vec()))),
        POP => Function::new(move |_| proxy.pop_unchecked()),
        SHIFT => Function::new(move |_| proxy.shift_unchecked()),
        UNSHIFT => Function::new(move |args| Value::from(proxy.unshift_unchecked(args.to_vec()))),
        SPLICE => Function::new(move |args| {
            let start = from_arg(args, 0).unwrap_or(0);
            let delete_count = match args.get(1) {
                Some(count) => Some(count.as_f64().map_or(0, |n| n.max(0.0) as usize)),
                None => None,
            };
            let items = args.iter().skip(2).cloned().collect();
            Value::array(proxy.splice_unchecked(start, delete_count, items))
        }),
        _ => return None,
    };
    Some(Value::Function(method))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn from_arg(args: &[Value], index: usize) -> Option<isize> {
    args.get(index)
        .and_then(Value::as_f64)
        .filter(|n| !n.is_nan())
        .map(|n| n.trunc() as isize)
}

/// Resolve a possibly negative relative index against `len`, clamped to
/// `0..=len`.
fn relative_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Search {
    IndexOf,
    LastIndexOf,
    Includes,
}

impl Search {
    fn name(self) -> &'static str {
        match self {
            Search::IndexOf => INDEX_OF,
            Search::LastIndexOf => LAST_INDEX_OF,
            Search::Includes => INCLUDES,
        }
    }

    fn run(self, items: &[Value], needle: &Value, from_index: Option<isize>) -> Option<usize> {
        let len = items.len();
        match self {
            Search::IndexOf | Search::Includes => {
                let start = relative_index(from_index.unwrap_or(0), len);
                let eq = if self == Search::Includes {
                    same_value_zero
                } else {
                    strict_equals
                };
                items[start..]
                    .iter()
                    .position(|item| eq(item, needle))
                    .map(|offset| start + offset)
            }
            Search::LastIndexOf => {
                if len == 0 {
                    return None;
                }
                let end = match from_index {
                    None => len - 1,
                    Some(index) if index < 0 => {
                        let back = index.unsigned_abs();
                        if back > len {
                            return None;
                        }
                        len - back
                    }
                    Some(index) => (index as usize).min(len - 1),
                };
                items[..=end].iter().rposition(|item| strict_equals(item, needle))
            }
        }
    }
}

impl Proxy {
    fn array_target(&self, operation: &'static str) -> Result<Object, ReactiveError> {
        let raw = self.raw_object();
        if raw.is_array() {
            Ok(raw)
        } else {
            Err(ReactiveError::NotAnArray { operation })
        }
    }

    fn search(&self, search: Search, needle: Value, from_index: Option<isize>) -> Option<usize> {
        let raw = self.raw_object();
        if !self.is_readonly() {
            track(&raw, TrackOp::Get, &PropKey::length());
            for index in 0..raw.len() {
                track(&raw, TrackOp::Get, &PropKey::from(index));
            }
        }

        let items = raw.items();
        search.run(&items, &needle, from_index).or_else(|| {
            let raw_needle = to_raw(&needle);
            search.run(&items, &raw_needle, from_index)
        })
    }

    fn checked_search(
        &self,
        search: Search,
        needle: Value,
        from_index: Option<isize>,
    ) -> Result<Option<usize>, ReactiveError> {
        self.array_target(search.name())?;
        Ok(self.search(search, needle, from_index))
    }

    /// First index of `needle`, matching both its wrapped and raw form.
    pub fn index_of(
        &self,
        needle: impl Into<Value>,
        from_index: Option<isize>,
    ) -> Result<Option<usize>, ReactiveError> {
        self.checked_search(Search::IndexOf, needle.into(), from_index)
    }

    pub fn last_index_of(
        &self,
        needle: impl Into<Value>,
        from_index: Option<isize>,
    ) -> Result<Option<usize>, ReactiveError> {
        self.checked_search(Search::LastIndexOf, needle.into(), from_index)
    }

    /// Whether the array contains `needle`. `NaN` matches `NaN`.
    pub fn includes(
        &self,
        needle: impl Into<Value>,
        from_index: Option<isize>,
    ) -> Result<bool, ReactiveError> {
        Ok(self
            .checked_search(Search::Includes, needle.into(), from_index)?
            .is_some())
    }

    /// Append `items`, returning the new length.
    pub fn push<I, V>(&self, items: I) -> Result<usize, ReactiveError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.array_target(PUSH)?;
        Ok(self.push_unchecked(items.into_iter().map(Into::into).collect()))
    }

    /// Remove and return the last element, `Undefined` when empty.
    pub fn pop(&self) -> Result<Value, ReactiveError> {
        self.array_target(POP)?;
        Ok(self.pop_unchecked())
    }

    /// Remove and return the first element, `Undefined` when empty.
    pub fn shift(&self) -> Result<Value, ReactiveError> {
        self.array_target(SHIFT)?;
        Ok(self.shift_unchecked())
    }

    /// Prepend `items`, returning the new length.
    pub fn unshift<I, V>(&self, items: I) -> Result<usize, ReactiveError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.array_target(UNSHIFT)?;
        Ok(self.unshift_unchecked(items.into_iter().map(Into::into).collect()))
    }

    /// Remove `delete_count` elements at `start` (all remaining when `None`)
    /// and insert `items` in their place. Returns the removed elements.
    ///
    /// A negative `start` counts from the end.
    pub fn splice<I, V>(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: I,
    ) -> Result<Vec<Value>, ReactiveError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.array_target(SPLICE)?;
        Ok(self.splice_unchecked(
            start,
            delete_count,
            items.into_iter().map(Into::into).collect(),
        ))
    }

    fn push_unchecked(&self, items: Vec<Value>) -> usize {
        let _pause = PauseGuard::new();
        let len = self.len();
        let new_len = len + items.len();
        for (offset, item) in items.into_iter().enumerate() {
            self.set(len + offset, item);
        }
        self.set(PropKey::length(), new_len);
        new_len
    }

    fn pop_unchecked(&self) -> Value {
        let _pause = PauseGuard::new();
        let len = self.len();
        if len == 0 {
            self.set(PropKey::length(), 0);
            return Value::Undefined;
        }
        let last = self.get(len - 1);
        self.delete(len - 1);
        self.set(PropKey::length(), len - 1);
        last
    }

    fn shift_unchecked(&self) -> Value {
        let _pause = PauseGuard::new();
        let len = self.len();
        if len == 0 {
            self.set(PropKey::length(), 0);
            return Value::Undefined;
        }
        let first = self.get(0usize);
        for index in 1..len {
            self.set(index - 1, self.get(index));
        }
        self.delete(len - 1);
        self.set(PropKey::length(), len - 1);
        first
    }

    fn unshift_unchecked(&self, items: Vec<Value>) -> usize {
        let _pause = PauseGuard::new();
        let len = self.len();
        let count = items.len();
        if count > 0 {
            for index in (0..len).rev() {
                self.set(index + count, self.get(index));
            }
            for (index, item) in items.into_iter().enumerate() {
                self.set(index, item);
            }
        }
        self.set(PropKey::length(), len + count);
        len + count
    }

    fn splice_unchecked(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: Vec<Value>,
    ) -> Vec<Value> {
        let _pause = PauseGuard::new();
        let len = self.len();
        let start = relative_index(start, len);
        let delete_count = delete_count.unwrap_or(len - start).min(len - start);
        let item_count = items.len();

        let removed: Vec<Value> = (start..start + delete_count)
            .map(|index| self.get(index))
            .collect();

        if item_count < delete_count {
            for index in start..len - delete_count {
                self.set(index + item_count, self.get(index + delete_count));
            }
            for index in (len - delete_count + item_count..len).rev() {
                self.delete(index);
            }
        } else if item_count > delete_count {
            for index in (start..len - delete_count).rev() {
                self.set(index + item_count, self.get(index + delete_count));
            }
        }

        for (offset, item) in items.into_iter().enumerate() {
            self.set(start + offset, item);
        }
        self.set(PropKey::length(), len - delete_count + item_count);
        removed
    }
}
