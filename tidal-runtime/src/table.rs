//! Lua tables.
//!
//! A table has an array part for the keys `1..=n` and an insertion-ordered
//! hash part. Traversal with [`TableRef::next`] visits the array part first
//! and then the hash part in insertion order. Clearing a field during
//! traversal is allowed; the cleared entry stays as a tombstone until a new
//! key is inserted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LuaError;
use crate::value::{float_to_integer, Value};

/// Hashable identity of a non-nil, non-NaN key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyId {
    Boolean(bool),
    Integer(i64),
    Float(u64),
    String(Arc<str>),
    Object(usize),
}

/// Normalize a key: integral floats become integers.
fn normalize(key: &Value) -> Result<(Value, KeyId), LuaError> {
    let id = match key {
        Value::Nil => return Err(LuaError::new("table index is nil")),
        Value::Boolean(b) => KeyId::Boolean(*b),
        Value::Integer(i) => KeyId::Integer(*i),
        Value::Float(f) if f.is_nan() => return Err(LuaError::new("table index is NaN")),
        Value::Float(f) => match float_to_integer(*f) {
            Some(i) => return Ok((Value::Integer(i), KeyId::Integer(i))),
            None => KeyId::Float(f.to_bits()),
        },
        Value::String(s) => KeyId::String(s.clone()),
        Value::Table(t) => KeyId::Object(t.address()),
        Value::Function(f) => KeyId::Object(Arc::as_ptr(f) as *const () as usize),
    };
    Ok((key.clone(), id))
}

/// The table storage.
#[derive(Debug, Default)]
pub struct Table {
    array: Vec<Value>,
    entries: Vec<(Value, Value)>,
    index: HashMap<KeyId, usize>,
    tombstones: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a field. Nil and NaN keys read as nil.
    pub fn get(&self, key: &Value) -> Value {
        let Ok((key, id)) = normalize(key) else {
            return Value::Nil;
        };
        if let Value::Integer(i) = key {
            if i >= 1 && (i as u64) <= self.array.len() as u64 {
                return self.array[(i - 1) as usize].clone();
            }
        }
        match self.index.get(&id) {
            Some(&pos) => self.entries[pos].1.clone(),
            None => Value::Nil,
        }
    }

    /// Write a field. Assigning nil removes it.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), LuaError> {
        let (key, id) = normalize(&key)?;
        if let Value::Integer(i) = key {
            let len = self.array.len() as i64;
            if i >= 1 && i <= len {
                self.array[(i - 1) as usize] = value;
                if i == len {
                    self.trim_array();
                }
                return Ok(());
            }
            if i == len + 1 && !value.is_nil() {
                self.remove_entry(&id);
                self.array.push(value);
                self.migrate_into_array();
                return Ok(());
            }
        }

        match self.index.get(&id) {
            Some(&pos) => {
                let slot = &mut self.entries[pos].1;
                if slot.is_nil() && !value.is_nil() {
                    self.tombstones -= 1;
                } else if !slot.is_nil() && value.is_nil() {
                    self.tombstones += 1;
                }
                *slot = value;
            }
            None if value.is_nil() => {}
            None => {
                if self.tombstones > 8 && self.tombstones * 2 > self.entries.len() {
                    self.compact();
                }
                self.index.insert(id, self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    /// A border of the table: `t[n] ~= nil` and `t[n+1] == nil`.
    pub fn len(&self) -> i64 {
        if !self.array.is_empty() {
            return self.array.len() as i64;
        }
        let mut n = 0i64;
        while !self.get(&Value::Integer(n + 1)).is_nil() {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.entries.len() == self.tombstones
    }

    /// The entry after `key` in traversal order, or `None` at the end.
    /// `nil` starts a traversal.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, LuaError> {
        let start = match key {
            Value::Nil => 0,
            _ => {
                let (key, id) = normalize(key)?;
                match key {
                    Value::Integer(i) if i >= 1 && (i as u64) <= self.array.len() as u64 => {
                        i as usize
                    }
                    // A trimmed array slot: continue with the hash part.
                    Value::Integer(i) if i >= 1 && !self.index.contains_key(&id) => {
                        self.array.len()
                    }
                    _ => match self.index.get(&id) {
                        Some(&pos) => self.array.len() + pos + 1,
                        None => return Err(LuaError::new("invalid key to 'next'")),
                    },
                }
            }
        };

        for i in start..self.array.len() {
            if !self.array[i].is_nil() {
                return Ok(Some((Value::Integer(i as i64 + 1), self.array[i].clone())));
            }
        }
        let from = start.saturating_sub(self.array.len());
        Ok(self
            .entries
            .iter()
            .skip(from)
            .find(|(_, v)| !v.is_nil())
            .cloned())
    }

    fn trim_array(&mut self) {
        while matches!(self.array.last(), Some(Value::Nil)) {
            self.array.pop();
        }
    }

    fn migrate_into_array(&mut self) {
        loop {
            let id = KeyId::Integer(self.array.len() as i64 + 1);
            let Some(&pos) = self.index.get(&id) else {
                break;
            };
            let value = std::mem::take(&mut self.entries[pos].1);
            if value.is_nil() {
                break;
            }
            self.tombstones += 1;
            self.array.push(value);
        }
    }

    fn remove_entry(&mut self, id: &KeyId) {
        if let Some(&pos) = self.index.get(id) {
            if !self.entries[pos].1.is_nil() {
                self.entries[pos].1 = Value::Nil;
                self.tombstones += 1;
            }
        }
    }

    fn compact(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        self.index.clear();
        for (key, value) in entries.into_iter().filter(|(_, v)| !v.is_nil()) {
            if let Ok((_, id)) = normalize(&key) {
                self.index.insert(id, self.entries.len());
                self.entries.push((key, value));
            }
        }
        self.tombstones = 0;
    }
}

/// A shared, thread-safe handle to a table.
#[derive(Debug, Clone, Default)]
pub struct TableRef(Arc<Mutex<Table>>);

impl TableRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence `{v1, v2, ...}`.
    pub fn from_sequence(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Table::new();
        table.array = values.into_iter().collect();
        table.trim_array();
        Self(Arc::new(Mutex::new(table)))
    }

    pub fn get(&self, key: &Value) -> Value {
        self.0.lock().get(key)
    }

    /// Convenience for string-keyed reads.
    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::string(key))
    }

    pub fn set(&self, key: Value, value: Value) -> Result<(), LuaError> {
        self.0.lock().set(key, value)
    }

    /// Convenience for string-keyed writes, which can not fail.
    pub fn set_str(&self, key: &str, value: Value) {
        let _ = self.0.lock().set(Value::string(key), value);
    }

    pub fn len(&self) -> i64 {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, LuaError> {
        self.0.lock().next(key)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address used for identity hashing and `tostring`.
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(t: &TableRef) -> Vec<(Value, Value)> {
        let mut out = Vec::new();
        let mut key = Value::Nil;
        while let Some((k, v)) = t.next(&key).unwrap() {
            key = k.clone();
            out.push((k, v));
        }
        out
    }

    #[test]
    fn test_array_growth_and_border() {
        let t = TableRef::new();
        for i in 1..=5 {
            t.set(Value::Integer(i), Value::Integer(i * 10)).unwrap();
        }
        assert_eq!(t.len(), 5);
        t.set(Value::Integer(5), Value::Nil).unwrap();
        assert_eq!(t.len(), 4);
        assert_eq!(t.get(&Value::Integer(2)), Value::Integer(20));
    }

    #[test]
    fn test_out_of_order_keys_migrate() {
        let t = TableRef::new();
        t.set(Value::Integer(3), Value::from("c")).unwrap();
        t.set(Value::Integer(2), Value::from("b")).unwrap();
        assert_eq!(t.len(), 0);
        t.set(Value::Integer(1), Value::from("a")).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(collect(&t).len(), 3);
    }

    #[test]
    fn test_float_keys_normalize() {
        let t = TableRef::new();
        t.set(Value::Float(1.0), Value::from("one")).unwrap();
        assert_eq!(t.get(&Value::Integer(1)), Value::from("one"));
        t.set(Value::Float(1.5), Value::from("x")).unwrap();
        assert_eq!(t.get(&Value::Float(1.5)), Value::from("x"));
    }

    #[test]
    fn test_invalid_keys() {
        let t = TableRef::new();
        assert_eq!(
            t.set(Value::Nil, Value::Integer(1)).unwrap_err().message(),
            "table index is nil"
        );
        assert_eq!(
            t.set(Value::Float(f64::NAN), Value::Integer(1)).unwrap_err().message(),
            "table index is NaN"
        );
        assert!(t.get(&Value::Nil).is_nil());
    }

    #[test]
    fn test_next_insertion_order() {
        let t = TableRef::new();
        t.set_str("x", Value::Integer(1));
        t.set_str("y", Value::Integer(2));
        t.set(Value::Integer(1), Value::Boolean(true)).unwrap();
        let keys: Vec<_> = collect(&t).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Value::Integer(1), Value::from("x"), Value::from("y")]);
    }

    #[test]
    fn test_clear_during_traversal() {
        let t = TableRef::new();
        t.set_str("a", Value::Integer(1));
        t.set_str("b", Value::Integer(2));
        t.set_str("c", Value::Integer(3));
        let (k, _) = t.next(&Value::Nil).unwrap().unwrap();
        t.set(k.clone(), Value::Nil).unwrap();
        let (k2, _) = t.next(&k).unwrap().unwrap();
        assert_eq!(k2, Value::from("b"));
        assert!(t.next(&Value::from("zzz")).is_err());
    }

    #[test]
    fn test_is_empty_after_clear() {
        let t = TableRef::new();
        t.set_str("k", Value::Integer(1));
        assert!(!t.is_empty());
        t.set_str("k", Value::Nil);
        assert!(t.is_empty());
    }
}
