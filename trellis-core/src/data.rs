//! Denormalized read output.
//!
//! Reads turn references back into nested objects. Objects are shared `Rc`
//! records so that reading a cyclic graph without a selector yields a
//! structure that points back at itself: the edge that closes a cycle is a
//! [`Data::Cycle`] holding the enclosing record weakly, which keeps the
//! output free of `Rc` cycles.

use std::cell::{Ref, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Number;

use crate::value::Value;

/// The fields of one output object.
#[derive(Debug, Default)]
pub struct Record {
    fields: RefCell<IndexMap<String, Data>>,
}

impl Record {
    pub(crate) fn insert(&self, field: &str, data: Data) {
        self.fields.borrow_mut().insert(field.to_string(), data);
    }

    pub fn get(&self, field: &str) -> Option<Data> {
        self.fields.borrow().get(field).cloned()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.borrow().contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.borrow().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }

    pub fn fields(&self) -> Ref<'_, IndexMap<String, Data>> {
        self.fields.borrow()
    }
}

/// Unlinks nested records one at a time so that dropping a long chain does
/// not recurse once per level.
impl Drop for Record {
    fn drop(&mut self) {
        let mut pending: Vec<Data> = self.fields.get_mut().drain(..).map(|(_, data)| data).collect();
        while let Some(data) = pending.pop() {
            match data {
                Data::Object(record) => {
                    if let Ok(mut record) = Rc::try_unwrap(record) {
                        pending.extend(record.fields.get_mut().drain(..).map(|(_, data)| data));
                    }
                }
                Data::List(items) => pending.extend(items),
                _ => {}
            }
        }
    }
}

/// A denormalized value.
#[derive(Debug, Clone)]
pub enum Data {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Data>),
    Object(Rc<Record>),
    /// Back-edge to an enclosing object of the same read.
    Cycle(Weak<Record>),
}

impl Data {
    pub(crate) fn scalar(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Data::Bool(*b),
            Value::Number(n) => Data::Number(n.clone()),
            Value::String(s) => Data::String(s.clone()),
            _ => Data::Null,
        }
    }

    /// The record behind an object or cycle edge.
    pub fn record(&self) -> Option<Rc<Record>> {
        match self {
            Data::Object(record) => Some(record.clone()),
            Data::Cycle(weak) => weak.upgrade(),
            _ => None,
        }
    }

    /// Field of an object (or of the object a cycle edge points to).
    pub fn get(&self, field: &str) -> Option<Data> {
        self.record()?.get(field)
    }

    pub fn index(&self, i: usize) -> Option<&Data> {
        match self {
            Data::List(items) => items.get(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Data::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether both values are the very same output object.
    pub fn same_object(&self, other: &Data) -> bool {
        match (self.record(), other.record()) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    /// Convert to JSON. Cycle edges become null.
    pub fn to_json(&self) -> serde_json::Value {
        let mut stack = Vec::new();
        let mut finished = match JsonFrame::open(self) {
            Ok(value) => return value,
            Err(frame) => {
                stack.push(frame);
                None
            }
        };
        loop {
            if let Some(value) = finished.take() {
                match stack.last_mut() {
                    Some(frame) => frame.accept(value),
                    None => return value,
                }
            }
            let Some(frame) = stack.last_mut() else {
                return serde_json::Value::Null;
            };
            match frame.next_child() {
                Some(child) => match JsonFrame::open(&child) {
                    Ok(value) => finished = Some(value),
                    Err(frame) => stack.push(frame),
                },
                None => finished = stack.pop().map(JsonFrame::close),
            }
        }
    }

    fn deep_eq(&self, other: &Data) -> bool {
        // A pair already under comparison is assumed equal; any real
        // difference shows up elsewhere in the walk.
        let mut seen = HashSet::new();
        let mut pending = vec![(self.clone(), other.clone())];
        while let Some((a, b)) = pending.pop() {
            match (&a, &b) {
                (Data::Null, Data::Null) => {}
                (Data::Bool(x), Data::Bool(y)) if x == y => {}
                (Data::Number(x), Data::Number(y)) if x == y => {}
                (Data::String(x), Data::String(y)) if x == y => {}
                (Data::List(x), Data::List(y)) if x.len() == y.len() => {
                    pending.extend(x.iter().cloned().zip(y.iter().cloned()));
                }
                (Data::Object(_) | Data::Cycle(_), Data::Object(_) | Data::Cycle(_)) => match (a.record(), b.record()) {
                    (Some(x), Some(y)) => {
                        let pair = (Rc::as_ptr(&x) as usize, Rc::as_ptr(&y) as usize);
                        if Rc::ptr_eq(&x, &y) || !seen.insert(pair) {
                            continue;
                        }
                        let (x, y) = (x.fields(), y.fields());
                        if x.len() != y.len() {
                            return false;
                        }
                        for (field, value) in x.iter() {
                            match y.get(field) {
                                Some(other) => pending.push((value.clone(), other.clone())),
                                None => return false,
                            }
                        }
                    }
                    (None, None) => {}
                    _ => return false,
                },
                _ => return false,
            }
        }
        true
    }
}

/// A container half-way through conversion by [`Data::to_json`].
enum JsonFrame {
    List {
        items: std::vec::IntoIter<Data>,
        out: Vec<serde_json::Value>,
    },
    Object {
        fields: std::vec::IntoIter<(String, Data)>,
        key: String,
        out: serde_json::Map<String, serde_json::Value>,
    },
}

impl JsonFrame {
    /// Scalars convert on the spot; containers become a frame.
    fn open(data: &Data) -> Result<serde_json::Value, JsonFrame> {
        match data {
            Data::Null | Data::Cycle(_) => Ok(serde_json::Value::Null),
            Data::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Data::Number(n) => Ok(serde_json::Value::Number(n.clone())),
            Data::String(s) => Ok(serde_json::Value::String(s.clone())),
            Data::List(items) => Err(JsonFrame::List {
                out: Vec::with_capacity(items.len()),
                items: items.clone().into_iter(),
            }),
            Data::Object(record) => {
                let fields: Vec<_> = record
                    .fields()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Err(JsonFrame::Object {
                    fields: fields.into_iter(),
                    key: String::new(),
                    out: serde_json::Map::new(),
                })
            }
        }
    }

    fn next_child(&mut self) -> Option<Data> {
        match self {
            JsonFrame::List { items, .. } => items.next(),
            JsonFrame::Object { fields, key, .. } => fields.next().map(|(field, value)| {
                *key = field;
                value
            }),
        }
    }

    fn accept(&mut self, value: serde_json::Value) {
        match self {
            JsonFrame::List { out, .. } => out.push(value),
            JsonFrame::Object { key, out, .. } => {
                out.insert(std::mem::take(key), value);
            }
        }
    }

    fn close(self) -> serde_json::Value {
        match self {
            JsonFrame::List { out, .. } => serde_json::Value::Array(out),
            JsonFrame::Object { out, .. } => serde_json::Value::Object(out),
        }
    }
}

/// Structural equality. Terminates on cyclic output.
impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

impl PartialEq<serde_json::Value> for Data {
    fn eq(&self, other: &serde_json::Value) -> bool {
        self.to_json() == *other
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Data::Null | Data::Cycle(_) => serializer.serialize_unit(),
            Data::Bool(b) => serializer.serialize_bool(*b),
            Data::Number(n) => n.serialize(serializer),
            Data::String(s) => serializer.serialize_str(s),
            Data::List(items) => items.serialize(serializer),
            Data::Object(record) => {
                let fields = record.fields();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (field, value) in fields.iter() {
                    map.serialize_entry(field, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(fields: &[(&str, Data)]) -> Rc<Record> {
        let record = Rc::new(Record::default());
        for (field, value) in fields {
            record.insert(field, value.clone());
        }
        record
    }

    #[test]
    fn distinct_but_equal_objects_compare_equal() {
        let a = Data::Object(object(&[("x", Data::Number(1.into()))]));
        let b = Data::Object(object(&[("x", Data::Number(1.into()))]));
        assert_eq!(a, b);
        assert!(!a.same_object(&b));
        assert_eq!(a, json!({ "x": 1 }));
    }

    #[test]
    fn field_order_does_not_matter() {
        let a = Data::Object(object(&[("x", Data::Null), ("y", Data::Bool(true))]));
        let b = Data::Object(object(&[("y", Data::Bool(true)), ("x", Data::Null)]));
        assert_eq!(a, b);
    }

    #[test]
    fn cyclic_structures_compare_and_serialize() {
        let a = object(&[("name", Data::String("a".into()))]);
        a.insert("me", Data::Cycle(Rc::downgrade(&a)));
        let b = object(&[("name", Data::String("a".into()))]);
        b.insert("me", Data::Cycle(Rc::downgrade(&b)));

        let (a, b) = (Data::Object(a), Data::Object(b));
        assert_eq!(a, b);
        assert!(a.get("me").unwrap().same_object(&a));
        assert_eq!(serde_json::to_value(&a).unwrap(), json!({ "name": "a", "me": null }));
    }

    #[test]
    fn differing_values_are_unequal() {
        let a = Data::List(vec![Data::String("x".into())]);
        let b = Data::List(vec![Data::String("y".into())]);
        assert_ne!(a, b);
        assert_ne!(Data::Null, Data::Bool(false));
    }

    fn chain(len: usize, tail: &str) -> Data {
        let mut data = Data::String(tail.into());
        for i in 0..len {
            data = Data::Object(object(&[("depth", Data::Number(i.into())), ("next", data)]));
        }
        data
    }

    #[test]
    fn long_chains_compare_and_drop() {
        let (a, b) = (chain(200_000, "end"), chain(200_000, "end"));
        assert_eq!(a, b);
        assert_ne!(a, chain(200_000, "other"));
        drop(a);
        drop(b);
    }

    #[test]
    fn nested_lists_convert_in_order() {
        let data = Data::List(vec![
            Data::Object(object(&[("a", Data::List(vec![Data::Bool(true), Data::Null]))])),
            Data::String("x".into()),
        ]);
        assert_eq!(data.to_json(), json!([{ "a": [true, null] }, "x"]));
    }
}
