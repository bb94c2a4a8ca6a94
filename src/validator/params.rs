//! Small helpers for pulling typed values out of the untrusted parameter map
//! while enforcing the closed-key-set rule: callers list every key they
//! consume, then [`ParamReader::finish`] rejects anything left over.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::validator::rules::contains_dangerous_chars;

pub struct ParamReader<'a> {
    map: &'a Map<String, Value>,
    consumed: HashSet<&'static str>,
    op_type: &'static str,
}

impl<'a> ParamReader<'a> {
    pub fn new(map: &'a Map<String, Value>, op_type: &'static str) -> Self {
        ParamReader {
            map,
            consumed: HashSet::new(),
            op_type,
        }
    }

    fn mark(&mut self, key: &'static str) {
        self.consumed.insert(key);
    }

    pub fn str(&mut self, key: &'static str) -> Result<Option<String>> {
        self.mark(key);
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                if contains_dangerous_chars(s) {
                    return Err(Error::validation(format!(
                        "{}.{key} contains disallowed characters",
                        self.op_type
                    ))
                    .with_field(key));
                }
                Ok(Some(s.clone()))
            }
            Some(_) => Err(Error::validation(format!("{}.{key} must be a string", self.op_type)).with_field(key)),
        }
    }

    pub fn bool(&mut self, key: &'static str) -> Result<bool> {
        self.mark(key);
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(Error::validation(format!("{}.{key} must be a boolean", self.op_type)).with_field(key)),
        }
    }

    pub fn u64(&mut self, key: &'static str) -> Result<Option<u64>> {
        self.mark(key);
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| Error::validation(format!("{}.{key} must be a non-negative integer", self.op_type)).with_field(key)),
            Some(_) => Err(Error::validation(format!("{}.{key} must be an integer", self.op_type)).with_field(key)),
        }
    }

    pub fn f64(&mut self, key: &'static str) -> Result<Option<f64>> {
        self.mark(key);
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| Error::validation(format!("{}.{key} must be a number", self.op_type)).with_field(key)),
            Some(_) => Err(Error::validation(format!("{}.{key} must be a number", self.op_type)).with_field(key)),
        }
    }

    pub fn array(&mut self, key: &'static str) -> Result<Option<Vec<Value>>> {
        self.mark(key);
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items.clone())),
            Some(_) => Err(Error::validation(format!("{}.{key} must be an array", self.op_type)).with_field(key)),
        }
    }

    /// Reject any key in the map that was never consumed by a call above.
    pub fn finish(&self) -> Result<()> {
        for key in self.map.keys() {
            if !self.consumed.contains(key.as_str()) {
                return Err(Error::validation(format!(
                    "unknown parameter '{key}' for operation '{}'",
                    self.op_type
                ))
                .with_field(key.clone()));
            }
        }
        Ok(())
    }
}
