use serde_json::{Map, Value};

use crate::error::WriteError;

enum Frame {
    Object { map: Map<String, Value>, key: Option<String> },
    Array(Vec<Value>),
}

/// Streaming builder for a single JSON document.
///
/// Calls chain through `?`:
///
/// ```rust
/// # fn main() -> Result<(), strata_json::WriteError> {
/// let mut w = strata_json::JsonWriter::new();
/// w.object()?.key("width")?.value(320)?.key("tags")?.array()?.value("a")?;
/// w.end_array()?.end_object()?;
/// assert_eq!(w.write()?, r#"{"width":320,"tags":["a"]}"#);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct JsonWriter {
    stack: Vec<Frame>,
    root: Option<Value>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&mut self, key: impl Into<String>) -> Result<&mut Self, WriteError> {
        let key = key.into();
        match self.stack.last_mut() {
            Some(Frame::Object { key: slot @ None, .. }) => *slot = Some(key),
            Some(Frame::Object { key: Some(pending), .. }) => {
                return Err(WriteError::DanglingKey { pending: pending.clone(), next: key });
            }
            _ => return Err(WriteError::KeyOutsideObject(key)),
        }
        Ok(self)
    }

    pub fn value(&mut self, value: impl Into<Value>) -> Result<&mut Self, WriteError> {
        self.push(value.into())?;
        Ok(self)
    }

    pub fn object(&mut self) -> Result<&mut Self, WriteError> {
        self.open(Frame::Object { map: Map::new(), key: None })
    }

    pub fn end_object(&mut self) -> Result<&mut Self, WriteError> {
        match self.stack.pop() {
            Some(Frame::Object { map, key: None }) => {
                self.push(Value::Object(map))?;
                Ok(self)
            }
            Some(frame) => {
                self.stack.push(frame);
                Err(WriteError::UnbalancedEnd { found: "end_object" })
            }
            None => Err(WriteError::UnbalancedEnd { found: "end_object" }),
        }
    }

    pub fn array(&mut self) -> Result<&mut Self, WriteError> {
        self.open(Frame::Array(Vec::new()))
    }

    pub fn end_array(&mut self) -> Result<&mut Self, WriteError> {
        match self.stack.pop() {
            Some(Frame::Array(items)) => {
                self.push(Value::Array(items))?;
                Ok(self)
            }
            Some(frame) => {
                self.stack.push(frame);
                Err(WriteError::UnbalancedEnd { found: "end_array" })
            }
            None => Err(WriteError::UnbalancedEnd { found: "end_array" }),
        }
    }

    /// Serializes the finished document and resets the writer.
    ///
    /// On error the writer is reset as well.
    pub fn write(&mut self) -> Result<String, WriteError> {
        let open = self.stack.len();
        let root = self.root.take();
        self.stack.clear();
        if open > 0 {
            return Err(WriteError::Unfinished(open));
        }
        let root = root.ok_or(WriteError::Empty)?;
        Ok(root.to_string())
    }

    fn open(&mut self, frame: Frame) -> Result<&mut Self, WriteError> {
        self.check_slot()?;
        self.stack.push(frame);
        Ok(self)
    }

    fn check_slot(&self) -> Result<(), WriteError> {
        match self.stack.last() {
            Some(Frame::Object { key: None, .. }) => Err(WriteError::ValueWithoutKey),
            Some(_) => Ok(()),
            None if self.root.is_some() => Err(WriteError::MultipleRoots),
            None => Ok(()),
        }
    }

    fn push(&mut self, value: Value) -> Result<(), WriteError> {
        match self.stack.last_mut() {
            Some(Frame::Object { map, key }) => {
                let key = key.take().ok_or(WriteError::ValueWithoutKey)?;
                map.insert(key, value);
                Ok(())
            }
            Some(Frame::Array(items)) => {
                items.push(value);
                Ok(())
            }
            None if self.root.is_some() => Err(WriteError::MultipleRoots),
            None if value.is_object() || value.is_array() => {
                self.root = Some(value);
                Ok(())
            }
            None => Err(WriteError::NoContainer),
        }
    }
}
