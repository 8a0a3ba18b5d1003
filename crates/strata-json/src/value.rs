use serde_json::{Map, Value};

/// A JSON object with lenient typed getters.
///
/// Missing keys and type mismatches never fail: they yield `false`, `0`,
/// `NaN`, `""` or `None`. Nested containers are returned as copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonObject {
    map: Map<String, Value>,
}

/// A JSON array with the same lenient getters as [`JsonObject`], by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonArray {
    items: Vec<Value>,
}

fn as_bool(v: Option<&Value>) -> bool {
    v.and_then(Value::as_bool).unwrap_or(false)
}

fn as_int(v: Option<&Value>) -> i32 {
    let Some(v) = v else { return 0 };
    v.as_i64()
        .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        .and_then(|i| i32::try_from(i).ok())
        .unwrap_or(0)
}

fn as_number(v: Option<&Value>) -> f64 {
    v.and_then(Value::as_f64).unwrap_or(f64::NAN)
}

fn as_str(v: Option<&Value>) -> &str {
    v.and_then(Value::as_str).unwrap_or("")
}

fn as_object(v: Option<&Value>) -> Option<JsonObject> {
    v.and_then(Value::as_object).cloned().map(JsonObject::from)
}

fn as_array(v: Option<&Value>) -> Option<JsonArray> {
    v.and_then(Value::as_array).cloned().map(JsonArray::from)
}

fn as_typed<T: JsonElement>(v: Option<&Value>) -> Option<TypedArray<T>> {
    let items = v?.as_array()?;
    Some(TypedArray { items: items.iter().map(T::from_json).collect() })
}

impl JsonObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        as_bool(self.map.get(key))
    }

    /// Integral value of `key`; fractional numbers truncate, out of range is 0.
    pub fn get_int(&self, key: &str) -> i32 {
        as_int(self.map.get(key))
    }

    pub fn get_number(&self, key: &str) -> f64 {
        as_number(self.map.get(key))
    }

    pub fn get_string(&self, key: &str) -> &str {
        as_str(self.map.get(key))
    }

    pub fn get_object(&self, key: &str) -> Option<JsonObject> {
        as_object(self.map.get(key))
    }

    pub fn get_array(&self, key: &str) -> Option<JsonArray> {
        as_array(self.map.get(key))
    }

    /// `None` unless `key` holds an array. Elements convert like the
    /// single-value getters, so mismatches become defaults.
    pub fn get_typed_array<T: JsonElement>(&self, key: &str) -> Option<TypedArray<T>> {
        as_typed(self.map.get(key))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }
}

impl From<Map<String, Value>> for JsonObject {
    fn from(map: Map<String, Value>) -> Self {
        Self { map }
    }
}

impl JsonArray {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_bool(&self, index: usize) -> bool {
        as_bool(self.items.get(index))
    }

    pub fn get_int(&self, index: usize) -> i32 {
        as_int(self.items.get(index))
    }

    pub fn get_number(&self, index: usize) -> f64 {
        as_number(self.items.get(index))
    }

    pub fn get_string(&self, index: usize) -> &str {
        as_str(self.items.get(index))
    }

    pub fn get_object(&self, index: usize) -> Option<JsonObject> {
        as_object(self.items.get(index))
    }

    pub fn get_array(&self, index: usize) -> Option<JsonArray> {
        as_array(self.items.get(index))
    }

    pub fn get_typed_array<T: JsonElement>(&self, index: usize) -> Option<TypedArray<T>> {
        as_typed(self.items.get(index))
    }

    /// Object elements, skipping anything else.
    pub fn objects(&self) -> impl Iterator<Item = JsonObject> + '_ {
        self.items.iter().filter_map(|v| as_object(Some(v)))
    }
}

impl From<Vec<Value>> for JsonArray {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

/// Element types a [`TypedArray`] can hold.
pub trait JsonElement: Sized {
    /// Converts one element, falling back to the type's lenient default.
    fn from_json(value: &Value) -> Self;
}

impl JsonElement for bool {
    fn from_json(value: &Value) -> Self {
        as_bool(Some(value))
    }
}

impl JsonElement for i32 {
    fn from_json(value: &Value) -> Self {
        as_int(Some(value))
    }
}

impl JsonElement for f64 {
    fn from_json(value: &Value) -> Self {
        as_number(Some(value))
    }
}

impl JsonElement for String {
    fn from_json(value: &Value) -> Self {
        as_str(Some(value)).to_owned()
    }
}

impl JsonElement for JsonObject {
    fn from_json(value: &Value) -> Self {
        as_object(Some(value)).unwrap_or_default()
    }
}

/// Array of `T`, converted element by element.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray<T> {
    items: Vec<T>,
}

impl<T> TypedArray<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for TypedArray<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a TypedArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
