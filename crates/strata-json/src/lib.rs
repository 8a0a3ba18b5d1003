//! JSON read/write adapter for strata scene and config files.
//!
//! A thin layer over `serde_json` with the lenient accessors scene loaders
//! want: missing or mistyped fields fall back to defaults instead of failing.
//! The crate has no engine dependencies so tooling can read scene files
//! without pulling in wgpu.
//!
//! | Item | Contents |
//! |------|----------|
//! | [`parse`] | text to [`JsonObject`] |
//! | [`JsonObject`], [`JsonArray`] | keyed / indexed getters |
//! | [`TypedArray`] | arrays converted per element to a [`JsonElement`] type |
//! | [`JsonWriter`] | streaming document builder |
//!
//! # Quick start
//!
//! ```rust
//! let scene = strata_json::parse(r#"{ "width": 320, "layers": [{ "kind": "group" }] }"#).unwrap();
//! assert_eq!(scene.get_int("width"), 320);
//! assert!(scene.get_number("height").is_nan());
//! let first = scene.get_array("layers").unwrap().get_object(0).unwrap();
//! assert_eq!(first.get_string("kind"), "group");
//! ```

pub mod error;
mod value;
mod writer;

pub use error::{ParseError, WriteError};
pub use value::{JsonArray, JsonElement, JsonObject, TypedArray};
pub use writer::JsonWriter;

/// Parses a document whose top-level value is an object.
pub fn parse(text: &str) -> Result<JsonObject, ParseError> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(map) => Ok(JsonObject::from(map)),
        other => {
            let message = format!("expected an object at top level, found {}", kind(&other));
            Err(ParseError::new(message, 1, 1))
        }
    }
}

fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    fn ok(src: &str) -> JsonObject {
        parse(src).unwrap()
    }

    fn err(src: &str) -> ParseError {
        parse(src).unwrap_err()
    }

    #[test]
    fn empty_object() {
        assert!(ok("{}").is_empty());
    }

    #[test]
    fn top_level_array_is_rejected() {
        assert!(err("[1, 2]").message.contains("an array"));
    }

    #[test]
    fn top_level_scalar_is_rejected() {
        err("42");
    }

    #[test]
    fn error_position_is_one_based() {
        let e = err("{\n  \"a\": 1,\n  \"b\": ?\n}");
        assert_eq!(e.line, 3);
        assert!(e.col > 1);
        assert!(!e.message.contains("at line"));
    }

    #[test]
    fn getters_read_typed_values() {
        let o = ok(r#"{ "b": true, "i": 7, "n": 2.5, "s": "hi", "o": { "x": 1 }, "a": [1, 2] }"#);
        assert!(o.get_bool("b"));
        assert_eq!(o.get_int("i"), 7);
        assert_eq!(o.get_number("n"), 2.5);
        assert_eq!(o.get_string("s"), "hi");
        assert_eq!(o.get_object("o").unwrap().get_int("x"), 1);
        assert_eq!(o.get_array("a").unwrap().len(), 2);
    }

    #[test]
    fn getters_default_on_missing_or_mismatched() {
        let o = ok(r#"{ "s": "text", "big": 1e12 }"#);
        assert!(!o.get_bool("s"));
        assert_eq!(o.get_int("s"), 0);
        assert_eq!(o.get_int("big"), 0);
        assert!(o.get_number("missing").is_nan());
        assert_eq!(o.get_string("missing"), "");
        assert!(o.get_object("s").is_none());
        assert!(o.get_array("missing").is_none());
    }

    #[test]
    fn int_truncates_fractions() {
        assert_eq!(ok(r#"{ "v": 3.9 }"#).get_int("v"), 3);
        assert_eq!(ok(r#"{ "v": -3.9 }"#).get_int("v"), -3);
    }

    #[test]
    fn keys_keep_document_order() {
        let o = ok(r#"{ "z": 1, "a": 2, "m": 3 }"#);
        assert_eq!(o.keys().collect::<Vec<_>>(), ["z", "a", "m"]);
        assert!(o.contains_key("a"));
        assert!(!o.contains_key("b"));
    }

    #[test]
    fn array_getters_by_index() {
        let a = ok(r#"{ "a": [false, 4, "x", { "k": "v" }, [1]] }"#).get_array("a").unwrap();
        assert!(!a.get_bool(0));
        assert_eq!(a.get_int(1), 4);
        assert_eq!(a.get_string(2), "x");
        assert_eq!(a.get_object(3).unwrap().get_string("k"), "v");
        assert_eq!(a.get_array(4).unwrap().get_int(0), 1);
        assert!(a.get_number(99).is_nan());
        assert_eq!(a.objects().count(), 1);
    }

    #[test]
    fn typed_arrays_convert_each_element_leniently() {
        let o = ok(r#"{
            "n": [1.5, 2], "s": ["a", "b"], "mixed": [1, "a"], "o": [{}, 3], "x": 1
        }"#);
        let n: TypedArray<f64> = o.get_typed_array("n").unwrap();
        assert_eq!(n.into_vec(), vec![1.5, 2.0]);
        let s: TypedArray<String> = o.get_typed_array("s").unwrap();
        assert_eq!(s.get(1).map(String::as_str), Some("b"));
        assert_eq!(o.get_typed_array::<i32>("mixed").unwrap().into_vec(), vec![1, 0]);
        assert_eq!(o.get_typed_array::<i32>("n").unwrap().into_vec(), vec![1, 2]);
        let mixed: TypedArray<String> = o.get_typed_array("mixed").unwrap();
        assert_eq!(mixed.into_vec(), vec![String::new(), "a".to_owned()]);
        let objects: TypedArray<JsonObject> = o.get_typed_array("o").unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects.get(1).unwrap().is_empty());
        assert!(o.get_typed_array::<i32>("x").is_none());
        assert!(o.get_typed_array::<i32>("missing").is_none());
    }
}
