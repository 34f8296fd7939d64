//! Frame codec.
//!
//! One event travels as one transport message holding a JSON array:
//! element 0 is the event name, the remaining elements are the positional
//! arguments in order.
//!
//! ```text
//! ["progress", 0.42, "Encoding video"]
//! ```

// Rust guideline compliant 2026-02

use serde::Serialize;
use serde_json::Value;

/// Errors produced while encoding or decoding a frame.
#[derive(Debug)]
pub enum FrameError {
    /// Inbound binary message is not UTF-8 text.
    NotText,
    /// Inbound message is not valid JSON.
    InvalidJson(serde_json::Error),
    /// Inbound message is valid JSON but not an array.
    NotAnArray,
    /// Inbound message is an empty array.
    EmptyFrame,
    /// First element of the array is not a string.
    NameNotString,
    /// Event name is the empty string.
    EmptyName,
    /// Outbound arguments are not JSON-representable.
    Encode(serde_json::Error),
    /// Outbound arguments are not a sequence of positional arguments.
    ArgsNotSequence,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotText => write!(f, "Frame is not UTF-8 text"),
            Self::InvalidJson(e) => write!(f, "Frame is not valid JSON: {e}"),
            Self::NotAnArray => write!(f, "Frame is not a JSON array"),
            Self::EmptyFrame => write!(f, "Frame is an empty array"),
            Self::NameNotString => write!(f, "Frame event name is not a string"),
            Self::EmptyName => write!(f, "Frame event name is empty"),
            Self::Encode(e) => write!(f, "Frame arguments are not serializable: {e}"),
            Self::ArgsNotSequence => write!(f, "Frame arguments must be a tuple or sequence"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidJson(e) | Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

/// One decoded event: a name plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Event name (never empty).
    pub name: String,
    /// Positional arguments, in wire order.
    pub args: Vec<Value>,
}

impl Frame {
    /// Build a frame from a name and already-converted arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Build a frame from any serializable argument list.
    ///
    /// See [`to_args`] for how `args` maps onto positional arguments.
    pub fn from_serialize<A: Serialize>(name: &str, args: A) -> Result<Self, FrameError> {
        if name.is_empty() {
            return Err(FrameError::EmptyName);
        }
        Ok(Self::new(name, to_args(args)?))
    }

    /// Serialize to a single transport message.
    pub fn encode(&self) -> Result<String, FrameError> {
        if self.name.is_empty() {
            return Err(FrameError::EmptyName);
        }
        let mut array = Vec::with_capacity(self.args.len() + 1);
        array.push(Value::String(self.name.clone()));
        array.extend(self.args.iter().cloned());
        serde_json::to_string(&Value::Array(array)).map_err(FrameError::Encode)
    }

    /// Parse one transport message.
    pub fn decode(message: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(message).map_err(FrameError::InvalidJson)?;
        let Value::Array(mut items) = value else {
            return Err(FrameError::NotAnArray);
        };
        if items.is_empty() {
            return Err(FrameError::EmptyFrame);
        }
        let args = items.split_off(1);
        let Some(Value::String(name)) = items.pop() else {
            return Err(FrameError::NameNotString);
        };
        if name.is_empty() {
            return Err(FrameError::EmptyName);
        }
        Ok(Self { name, args })
    }
}

/// Encode `name` and `args` into a transport message.
pub fn encode<A: Serialize>(name: &str, args: A) -> Result<String, FrameError> {
    Frame::from_serialize(name, args)?.encode()
}

/// Decode a transport message into `(name, args)`.
pub fn decode(message: &str) -> Result<(String, Vec<Value>), FrameError> {
    let frame = Frame::decode(message)?;
    Ok((frame.name, frame.args))
}

/// Empty argument list, for events that carry no arguments.
pub const NO_ARGS: [Value; 0] = [];

/// Convert a serializable argument list into positional arguments.
///
/// `args` must serialize to a sequence (tuple, array, slice, `Vec`); each
/// element becomes one argument. A single value still needs wrapping, e.g.
/// `(true,)` or `(vec!["a", "b"],)`. Use [`NO_ARGS`] for none.
pub fn to_args<A: Serialize>(args: A) -> Result<Vec<Value>, FrameError> {
    match serde_json::to_value(args).map_err(FrameError::Encode)? {
        Value::Array(items) => Ok(items),
        _ => Err(FrameError::ArgsNotSequence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_encode_puts_name_first() {
        let text = encode("progress", (0.42, "Encoding video")).unwrap();
        assert_eq!(text, r#"["progress",0.42,"Encoding video"]"#);
    }

    #[test]
    fn test_encode_no_args() {
        assert_eq!(encode("user_ready", NO_ARGS).unwrap(), r#"["user_ready"]"#);
    }

    #[test]
    fn test_encode_single_value_needs_wrapping() {
        assert_eq!(encode("done", (true,)).unwrap(), r#"["done",true]"#);
        assert!(matches!(encode("done", true), Err(FrameError::ArgsNotSequence)));
    }

    #[test]
    fn test_encode_lone_none_is_rejected_not_dropped() {
        assert!(matches!(
            encode("done", None::<bool>),
            Err(FrameError::ArgsNotSequence)
        ));
        assert!(matches!(
            encode("x", Value::Null),
            Err(FrameError::ArgsNotSequence)
        ));
        assert!(matches!(encode("x", ()), Err(FrameError::ArgsNotSequence)));

        let text = encode("done", (None::<bool>,)).unwrap();
        assert_eq!(text, r#"["done",null]"#);
        assert_eq!(Frame::decode(&text).unwrap().args, vec![Value::Null]);
    }

    #[test]
    fn test_encode_vec_argument_stays_one_argument() {
        let text = encode("files", (vec!["a", "b"],)).unwrap();
        assert_eq!(text, r#"["files",["a","b"]]"#);
        let frame = Frame::decode(&text).unwrap();
        assert_eq!(frame.args, vec![json!(["a", "b"])]);

        // A bare Vec is the argument list itself.
        assert_eq!(encode("files", vec!["a", "b"]).unwrap(), r#"["files","a","b"]"#);
    }

    #[test]
    fn test_encode_escapes_strings_as_json() {
        let text = encode("log_message", ("say \"hi\"\n",)).unwrap();
        assert_eq!(text, r#"["log_message","say \"hi\"\n"]"#);
    }

    #[test]
    fn test_encode_rejects_unserializable_args() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1);
        let err = encode("bad", (map,)).unwrap_err();
        assert!(matches!(err, FrameError::Encode(_)));
    }

    #[test]
    fn test_encode_rejects_empty_name() {
        assert!(matches!(encode("", NO_ARGS), Err(FrameError::EmptyName)));
    }

    #[test]
    fn test_decode_scenario_frames() {
        let (name, args) = decode(r#"["progress", 0.5, "halfway"]"#).unwrap();
        assert_eq!(name, "progress");
        assert_eq!(args, vec![json!(0.5), json!("halfway")]);

        let (name, args) = decode(r#"["done", true]"#).unwrap();
        assert_eq!(name, "done");
        assert_eq!(args, vec![json!(true)]);
    }

    #[test]
    fn test_decode_name_only() {
        let frame = Frame::decode(r#"["done"]"#).unwrap();
        assert_eq!(frame.name, "done");
        assert!(frame.args.is_empty());
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(Frame::decode("not json"), Err(FrameError::InvalidJson(_))));
        assert!(matches!(Frame::decode(r#"{"a":1}"#), Err(FrameError::NotAnArray)));
        assert!(matches!(Frame::decode("[]"), Err(FrameError::EmptyFrame)));
        assert!(matches!(Frame::decode("[1, 2]"), Err(FrameError::NameNotString)));
        assert!(matches!(Frame::decode(r#"[""]"#), Err(FrameError::EmptyName)));
        assert!(matches!(Frame::decode("ab12"), Err(FrameError::InvalidJson(_))));
    }

    #[test]
    fn test_round_trip_preserves_nested_args() {
        let args = vec![
            json!({"files": ["a.vp", "b.vp"], "size": 1024}),
            json!(null),
            json!([1, [2, 3]]),
            json!(-7),
            json!("ü ✓"),
        ];
        let frame = Frame::new("custom_event", args.clone());
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.args, args);
    }
}
