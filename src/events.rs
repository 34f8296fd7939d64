//! Typed view of the converter's event vocabulary.
//!
//! The wire vocabulary is open: the server may add events at any time.
//! Known names map onto variants with fixed argument shapes, and everything
//! else is carried through untouched as [`ConverterEvent::Unrecognized`].

use serde_json::{json, Value};

use crate::channel::Frame;
use crate::constants::{EVENT_CAPTCHA, EVENT_DONE, EVENT_LOG_MESSAGE, EVENT_PROGRESS, EVENT_USER_READY};

/// A known event whose arguments have the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Required positional argument is absent.
    MissingArgument {
        /// Event name.
        event: &'static str,
        /// Zero-based argument position.
        index: usize,
    },
    /// Argument is present but of the wrong JSON type.
    WrongType {
        /// Event name.
        event: &'static str,
        /// Zero-based argument position.
        index: usize,
        /// Expected JSON type.
        expected: &'static str,
    },
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingArgument { event, index } => {
                write!(f, "'{event}' is missing argument {index}")
            }
            Self::WrongType {
                event,
                index,
                expected,
            } => write!(f, "'{event}' argument {index} is not a {expected}"),
        }
    }
}

impl std::error::Error for EventError {}

/// One event from the converter stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ConverterEvent {
    /// A line of task output.
    LogMessage(String),
    /// Task progress.
    Progress {
        /// Completed share of the task, nominally in `[0, 1]`.
        fraction: f64,
        /// What the task is doing right now.
        label: String,
    },
    /// The task finished.
    Done {
        /// Whether it succeeded.
        success: bool,
    },
    /// The server needs a captcha answer before it continues.
    Captcha {
        /// Image reference, usually a `data:` URL.
        image: String,
    },
    /// Client handshake frame (ready variant).
    UserReady,
    /// Any event this client does not know about.
    Unrecognized(Frame),
}

impl ConverterEvent {
    /// Wire name of this event.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::LogMessage(_) => EVENT_LOG_MESSAGE,
            Self::Progress { .. } => EVENT_PROGRESS,
            Self::Done { .. } => EVENT_DONE,
            Self::Captcha { .. } => EVENT_CAPTCHA,
            Self::UserReady => EVENT_USER_READY,
            Self::Unrecognized(frame) => &frame.name,
        }
    }

    /// Wire frame for this event.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::LogMessage(text) => Frame::new(EVENT_LOG_MESSAGE, vec![json!(text)]),
            Self::Progress { fraction, label } => {
                Frame::new(EVENT_PROGRESS, vec![json!(fraction), json!(label)])
            }
            Self::Done { success } => Frame::new(EVENT_DONE, vec![json!(success)]),
            Self::Captcha { image } => Frame::new(EVENT_CAPTCHA, vec![json!(image)]),
            Self::UserReady => Frame::new(EVENT_USER_READY, Vec::new()),
            Self::Unrecognized(frame) => frame.clone(),
        }
    }
}

impl TryFrom<&Frame> for ConverterEvent {
    type Error = EventError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        let args = &frame.args;
        match frame.name.as_str() {
            EVENT_LOG_MESSAGE => Ok(Self::LogMessage(
                string_arg(EVENT_LOG_MESSAGE, args, 0)?.to_string(),
            )),
            EVENT_PROGRESS => Ok(Self::Progress {
                fraction: number_arg(EVENT_PROGRESS, args, 0)?,
                label: string_arg(EVENT_PROGRESS, args, 1)?.to_string(),
            }),
            EVENT_DONE => {
                // Older servers send a bare `["done"]` on success.
                let success = match args.first() {
                    None => true,
                    Some(Value::Bool(b)) => *b,
                    Some(_) => {
                        return Err(EventError::WrongType {
                            event: EVENT_DONE,
                            index: 0,
                            expected: "boolean",
                        })
                    }
                };
                Ok(Self::Done { success })
            }
            EVENT_CAPTCHA => Ok(Self::Captcha {
                image: string_arg(EVENT_CAPTCHA, args, 0)?.to_string(),
            }),
            EVENT_USER_READY => Ok(Self::UserReady),
            _ => Ok(Self::Unrecognized(frame.clone())),
        }
    }
}

fn arg<'a>(event: &'static str, args: &'a [Value], index: usize) -> Result<&'a Value, EventError> {
    args.get(index)
        .ok_or(EventError::MissingArgument { event, index })
}

fn string_arg<'a>(
    event: &'static str,
    args: &'a [Value],
    index: usize,
) -> Result<&'a str, EventError> {
    arg(event, args, index)?
        .as_str()
        .ok_or(EventError::WrongType {
            event,
            index,
            expected: "string",
        })
}

fn number_arg(event: &'static str, args: &[Value], index: usize) -> Result<f64, EventError> {
    arg(event, args, index)?
        .as_f64()
        .ok_or(EventError::WrongType {
            event,
            index,
            expected: "number",
        })
}
