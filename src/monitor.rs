//! Terminal output for a watched task.
//!
//! Subscribes to every frame on a channel and renders the known events:
//!
//! ```text
//! Reading input.vp
//! [ 42%] Encoding video
//! Task finished successfully.
//! ```

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::channel::{EventChannel, Frame};
use crate::events::ConverterEvent;

/// How a watched task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `done(true)` was received.
    Succeeded,
    /// `done(false)` was received.
    Failed,
    /// The channel closed before any `done`.
    Disconnected,
}

impl Outcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
            Self::Disconnected => 2,
        }
    }
}

struct MonitorState {
    writer: Box<dyn Write + Send>,
    done: Option<bool>,
}

/// Renders channel events to a writer and remembers the outcome.
#[derive(Clone)]
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Start rendering `channel`'s events to `writer`.
    pub fn attach(channel: &mut EventChannel, writer: impl Write + Send + 'static) -> Self {
        let monitor = Self {
            state: Arc::new(Mutex::new(MonitorState {
                writer: Box::new(writer),
                done: None,
            })),
        };
        let handle = monitor.clone();
        channel.on_any(move |frame| handle.render(frame));
        monitor
    }

    /// Outcome so far. `Disconnected` until a `done` event arrives.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self.lock().done {
            Some(true) => Outcome::Succeeded,
            Some(false) => Outcome::Failed,
            None => Outcome::Disconnected,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(&self, frame: &Frame) -> anyhow::Result<()> {
        let event = ConverterEvent::try_from(frame)?;
        let mut state = self.lock();
        match event {
            ConverterEvent::LogMessage(text) => writeln!(state.writer, "{text}")?,
            ConverterEvent::Progress { fraction, label } => {
                writeln!(state.writer, "[{:>3}%] {}", percent(fraction), label)?;
            }
            ConverterEvent::Done { success } => {
                state.done = Some(success);
                if success {
                    writeln!(state.writer, "Task finished successfully.")?;
                } else {
                    writeln!(state.writer, "Task failed.")?;
                }
            }
            ConverterEvent::Captcha { .. } | ConverterEvent::UserReady => {}
            ConverterEvent::Unrecognized(frame) => {
                log::debug!("Not rendering '{}'", frame.name);
            }
        }
        state.writer.flush()?;
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(fraction: f64) -> u32 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}
