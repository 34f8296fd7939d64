//! Captcha challenge responder.
//!
//! The server pauses the task and pushes `["captcha", image_ref]`. It only
//! continues once the client sends the answer back as a bare string over
//! the same connection (never as a frame).
//!
//! ```text
//! captcha listener ──► Challenge ──► respond() ──► AnswerSource (blocking)
//!                                         │
//!                                         └──► Challenge::answer() ──► send_raw
//! ```
//!
//! The server asks one question at a time, so [`respond`] answers
//! challenges strictly in arrival order.

// Rust guideline compliant 2026-02

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::sync::mpsc;

use crate::channel::{ChannelError, ChannelSender, EventChannel, Frame};
use crate::constants::EVENT_CAPTCHA;
use crate::events::ConverterEvent;

/// One pending captcha. Answer it at most once with [`Challenge::answer`].
#[derive(Debug)]
pub struct Challenge {
    image: String,
    sender: ChannelSender,
    answered: bool,
}

impl Challenge {
    /// Image reference sent by the server (usually a `data:` URL).
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Send `text` to the server as the raw answer.
    ///
    /// The payload is exactly `text`; it is not framed or trimmed.
    pub fn answer(mut self, text: &str) -> Result<(), ChannelError> {
        self.answered = true;
        self.sender.send_raw(text)
    }
}

impl Drop for Challenge {
    fn drop(&mut self) {
        if !self.answered {
            log::warn!("Captcha challenge dropped without an answer; the task will stay paused");
        }
    }
}

/// Register a `captcha` listener on `channel` and return the stream of challenges.
///
/// Malformed `captcha` frames are logged and skipped.
pub fn subscribe(channel: &mut EventChannel) -> mpsc::UnboundedReceiver<Challenge> {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = channel.sender();
    channel.on(EVENT_CAPTCHA, move |args| {
        let frame = Frame::new(EVENT_CAPTCHA, args.to_vec());
        let ConverterEvent::Captcha { image } = ConverterEvent::try_from(&frame)? else {
            return Ok(());
        };
        log::info!("Captcha challenge received");
        tx.send(Challenge {
            image,
            sender: sender.clone(),
            answered: false,
        })
        .map_err(|e| anyhow::anyhow!("captcha responder is gone: {e}"))?;
        Ok(())
    });
    rx
}

/// Register a `captcha` listener that closes `channel` instead of answering.
///
/// The server keeps a task paused until it gets an answer, so a client that
/// will not answer ends the run here and reports a disconnect.
pub fn decline(channel: &mut EventChannel) {
    let sender = channel.sender();
    channel.on(EVENT_CAPTCHA, move |_| {
        log::info!("Captcha challenge received, closing without an answer");
        sender.close()?;
        Ok(())
    });
}

/// Where answers come from. Called on a blocking thread.
pub trait AnswerSource: Send + 'static {
    /// Produce the answer for the challenge showing `image`.
    ///
    /// `Ok(None)` means no answer will ever come (e.g. end of input).
    fn answer(&mut self, image: &str) -> Result<Option<String>>;
}

/// Prompts on stderr and reads one line from stdin per challenge.
#[derive(Debug, Default)]
pub struct StdinAnswerSource {
    captcha_dir: Option<PathBuf>,
}

impl StdinAnswerSource {
    /// Create a source. With `captcha_dir`, `data:` images are saved there
    /// and the prompt shows the file path.
    #[must_use]
    pub fn new(captcha_dir: Option<PathBuf>) -> Self {
        Self { captcha_dir }
    }

    fn describe(&self, image: &str) -> String {
        if let Some(dir) = &self.captcha_dir {
            match save_data_url(image, dir) {
                Ok(Some(path)) => return path.display().to_string(),
                Ok(None) => {}
                Err(e) => log::warn!("Could not save captcha image: {:#}", e),
            }
        }
        if image.starts_with("data:") {
            let head: String = image.chars().take(48).collect();
            format!("{head}... ({} bytes)", image.len())
        } else {
            image.to_string()
        }
    }
}

impl AnswerSource for StdinAnswerSource {
    fn answer(&mut self, image: &str) -> Result<Option<String>> {
        let shown = self.describe(image);
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "Captcha required: {shown}")?;
        write!(stderr, "Answer: ")?;
        stderr.flush()?;

        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read captcha answer")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(strip_line_ending(&line).to_string()))
    }
}

/// Remove one trailing `\n` or `\r\n`, nothing else.
fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Answer challenges from `rx` in order until the channel goes away.
///
/// Returns the number of challenges answered. Stops early when the source
/// runs dry.
pub async fn respond<S: AnswerSource>(
    mut rx: mpsc::UnboundedReceiver<Challenge>,
    mut source: S,
) -> Result<usize> {
    let mut answered = 0;
    while let Some(challenge) = rx.recv().await {
        let image = challenge.image().to_string();
        let (returned, answer) = tokio::task::spawn_blocking(move || {
            let answer = source.answer(&image);
            (source, answer)
        })
        .await
        .context("Answer source panicked")?;
        source = returned;

        let Some(text) = answer? else {
            log::warn!("No captcha answer available, giving up");
            return Ok(answered);
        };
        challenge
            .answer(&text)
            .context("Failed to send captcha answer")?;
        answered += 1;
        log::debug!("Captcha answered ({} so far)", answered);
    }
    Ok(answered)
}

/// Write a `data:<mime>;base64,<payload>` image into `dir`.
///
/// Files are named `captcha-<n>.<ext>` with the first free `n`. Returns
/// `Ok(None)` for references that are not data URLs.
pub fn save_data_url(image_ref: &str, dir: &Path) -> Result<Option<PathBuf>> {
    let Some(rest) = image_ref.strip_prefix("data:") else {
        return Ok(None);
    };
    let Some((meta, payload)) = rest.split_once(',') else {
        bail!("Malformed data URL");
    };
    let Some(mime) = meta.strip_suffix(";base64") else {
        bail!("Only base64 data URLs are supported");
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .context("Invalid base64 in captcha image")?;

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let ext = extension_for(mime);
    let path = (1u32..)
        .map(|n| dir.join(format!("captcha-{n}.{ext}")))
        .find(|p| !p.exists())
        .context("No free captcha file name")?;
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("Saved captcha image to {}", path.display());
    Ok(Some(path))
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}
