//! Stage timing hook.
//!
//! The processor reports how long each stage of a request took, labelled
//! with the lowercased extension of the file involved. A [`Recorder`]
//! decides what happens to the observation.

use std::fmt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading a source or cached derivative.
    Load,
    /// Running the engine.
    Transform,
    /// Writing the derivative and its index entry.
    Store,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Transform => "transform",
            Stage::Store => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Recorder: Send + Sync + 'static {
    fn observe(&self, stage: Stage, extension: &str, elapsed: Duration);
}

/// Discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn observe(&self, _stage: Stage, _extension: &str, _elapsed: Duration) {}
}

/// Emits each observation as a `debug` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn observe(&self, stage: Stage, extension: &str, elapsed: Duration) {
        debug!(
            stage = %stage,
            extension,
            seconds = elapsed.as_secs_f64(),
            "stage timing"
        );
    }
}

/// Lowercased extension of `path`, without the dot. Empty when there is
/// none.
pub fn extension_label(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[dot + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}
