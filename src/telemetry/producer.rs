use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use serde::Deserialize;
use serde_jsonlines::JsonLinesIter;

use crate::RideError;

use super::{FixError, FixEvent, GeolocationPermission, RawFix, SourceStatus};

/// Longest pause between two paced fixes
const MAX_PACING_GAP_MS: i64 = 10_000;

/// A source of location fixes.
///
/// # Lifecycle
///
/// 1. Check `status()` for capability and permission before recording
/// 2. Call `start()` to begin receiving fixes
/// 3. Call `next_event()` until it returns `None`. An `Error` event ends the stream
pub trait PositionSource {
    /// Whether the source can deliver fixes and what permission the user granted
    fn status(&self) -> SourceStatus;

    /// Begin watching position.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying feed cannot be opened.
    fn start(&mut self) -> Result<(), RideError>;

    /// Next fix or error, blocking until one is available. `None` once the feed is
    /// exhausted or after an error was delivered.
    fn next_event(&mut self) -> Option<FixEvent>;
}

/// A reported error line. Only `{"error": "..."}` with no other field qualifies, so a
/// fix carrying an extra `error` member still reads as a fix.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct FeedError {
    error: String,
}

/// One line of a fix feed: either a fix or a reported error
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum FeedLine {
    Error(FeedError),
    Fix(RawFix),
}

/// Reads fixes from a JSON lines file, one `RawFix` object per line. A line such as
/// `{"error": "timeout"}` is delivered as a fix error.
pub struct JsonlPositionSource {
    path: PathBuf,
    pace: bool,
    lines: Option<JsonLinesIter<BufReader<File>, FeedLine>>,
    last_timestamp: Option<i64>,
    finished: bool,
}

impl JsonlPositionSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            pace: false,
            lines: None,
            last_timestamp: None,
            finished: false,
        }
    }

    /// Sleep between fixes according to their timestamps so the feed plays back at
    /// the speed it was recorded
    pub fn paced(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    fn wait_for(&mut self, fix: &RawFix) {
        let Some(timestamp) = fix.timestamp else {
            return;
        };
        if let Some(last) = self.last_timestamp {
            let gap = (timestamp - last).clamp(0, MAX_PACING_GAP_MS);
            if self.pace && gap > 0 {
                thread::sleep(Duration::from_millis(gap as u64));
            }
        }
        self.last_timestamp = Some(timestamp);
    }
}

impl PositionSource for JsonlPositionSource {
    fn status(&self) -> SourceStatus {
        if !self.path.exists() {
            return SourceStatus {
                available: false,
                permission: GeolocationPermission::Unknown,
            };
        }
        let permission = match File::open(&self.path) {
            Ok(_) => GeolocationPermission::Granted,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                GeolocationPermission::Denied
            }
            Err(e) => {
                warn!("Could not query fix feed {:?}: {}", self.path, e);
                GeolocationPermission::Unknown
            }
        };
        SourceStatus {
            available: true,
            permission,
        }
    }

    fn start(&mut self) -> Result<(), RideError> {
        let lines = serde_jsonlines::json_lines(&self.path)
            .map_err(|e| RideError::FixFeedError { source: e })?;
        info!("Watching fixes from {:?}", self.path);
        self.lines = Some(lines);
        self.finished = false;
        Ok(())
    }

    fn next_event(&mut self) -> Option<FixEvent> {
        if self.finished {
            return None;
        }
        let line = self.lines.as_mut()?.next();
        match line {
            None => {
                debug!("Fix feed {:?} exhausted", self.path);
                self.finished = true;
                None
            }
            Some(Ok(FeedLine::Fix(fix))) => {
                self.wait_for(&fix);
                Some(FixEvent::Fix(fix))
            }
            Some(Ok(FeedLine::Error(FeedError { error }))) => {
                self.finished = true;
                Some(FixEvent::Error(FixError { message: error }))
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(FixEvent::Error(FixError {
                    message: format!("Could not read fix: {}", e),
                }))
            }
        }
    }
}

/// Replays a fixed list of events, used by tests
pub struct MockPositionSource {
    status: SourceStatus,
    events: Vec<FixEvent>,
    cur: usize,
    started: bool,
}

impl MockPositionSource {
    pub fn from_events(events: Vec<FixEvent>) -> Self {
        Self {
            status: SourceStatus::ready(),
            events,
            cur: 0,
            started: false,
        }
    }

    pub fn with_status(mut self, status: SourceStatus) -> Self {
        self.status = status;
        self
    }
}

impl PositionSource for MockPositionSource {
    fn status(&self) -> SourceStatus {
        self.status
    }

    fn start(&mut self) -> Result<(), RideError> {
        if !self.status.available {
            return Err(RideError::GeolocationUnavailable);
        }
        self.started = true;
        Ok(())
    }

    fn next_event(&mut self) -> Option<FixEvent> {
        if !self.started {
            return None;
        }
        let event = self.events.get(self.cur).cloned();
        self.cur += 1;
        if matches!(event, Some(FixEvent::Error(_))) {
            self.started = false;
        }
        event
    }
}
