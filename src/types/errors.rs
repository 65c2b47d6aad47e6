use std::fmt;

// === StitchError ===

/// Errors raised by the tile compositor.
#[derive(Debug, Clone, PartialEq)]
pub enum StitchError {
    /// No canvas exists for the given session ID.
    UnknownSession(String),
    /// A canvas for the given session ID has already been started.
    AlreadyExists(String),
    /// The capture metadata cannot produce a drawable surface.
    InvalidMeta(String),
    /// `finish` was requested before any tile was appended.
    NoTiles(String),
    /// A tile could not be decoded.
    Decode(String),
    /// The composed surface could not be encoded.
    Encode(String),
    /// The compositor task is gone.
    WorkerUnavailable,
}

impl fmt::Display for StitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StitchError::UnknownSession(id) => write!(f, "Unknown stitch session: {}", id),
            StitchError::AlreadyExists(id) => write!(f, "Stitch session already exists: {}", id),
            StitchError::InvalidMeta(msg) => write!(f, "Invalid stitch metadata: {}", msg),
            StitchError::NoTiles(id) => write!(f, "Stitching returned no image: {}", id),
            StitchError::Decode(msg) => write!(f, "Tile decode failed: {}", msg),
            StitchError::Encode(msg) => write!(f, "Image encode failed: {}", msg),
            StitchError::WorkerUnavailable => write!(f, "Stitch worker unavailable"),
        }
    }
}

impl std::error::Error for StitchError {}

// === SessionError ===

/// Errors related to the capture session registry.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The capture metadata is missing a positive dimension.
    InvalidMeta(String),
    /// The sender has no tab or window to capture.
    MissingTab,
    /// The tab already owns an open capture session.
    TabBusy { tab_id: i64, session_id: String },
    /// No open session carries the given ID.
    NotFound(String),
    /// The session belongs to a different tab than the caller.
    TabMismatch { session_id: String, expected: i64, actual: i64 },
    /// The session ID is empty or otherwise unusable.
    MalformedId(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidMeta(msg) => write!(f, "Invalid capture metadata: {}", msg),
            SessionError::MissingTab => write!(f, "No active tab/window for capture."),
            SessionError::TabBusy { tab_id, session_id } => write!(
                f,
                "Tab {} already has an open capture session: {}",
                tab_id, session_id
            ),
            SessionError::NotFound(id) => {
                write!(f, "No active full-page capture session: {}", id)
            }
            SessionError::TabMismatch { .. } => write!(f, "Session/tab mismatch."),
            SessionError::MalformedId(id) => write!(f, "Malformed session id: {:?}", id),
        }
    }
}

impl std::error::Error for SessionError {}

// === PolicyError ===

/// Reasons the coordinator refuses an operation on policy grounds.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// The sender's host is not covered by the allow-list.
    DomainNotAllowed,
    /// The kill switch blocks every capture and action.
    KillSwitchEngaged,
    /// Observe mode forbids page-mutating actions.
    ObserveMode,
    /// The action is explicitly disallowed.
    ActionDisallowed(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::DomainNotAllowed => {
                write!(f, "Blocked by policy: domain is not in allowed domains.")
            }
            PolicyError::KillSwitchEngaged => {
                write!(f, "Blocked by policy: kill switch is engaged.")
            }
            PolicyError::ObserveMode => {
                write!(f, "Blocked by policy: agent mode is Observe (read-only).")
            }
            PolicyError::ActionDisallowed(action) => {
                write!(f, "Blocked by policy: action \"{}\" is disallowed.", action)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

// === CaptureError ===

/// Errors surfaced by coordinator operations and the transport between
/// the page and the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    Policy(PolicyError),
    Session(SessionError),
    Stitch(StitchError),
    /// The viewport screenshot could not be taken.
    Screenshot(String),
    /// A request carried a missing or out-of-range value.
    InvalidInput(String),
    /// A region selection rectangle is unusable.
    InvalidRect(String),
    /// Completion produced no image.
    NoImage,
    /// A round-trip did not finish before its deadline.
    Timeout(String),
    /// The request or response could not be carried across the boundary.
    Transport(String),
    /// Internal state is unusable (poisoned lock, closed channel).
    Internal(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Policy(e) => write!(f, "{}", e),
            CaptureError::Session(e) => write!(f, "{}", e),
            CaptureError::Stitch(e) => write!(f, "{}", e),
            CaptureError::Screenshot(msg) => write!(f, "Screenshot failed: {}", msg),
            CaptureError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CaptureError::InvalidRect(msg) => write!(f, "Invalid selection rectangle: {}", msg),
            CaptureError::NoImage => write!(f, "Stitching returned no image."),
            CaptureError::Timeout(step) => write!(f, "Timed out waiting for {}", step),
            CaptureError::Transport(msg) => write!(f, "Capture transport error: {}", msg),
            CaptureError::Internal(msg) => write!(f, "Capture internal error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<PolicyError> for CaptureError {
    fn from(e: PolicyError) -> Self {
        CaptureError::Policy(e)
    }
}

impl From<SessionError> for CaptureError {
    fn from(e: SessionError) -> Self {
        CaptureError::Session(e)
    }
}

impl From<StitchError> for CaptureError {
    fn from(e: StitchError) -> Self {
        match e {
            StitchError::NoTiles(_) => CaptureError::NoImage,
            other => CaptureError::Stitch(other),
        }
    }
}

// === PageError ===

/// Errors from page-side DOM manipulation during capture.
#[derive(Debug, Clone, PartialEq)]
pub enum PageError {
    /// Scrolling the document failed.
    Scroll(String),
    /// Reading or writing an inline style failed.
    Style(String),
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::Scroll(msg) => write!(f, "Scroll failed: {}", msg),
            PageError::Style(msg) => write!(f, "Style update failed: {}", msg),
        }
    }
}

impl std::error::Error for PageError {}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
    /// The provided settings key is invalid.
    InvalidKey(String),
    /// The provided settings value is invalid.
    InvalidValue(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
            SettingsError::InvalidKey(key) => write!(f, "Invalid settings key: {}", key),
            SettingsError::InvalidValue(msg) => {
                write!(f, "Invalid settings value: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

// === StoreError ===

/// Errors related to the persisted capture history.
#[derive(Debug)]
pub enum StoreError {
    /// Capture with the given ID was not found.
    NotFound(i64),
    /// Database operation failed.
    DatabaseError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Capture not found: {}", id),
            StoreError::DatabaseError(msg) => write!(f, "Capture store database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

// === VisionError ===

/// Errors related to the remote vision/OCR runtime.
#[derive(Debug)]
pub enum VisionError {
    /// No runtime base URL has been configured.
    NotConfigured,
    /// A network error occurred while talking to the runtime.
    NetworkError(String),
    /// The runtime answered with a non-success status.
    RuntimeError { status: u16, message: String },
    /// The runtime answered with something that is not usable.
    InvalidResponse(String),
}

impl fmt::Display for VisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisionError::NotConfigured => write!(f, "Vision runtime not configured"),
            VisionError::NetworkError(msg) => write!(f, "Vision network error: {}", msg),
            VisionError::RuntimeError { status, message } => {
                write!(f, "Vision runtime error ({}): {}", status, message)
            }
            VisionError::InvalidResponse(msg) => {
                write!(f, "Vision runtime returned an invalid response: {}", msg)
            }
        }
    }
}

impl std::error::Error for VisionError {}
