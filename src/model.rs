//! Core data model.
//!
//! An operation is one caller's claim that something is busy. The engine
//! owns the live set; callers only ever hold its [`Token`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Opaque handle for a live operation, issued by `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(pub Uuid);

impl Token {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Where an operation came from. Drives message lookup and visual treatment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Page navigation.
    Route,
    /// Session bootstrap, sign-in and friends.
    Auth,
    /// User-triggered work such as saving a route or importing customers.
    Action,
    #[default]
    System,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Route, Scope::Auth, Scope::Action, Scope::System];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Route => "route",
            Scope::Auth => "auth",
            Scope::Action => "action",
            Scope::System => "system",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "route" => Ok(Scope::Route),
            "auth" => Ok(Scope::Auth),
            "action" => Ok(Scope::Action),
            "system" => Ok(Scope::System),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Raw progress as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: i64,
    pub total: i64,
}

impl Progress {
    pub fn new(current: i64, total: i64) -> Self {
        Self { current, total }
    }

    /// A progress pair is determinate when `total > 0` and `current >= 0`.
    pub fn is_determinate(&self) -> bool {
        self.total > 0 && self.current >= 0
    }

    /// Completion percentage clamped to `[0, 100]`, if determinate.
    pub fn percent(&self) -> Option<f64> {
        if !self.is_determinate() {
            return None;
        }
        let percent = self.current as f64 * 100.0 / self.total as f64;
        Some(percent.clamp(0.0, 100.0))
    }
}

/// Progress as handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressDisplay {
    Determinate {
        current: i64,
        total: i64,
        percent: f64,
    },
    Indeterminate,
}

impl From<Progress> for ProgressDisplay {
    fn from(progress: Progress) -> Self {
        match progress.percent() {
            Some(percent) => ProgressDisplay::Determinate {
                current: progress.current,
                total: progress.total,
                percent,
            },
            None => ProgressDisplay::Indeterminate,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A live busy operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub token: Token,
    pub scope: Scope,
    /// Milliseconds on the engine clock.
    pub started_at: u64,
    /// Explicit status text. Wins over `message_key`.
    pub message: Option<String>,
    /// Catalog key resolved against `scope`.
    pub message_key: Option<String>,
    pub progress: Option<Progress>,
    /// Insertion order, used to break `started_at` ties.
    #[serde(skip)]
    pub(crate) seq: u64,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Options for starting an operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartOptions {
    pub(crate) scope: Scope,
    pub(crate) message: Option<String>,
    pub(crate) message_key: Option<String>,
    pub(crate) progress: Option<Progress>,
}

impl StartOptions {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn route() -> Self {
        Self::new(Scope::Route)
    }

    pub fn auth() -> Self {
        Self::new(Scope::Auth)
    }

    pub fn action() -> Self {
        Self::new(Scope::Action)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.message_key = Some(key.into());
        self
    }

    pub fn progress(mut self, current: i64, total: i64) -> Self {
        self.progress = Some(Progress::new(current, total));
        self
    }
}

/// Partial update for a live operation. Unset fields keep their prior value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPatch {
    pub(crate) message: Option<String>,
    pub(crate) message_key: Option<String>,
    pub(crate) progress: Option<Progress>,
}

impl OperationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.message_key = Some(key.into());
        self
    }

    pub fn progress(mut self, current: i64, total: i64) -> Self {
        self.progress = Some(Progress::new(current, total));
        self
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What the busy UI should show for the current operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub token: Token,
    pub scope: Scope,
    pub message: String,
    pub progress: Option<ProgressDisplay>,
}

/// Immutable view of engine state handed to readers and subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub active_count: usize,
    pub is_active: bool,
    pub should_reveal: bool,
    pub is_short_visible: bool,
    pub visible_since: Option<u64>,
    pub last_settled_at: Option<u64>,
    pub reveal_delay_ms: u64,
    pub short_variant_threshold_ms: u64,
    /// `None` while idle.
    pub display: Option<DisplayInfo>,
}
