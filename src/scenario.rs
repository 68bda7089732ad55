//! Deterministic replay of timed start/update/stop scripts.
//!
//! A script is a TOML list of `[[step]]` tables, each firing at `at_ms` on
//! a [`ManualClock`]. Replay records one [`Frame`] per step, plus one per
//! timer-driven notification (delayed reveal, short variant elapsing), so
//! designers can see exactly what the busy UI would do for a given tuning.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, ManualClock, lock};
use crate::config::EngineConfig;
use crate::engine::LoadingEngine;
use crate::error::{Error, Result};
use crate::model::{OperationPatch, Progress, Scope, Snapshot, StartOptions, Token};

/// A replay script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Keep running timers until this time after the last step.
    #[serde(default)]
    pub end_ms: Option<u64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// One timed step. Exactly one of `start`, `update`, `stop`, `probe` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateStep>,
    /// Script id of the operation to stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    /// Only record a snapshot.
    #[serde(default)]
    pub probe: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartStep {
    pub id: String,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub current: Option<i64>,
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStep {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub current: Option<i64>,
    #[serde(default)]
    pub total: Option<i64>,
}

/// What produced a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Start { id: String },
    Update { id: String, applied: bool },
    Stop { id: String, applied: bool },
    Probe,
    /// A reveal or short-variant timer fired.
    Timer,
}

/// Engine state observed at one point of the replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub at_ms: u64,
    pub trigger: Trigger,
    pub snapshot: Snapshot,
}

impl Script {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let script: Self = toml::from_str(content)?;
        script.validate()?;
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Scenario(format!("cannot read script {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Scenario(msg) => Error::Scenario(format!("{}: {msg}", path.display())),
            other => Error::Scenario(format!("bad script {}: {other}", path.display())),
        })
    }

    /// Check ordering and step shape. Id bookkeeping is checked during replay.
    pub fn validate(&self) -> Result<()> {
        let mut last = 0;
        for (index, step) in self.steps.iter().enumerate() {
            if step.at_ms < last {
                return Err(Error::Scenario(format!(
                    "step {index}: at_ms {} is earlier than the previous step ({last})",
                    step.at_ms
                )));
            }
            last = step.at_ms;

            let actions = [
                step.start.is_some(),
                step.update.is_some(),
                step.stop.is_some(),
                step.probe,
            ];
            let count = actions.iter().filter(|set| **set).count();
            if count != 1 {
                return Err(Error::Scenario(format!(
                    "step {index}: expected exactly one of start, update, stop, probe; found {count}"
                )));
            }
        }
        if let Some(end) = self.end_ms
            && end < last
        {
            return Err(Error::Scenario(format!(
                "end_ms {end} is earlier than the last step ({last})"
            )));
        }
        Ok(())
    }
}

fn progress_of(index: usize, current: Option<i64>, total: Option<i64>) -> Result<Option<Progress>> {
    match (current, total) {
        (Some(current), Some(total)) => Ok(Some(Progress::new(current, total))),
        (None, None) => Ok(None),
        _ => Err(Error::Scenario(format!(
            "step {index}: current and total must be given together"
        ))),
    }
}

/// Replay `script` against a fresh engine on a manual clock starting at zero.
pub fn replay(script: &Script, config: EngineConfig) -> Result<Vec<Frame>> {
    script.validate()?;

    let clock = ManualClock::new();
    let engine = LoadingEngine::manual(config, &clock)?;

    let notifications: Arc<Mutex<Vec<(u64, Snapshot)>>> = Arc::default();
    let subscription = {
        let notifications = Arc::clone(&notifications);
        let clock = clock.clone();
        engine.subscribe(move |snapshot| {
            lock(&notifications).push((clock.now_ms(), snapshot.clone()));
        })
    };

    let mut frames = Vec::new();
    let mut tokens: HashMap<String, Token> = HashMap::new();
    let mut live: HashSet<String> = HashSet::new();

    let drain_timer_frames = |frames: &mut Vec<Frame>| {
        for (at_ms, snapshot) in lock(&notifications).drain(..) {
            frames.push(Frame {
                at_ms,
                trigger: Trigger::Timer,
                snapshot,
            });
        }
    };

    for (index, step) in script.steps.iter().enumerate() {
        clock.advance_to(step.at_ms);
        drain_timer_frames(&mut frames);

        let trigger = if let Some(start) = &step.start {
            if !live.insert(start.id.clone()) {
                return Err(Error::Scenario(format!(
                    "step {index}: operation {:?} is already running",
                    start.id
                )));
            }
            let options = StartOptions {
                scope: start.scope.unwrap_or_default(),
                message: start.message.clone(),
                message_key: start.key.clone(),
                progress: progress_of(index, start.current, start.total)?,
            };
            tokens.insert(start.id.clone(), engine.start(options));
            Trigger::Start {
                id: start.id.clone(),
            }
        } else if let Some(update) = &step.update {
            let token = token_for(&tokens, index, &update.id)?;
            let patch = OperationPatch {
                message: update.message.clone(),
                message_key: update.key.clone(),
                progress: progress_of(index, update.current, update.total)?,
            };
            Trigger::Update {
                id: update.id.clone(),
                applied: engine.update(token, patch),
            }
        } else if let Some(id) = &step.stop {
            let token = token_for(&tokens, index, id)?;
            live.remove(id);
            Trigger::Stop {
                id: id.clone(),
                applied: engine.stop(token),
            }
        } else {
            Trigger::Probe
        };

        // The step's own notification is recorded as the step frame below.
        lock(&notifications).clear();
        debug!(index, at_ms = step.at_ms, ?trigger, "replayed step");
        frames.push(Frame {
            at_ms: step.at_ms,
            trigger,
            snapshot: engine.snapshot(),
        });
    }

    if let Some(end) = script.end_ms {
        clock.advance_to(end);
        drain_timer_frames(&mut frames);
    }

    subscription.unsubscribe();
    engine.shutdown();
    Ok(frames)
}

fn token_for(tokens: &HashMap<String, Token>, index: usize, id: &str) -> Result<Token> {
    tokens
        .get(id)
        .copied()
        .ok_or_else(|| Error::Scenario(format!("step {index}: unknown operation {id:?}")))
}
