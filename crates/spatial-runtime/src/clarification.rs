//! Clarification dialogue state machine.
//!
//! ```text
//!   Idle ──begin──▶ AmbiguityDetected ──ask──▶ AwaitingClarification
//!    ▲                                          │      ▲
//!    │                          unparseable,    │      │ re-ask
//!    │                          turns left      └──────┘
//!    │                                          │
//!    └──take_resolution── Resolved ◀────────────┘ answer / deadline / max turns
//! ```
//!
//! Every episode terminates: an answer that names a candidate resolves it,
//! and both an elapsed deadline and the last unparseable answer fall back to
//! the resolver's top-ranked candidate. From `AmbiguityDetected` an episode
//! needs at most `max_clarification_turns + 1` transitions to reach
//! `Resolved`.
//!
//! The synchronous methods ([`begin`], [`ask`], [`submit_response`],
//! [`check_deadline`]) let a caller drive the dialogue from its own loop.
//! [`run_episode`] drives it against a [`ResponderChannel`] under a tokio
//! deadline and a [`CancelHandle`].
//!
//! [`begin`]: ClarificationCoordinator::begin
//! [`ask`]: ClarificationCoordinator::ask
//! [`submit_response`]: ClarificationCoordinator::submit_response
//! [`check_deadline`]: ClarificationCoordinator::check_deadline
//! [`run_episode`]: ClarificationCoordinator::run_episode

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spatial_perception::relations::{ContainmentKind, RelationRecord};
use spatial_types::{CandidateScore, Direction, EngineConfig, SpatialError};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::instruction::InstructionParser;
use crate::responder::{ClarificationQuestion, ResponderChannel};

/// Bearings or distances closer than this are treated as a tie when an
/// answer names a direction.
const EXTREME_TIE_EPSILON: f32 = 1e-3;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueState {
    Idle,
    AmbiguityDetected,
    AwaitingClarification,
    Resolved,
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DialogueState::Idle => "idle",
            DialogueState::AmbiguityDetected => "ambiguity_detected",
            DialogueState::AwaitingClarification => "awaiting_clarification",
            DialogueState::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// How an episode reached `Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// The responder named a candidate.
    Answered,
    /// The turn deadline elapsed; top-ranked candidate taken.
    TimedOut,
    /// Every turn was spent on unparseable answers; top-ranked candidate
    /// taken.
    Exhausted,
    /// The responder channel failed; top-ranked candidate taken.
    ResponderUnavailable,
}

impl ResolutionPath {
    pub fn is_fallback(self) -> bool {
        !matches!(self, ResolutionPath::Answered)
    }
}

/// Final result of a clarification episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationOutcome {
    pub episode_id: String,
    pub object_id: String,
    pub path: ResolutionPath,
    /// Questions asked.
    pub turns: u32,
    pub resolved_at: DateTime<Utc>,
}

/// Result of feeding one answer to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueStep {
    /// Unparseable answer; ask this follow-up.
    Reask(ClarificationQuestion),
    Resolved(ClarificationOutcome),
}

/// How [`ClarificationCoordinator::run_episode`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeEnd {
    Resolved(ClarificationOutcome),
    Cancelled,
}

/// One pending candidate, in ranked order.
#[derive(Debug, Clone, PartialEq)]
struct PendingCandidate {
    object_id: String,
    relation: Option<RelationRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// CancelHandle
// ────────────────────────────────────────────────────────────────────────────

/// Cooperative cancellation for running episodes. Clone it freely; one
/// handle may be shared by several concurrent episodes and cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Completes once [`cancel`][Self::cancel] has been called.
    pub async fn cancelled(&self) {
        loop {
            // Enabled before the flag check: `notify_waiters` stores no permit.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ClarificationCoordinator
// ────────────────────────────────────────────────────────────────────────────

/// Owns the dialogue state of one clarification episode at a time.
#[derive(Debug)]
pub struct ClarificationCoordinator {
    max_turns: u32,
    timeout: Duration,
    parser: InstructionParser,

    state: DialogueState,
    episode_id: String,
    pending: Vec<PendingCandidate>,
    question: Option<ClarificationQuestion>,
    turn: u32,
    deadline: Option<Instant>,
    transitions: u32,
    outcome: Option<ClarificationOutcome>,
}

impl ClarificationCoordinator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_turns: config.max_clarification_turns.max(1),
            timeout: Duration::from_secs(config.clarification_timeout_seconds),
            parser: InstructionParser::new(),
            state: DialogueState::Idle,
            episode_id: String::new(),
            pending: Vec::new(),
            question: None,
            turn: 0,
            deadline: None,
            transitions: 0,
            outcome: None,
        }
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    /// 1-based turn of the outstanding question; `0` before the first ask.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// State transitions since `begin`.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub fn pending_question(&self) -> Option<&ClarificationQuestion> {
        self.question.as_ref()
    }

    /// Ids of the pending candidates, best first.
    pub fn pending_candidates(&self) -> Vec<&str> {
        self.pending.iter().map(|p| p.object_id.as_str()).collect()
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    /// `Idle → AmbiguityDetected`. Returns the new episode id.
    ///
    /// `ranked` is the resolver's ranked list; `relations` describes those
    /// candidates relative to the agent.
    pub fn begin(
        &mut self,
        ranked: &[CandidateScore],
        relations: &BTreeMap<String, RelationRecord>,
    ) -> Result<String, SpatialError> {
        if self.state != DialogueState::Idle {
            return Err(SpatialError::EpisodeInProgress);
        }
        if ranked.is_empty() {
            return Err(SpatialError::NoCandidates {
                object_type: String::new(),
            });
        }

        self.episode_id = Uuid::new_v4().to_string();
        self.pending = ranked
            .iter()
            .map(|c| PendingCandidate {
                object_id: c.object_id.clone(),
                relation: relations.get(&c.object_id).cloned(),
            })
            .collect();
        self.turn = 0;
        self.transitions = 0;
        self.state = DialogueState::AmbiguityDetected;
        info!(
            episode_id = %self.episode_id,
            candidates = self.pending.len(),
            "ambiguity detected"
        );
        Ok(self.episode_id.clone())
    }

    /// `AmbiguityDetected → AwaitingClarification`: compose the first
    /// question and arm the deadline.
    pub fn ask(&mut self) -> Result<ClarificationQuestion, SpatialError> {
        self.expect_state(DialogueState::AmbiguityDetected, "ask")?;
        self.turn = 1;
        let question = self.compose_question();
        self.arm(question.clone());
        self.state = DialogueState::AwaitingClarification;
        self.transitions += 1;
        info!(episode_id = %self.episode_id, turn = self.turn, "clarification asked");
        Ok(question)
    }

    /// Feed one answer while `AwaitingClarification`.
    ///
    /// The answer is tried as a candidate number, then a direction word, then
    /// a landmark mention. An unparseable answer re-asks a narrower question
    /// until the turn limit, after which the top-ranked candidate is taken.
    /// An answer arriving after the deadline resolves as a timeout.
    pub fn submit_response(&mut self, text: &str) -> Result<DialogueStep, SpatialError> {
        self.expect_state(DialogueState::AwaitingClarification, "submit a response")?;

        if let Some(outcome) = self.check_deadline() {
            return Ok(DialogueStep::Resolved(outcome));
        }

        if let Some(index) = self.interpret(text) {
            let id = self.pending[index].object_id.clone();
            return Ok(DialogueStep::Resolved(self.resolve(id, ResolutionPath::Answered)));
        }

        if self.turn >= self.max_turns {
            warn!(
                episode_id = %self.episode_id,
                turns = self.turn,
                "clarification turns exhausted; falling back to top-ranked candidate"
            );
            return Ok(DialogueStep::Resolved(self.fallback(ResolutionPath::Exhausted)));
        }

        self.turn += 1;
        self.transitions += 1;
        let question = self.compose_question();
        self.arm(question.clone());
        debug!(episode_id = %self.episode_id, turn = self.turn, answer = text, "answer not understood");
        Ok(DialogueStep::Reask(question))
    }

    /// Resolve by timeout if the armed deadline has passed.
    pub fn check_deadline(&mut self) -> Option<ClarificationOutcome> {
        if self.state != DialogueState::AwaitingClarification {
            return None;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!(
                    episode_id = %self.episode_id,
                    turn = self.turn,
                    "clarification timed out; falling back to top-ranked candidate"
                );
                Some(self.fallback(ResolutionPath::TimedOut))
            }
            _ => None,
        }
    }

    /// Resolve via fallback because the responder channel failed.
    pub fn responder_failed(&mut self, reason: &str) -> Result<ClarificationOutcome, SpatialError> {
        self.expect_state(DialogueState::AwaitingClarification, "handle a responder failure")?;
        warn!(episode_id = %self.episode_id, reason, "responder unavailable; falling back");
        Ok(self.fallback(ResolutionPath::ResponderUnavailable))
    }

    /// Abandon the episode before it resolves. Returns `false` when there is
    /// nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        if !matches!(
            self.state,
            DialogueState::AmbiguityDetected | DialogueState::AwaitingClarification
        ) {
            return false;
        }
        info!(episode_id = %self.episode_id, "clarification cancelled");
        self.reset();
        true
    }

    /// `Resolved → Idle`, handing the outcome to the caller.
    pub fn take_resolution(&mut self) -> Option<ClarificationOutcome> {
        if self.state != DialogueState::Resolved {
            return None;
        }
        let outcome = self.outcome.take();
        self.reset();
        outcome
    }

    // ── Async driver ────────────────────────────────────────────────────────

    /// Run the whole dialogue against `responder`, starting from
    /// `AmbiguityDetected` and ending back in `Idle`.
    ///
    /// Each responder call is bounded by the turn deadline. Cancelling
    /// `cancel` at any point abandons the episode without a resolution.
    pub async fn run_episode(
        &mut self,
        responder: &dyn ResponderChannel,
        cancel: &CancelHandle,
    ) -> Result<EpisodeEnd, SpatialError> {
        let mut question = self.ask()?;

        loop {
            let deadline = self.deadline.unwrap_or_else(|| Instant::now() + self.timeout);
            let reply = tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancel();
                    return Ok(EpisodeEnd::Cancelled);
                }
                r = tokio::time::timeout_at(deadline, responder.ask_and_wait(&question)) => r,
            };

            let step = match reply {
                Err(_elapsed) => match self.check_deadline() {
                    Some(outcome) => DialogueStep::Resolved(outcome),
                    None => DialogueStep::Resolved(self.fallback(ResolutionPath::TimedOut)),
                },
                Ok(Err(e)) => DialogueStep::Resolved(self.responder_failed(&e.to_string())?),
                Ok(Ok(text)) => self.submit_response(&text)?,
            };

            match step {
                DialogueStep::Reask(next) => question = next,
                DialogueStep::Resolved(_) => {
                    return self
                        .take_resolution()
                        .map(EpisodeEnd::Resolved)
                        .ok_or_else(|| SpatialError::InvalidTransition {
                            from: self.state.to_string(),
                            action: "take the resolution".to_string(),
                        });
                }
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn expect_state(&self, expected: DialogueState, action: &str) -> Result<(), SpatialError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SpatialError::InvalidTransition {
                from: self.state.to_string(),
                action: action.to_string(),
            })
        }
    }

    fn arm(&mut self, question: ClarificationQuestion) {
        self.deadline = Some(Instant::now() + self.timeout);
        self.question = Some(question);
    }

    fn fallback(&mut self, path: ResolutionPath) -> ClarificationOutcome {
        let id = self.pending[0].object_id.clone();
        self.resolve(id, path)
    }

    fn resolve(&mut self, object_id: String, path: ResolutionPath) -> ClarificationOutcome {
        let outcome = ClarificationOutcome {
            episode_id: self.episode_id.clone(),
            object_id,
            path,
            turns: self.turn,
            resolved_at: Utc::now(),
        };
        self.state = DialogueState::Resolved;
        self.deadline = None;
        self.transitions += 1;
        self.outcome = Some(outcome.clone());
        info!(
            episode_id = %outcome.episode_id,
            object_id = %outcome.object_id,
            path = ?outcome.path,
            turns = outcome.turns,
            "clarification resolved"
        );
        outcome
    }

    fn reset(&mut self) {
        self.state = DialogueState::Idle;
        self.pending.clear();
        self.question = None;
        self.deadline = None;
        self.turn = 0;
        self.outcome = None;
    }

    /// Index into `pending` named by `text`, if any.
    fn interpret(&self, text: &str) -> Option<usize> {
        if let Some(ordinal) = self.parser.parse_index(text) {
            if let Some(pos) = ordinal.position(self.pending.len()) {
                return Some(pos);
            }
        }
        let direction = self.parser.parse(text).direction;
        if direction != Direction::None
            && let Some(index) = self.unique_extreme(direction)
        {
            return Some(index);
        }
        let landmark = self.parser.mentioned_landmark(text)?;
        let hits: Vec<usize> = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.relation.as_ref().is_some_and(|r| r.has_landmark(&landmark)))
            .map(|(i, _)| i)
            .collect();
        (hits.len() == 1).then(|| hits[0])
    }

    /// The candidate that is strictly the most `direction` of all.
    fn unique_extreme(&self, direction: Direction) -> Option<usize> {
        let mut values: Vec<(usize, f32)> = self
            .pending
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let r = p.relation.as_ref()?;
                let v = match direction {
                    Direction::Left => -r.bearing_deg,
                    Direction::Right => r.bearing_deg,
                    Direction::Front => -r.bearing_deg.abs(),
                    Direction::Back => r.bearing_deg.abs(),
                    Direction::Near => -r.distance,
                    Direction::Far => r.distance,
                    Direction::None => return None,
                };
                Some((i, v))
            })
            .collect();
        values.sort_by(|a, b| b.1.total_cmp(&a.1));
        match values.as_slice() {
            [only] => Some(only.0),
            [best, second, ..] if best.1 - second.1 > EXTREME_TIE_EPSILON => Some(best.0),
            _ => None,
        }
    }

    fn compose_question(&self) -> ClarificationQuestion {
        let n = self.pending.len();
        let numbers: Vec<String> = (1..=n).map(|i| i.to_string()).collect();

        let (text, answer_tokens) = if self.turn <= 1 {
            let options: Vec<String> = self
                .pending
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{}) {}", i + 1, self.describe(p)))
                .collect();
            let mut tokens = numbers;
            for d in [Direction::Left, Direction::Right, Direction::Front, Direction::Back] {
                if self.unique_extreme(d).is_some() {
                    tokens.push(d.as_str().to_string());
                }
            }
            for landmark in self.distinguishing_landmarks() {
                tokens.push(landmark);
            }
            (
                format!(
                    "I found {n} matching objects. Which one do you mean? {}",
                    options.join("; ")
                ),
                tokens,
            )
        } else {
            (
                format!(
                    "Sorry, I did not understand. Please reply with a single number from 1 to {n} (turn {} of {}).",
                    self.turn, self.max_turns
                ),
                numbers,
            )
        };

        ClarificationQuestion {
            episode_id: self.episode_id.clone(),
            text,
            answer_tokens,
            turn: self.turn,
        }
    }

    fn describe(&self, p: &PendingCandidate) -> String {
        let Some(r) = &p.relation else {
            return p.object_id.clone();
        };
        let place = match r.sector() {
            "front" => "ahead of you",
            "right" => "on your right",
            "left" => "on your left",
            _ => "behind you",
        };
        let mut out = format!("the one {place}, {:.1} m away", r.distance);
        if let Some(l) = r.nearby_landmarks.first() {
            out.push_str(&format!(", near the {}", l.landmark_type));
        }
        if let Some(c) = &r.container {
            let prep = match c.kind {
                ContainmentKind::On => "on",
                ContainmentKind::In => "in",
            };
            out.push_str(&format!(", {prep} the {}", c.container_type));
        }
        out
    }

    /// Landmark types next to exactly one pending candidate (lowercase).
    fn distinguishing_landmarks(&self) -> Vec<String> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for p in &self.pending {
            if let Some(r) = &p.relation {
                let mut seen: Vec<String> = r
                    .nearby_landmarks
                    .iter()
                    .map(|l| l.landmark_type.to_ascii_lowercase())
                    .collect();
                seen.sort();
                seen.dedup();
                for t in seen {
                    *counts.entry(t).or_default() += 1;
                }
            }
        }
        counts
            .into_iter()
            .filter(|(_, c)| *c == 1)
            .map(|(t, _)| t)
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
