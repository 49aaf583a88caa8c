//! `SpatialEngine` – the façade the navigation layer talks to.
//!
//! The engine is a free-standing service. It holds no scene state of its
//! own: every call receives the current [`SceneSnapshot`] and agent pose.
//! All methods take `&self`, so one engine can be shared (e.g. behind an
//! `Arc`) by episodes running in parallel; the only state they share is the
//! append-only [`InteractionHistory`] and the counters.
//!
//! Lifecycle events are broadcast as [`EngineEvent`]s. Publishing with no
//! subscribers is normal.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spatial_perception::observation::{NavigationLayer, ObservationPlanner, ObservationReport};
use spatial_types::{
    AgentPose, ClarificationReason, EngineConfig, ObjectRecord, ObservationKind,
    ObservationStrategy, Resolution, SceneSnapshot, SelectionMethod, SpatialError,
};
use tokio::sync::broadcast;
use tracing::{Instrument, Span, debug, info};

use crate::clarification::{
    CancelHandle, ClarificationCoordinator, ClarificationOutcome, EpisodeEnd, ResolutionPath,
};
use crate::history::InteractionHistory;
use crate::resolver::AmbiguityResolver;
use crate::responder::{ClarificationQuestion, ResponderChannel, ResponderError};
use crate::telemetry;

/// Buffered events before slow subscribers start missing them.
const EVENT_CAPACITY: usize = 256;

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Something the engine did, as seen by external subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EngineEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEventKind {
    AmbiguityDetected {
        object_type: String,
        candidates: Vec<String>,
        reason: ClarificationReason,
    },
    ClarificationAsked {
        episode_id: String,
        turn: u32,
        question: String,
    },
    ClarificationResolved(ClarificationOutcome),
    /// Emitted in addition to `ClarificationResolved` when the deadline
    /// elapsed.
    ClarificationTimedOut {
        episode_id: String,
        fallback_id: String,
    },
    ClarificationCancelled {
        episode_id: String,
    },
    PlanEmitted {
        object_id: String,
        kind: ObservationKind,
        viewpoints: usize,
    },
    ObservationFinished {
        object_id: String,
        status: String,
        coverage: f32,
        failures: usize,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Results and stats
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of [`SpatialEngine::select_target`].
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSelection {
    /// The resolver picked the target without asking.
    Resolved {
        object_id: String,
        confidence: f32,
        method: SelectionMethod,
    },
    /// A clarification dialogue picked the target.
    Clarified(ClarificationOutcome),
    /// The caller cancelled the dialogue.
    Cancelled,
}

impl TargetSelection {
    pub fn object_id(&self) -> Option<&str> {
        match self {
            TargetSelection::Resolved { object_id, .. } => Some(object_id),
            TargetSelection::Clarified(outcome) => Some(&outcome.object_id),
            TargetSelection::Cancelled => None,
        }
    }
}

/// Counters since the engine was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Disambiguation calls.
    pub disambiguations: u64,
    /// Calls that needed clarification.
    pub ambiguities: u64,
    /// Clarification episodes settled by an answer.
    pub clarifications_answered: u64,
    /// Clarification episodes settled by fallback (timeout, exhaustion,
    /// responder failure).
    pub fallbacks: u64,
    pub cancellations: u64,
    pub multi_view_plans: u64,
    pub observations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    disambiguations: AtomicU64,
    ambiguities: AtomicU64,
    clarifications_answered: AtomicU64,
    fallbacks: AtomicU64,
    cancellations: AtomicU64,
    multi_view_plans: AtomicU64,
    observations: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ────────────────────────────────────────────────────────────────────────────
// SpatialEngine
// ────────────────────────────────────────────────────────────────────────────

pub struct SpatialEngine {
    config: EngineConfig,
    resolver: AmbiguityResolver,
    planner: ObservationPlanner,
    history: InteractionHistory,
    events: broadcast::Sender<EngineEvent>,
    counters: Counters,
}

impl SpatialEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_history(config, InteractionHistory::new())
    }

    /// Build an engine around an existing (possibly shared) history.
    pub fn with_history(config: EngineConfig, history: InteractionHistory) -> Self {
        let config = config.validate();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            resolver: AmbiguityResolver::new(config.clone(), history.clone()),
            planner: ObservationPlanner::new(config.clone()),
            config,
            history,
            events,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &InteractionHistory {
        &self.history
    }

    pub fn resolver(&self) -> &AmbiguityResolver {
        &self.resolver
    }

    pub fn planner(&self) -> &ObservationPlanner {
        &self.planner
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            disambiguations: c.disambiguations.load(Ordering::Relaxed),
            ambiguities: c.ambiguities.load(Ordering::Relaxed),
            clarifications_answered: c.clarifications_answered.load(Ordering::Relaxed),
            fallbacks: c.fallbacks.load(Ordering::Relaxed),
            cancellations: c.cancellations.load(Ordering::Relaxed),
            multi_view_plans: c.multi_view_plans.load(Ordering::Relaxed),
            observations: c.observations.load(Ordering::Relaxed),
        }
    }

    // ── Disambiguation ──────────────────────────────────────────────────────

    /// Resolve `instruction` among the `object_type` instances in `scene`.
    ///
    /// # Errors
    ///
    /// [`SpatialError::NoCandidates`] when the scene has no such object.
    pub fn disambiguate(
        &self,
        instruction: &str,
        object_type: &str,
        scene: &SceneSnapshot,
        agent: &AgentPose,
    ) -> Result<Resolution, SpatialError> {
        let candidates = self.candidates(object_type, scene)?;
        let resolution = self.resolver.resolve(instruction, &candidates, scene, agent)?;
        self.note_resolution(object_type, &resolution);
        Ok(resolution)
    }

    /// Resolve `instruction`, asking `responder` when the resolver cannot
    /// decide on its own.
    ///
    /// The dialogue always terminates: a silent or failing responder falls
    /// back to the resolver's top-ranked candidate. Cancelling `cancel`
    /// abandons the dialogue and returns [`TargetSelection::Cancelled`].
    ///
    /// Runs inside a `select_target` span.
    pub async fn select_target(
        &self,
        instruction: &str,
        object_type: &str,
        scene: &SceneSnapshot,
        agent: &AgentPose,
        responder: &dyn ResponderChannel,
        cancel: &CancelHandle,
    ) -> Result<TargetSelection, SpatialError> {
        self.select_in_span(instruction, object_type, scene, agent, responder, cancel)
            .instrument(telemetry::selection_span(object_type))
            .await
    }

    async fn select_in_span(
        &self,
        instruction: &str,
        object_type: &str,
        scene: &SceneSnapshot,
        agent: &AgentPose,
        responder: &dyn ResponderChannel,
        cancel: &CancelHandle,
    ) -> Result<TargetSelection, SpatialError> {
        let candidates = self.candidates(object_type, scene)?;
        let assessment = self.resolver.assess(instruction, &candidates, scene, agent)?;
        self.note_resolution(object_type, &assessment.resolution);

        let ranked = match assessment.resolution {
            Resolution::Selected {
                object_id,
                confidence,
                method,
            } => {
                return Ok(TargetSelection::Resolved {
                    object_id,
                    confidence,
                    method,
                });
            }
            Resolution::NeedsClarification { ranked, .. } => ranked,
        };

        let mut coordinator = ClarificationCoordinator::new(&self.config);
        let episode_id = coordinator.begin(&ranked, &assessment.relations)?;
        Span::current().record("episode_id", episode_id.as_str());
        let announcing = Announcing {
            inner: responder,
            events: &self.events,
        };

        match coordinator.run_episode(&announcing, cancel).await? {
            EpisodeEnd::Resolved(outcome) => {
                if outcome.path.is_fallback() {
                    bump(&self.counters.fallbacks);
                } else {
                    bump(&self.counters.clarifications_answered);
                }
                if outcome.path == ResolutionPath::TimedOut {
                    self.publish(EngineEventKind::ClarificationTimedOut {
                        episode_id: outcome.episode_id.clone(),
                        fallback_id: outcome.object_id.clone(),
                    });
                }
                self.publish(EngineEventKind::ClarificationResolved(outcome.clone()));
                Ok(TargetSelection::Clarified(outcome))
            }
            EpisodeEnd::Cancelled => {
                bump(&self.counters.cancellations);
                self.publish(EngineEventKind::ClarificationCancelled { episode_id });
                Ok(TargetSelection::Cancelled)
            }
        }
    }

    // ── Observation ─────────────────────────────────────────────────────────

    /// Plan viewpoints for the object `object_id` in `scene`.
    ///
    /// Malformed geometry degrades to a single default viewpoint.
    ///
    /// # Errors
    ///
    /// [`SpatialError::UnknownObject`] when `object_id` is not in the scene.
    pub fn plan_observation(
        &self,
        object_id: &str,
        scene: &SceneSnapshot,
        agent: &AgentPose,
    ) -> Result<ObservationStrategy, SpatialError> {
        let object = scene
            .get(object_id)
            .ok_or_else(|| SpatialError::UnknownObject(object_id.to_string()))?;
        Ok(self.plan_for(object, agent))
    }

    /// Plan viewpoints for `object` directly.
    pub fn plan_for(&self, object: &ObjectRecord, agent: &AgentPose) -> ObservationStrategy {
        let strategy = self.planner.plan_or_default(object, agent);
        if strategy.kind == ObservationKind::MultiView {
            bump(&self.counters.multi_view_plans);
        }
        self.publish(EngineEventKind::PlanEmitted {
            object_id: strategy.object_id.clone(),
            kind: strategy.kind,
            viewpoints: strategy.viewpoints.len(),
        });
        strategy
    }

    /// Execute `strategy` against `nav` in plan order.
    pub fn observe(
        &self,
        strategy: &ObservationStrategy,
        nav: &mut dyn NavigationLayer,
    ) -> ObservationReport {
        let _span = telemetry::observation_span(&strategy.object_id).entered();
        let report = self.planner.execute(strategy, nav);
        bump(&self.counters.observations);
        self.publish(EngineEventKind::ObservationFinished {
            object_id: report.object_id.clone(),
            status: report.status.as_str().to_string(),
            coverage: report.coverage,
            failures: report.failures.len(),
        });
        report
    }

    /// Remember that `kind` was performed on `object_id`. Returns `true`
    /// when the entry is new.
    pub fn record_interaction(&self, object_id: &str, kind: &str) -> bool {
        self.history.record(object_id, kind)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn candidates<'a>(
        &self,
        object_type: &str,
        scene: &'a SceneSnapshot,
    ) -> Result<Vec<&'a ObjectRecord>, SpatialError> {
        let candidates = scene.candidates_of_type(object_type);
        if candidates.is_empty() {
            return Err(SpatialError::NoCandidates {
                object_type: object_type.to_string(),
            });
        }
        Ok(candidates)
    }

    fn note_resolution(&self, object_type: &str, resolution: &Resolution) {
        bump(&self.counters.disambiguations);
        match resolution {
            Resolution::Selected {
                object_id, method, ..
            } => {
                info!(object_type, object_id = %object_id, method = ?method, "target selected");
            }
            Resolution::NeedsClarification { ranked, reason } => {
                bump(&self.counters.ambiguities);
                info!(object_type, candidates = ranked.len(), reason = reason.as_str(), "needs clarification");
                self.publish(EngineEventKind::AmbiguityDetected {
                    object_type: object_type.to_string(),
                    candidates: ranked.iter().map(|c| c.object_id.clone()).collect(),
                    reason: *reason,
                });
            }
        }
    }

    fn publish(&self, kind: EngineEventKind) {
        publish(&self.events, kind);
    }
}

fn publish(events: &broadcast::Sender<EngineEvent>, kind: EngineEventKind) {
    let receivers = events
        .send(EngineEvent {
            timestamp: Utc::now(),
            kind,
        })
        .unwrap_or(0);
    debug!(receivers, "engine event published");
}

/// Announces every question on the event channel before delegating.
struct Announcing<'a> {
    inner: &'a dyn ResponderChannel,
    events: &'a broadcast::Sender<EngineEvent>,
}

#[async_trait]
impl ResponderChannel for Announcing<'_> {
    async fn ask_and_wait(&self, question: &ClarificationQuestion) -> Result<String, ResponderError> {
        publish(
            self.events,
            EngineEventKind::ClarificationAsked {
                episode_id: question.episode_id.clone(),
                turn: question.turn,
                question: question.text.clone(),
            },
        );
        self.inner.ask_and_wait(question).await
    }
}
