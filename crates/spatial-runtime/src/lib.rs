//! `spatial-runtime` – disambiguation and clarification orchestration.
//!
//! Turns a free-text instruction and a scene snapshot into one target object,
//! asking a responder when the scene alone cannot decide, then plans how to
//! observe that target.
//!
//! # Modules
//!
//! - [`instruction`] – [`InstructionParser`]: bilingual (English/Chinese)
//!   keyword extraction of direction, landmark, container, ordinal and state
//!   constraints.
//! - [`resolver`] – [`AmbiguityResolver`]: constraint scoring with a margin
//!   test, then a weighted composite score with a confidence threshold.
//!   Malformed candidates are excluded, never fatal.
//! - [`clarification`] – [`ClarificationCoordinator`]: the bounded
//!   `Idle → AmbiguityDetected → AwaitingClarification → Resolved` dialogue,
//!   with deadline fallback and cooperative cancellation.
//! - [`responder`] – the [`ResponderChannel`] capability shared by human and
//!   model responders, plus scripted and channel-backed implementations.
//! - [`history`] – [`InteractionHistory`]: the append-only record of objects
//!   already handled, shared between concurrent episodes.
//! - [`engine`] – [`SpatialEngine`]: the façade tying the above to the
//!   observation planner, with counters and an event broadcast.
//! - [`config`] – TOML loading/saving of [`EngineConfig`] with `SPATIAL_*`
//!   environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: tracing
//!   subscriber with optional OTLP export, and the `select_target` /
//!   `observe` spans the engine opens.
//!
//! # Example
//!
//! ```rust
//! use spatial_runtime::SpatialEngine;
//! use spatial_types::{AgentPose, BoundingSize, EngineConfig, ObjectRecord, SceneSnapshot, Vec3};
//!
//! let scene = SceneSnapshot::new(vec![
//!     ObjectRecord::new("Book|1", "Book", Vec3::new(-1.0, 0.8, 2.0), BoundingSize::new(0.2, 0.05, 0.3)),
//!     ObjectRecord::new("Book|2", "Book", Vec3::new(0.0, 0.8, 2.0), BoundingSize::new(0.2, 0.05, 0.3)),
//!     ObjectRecord::new("Book|3", "Book", Vec3::new(1.0, 0.8, 2.0), BoundingSize::new(0.2, 0.05, 0.3)),
//! ])
//! .unwrap();
//! let agent = AgentPose::new(Vec3::zero(), 0.0);
//!
//! let engine = SpatialEngine::new(EngineConfig::default());
//! let resolution = engine
//!     .disambiguate("pick up the left book", "Book", &scene, &agent)
//!     .unwrap();
//! assert_eq!(resolution.selected_id(), Some("Book|1"));
//! ```

pub mod clarification;
pub mod config;
pub mod engine;
pub mod history;
pub mod instruction;
pub mod resolver;
pub mod responder;
pub mod telemetry;

pub use clarification::{
    CancelHandle, ClarificationCoordinator, ClarificationOutcome, DialogueState, DialogueStep,
    EpisodeEnd, ResolutionPath,
};
pub use config::ConfigError;
pub use engine::{EngineEvent, EngineEventKind, EngineStats, SpatialEngine, TargetSelection};
pub use history::InteractionHistory;
pub use instruction::InstructionParser;
pub use resolver::{AmbiguityResolver, Assessment};
pub use responder::{
    ChannelResponder, ClarificationQuestion, PendingQuestion, ResponderChannel, ResponderError,
    ScriptedResponder,
};
pub use telemetry::{LogFormat, TelemetrySettings, TracerProviderGuard, init_tracing};

pub use spatial_types::EngineConfig;
