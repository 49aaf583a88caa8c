//! Multi-criteria ambiguity resolution.
//!
//! # Algorithm
//!
//! 1. One candidate (or one well-formed candidate) is selected outright.
//! 2. Candidates with malformed geometry are excluded with a logged reason.
//!    If none remain, the closest visible candidate is taken as a fallback.
//! 3. If the instruction carries constraints, every candidate is scored
//!    against them. The top candidate is selected when it leads the
//!    runner-up by at least the configured gap.
//! 4. Otherwise a composite score is computed:
//!    `0.3·visibility + 0.2·proximity + 0.2·accessibility + 0.3·context`,
//!    halved for candidates already interacted with. Proximity is 1 within
//!    `near_distance`, 0 beyond `far_distance` and linear in between. The top
//!    candidate is selected when it exceeds the confidence threshold and is
//!    not tied with the runner-up.
//! 5. Anything else is returned as [`Resolution::NeedsClarification`] with
//!    the ranked list.
//!
//! Ties are always broken by ascending object id, so identical inputs give
//! identical outputs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use spatial_perception::frame::YawFrame;
use spatial_perception::geometry::GeometryAnalyzer;
use spatial_perception::relations::{ContainmentKind, RelationRecord, SpatialRelationCalculator};
use spatial_types::{
    AgentPose, CandidateScore, ClarificationReason, Direction, EngineConfig, ObjectRecord,
    Resolution, SceneSnapshot, SelectionMethod, SpatialConstraint, SpatialError, StateHint,
};
use tracing::{debug, info, warn};

use crate::history::InteractionHistory;
use crate::instruction::InstructionParser;

const W_VISIBILITY: f32 = 0.3;
const W_PROXIMITY: f32 = 0.2;
const W_ACCESSIBILITY: f32 = 0.2;
const W_CONTEXT: f32 = 0.3;

/// Context score used when the instruction has no constraints.
const NEUTRAL_CONTEXT: f32 = 0.5;
/// Accessibility of an object inside a closed receptacle.
const ENCLOSED_ACCESSIBILITY: f32 = 0.5;
/// Composite totals closer than this count as a tie.
const TIE_EPSILON: f32 = 1e-6;

/// Everything the resolver worked out for one call.
///
/// The clarification coordinator reuses `relations` to describe candidates
/// and to interpret answers.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub resolution: Resolution,
    pub constraint: SpatialConstraint,
    /// Relations of the well-formed candidates to the agent.
    pub relations: BTreeMap<String, RelationRecord>,
    /// Ids excluded for malformed geometry.
    pub excluded: Vec<String>,
}

/// Scores and ranks same-type candidates.
#[derive(Debug, Clone)]
pub struct AmbiguityResolver {
    config: EngineConfig,
    parser: InstructionParser,
    analyzer: GeometryAnalyzer,
    relations: SpatialRelationCalculator,
    history: InteractionHistory,
}

impl AmbiguityResolver {
    pub fn new(config: EngineConfig, history: InteractionHistory) -> Self {
        let config = config.validate();
        Self {
            parser: InstructionParser::new(),
            analyzer: GeometryAnalyzer::new(&config),
            relations: SpatialRelationCalculator::new(&config),
            config,
            history,
        }
    }

    pub fn parser(&self) -> &InstructionParser {
        &self.parser
    }

    /// Resolve `instruction` against `candidates`.
    ///
    /// # Errors
    ///
    /// [`SpatialError::NoCandidates`] when `candidates` is empty.
    pub fn resolve(
        &self,
        instruction: &str,
        candidates: &[&ObjectRecord],
        scene: &SceneSnapshot,
        agent: &AgentPose,
    ) -> Result<Resolution, SpatialError> {
        self.assess(instruction, candidates, scene, agent)
            .map(|a| a.resolution)
    }

    /// Like [`resolve`][Self::resolve], returning the intermediate results too.
    pub fn assess(
        &self,
        instruction: &str,
        candidates: &[&ObjectRecord],
        scene: &SceneSnapshot,
        agent: &AgentPose,
    ) -> Result<Assessment, SpatialError> {
        let Some(first) = candidates.first() else {
            return Err(SpatialError::NoCandidates {
                object_type: String::new(),
            });
        };
        let frame = YawFrame::from_agent(agent);

        if candidates.len() == 1 {
            return Ok(Assessment {
                resolution: single(&first.id),
                constraint: SpatialConstraint::default(),
                relations: self.relations.relations(&frame, candidates, scene),
                excluded: Vec::new(),
            });
        }

        // ── Exclude malformed candidates ────────────────────────────────────
        let mut valid: Vec<&ObjectRecord> = Vec::with_capacity(candidates.len());
        let mut excluded = Vec::new();
        for &obj in candidates {
            match self.analyzer.analyze(obj) {
                Ok(_) => valid.push(obj),
                Err(e) => {
                    warn!(object_id = %obj.id, reason = %e, "candidate excluded from scoring");
                    excluded.push(obj.id.clone());
                }
            }
        }

        if valid.is_empty() {
            let fallback = closest_visible(candidates, agent);
            warn!(object_id = %fallback.id, "all candidates malformed; closest visible selected");
            return Ok(Assessment {
                resolution: Resolution::Selected {
                    object_id: fallback.id.clone(),
                    confidence: 0.0,
                    method: SelectionMethod::Fallback,
                },
                constraint: SpatialConstraint::default(),
                relations: BTreeMap::new(),
                excluded,
            });
        }

        let relations = self.relations.relations(&frame, &valid, scene);
        if valid.len() == 1 {
            return Ok(Assessment {
                resolution: single(&valid[0].id),
                constraint: SpatialConstraint::default(),
                relations,
                excluded,
            });
        }

        let constraint = self.parser.parse(instruction);

        // ── Constraint pass ─────────────────────────────────────────────────
        let mut constraint_scores: BTreeMap<String, (f32, BTreeMap<String, f32>)> = BTreeMap::new();
        if !constraint.is_empty() {
            constraint_scores = self.constraint_scores(&constraint, &valid, &relations);
            let mut ranked: Vec<(&String, f32)> =
                constraint_scores.iter().map(|(id, (s, _))| (id, *s)).collect();
            ranked.sort_by(|a, b| by_score_then_id(a.1, a.0, b.1, b.0));

            let (top_id, top) = ranked[0];
            let runner_up = ranked.get(1).map_or(0.0, |r| r.1);
            debug!(top_id = %top_id, top, runner_up, "constraint pass");
            if top - runner_up >= self.config.confidence_gap_threshold {
                info!(object_id = %top_id, confidence = top, "selected by constraint");
                return Ok(Assessment {
                    resolution: Resolution::Selected {
                        object_id: top_id.clone(),
                        confidence: top,
                        method: SelectionMethod::Constraint,
                    },
                    constraint,
                    relations,
                    excluded,
                });
            }
        }

        // ── Composite pass ──────────────────────────────────────────────────
        let ranked = self.composite_scores(&constraint, &valid, &relations, &constraint_scores);
        let top = &ranked[0];
        let tied = ranked
            .get(1)
            .is_some_and(|r| top.total_score - r.total_score <= TIE_EPSILON);

        let resolution = if top.total_score > self.config.confidence_threshold && !tied {
            info!(object_id = %top.object_id, confidence = top.total_score, "selected by composite score");
            Resolution::Selected {
                object_id: top.object_id.clone(),
                confidence: top.total_score,
                method: SelectionMethod::Composite,
            }
        } else {
            let reason = if constraint.is_empty() {
                ClarificationReason::NoContext
            } else {
                ClarificationReason::LowConfidence
            };
            info!(
                candidates = ranked.len(),
                top = top.total_score,
                reason = reason.as_str(),
                tied,
                "clarification needed"
            );
            Resolution::NeedsClarification { ranked, reason }
        };

        Ok(Assessment {
            resolution,
            constraint,
            relations,
            excluded,
        })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Constraint scoring
    // ────────────────────────────────────────────────────────────────────────

    /// Mean of the present constraint components per candidate, with the
    /// components themselves.
    fn constraint_scores(
        &self,
        constraint: &SpatialConstraint,
        candidates: &[&ObjectRecord],
        relations: &BTreeMap<String, RelationRecord>,
    ) -> BTreeMap<String, (f32, BTreeMap<String, f32>)> {
        let direction = (constraint.direction != Direction::None)
            .then(|| self.direction_scores(constraint.direction, candidates, relations));
        let left_to_right = left_to_right(candidates, relations);

        candidates
            .iter()
            .map(|obj| {
                let rel = relations.get(&obj.id);
                let mut parts = BTreeMap::new();

                if let Some(scores) = &direction {
                    parts.insert("direction".to_string(), scores.get(&obj.id).copied().unwrap_or(0.0));
                }
                if let Some(landmark) = &constraint.landmark_type {
                    let s = rel
                        .and_then(|r| r.nearest_landmark_distance(landmark))
                        .map_or(0.0, |d| 1.0 - 0.5 * d / self.config.landmark_radius.max(f32::EPSILON));
                    parts.insert("landmark".to_string(), s.clamp(0.0, 1.0));
                }
                if let Some(container) = &constraint.container_type {
                    let needle = container.to_ascii_lowercase();
                    let hit = rel
                        .and_then(|r| r.container.as_ref())
                        .is_some_and(|c| c.container_type.to_ascii_lowercase().contains(&needle));
                    parts.insert("container".to_string(), if hit { 1.0 } else { 0.0 });
                }
                if let Some(ordinal) = constraint.ordinal {
                    let hit = ordinal
                        .position(left_to_right.len())
                        .is_some_and(|pos| left_to_right[pos] == obj.id);
                    parts.insert("ordinal".to_string(), if hit { 1.0 } else { 0.0 });
                }
                if let Some(state) = constraint.state {
                    let used = self.history.was_used(obj);
                    let hit = match state {
                        StateHint::Fresh => !used,
                        StateHint::Revisit => used,
                    };
                    parts.insert("state".to_string(), if hit { 1.0 } else { 0.0 });
                }

                let total = if parts.is_empty() {
                    0.0
                } else {
                    parts.values().sum::<f32>() / parts.len() as f32
                };
                (obj.id.clone(), (total, parts))
            })
            .collect()
    }

    /// Half sign match, half rank among the candidates.
    fn direction_scores(
        &self,
        direction: Direction,
        candidates: &[&ObjectRecord],
        relations: &BTreeMap<String, RelationRecord>,
    ) -> BTreeMap<String, f32> {
        let dead = self.config.direction_dead_zone_degrees;
        let measured: Vec<(&str, f32, bool)> = candidates
            .iter()
            .filter_map(|obj| relations.get(&obj.id).map(|r| (obj.id.as_str(), r)))
            .map(|(id, r)| {
                let b = r.bearing_deg;
                let (value, matches) = match direction {
                    Direction::Left => (-b, b < -dead),
                    Direction::Right => (b, b > dead),
                    Direction::Front => (-b.abs(), b.abs() < 90.0 - dead),
                    Direction::Back => (b.abs(), b.abs() > 90.0 + dead),
                    Direction::Near => (-r.distance, r.distance <= self.config.near_distance),
                    Direction::Far => (r.distance, r.distance >= self.config.far_distance),
                    Direction::None => (0.0, false),
                };
                (id, value, matches)
            })
            .collect();

        let lo = measured.iter().map(|m| m.1).fold(f32::INFINITY, f32::min);
        let hi = measured.iter().map(|m| m.1).fold(f32::NEG_INFINITY, f32::max);
        let span = hi - lo;

        measured
            .into_iter()
            .map(|(id, value, matches)| {
                let rank = if span > f32::EPSILON { (value - lo) / span } else { 0.5 };
                let sign = if matches { 1.0 } else { 0.0 };
                (id.to_string(), 0.5 * sign + 0.5 * rank)
            })
            .collect()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Composite scoring
    // ────────────────────────────────────────────────────────────────────────

    fn composite_scores(
        &self,
        constraint: &SpatialConstraint,
        candidates: &[&ObjectRecord],
        relations: &BTreeMap<String, RelationRecord>,
        constraint_scores: &BTreeMap<String, (f32, BTreeMap<String, f32>)>,
    ) -> Vec<CandidateScore> {
        let revisit = constraint.state == Some(StateHint::Revisit);

        let mut ranked: Vec<CandidateScore> = candidates
            .iter()
            .map(|obj| {
                let rel = relations.get(&obj.id);
                let visibility = if obj.visible { 1.0 } else { 0.0 };
                let proximity = rel.map_or(1.0, |r| self.proximity(r.distance));
                let accessibility = match rel.and_then(|r| r.container.as_ref()) {
                    Some(c) if c.kind == ContainmentKind::In => ENCLOSED_ACCESSIBILITY,
                    _ => 1.0,
                };
                let (context, mut parts) = match constraint_scores.get(&obj.id) {
                    Some((score, parts)) => (*score, parts.clone()),
                    None => (NEUTRAL_CONTEXT, BTreeMap::new()),
                };

                let mut total = W_VISIBILITY * visibility
                    + W_PROXIMITY * proximity
                    + W_ACCESSIBILITY * accessibility
                    + W_CONTEXT * context;

                let used = self.history.was_used(obj);
                // Revisit flips the penalty onto untouched instances.
                if used != revisit {
                    total *= self.config.history_penalty;
                }

                parts.insert("visibility".to_string(), visibility);
                parts.insert("proximity".to_string(), proximity);
                parts.insert("accessibility".to_string(), accessibility);
                parts.insert("context".to_string(), context);

                CandidateScore {
                    object_id: obj.id.clone(),
                    total_score: total.clamp(0.0, 1.0),
                    component_scores: parts,
                    used_in_history: used,
                }
            })
            .collect();

        ranked.sort_by(|a, b| by_score_then_id(a.total_score, &a.object_id, b.total_score, &b.object_id));
        ranked
    }

    /// Absolute closeness on the configured near/far scale, independent of
    /// which other candidates are in the set.
    fn proximity(&self, distance: f32) -> f32 {
        let near = self.config.near_distance;
        let span = self.config.far_distance - near;
        if span <= f32::EPSILON {
            return if distance <= near { 1.0 } else { 0.0 };
        }
        (1.0 - (distance - near) / span).clamp(0.0, 1.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn single(id: &str) -> Resolution {
    info!(object_id = %id, "single candidate selected");
    Resolution::Selected {
        object_id: id.to_string(),
        confidence: 1.0,
        method: SelectionMethod::SingleCandidate,
    }
}

/// Descending score, then ascending id.
fn by_score_then_id(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

/// Candidate ids ordered by bearing from the agent's left to right.
pub fn left_to_right(
    candidates: &[&ObjectRecord],
    relations: &BTreeMap<String, RelationRecord>,
) -> Vec<String> {
    let mut ids: Vec<(f32, &str)> = candidates
        .iter()
        .map(|o| (relations.get(&o.id).map_or(0.0, |r| r.bearing_deg), o.id.as_str()))
        .collect();
    ids.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    ids.into_iter().map(|(_, id)| id.to_string()).collect()
}

/// Visible candidates first, then by distance to the agent, then id.
fn closest_visible<'a>(candidates: &[&'a ObjectRecord], agent: &AgentPose) -> &'a ObjectRecord {
    let distance = |o: &ObjectRecord| {
        if o.center.is_finite() {
            agent.position.planar_distance(o.center)
        } else if o.distance_to_agent.is_finite() {
            o.distance_to_agent
        } else {
            f32::INFINITY
        }
    };
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        b.visible
            .cmp(&a.visible)
            .then_with(|| distance(*a).total_cmp(&distance(*b)))
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted[0]
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_types::{BoundingSize, Vec3};

    fn book(id: &str, x: f32, z: f32) -> ObjectRecord {
        ObjectRecord::new(id, "Book", Vec3::new(x, 0.8, z), BoundingSize::new(0.2, 0.05, 0.3))
    }

    fn agent() -> AgentPose {
        AgentPose::new(Vec3::zero(), 0.0)
    }

    fn resolver() -> AmbiguityResolver {
        AmbiguityResolver::new(EngineConfig::default(), InteractionHistory::new())
    }

    fn three_books() -> SceneSnapshot {
        SceneSnapshot::new(vec![
            book("Book|a", -1.0, 2.0),
            book("Book|b", 0.0, 2.0),
            book("Book|c", 1.0, 2.0),
        ])
        .unwrap()
    }

    fn resolve(r: &AmbiguityResolver, scene: &SceneSnapshot, text: &str) -> Resolution {
        let candidates = scene.candidates_of_type("Book");
        r.resolve(text, &candidates, scene, &agent()).unwrap()
    }

    // ── Trivial cases ───────────────────────────────────────────────────────

    #[test]
    fn empty_candidate_set_is_an_error() {
        let scene = SceneSnapshot::default();
        let err = resolver().resolve("anything", &[], &scene, &agent()).unwrap_err();
        assert!(matches!(err, SpatialError::NoCandidates { .. }));
    }

    #[test]
    fn single_candidate_always_selected() {
        let scene = SceneSnapshot::new(vec![book("Book|only", 3.0, -4.0)]).unwrap();
        for text in ["", "the left one", "最后一个", "§§§", "the right book near the window"] {
            let r = resolve(&resolver(), &scene, text);
            assert_eq!(r.selected_id(), Some("Book|only"), "instruction {text:?}");
        }
    }

    // ── Constraint pass ─────────────────────────────────────────────────────

    #[test]
    fn left_book_selected_with_margin() {
        let scene = three_books();
        let candidates = scene.candidates_of_type("Book");
        let a = resolver()
            .assess("pick up the left book", &candidates, &scene, &agent())
            .unwrap();
        match a.resolution {
            Resolution::Selected { object_id, confidence, method } => {
                assert_eq!(object_id, "Book|a");
                assert_eq!(method, SelectionMethod::Constraint);
                assert!((confidence - 1.0).abs() < 1e-5);
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[test]
    fn right_and_chinese_left() {
        let scene = three_books();
        assert_eq!(resolve(&resolver(), &scene, "the right book").selected_id(), Some("Book|c"));
        assert_eq!(resolve(&resolver(), &scene, "左边的书").selected_id(), Some("Book|a"));
    }

    #[test]
    fn ordinal_counts_left_to_right() {
        let scene = three_books();
        assert_eq!(resolve(&resolver(), &scene, "the second book").selected_id(), Some("Book|b"));
        assert_eq!(resolve(&resolver(), &scene, "the last book").selected_id(), Some("Book|c"));
    }

    #[test]
    fn landmark_constraint_prefers_nearby_candidate() {
        let scene = SceneSnapshot::new(vec![
            book("Book|a", -2.0, 2.0),
            book("Book|b", 2.0, 2.0),
            ObjectRecord::new("Window|1", "Window", Vec3::new(2.5, 1.5, 2.5), BoundingSize::new(1.0, 1.0, 0.1)),
        ])
        .unwrap();
        assert_eq!(
            resolve(&resolver(), &scene, "the book near the window").selected_id(),
            Some("Book|b")
        );
    }

    #[test]
    fn wall_is_a_default_landmark() {
        let scene = SceneSnapshot::new(vec![
            book("Book|1", -1.0, 2.0),
            book("Book|2", 1.0, 2.0),
            ObjectRecord::new("Wall|1", "Wall", Vec3::new(1.3, 1.25, 2.0), BoundingSize::new(0.1, 2.5, 4.0)),
        ])
        .unwrap();
        match resolve(&resolver(), &scene, "the book near the wall") {
            Resolution::Selected { object_id, method, confidence } => {
                assert_eq!(object_id, "Book|2");
                assert_eq!(method, SelectionMethod::Constraint);
                assert!((confidence - 0.925).abs() < 1e-4);
            }
            other => panic!("expected selection, got {other:?}"),
        }
        assert_eq!(resolve(&resolver(), &scene, "墙边的书").selected_id(), Some("Book|2"));
    }

    #[test]
    fn container_constraint_matches_type_substring() {
        let scene = SceneSnapshot::new(vec![
            book("Book|a", -1.0, 2.0).contained_in("DiningTable|1"),
            book("Book|b", 1.0, 2.0).contained_in("Shelf|1"),
            ObjectRecord::new("DiningTable|1", "DiningTable", Vec3::new(-1.0, 0.4, 2.0), BoundingSize::new(1.5, 0.8, 1.0)),
            ObjectRecord::new("Shelf|1", "Shelf", Vec3::new(1.0, 0.4, 2.0), BoundingSize::new(1.0, 1.8, 0.4)),
        ])
        .unwrap();
        assert_eq!(
            resolve(&resolver(), &scene, "the book on the table").selected_id(),
            Some("Book|a")
        );
    }

    #[test]
    fn state_hint_uses_history() {
        let history = InteractionHistory::new();
        history.record("Book|a", "pickup");
        let r = AmbiguityResolver::new(EngineConfig::default(), history);
        let scene = SceneSnapshot::new(vec![book("Book|a", -1.0, 2.0), book("Book|b", 1.0, 2.0)]).unwrap();
        assert_eq!(resolve(&r, &scene, "pick up another book").selected_id(), Some("Book|b"));
        assert_eq!(resolve(&r, &scene, "the same book again").selected_id(), Some("Book|a"));
    }

    // ── Composite pass ──────────────────────────────────────────────────────

    #[test]
    fn equidistant_twins_need_clarification() {
        let scene = SceneSnapshot::new(vec![
            ObjectRecord::new("CounterTop|2", "CounterTop", Vec3::new(1.5, 0.9, 1.5), BoundingSize::new(1.0, 0.1, 0.6)),
            ObjectRecord::new("CounterTop|1", "CounterTop", Vec3::new(-1.5, 0.9, 1.5), BoundingSize::new(1.0, 0.1, 0.6)),
        ])
        .unwrap();
        let candidates = scene.candidates_of_type("CounterTop");
        let r = resolver()
            .resolve("clean the countertop", &candidates, &scene, &agent())
            .unwrap();
        match r {
            Resolution::NeedsClarification { ranked, reason } => {
                assert_eq!(reason, ClarificationReason::NoContext);
                assert_eq!(ranked[0].object_id, "CounterTop|1");
                // 2.12 m sits 41% of the way from near (1.5 m) to far (3 m).
                assert!((ranked[0].component_scores["proximity"] - 0.5858).abs() < 1e-3);
                assert!((ranked[0].total_score - 0.7672).abs() < 1e-3);
                assert!((ranked[0].total_score - ranked[1].total_score).abs() < 1e-6);
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn proximity_does_not_depend_on_other_candidates() {
        let counter = |id: &str, x: f32, z: f32| {
            ObjectRecord::new(id, "CounterTop", Vec3::new(x, 0.9, z), BoundingSize::new(1.0, 0.1, 0.6))
        };
        let proximity_of_first = |scene: &SceneSnapshot| {
            let candidates = scene.candidates_of_type("CounterTop");
            match resolver().resolve("clean the countertop", &candidates, scene, &agent()).unwrap() {
                Resolution::NeedsClarification { ranked, .. } => ranked
                    .iter()
                    .find(|c| c.object_id == "CounterTop|1")
                    .map(|c| c.component_scores["proximity"])
                    .unwrap(),
                other => panic!("expected clarification, got {other:?}"),
            }
        };

        let pair = SceneSnapshot::new(vec![counter("CounterTop|1", -1.5, 1.5), counter("CounterTop|2", 1.5, 1.5)]).unwrap();
        let with_far = SceneSnapshot::new(vec![
            counter("CounterTop|1", -1.5, 1.5),
            counter("CounterTop|2", 1.5, 1.5),
            counter("CounterTop|3", 0.0, 8.0),
        ])
        .unwrap();
        let near = proximity_of_first(&pair);
        assert!(near > 0.5);
        assert!((near - proximity_of_first(&with_far)).abs() < 1e-6);
    }

    #[test]
    fn proximity_is_clamped_to_near_and_far() {
        let r = resolver();
        assert!((r.proximity(0.4) - 1.0).abs() < 1e-6);
        assert!((r.proximity(2.25) - 0.5).abs() < 1e-5);
        assert!(r.proximity(7.0).abs() < 1e-6);
    }

    #[test]
    fn conflicting_directions_fall_back_to_composite() {
        let scene = three_books();
        match resolve(&resolver(), &scene, "the left or right book") {
            Resolution::NeedsClarification { reason, .. } => {
                assert_eq!(reason, ClarificationReason::NoContext);
            }
            Resolution::Selected { method, .. } => assert_eq!(method, SelectionMethod::Composite),
        }
    }

    #[test]
    fn weak_constraint_reports_low_confidence() {
        // Both books are equally close to the window.
        let scene = SceneSnapshot::new(vec![
            book("Book|a", -1.0, 2.0),
            book("Book|b", 1.0, 2.0),
            ObjectRecord::new("Window|1", "Window", Vec3::new(0.0, 1.5, 3.0), BoundingSize::new(1.0, 1.0, 0.1)),
        ])
        .unwrap();
        match resolve(&resolver(), &scene, "the book near the window") {
            Resolution::NeedsClarification { reason, ranked } => {
                assert_eq!(reason, ClarificationReason::LowConfidence);
                assert!(ranked[0].component_scores.contains_key("landmark"));
                assert_eq!(ranked[0].object_id, "Book|a");
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn clear_composite_winner_is_selected() {
        // One visible book right next to the agent, one hidden far away.
        let scene = SceneSnapshot::new(vec![
            book("Book|near", 0.0, 0.5),
            book("Book|far", 0.0, 6.0).with_visible(false),
        ])
        .unwrap();
        match resolve(&resolver(), &scene, "pick up the book") {
            Resolution::Selected { object_id, method, .. } => {
                assert_eq!(object_id, "Book|near");
                assert_eq!(method, SelectionMethod::Composite);
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[test]
    fn history_penalty_halves_score() {
        let history = InteractionHistory::new();
        history.record("Book|b", "pickup");
        let r = AmbiguityResolver::new(EngineConfig::default(), history);
        // Beyond the far distance, so the untouched book alone stays below threshold.
        let scene = SceneSnapshot::new(vec![book("Book|a", -1.0, 4.0), book("Book|b", 1.0, 4.0)]).unwrap();
        if let Resolution::NeedsClarification { ranked, .. } = resolve(&r, &scene, "pick up the book") {
            let a = ranked.iter().find(|c| c.object_id == "Book|a").unwrap();
            let b = ranked.iter().find(|c| c.object_id == "Book|b").unwrap();
            assert!(b.used_in_history);
            assert!((b.total_score - a.total_score * 0.5).abs() < 1e-5);
            assert_eq!(ranked[0].object_id, "Book|a");
        } else {
            panic!("expected clarification");
        }
    }

    #[test]
    fn enclosed_candidates_are_less_accessible() {
        let scene = SceneSnapshot::new(vec![
            book("Book|a", -1.0, 4.0).contained_in("Drawer|1"),
            book("Book|b", 1.0, 4.0),
            ObjectRecord::new("Drawer|1", "Drawer", Vec3::new(-1.0, 0.5, 4.0), BoundingSize::new(0.5, 0.2, 0.5)),
        ])
        .unwrap();
        if let Resolution::NeedsClarification { ranked, .. } = resolve(&resolver(), &scene, "a book") {
            assert_eq!(ranked[0].object_id, "Book|b");
            let a = ranked.iter().find(|c| c.object_id == "Book|a").unwrap();
            assert!((a.component_scores["accessibility"] - 0.5).abs() < 1e-6);
        } else {
            panic!("expected clarification");
        }
    }

    // ── Malformed input ─────────────────────────────────────────────────────

    #[test]
    fn malformed_candidate_is_excluded() {
        let scene = SceneSnapshot::new(vec![
            book("Book|a", -1.0, 2.0),
            ObjectRecord::new("Book|bad", "Book", Vec3::new(1.0, 0.8, 2.0), BoundingSize::new(0.0, 0.05, 0.3)),
        ])
        .unwrap();
        let candidates = scene.candidates_of_type("Book");
        let a = resolver().assess("the right book", &candidates, &scene, &agent()).unwrap();
        assert_eq!(a.excluded, vec!["Book|bad".to_string()]);
        assert_eq!(a.resolution.selected_id(), Some("Book|a"));
    }

    #[test]
    fn all_malformed_falls_back_to_closest_visible() {
        let bad = BoundingSize::new(-1.0, 0.05, 0.3);
        let scene = SceneSnapshot::new(vec![
            ObjectRecord::new("Book|1", "Book", Vec3::new(0.0, 0.8, 0.5), bad).with_visible(false),
            ObjectRecord::new("Book|2", "Book", Vec3::new(0.0, 0.8, 3.0), bad),
            ObjectRecord::new("Book|3", "Book", Vec3::new(0.0, 0.8, 5.0), bad),
        ])
        .unwrap();
        match resolve(&resolver(), &scene, "the left book") {
            Resolution::Selected { object_id, method, .. } => {
                assert_eq!(object_id, "Book|2");
                assert_eq!(method, SelectionMethod::Fallback);
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let scene = three_books();
        let a = resolve(&resolver(), &scene, "pick up a book");
        let b = resolve(&resolver(), &scene, "pick up a book");
        assert_eq!(a, b);
    }
}
