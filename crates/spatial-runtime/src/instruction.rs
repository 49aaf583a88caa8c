//! Bilingual lexical instruction parser.
//!
//! [`InstructionParser::parse`] extracts a [`SpatialConstraint`] from free
//! English or Chinese text by keyword matching over lowercased input.
//! English keywords match whole tokens; Chinese keywords match substrings.
//! It is a best-effort extractor: unknown or garbled text yields an empty
//! constraint and parsing never fails.
//!
//! # Example
//!
//! ```rust
//! use spatial_runtime::instruction::InstructionParser;
//! use spatial_types::{Direction, Ordinal};
//!
//! let parser = InstructionParser::new();
//!
//! assert_eq!(parser.parse("pick up the left book").direction, Direction::Left);
//! assert_eq!(parser.parse("拿起右边的书").direction, Direction::Right);
//! assert_eq!(parser.parse("the book on the left, not the right").direction, Direction::None);
//! assert_eq!(parser.parse("open countertop #2").ordinal, Some(Ordinal::Index(2)));
//! assert_eq!(
//!     parser.parse("the book near the window").landmark_type.as_deref(),
//!     Some("window"),
//! );
//! ```

use spatial_types::{Direction, Ordinal, SpatialConstraint, StateHint};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Keyword tables
// ────────────────────────────────────────────────────────────────────────────

/// `(direction, English tokens, Chinese substrings)`.
const DIRECTION_WORDS: &[(Direction, &[&str], &[&str])] = &[
    (Direction::Left, &["left", "leftmost"], &["左"]),
    (Direction::Right, &["right", "rightmost"], &["右"]),
    (Direction::Front, &["front", "ahead", "forward"], &["前"]),
    (Direction::Back, &["back", "behind", "rear"], &["后"]),
    (
        Direction::Near,
        &["near", "nearest", "close", "closest", "nearby"],
        &["靠近", "附近", "近"],
    ),
    (
        Direction::Far,
        &["far", "farthest", "furthest", "distant"],
        &["远"],
    ),
];

/// Chinese words that contain a direction character without meaning a
/// direction ("last", "before", "after", "recently").
const ZH_FALSE_DIRECTIONS: &[&str] = &["最后", "之前", "以前", "之后", "以后", "然后", "最近"];

/// Words after "right" that make it mean "immediately" ("right now").
const EN_RIGHT_ADVERBIAL: &[&str] = &["now", "away", "here", "there"];
/// "back" is a place only after one of these ("at the back") or before one
/// of `EN_BACK_NOUN_AFTER` ("back of the room"). Elsewhere it is a verb
/// particle ("put the book back").
const EN_BACK_PLACE_BEFORE: &[&str] = &["the", "at", "in", "on", "to", "from", "towards", "toward"];
const EN_BACK_NOUN_AFTER: &[&str] = &["of", "side", "row", "one", "corner", "shelf", "wall"];

/// `(landmark type, English tokens, Chinese substrings)`.
const LANDMARK_WORDS: &[(&str, &[&str], &[&str])] = &[
    ("window", &["window", "windows"], &["窗户", "窗"]),
    ("door", &["door", "doorway", "doorframe"], &["门"]),
    ("wall", &["wall"], &["墙"]),
];

const EN_PROXIMITY: &[&str] = &["near", "nearest", "close", "nearby", "by", "beside", "next"];
const ZH_PROXIMITY_AFTER: &[&str] = &["旁", "边", "附近"];
const ZH_PROXIMITY_BEFORE: &[&str] = &["靠近"];

/// `(container type, English tokens, Chinese phrases)`.
const CONTAINER_WORDS: &[(&str, &[&str], &[&str])] = &[
    ("table", &["table", "desk"], &["桌子上", "桌上", "桌面上"]),
    ("counter", &["counter", "countertop"], &["台面上", "柜台上"]),
    ("shelf", &["shelf", "shelves"], &["架子上", "书架上"]),
    ("cabinet", &["cabinet", "cupboard"], &["柜子里", "柜里", "橱柜里"]),
    ("drawer", &["drawer"], &["抽屉里"]),
    ("fridge", &["fridge", "refrigerator"], &["冰箱里"]),
];

const EN_CONTAINER_PREPOSITIONS: &[&str] = &["on", "in", "inside", "onto", "from"];
const EN_FILLERS: &[&str] = &["the", "a", "an", "top", "of", "that", "this"];

const EN_ORDINALS: &[(&str, Ordinal)] = &[
    ("first", Ordinal::First),
    ("1st", Ordinal::First),
    ("second", Ordinal::Index(2)),
    ("2nd", Ordinal::Index(2)),
    ("third", Ordinal::Index(3)),
    ("3rd", Ordinal::Index(3)),
    ("fourth", Ordinal::Index(4)),
    ("4th", Ordinal::Index(4)),
    ("fifth", Ordinal::Index(5)),
    ("5th", Ordinal::Index(5)),
    ("last", Ordinal::Last),
];

const ZH_DIGITS: &[(char, usize)] = &[
    ('一', 1),
    ('二', 2),
    ('三', 3),
    ('四', 4),
    ('五', 5),
    ('六', 6),
    ('七', 7),
    ('八', 8),
    ('九', 9),
];

const EN_FRESH: &[&str] = &["another", "other", "different", "new"];
const EN_REVISIT: &[&str] = &["same", "again"];
const ZH_FRESH: &[&str] = &["另一个", "另一", "另外", "别的"];
const ZH_REVISIT: &[&str] = &["同一个", "刚才那个", "再次"];

// ────────────────────────────────────────────────────────────────────────────
// InstructionParser
// ────────────────────────────────────────────────────────────────────────────

/// Stateless keyword matcher turning instruction text into constraints.
#[derive(Debug, Clone, Default)]
pub struct InstructionParser;

impl InstructionParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract every constraint present in `text`.
    pub fn parse(&self, text: &str) -> SpatialConstraint {
        let lower = text.to_lowercase();
        let tokens = tokenize(&lower);

        let (landmark_type, proximity_consumed) = landmark(&lower, &tokens);
        let direction = direction(&lower, &tokens, proximity_consumed);

        let constraint = SpatialConstraint {
            direction,
            landmark_type,
            container_type: container(&lower, &tokens),
            ordinal: ordinal(&lower, &tokens),
            state: state(&lower, &tokens),
        };
        debug!(text, constraint = ?constraint, "instruction parsed");
        constraint
    }

    /// A 1-based index named by a short answer: a bare number ("2", "#2",
    /// "2号") or an ordinal word. `last` is reported as `Ordinal::Last`.
    pub fn parse_index(&self, text: &str) -> Option<Ordinal> {
        let lower = text.to_lowercase();
        let tokens = tokenize(&lower);
        if let Some(n) = tokens.iter().find_map(|t| t.parse::<usize>().ok()) {
            return Some(Ordinal::Index(n));
        }
        if let Some(n) = leading_ascii_number(&lower) {
            return Some(Ordinal::Index(n));
        }
        ordinal(&lower, &tokens)
    }

    /// The first landmark named anywhere in `text`, with or without a
    /// proximity word ("the window one", "门边那个").
    pub fn mentioned_landmark(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        let tokens = tokenize(&lower);
        LANDMARK_WORDS
            .iter()
            .find(|(_, en, cn)| has_token(&tokens, en) || has_substring(&lower, cn))
            .map(|(kind, _, _)| (*kind).to_string())
    }
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn has_token(tokens: &[&str], words: &[&str]) -> bool {
    tokens.iter().any(|t| words.contains(t))
}

fn has_substring(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

// ── Direction ───────────────────────────────────────────────────────────────

fn direction(lower: &str, tokens: &[&str], proximity_consumed: bool) -> Direction {
    let tokens = spatial_tokens(tokens);
    let mut zh = lower.to_string();
    for w in ZH_FALSE_DIRECTIONS {
        zh = zh.replace(w, " ");
    }

    let hits: Vec<Direction> = DIRECTION_WORDS
        .iter()
        .filter(|(dir, en, cn)| {
            if proximity_consumed && *dir == Direction::Near {
                return false;
            }
            has_token(&tokens, en) || has_substring(&zh, cn)
        })
        .map(|(dir, _, _)| *dir)
        .collect();

    // Contradictory pairs carry no usable signal.
    if hits
        .iter()
        .any(|d| d.opposite().is_some_and(|o| hits.contains(&o)))
    {
        return Direction::None;
    }

    [
        Direction::Left,
        Direction::Right,
        Direction::Front,
        Direction::Back,
        Direction::Near,
        Direction::Far,
    ]
    .into_iter()
    .find(|d| hits.contains(d))
    .unwrap_or_default()
}

/// `tokens` without the adverbial "right" and particle "back" uses.
fn spatial_tokens<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    tokens
        .iter()
        .enumerate()
        .filter(|&(i, t)| {
            let prev = i.checked_sub(1).map(|p| tokens[p]);
            let next = tokens.get(i + 1).copied();
            match *t {
                "right" => !next.is_some_and(|n| EN_RIGHT_ADVERBIAL.contains(&n)),
                "back" => {
                    prev.is_some_and(|p| EN_BACK_PLACE_BEFORE.contains(&p))
                        || next.is_some_and(|n| EN_BACK_NOUN_AFTER.contains(&n))
                }
                _ => true,
            }
        })
        .map(|(_, t)| *t)
        .collect()
}

// ── Landmark ────────────────────────────────────────────────────────────────

/// Returns the landmark mentioned next to a proximity word, and whether the
/// proximity word was used up by it.
fn landmark(lower: &str, tokens: &[&str]) -> (Option<String>, bool) {
    let en_proximity = has_token(tokens, EN_PROXIMITY);
    for (kind, en, cn) in LANDMARK_WORDS {
        if en_proximity && has_token(tokens, en) {
            return (Some((*kind).to_string()), true);
        }
        for word in *cn {
            if let Some(at) = lower.find(word) {
                let before = &lower[..at];
                let after = &lower[at + word.len()..];
                let beside = ZH_PROXIMITY_AFTER.iter().any(|p| after.starts_with(p))
                    || after.contains("附近");
                if beside || has_substring(before, ZH_PROXIMITY_BEFORE)
                {
                    return (Some((*kind).to_string()), true);
                }
            }
        }
    }
    (None, false)
}

// ── Container ───────────────────────────────────────────────────────────────

fn container(lower: &str, tokens: &[&str]) -> Option<String> {
    for (i, t) in tokens.iter().enumerate() {
        if !EN_CONTAINER_PREPOSITIONS.contains(t) {
            continue;
        }
        let noun = tokens[i + 1..]
            .iter()
            .take(4)
            .find(|w| !EN_FILLERS.contains(*w));
        if let Some(noun) = noun
            && let Some((kind, _, _)) = CONTAINER_WORDS.iter().find(|(_, en, _)| en.contains(noun))
        {
            return Some((*kind).to_string());
        }
    }
    CONTAINER_WORDS
        .iter()
        .find(|(_, _, cn)| has_substring(lower, cn))
        .map(|(kind, _, _)| (*kind).to_string())
}

// ── Ordinal ─────────────────────────────────────────────────────────────────

fn ordinal(lower: &str, tokens: &[&str]) -> Option<Ordinal> {
    if let Some((_, ord)) = EN_ORDINALS.iter().find(|(w, _)| tokens.contains(w)) {
        return Some(*ord);
    }
    if lower.contains("最后") {
        return Some(Ordinal::Last);
    }
    if let Some(n) = zh_ordinal(lower) {
        return Some(if n == 1 { Ordinal::First } else { Ordinal::Index(n) });
    }
    // "number 2" / "no 2"
    for pair in tokens.windows(2) {
        if matches!(pair[0], "number" | "no" | "num")
            && let Ok(n) = pair[1].parse::<usize>()
        {
            return Some(Ordinal::Index(n));
        }
    }
    // "#2"
    if let Some(at) = lower.find('#')
        && let Some(n) = leading_ascii_number(lower[at + 1..].trim_start())
    {
        return Some(Ordinal::Index(n));
    }
    // "book2"
    tokens.iter().find_map(|t| numbered_reference(t)).map(Ordinal::Index)
}

/// `第N` with a Chinese or ASCII numeral.
fn zh_ordinal(lower: &str) -> Option<usize> {
    let at = lower.find('第')?;
    let rest = &lower[at + '第'.len_utf8()..];
    if let Some(n) = leading_ascii_number(rest) {
        return Some(n);
    }
    let c = rest.chars().next()?;
    ZH_DIGITS.iter().find(|(d, _)| *d == c).map(|(_, n)| *n)
}

fn leading_ascii_number(s: &str) -> Option<usize> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// A letters-then-digits token such as `book2`.
fn numbered_reference(token: &str) -> Option<usize> {
    let split = token.find(|c: char| c.is_ascii_digit())?;
    let (word, digits) = token.split_at(split);
    if word.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&n| n >= 1)
}

// ── State ───────────────────────────────────────────────────────────────────

fn state(lower: &str, tokens: &[&str]) -> Option<StateHint> {
    let fresh = has_token(tokens, EN_FRESH) || has_substring(lower, ZH_FRESH);
    let revisit = has_token(tokens, EN_REVISIT) || has_substring(lower, ZH_REVISIT);
    match (fresh, revisit) {
        (true, false) => Some(StateHint::Fresh),
        (false, true) => Some(StateHint::Revisit),
        _ => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SpatialConstraint {
        InstructionParser::new().parse(text)
    }

    // ── Direction ───────────────────────────────────────────────────────────

    #[test]
    fn english_directions() {
        assert_eq!(parse("pick up the left book").direction, Direction::Left);
        assert_eq!(parse("grab the rightmost mug").direction, Direction::Right);
        assert_eq!(parse("the chair in front of you").direction, Direction::Front);
        assert_eq!(parse("the box behind the sofa").direction, Direction::Back);
        assert_eq!(parse("the closest apple").direction, Direction::Near);
        assert_eq!(parse("the distant lamp").direction, Direction::Far);
    }

    #[test]
    fn idiomatic_right_and_back_are_not_directions() {
        assert_eq!(parse("put the book back").direction, Direction::None);
        assert_eq!(parse("bring the mug back please").direction, Direction::None);
        assert_eq!(parse("do it right now").direction, Direction::None);
        assert_eq!(parse("grab the cup right away").direction, Direction::None);

        assert_eq!(parse("the book at the back").direction, Direction::Back);
        assert_eq!(parse("the back shelf").direction, Direction::Back);
        assert_eq!(parse("back of the room").direction, Direction::Back);
        assert_eq!(parse("put the book back on the left").direction, Direction::Left);
        assert_eq!(parse("the right book now").direction, Direction::Right);
    }

    #[test]
    fn chinese_directions() {
        assert_eq!(parse("拿起左边的书").direction, Direction::Left);
        assert_eq!(parse("右侧的杯子").direction, Direction::Right);
        assert_eq!(parse("前面的椅子").direction, Direction::Front);
        assert_eq!(parse("后面的箱子").direction, Direction::Back);
        assert_eq!(parse("远处的灯").direction, Direction::Far);
    }

    #[test]
    fn conflicting_directions_cancel() {
        assert_eq!(parse("the left or the right book").direction, Direction::None);
        assert_eq!(parse("左边还是右边").direction, Direction::None);
        assert_eq!(parse("near or far").direction, Direction::None);
    }

    #[test]
    fn lateral_beats_depth() {
        assert_eq!(parse("the front left burner").direction, Direction::Left);
    }

    #[test]
    fn words_inside_tokens_do_not_match() {
        assert_eq!(parse("alright, the leftover book").direction, Direction::None);
    }

    #[test]
    fn last_is_not_back() {
        let c = parse("最后一个杯子");
        assert_eq!(c.direction, Direction::None);
        assert_eq!(c.ordinal, Some(Ordinal::Last));
    }

    // ── Landmark ────────────────────────────────────────────────────────────

    #[test]
    fn landmark_consumes_proximity_word() {
        let c = parse("the book near the window");
        assert_eq!(c.landmark_type.as_deref(), Some("window"));
        assert_eq!(c.direction, Direction::None);

        let c = parse("窗户旁边的书");
        assert_eq!(c.landmark_type.as_deref(), Some("window"));
        assert_eq!(c.direction, Direction::None);

        let c = parse("靠近门的椅子");
        assert_eq!(c.landmark_type.as_deref(), Some("door"));
    }

    #[test]
    fn landmark_without_proximity_is_ignored() {
        let c = parse("open the window");
        assert!(c.landmark_type.is_none());
    }

    #[test]
    fn direction_and_landmark_combine() {
        let c = parse("the left book by the door");
        assert_eq!(c.direction, Direction::Left);
        assert_eq!(c.landmark_type.as_deref(), Some("door"));
    }

    // ── Container ───────────────────────────────────────────────────────────

    #[test]
    fn container_phrases() {
        assert_eq!(parse("the mug on the table").container_type.as_deref(), Some("table"));
        assert_eq!(parse("the bowl in the cabinet").container_type.as_deref(), Some("cabinet"));
        assert_eq!(parse("柜子里的碗").container_type.as_deref(), Some("cabinet"));
        assert_eq!(parse("桌子上的杯子").container_type.as_deref(), Some("table"));
        assert!(parse("the chair in front of the table").container_type.is_none());
    }

    // ── Ordinal ─────────────────────────────────────────────────────────────

    #[test]
    fn ordinals() {
        assert_eq!(parse("take the second book").ordinal, Some(Ordinal::Index(2)));
        assert_eq!(parse("the first apple").ordinal, Some(Ordinal::First));
        assert_eq!(parse("the last cup").ordinal, Some(Ordinal::Last));
        assert_eq!(parse("第二本书").ordinal, Some(Ordinal::Index(2)));
        assert_eq!(parse("第一个").ordinal, Some(Ordinal::First));
        assert_eq!(parse("第3个").ordinal, Some(Ordinal::Index(3)));
    }

    #[test]
    fn numbered_references() {
        assert_eq!(parse("pick up book2").ordinal, Some(Ordinal::Index(2)));
        assert_eq!(parse("open countertop #2").ordinal, Some(Ordinal::Index(2)));
        assert_eq!(parse("drawer number 3").ordinal, Some(Ordinal::Index(3)));
        assert_eq!(parse("pick up the book").ordinal, None);
    }

    #[test]
    fn parse_index_accepts_bare_numbers() {
        let p = InstructionParser::new();
        assert_eq!(p.parse_index("1"), Some(Ordinal::Index(1)));
        assert_eq!(p.parse_index(" 2 "), Some(Ordinal::Index(2)));
        assert_eq!(p.parse_index("2号"), Some(Ordinal::Index(2)));
        assert_eq!(p.parse_index("the last one"), Some(Ordinal::Last));
        assert_eq!(p.parse_index("no idea"), None);
    }

    #[test]
    fn mentioned_landmark_needs_no_proximity_word() {
        let p = InstructionParser::new();
        assert_eq!(p.mentioned_landmark("the window one").as_deref(), Some("window"));
        assert_eq!(p.mentioned_landmark("门边那个").as_deref(), Some("door"));
        assert_eq!(p.mentioned_landmark("the blue one"), None);
    }

    // ── State ───────────────────────────────────────────────────────────────

    #[test]
    fn state_hints() {
        assert_eq!(parse("pick up another apple").state, Some(StateHint::Fresh));
        assert_eq!(parse("the same cup again").state, Some(StateHint::Revisit));
        assert_eq!(parse("拿另一个苹果").state, Some(StateHint::Fresh));
        assert_eq!(parse("the same other thing").state, None);
    }

    // ── Degenerate input ────────────────────────────────────────────────────

    #[test]
    fn garbage_yields_empty_constraint() {
        assert!(parse("").is_empty());
        assert!(parse("pick up the book").is_empty());
        assert!(parse("§§§ ??? 12.5").is_empty());
    }
}
