//! Context slot extraction from user messages and agent selection.

use touchline_core::conversation::{ContextSlots, slots};

use crate::registry::{BOXING, CHAMPIONSHIP, PREMIER_LEAGUE, SPORTS_NEWS};

const NAME_CUES: &[&str] = &["my name is ", "call me "];
const TEAM_CUES: &[&str] = &[
    "my favourite team is ",
    "my favorite team is ",
    "my team is ",
    "i support ",
];
const SPORT_CUES: &[&str] = &["my favourite sport is ", "my favorite sport is "];

/// Words that end a captured value ("I support Leeds and ...").
const STOP_WORDS: &[&str] = &["and", "but", "so", "because", "who", "what", "how", "when", "please"];

/// Up to `max_words` words after the first cue found in `text`, keeping
/// the user's capitalization.
fn capture_after(text: &str, cues: &[&str], max_words: usize) -> Option<String> {
    // ASCII lower-casing keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();
    let start = cues
        .iter()
        .filter_map(|cue| lower.find(cue).map(|at| at + cue.len()))
        .min()?;
    let rest = text.get(start..)?;
    let end = rest.find(['.', ',', '!', '?', ';', '\n']).unwrap_or(rest.len());

    let words: Vec<&str> = rest[..end]
        .split_whitespace()
        .take_while(|w| !STOP_WORDS.contains(&w.to_ascii_lowercase().as_str()))
        .take(max_words)
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

/// Fill name, team, and sport slots from phrases like "my name is Sam" or
/// "I support Leeds United". Returns the slots that changed.
pub fn apply_message(context: &mut ContextSlots, text: &str) -> Vec<&'static str> {
    let mut changed = Vec::new();
    let captures = [
        (slots::USER_NAME, capture_after(text, NAME_CUES, 2)),
        (slots::FAVORITE_TEAM, capture_after(text, TEAM_CUES, 3)),
        (slots::FAVORITE_SPORT, capture_after(text, SPORT_CUES, 2).map(|s| s.to_lowercase())),
    ];
    for (slot, value) in captures {
        if let Some(value) = value {
            if context.get(slot) != Some(value.as_str()) {
                context.set(slot, value);
                changed.push(slot);
            }
        }
    }
    changed
}

/// Record which specialist answered: `last_query_type` always, and
/// `favorite_sport` when the user has not stated one.
pub fn record_agent(context: &mut ContextSlots, agent: &str) {
    let (query_type, sport) = match agent {
        PREMIER_LEAGUE => ("premier_league", Some("football")),
        CHAMPIONSHIP => ("championship", Some("football")),
        BOXING => ("boxing", Some("boxing")),
        SPORTS_NEWS => ("sports_news", None),
        _ => return,
    };
    context.set(slots::LAST_QUERY_TYPE, query_type);
    if let Some(sport) = sport {
        if context.get(slots::FAVORITE_SPORT).is_none() {
            context.set(slots::FAVORITE_SPORT, sport);
        }
    }
}
