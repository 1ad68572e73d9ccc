//! Whole-word phrase matching shared by routing, guardrails, and lookups.

/// Lower-case `text`, fold typographic apostrophes to `'`, and collapse
/// every run of non-word characters to a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        let ch = match ch {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => '\'',
            other => other,
        };
        if ch.is_alphanumeric() || ch == '\'' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// "arsenal's" -> "arsenal", "spurs'" -> "spurs"; "don't" is untouched.
fn strip_possessive(token: &str) -> &str {
    token
        .strip_suffix("'s")
        .or_else(|| token.strip_suffix('\''))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(token)
}

/// `normalized` with possessive endings dropped from every word.
pub fn without_possessives(normalized: &str) -> String {
    normalized
        .split(' ')
        .map(strip_possessive)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `phrase` occurs in `normalized` on word boundaries, either as
/// written or with possessive endings dropped.
///
/// `normalized` must already be the output of [`normalize`]; `phrase` is
/// normalized here.
pub fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    if phrase.is_empty() {
        return false;
    }
    let needle = format!(" {phrase} ");
    if format!(" {normalized} ").contains(&needle) {
        return true;
    }
    normalized.contains('\'')
        && format!(" {} ", without_possessives(normalized)).contains(&needle)
}

/// The first phrase from `phrases` found in `normalized`.
pub fn first_match<'a, I>(normalized: &str, phrases: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    phrases
        .into_iter()
        .find(|p| contains_phrase(normalized, p))
}
