//! Hierarchical slug derivation for vocabulary entries.
//!
//! An entry's slug (`entry_value`) encodes its lineage: the vocabulary
//! token, the parent's slug, and a leaf token taken from the label of the
//! lexicographically-first locale. For example, an entry labelled
//! `{"en": "Mammals", "fr-BE": "Mammifères"}` at the root of vocabulary
//! "Fauna" gets `FAUNA_MAMMALS`.
//!
//! Derivation is a pure function of its inputs: no I/O, no randomness and
//! no dependence on the process locale.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::defaults::{DEFAULT_VOCAB_SLUG, SLUG_SEPARATOR};
use crate::models::EntryLabels;

/// Derive the slug for an entry.
///
/// * `vocabulary_name` - display name of the owning vocabulary; a missing
///   or blank name yields [`DEFAULT_VOCAB_SLUG`]
/// * `parent_slug` - existing slug of the parent entry, `None` or empty for
///   roots
/// * `labels` - the entry's labels; the first locale in sort order supplies
///   the leaf token
///
/// Tokens are joined in the order `[vocabulary, parent, leaf]`, empty
/// tokens are skipped, repeated separators collapse, and leading/trailing
/// separators are trimmed. Uniqueness is not guaranteed.
pub fn derive(
    vocabulary_name: Option<&str>,
    parent_slug: Option<&str>,
    labels: &EntryLabels,
) -> String {
    let vocab = vocabulary_token(vocabulary_name);
    let parent = parent_slug.map(normalize_token).unwrap_or_default();
    let leaf = labels
        .values()
        .next()
        .map(|label| normalize_token(label))
        .unwrap_or_default();

    let joined = [vocab.as_str(), parent.as_str(), leaf.as_str()]
        .iter()
        .filter(|token| !token.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(&SLUG_SEPARATOR.to_string());

    collapse_separators(&joined)
}

/// Normalized vocabulary token, or the default when the name is unusable.
pub fn vocabulary_token(vocabulary_name: Option<&str>) -> String {
    let token = vocabulary_name.map(normalize_token).unwrap_or_default();
    if token.is_empty() {
        DEFAULT_VOCAB_SLUG.to_string()
    } else {
        token
    }
}

/// Normalize free text into an uppercase, ASCII, underscore-separated token.
///
/// Whitespace, hyphens and underscores become separators; `@` becomes
/// `AT`; letters with diacritics lose their marks; any other character is
/// dropped.
pub fn normalize_token(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            let mut buf = [0u8; 4];
            let upper = c.to_ascii_uppercase();
            push_word(&mut out, upper.encode_utf8(&mut buf), &mut pending_separator);
        } else if c.is_whitespace() || c == '-' || c == SLUG_SEPARATOR {
            pending_separator = true;
        } else if c == '@' {
            pending_separator = true;
            push_word(&mut out, "AT", &mut pending_separator);
            pending_separator = true;
        } else if let Some(folded) = fold_letter(c) {
            push_word(&mut out, folded, &mut pending_separator);
        }
    }

    out
}

/// Append `word`, emitting a separator first if one is pending and the
/// token is not empty yet.
fn push_word(out: &mut String, word: &str, pending: &mut bool) {
    if *pending && !out.is_empty() {
        out.push(SLUG_SEPARATOR);
    }
    *pending = false;
    out.push_str(word);
}

/// ASCII spelling of letters that survive NFKD decomposition unchanged.
fn fold_letter(c: char) -> Option<&'static str> {
    let folded = match c {
        'ß' => "SS",
        'ẞ' => "SS",
        'æ' | 'Æ' => "AE",
        'œ' | 'Œ' => "OE",
        'ø' | 'Ø' => "O",
        'đ' | 'Đ' => "D",
        'ð' | 'Ð' => "D",
        'ł' | 'Ł' => "L",
        'þ' | 'Þ' => "TH",
        'ı' => "I",
        _ => return None,
    };
    Some(folded)
}

fn collapse_separators(input: &str) -> String {
    input
        .split(SLUG_SEPARATOR)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(&SLUG_SEPARATOR.to_string())
}
