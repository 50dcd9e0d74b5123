// ─── Version Arbitration ───
// Maven-style version ordering and highest-version selection.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(u64),
    Word(String),
}

const RELEASE_RANK: u8 = 6;

fn tokenize(raw: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for segment in raw.split(['.', '-', '_', '+']) {
        let mut current = String::new();
        let mut current_is_digit = None;
        for ch in segment.chars() {
            let is_digit = ch.is_ascii_digit();
            if current_is_digit.is_some_and(|d| d != is_digit) {
                tokens.push(make_token(&current));
                current.clear();
            }
            current_is_digit = Some(is_digit);
            current.push(ch.to_ascii_lowercase());
        }
        if !current.is_empty() {
            tokens.push(make_token(&current));
        }
    }
    tokens
}

fn make_token(text: &str) -> Token {
    match text.parse::<u64>() {
        Ok(n) => Token::Number(n),
        Err(_) => Token::Word(text.to_string()),
    }
}

/// Rank of a well-known qualifier, `None` for anything else.
fn qualifier_rank(word: &str) -> Option<u8> {
    match word {
        "alpha" | "a" => Some(1),
        "beta" | "b" => Some(2),
        "milestone" | "m" => Some(3),
        "rc" | "cr" => Some(4),
        "snapshot" => Some(5),
        "" | "ga" | "final" | "release" => Some(RELEASE_RANK),
        "sp" => Some(7),
        _ => None,
    }
}

fn compare_words(a: &str, b: &str) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    match (qualifier_rank(a), qualifier_rank(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        // Unknown qualifiers sort after every known one.
        (None, Some(_)) => Some(Ordering::Greater),
        (Some(_), None) => Some(Ordering::Less),
        (None, None) => None,
    }
}

/// Compare two version strings.
///
/// Numeric segments compare numerically and trailing zeros are insignificant
/// (`1.0 == 1`). Qualifiers order as
/// `alpha < beta < milestone < rc < snapshot < release < sp < unknown`.
/// Two different unknown qualifiers at the same position cannot be ordered and
/// yield `None`.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let left = tokenize(a);
    let right = tokenize(b);
    let len = left.len().max(right.len());

    for idx in 0..len {
        let ord = match (left.get(idx), right.get(idx)) {
            (Some(Token::Number(x)), Some(Token::Number(y))) => x.cmp(y),
            (Some(Token::Number(x)), None) => x.cmp(&0),
            (None, Some(Token::Number(y))) => 0.cmp(y),
            (Some(Token::Word(w)), None) => compare_words(w, "")?,
            (None, Some(Token::Word(w))) => compare_words("", w)?,
            (Some(Token::Number(_)), Some(Token::Word(_))) => Ordering::Greater,
            (Some(Token::Word(_)), Some(Token::Number(_))) => Ordering::Less,
            (Some(Token::Word(x)), Some(Token::Word(y))) => compare_words(x, y)?,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return Some(ord);
        }
    }

    Some(Ordering::Equal)
}

/// Pick the highest of `versions`.
///
/// Returns `Err` with the competing maximal versions when the highest cannot
/// be decided. Versions that compare equal but are spelled differently
/// (`1.0` vs `1.0.0`) resolve to the lexically greatest spelling so the
/// outcome never depends on input order.
pub fn select_highest(versions: &[String]) -> Result<String, Vec<String>> {
    let mut unique: Vec<&String> = versions.iter().collect();
    unique.sort();
    unique.dedup();

    let maximal: Vec<&String> = unique
        .iter()
        .filter(|candidate| {
            !unique
                .iter()
                .any(|other| compare_versions(other, candidate) == Some(Ordering::Greater))
        })
        .copied()
        .collect();

    let all_equal = maximal.iter().all(|a| {
        maximal
            .iter()
            .all(|b| compare_versions(a, b) == Some(Ordering::Equal))
    });

    if all_equal {
        if let Some(best) = maximal.iter().max() {
            return Ok((*best).clone());
        }
    }

    Err(maximal.into_iter().cloned().collect())
}
