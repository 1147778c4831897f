//! Entity-name normalization and fuzzy-lookup helpers.

/// Corporate suffix tokens stripped from entity names.
const CORPORATE_SUFFIXES: [&str; 6] = ["CO", "INC", "LTD", "LLP", "LIMITED", "COM"];
/// Honorific tokens stripped from person names.
const HONORIFICS: [&str; 7] = ["MR", "DR", "PROF", "MS", "MISS", "MDM", "MRS"];
const PUNCTUATION: [char; 4] = [',', '.', '-', '"'];

/// Normalize a raw entity name: punctuation becomes spaces, corporate
/// suffixes and honorifics are dropped, whitespace is collapsed.
pub fn clean_name(name: &str) -> String {
    let mut cleaned = name.to_string();
    for punctuation in PUNCTUATION {
        cleaned = cleaned.replace(punctuation, " ");
    }

    cleaned
        .split_whitespace()
        .filter(|part| {
            let upper = part.to_uppercase();
            !CORPORATE_SUFFIXES.contains(&upper.as_str()) && !HONORIFICS.contains(&upper.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Acronym formed from word initials; `None` for single-word names.
pub fn acronym(name: &str) -> Option<String> {
    let initials: Vec<char> = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .collect();
    if initials.len() > 1 {
        Some(initials.into_iter().collect())
    } else {
        None
    }
}

/// First token longer than one character, used for substring search.
pub fn sub_name(name: &str) -> Option<String> {
    name.split_whitespace()
        .map(|part| part.trim())
        .find(|part| part.len() > 1)
        .map(|part| part.to_string())
}

/// Regex that expands an acronym back into candidate full names: each letter
/// becomes a word prefix, e.g. `AMD` matches `ADVANCED MICRO DEVICES`.
pub fn acronym_pattern(name: &str) -> String {
    let body: String = name
        .chars()
        .map(|letter| format!("{}\\w*\\s+", regex::escape(&letter.to_string())))
        .collect();
    let body = body.strip_suffix("\\s+").unwrap_or(&body);
    format!("\\b{body}\\b")
}
