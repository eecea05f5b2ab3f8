// normalize.rs — Action normalization and glob matching.
//
// Agents submit actions in whatever shape their SDK produced: "read:file",
// "read file", "Read File", "readFile", "read-file", "read_file", or just
// "read". All of them canonicalize to the same `verb:noun` token, which is
// the only form the matcher ever sees. A bare verb expands to `verb:*`.
//
// Normalization is idempotent: normalize(normalize(x)) == normalize(x).

use glob::Pattern;

/// Canonicalize a free-form action string to lowercase `verb:noun`.
///
/// Multi-word nouns are joined with `_` ("delete database table" →
/// "delete:database_table"). A single bare token becomes `verb:*`.
/// An empty input stays empty; callers validate non-empty up front.
pub fn normalize_action(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    if let Some((verb, noun)) = raw.split_once(':') {
        let verb = join_words(&split_words(verb));
        let noun = join_words(&split_words(noun));
        if noun.is_empty() {
            return format!("{}:*", verb);
        }
        return format!("{}:{}", verb, noun);
    }

    let words = split_words(raw);
    match words.split_first() {
        None => String::new(),
        Some((verb, [])) => format!("{}:*", verb),
        Some((verb, rest)) => format!("{}:{}", verb, rest.join("_")),
    }
}

/// Check whether a glob pattern matches a value.
///
/// `*` matches any substring, including across `/` (resources like
/// "secret/keys" are matched by "secret/*" and by "*" alone). Invalid
/// patterns never match — fail closed, not fail open.
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(value),
        Err(_) => false,
    }
}

/// Validate that a glob pattern parses. Used when a policy is written.
pub fn validate_pattern(pattern: &str) -> bool {
    Pattern::new(pattern).is_ok()
}

/// Split a token into lowercase words at whitespace, punctuation, and
/// camelCase boundaries. `*` survives as a word of its own so glob forms
/// like "read:*" pass through normalization unchanged.
fn split_words(token: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in token.chars() {
        if c.is_alphanumeric() || c == '*' {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.extend(c.to_lowercase());
        } else {
            // Any other character is a separator.
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn join_words(words: &[String]) -> String {
    words.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_form_passes_through() {
        assert_eq!(normalize_action("read:file"), "read:file");
        assert_eq!(normalize_action("delete:database"), "delete:database");
    }

    #[test]
    fn space_separated_words() {
        assert_eq!(normalize_action("read file"), "read:file");
        assert_eq!(normalize_action("Read File"), "read:file");
    }

    #[test]
    fn camel_case_splits() {
        assert_eq!(normalize_action("readFile"), "read:file");
        assert_eq!(normalize_action("deleteDatabaseTable"), "delete:database_table");
    }

    #[test]
    fn hyphen_and_underscore_forms() {
        assert_eq!(normalize_action("read-file"), "read:file");
        assert_eq!(normalize_action("read_file"), "read:file");
    }

    #[test]
    fn bare_verb_expands_to_wildcard_noun() {
        assert_eq!(normalize_action("read"), "read:*");
        assert_eq!(normalize_action("Deploy"), "deploy:*");
    }

    #[test]
    fn multi_word_noun_joined_with_underscore() {
        assert_eq!(normalize_action("delete database table"), "delete:database_table");
        assert_eq!(normalize_action("read:Secret File"), "read:secret_file");
    }

    #[test]
    fn glob_forms_survive() {
        assert_eq!(normalize_action("read:*"), "read:*");
        assert_eq!(normalize_action("*:file"), "*:file");
        // A bare "*" is a verb wildcard over everything.
        assert_eq!(normalize_action("*"), "*:*");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "read:file",
            "read file",
            "Read File",
            "readFile",
            "read-file",
            "read_file",
            "read",
            "read:*",
            "*:file",
            "delete database table",
        ] {
            let once = normalize_action(raw);
            assert_eq!(normalize_action(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_action(""), "");
        assert_eq!(normalize_action("   "), "");
    }

    #[test]
    fn pattern_matches_substrings() {
        assert!(matches_pattern("read:*", "read:file"));
        assert!(matches_pattern("read:*", "read:database"));
        assert!(matches_pattern("*:file", "read:file"));
        assert!(matches_pattern("*:file", "write:file"));
        assert!(!matches_pattern("read:*", "write:file"));
    }

    #[test]
    fn star_alone_matches_everything() {
        assert!(matches_pattern("*", "read:file"));
        assert!(matches_pattern("*", "secret/keys"));
        assert!(matches_pattern("*", ""));
    }

    #[test]
    fn resource_globs_treat_slash_literally() {
        assert!(matches_pattern("secret/*", "secret/keys"));
        assert!(!matches_pattern("secret/*", "public/keys"));
        assert!(matches_pattern("a.txt", "a.txt"));
        assert!(!matches_pattern("a.txt", "b.txt"));
    }

    #[test]
    fn invalid_pattern_never_matches() {
        assert!(!matches_pattern("secret[", "secret["));
        assert!(!validate_pattern("secret["));
        assert!(validate_pattern("secret/*"));
    }
}
