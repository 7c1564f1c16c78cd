//! Tokenizer shared by free-text criteria and the in-memory store.
//!
//! - split on non-alphanumeric characters
//! - split lower -> upper camelCase boundaries (`PinusNigra` -> pinus, nigra)
//! - lowercase everything
//! - drop one-character tokens and a handful of stopwords (en/it)

const MIN_TOKEN_LEN: usize = 2;
const MAX_TOKEN_LEN: usize = 64;
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "in", "is", "of", "on", "or", "the", "to", "with",
    "di", "da", "il", "la", "le", "lo", "gli", "e",
];

pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_was_lower = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_was_lower && !current.is_empty() {
                push_token(&mut tokens, &mut current);
            }
            prev_was_lower = c.is_lowercase();
            if current.chars().count() < MAX_TOKEN_LEN {
                current.extend(c.to_lowercase());
            }
            continue;
        }

        if !current.is_empty() {
            push_token(&mut tokens, &mut current);
        }
        prev_was_lower = false;
    }

    if !current.is_empty() {
        push_token(&mut tokens, &mut current);
    }
    tokens
}

fn push_token(tokens: &mut Vec<String>, current: &mut String) {
    if current.chars().count() >= MIN_TOKEN_LEN && !STOPWORDS.contains(&current.as_str()) {
        tokens.push(std::mem::take(current));
    } else {
        current.clear();
    }
}
