// MindHarbor - Tokenizer
//
// The one normalization used both when building the index and when
// vectorizing a query. Any drift between the two would silently misalign
// query terms with the vocabulary.

/// Tokens this short carry no retrieval signal and are dropped.
const MIN_TOKEN_CHARS: usize = 3;

/// Lower-case `text`, blank out everything that is not a letter, digit or
/// whitespace, split on whitespace runs and drop tokens shorter than three
/// characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    normalized
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokenization() {
        let tokens = tokenize("Breathing exercises help reduce anxiety.");
        assert_eq!(
            tokens,
            vec!["breathing", "exercises", "help", "reduce", "anxiety"]
        );
    }

    #[test]
    fn test_punctuation_splits_words() {
        assert_eq!(tokenize("self-care, well_being!"), vec!["self", "care", "well", "being"]);
    }

    #[test]
    fn test_short_tokens_dropped() {
        assert_eq!(tokenize("I am ok so do it now"), vec!["now"]);
    }

    #[test]
    fn test_empty_and_symbol_only_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \n\t ").is_empty());
        assert!(tokenize("!!! ... ???").is_empty());
    }

    #[test]
    fn test_digits_kept() {
        assert_eq!(tokenize("Call 988 now"), vec!["call", "988", "now"]);
    }

    #[test]
    fn test_token_properties_hold_for_mixed_input() {
        let samples = [
            "Ünïcödé TEXT — with “quotes” and émojis 😊!!",
            "Tabs\tand\nnewlines\r\nEVERYWHERE",
            "x1y2z3 a_b_c ##hash## 3.14159",
            "ΣΊΣΥΦΟΣ ÇA VA BIEN",
        ];
        for sample in samples {
            for token in tokenize(sample) {
                assert!(token.chars().count() > 2, "{token:?} too short");
                assert!(token.chars().all(char::is_alphanumeric), "{token:?} not alphanumeric");
                assert_eq!(token.to_lowercase(), token, "{token:?} not lower-case");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Practice slow breathing daily. Practice!";
        assert_eq!(tokenize(text), tokenize(text));
    }
}
