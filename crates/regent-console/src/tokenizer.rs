//! Quote-aware line tokenizer.

/// Split a command line into tokens.
///
/// - Whitespace outside double quotes separates tokens.
/// - A quoted span that starts a token is unwrapped: `"b c"` becomes `b c`.
/// - A quoted span opened in the middle of a token keeps its quotes, so an
///   option value such as `--name="a b"` survives as one token verbatim.
/// - An unterminated quote swallows the rest of the line into the current
///   token instead of rejecting the line.
/// - Empty tokens are never produced.
pub fn parse(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    // Whether the open quote span keeps its quote characters.
    let mut literal_quotes = false;

    for ch in line.chars() {
        if in_quote {
            if ch == '"' {
                in_quote = false;
                if literal_quotes {
                    current.push('"');
                }
            } else {
                current.push(ch);
            }
            continue;
        }
        match ch {
            '"' => {
                in_quote = true;
                literal_quotes = !current.is_empty();
                if literal_quotes {
                    current.push('"');
                }
            },
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            },
            c => current.push(c),
        }
    }

    if in_quote {
        log::debug!("unterminated quote in console input, keeping remainder as one token");
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Whether `line` ends in whitespace outside of any quote, i.e. the last
/// token is complete. Used by tab-completion.
pub fn ends_with_separator(line: &str) -> bool {
    let mut in_quote = false;
    let mut last_was_space = true;
    for ch in line.chars() {
        if ch == '"' {
            in_quote = !in_quote;
            last_was_space = false;
        } else {
            last_was_space = !in_quote && ch.is_whitespace();
        }
    }
    last_was_space
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn simple_words() {
        assert_eq!(parse("show info"), vec!["show", "info"]);
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(parse("  show \t  info  "), vec!["show", "info"]);
    }

    #[test]
    fn quoted_span_is_one_token() {
        assert_eq!(parse(r#"a "b c" d"#), vec!["a", "b c", "d"]);
    }

    #[test]
    fn option_value_keeps_quotes() {
        assert_eq!(parse(r#"a --x="1 2""#), vec!["a", r#"--x="1 2""#]);
    }

    #[test]
    fn option_value_followed_by_more_tokens() {
        assert_eq!(
            parse(r#"save oar --path="my file.oar" now"#),
            vec!["save", "oar", r#"--path="my file.oar""#, "now"]
        );
    }

    #[test]
    fn quote_glued_after_leading_span() {
        assert_eq!(parse(r#""b c"d"#), vec!["b cd"]);
    }

    #[test]
    fn empty_quotes_produce_no_token() {
        assert_eq!(parse(r#"a "" b"#), vec!["a", "b"]);
    }

    #[test]
    fn unterminated_quote_takes_rest_of_line() {
        assert_eq!(parse(r#"say "hello there"#), vec!["say", "hello there"]);
    }

    #[test]
    fn empty_line() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn separator_detection() {
        assert!(ends_with_separator(""));
        assert!(ends_with_separator("show "));
        assert!(!ends_with_separator("show"));
        assert!(!ends_with_separator(r#"say "a "#));
        assert!(ends_with_separator(r#"say "a b" "#));
    }

    proptest! {
        #[test]
        fn tokens_never_empty(line in ".{0,64}") {
            for token in parse(&line) {
                prop_assert!(!token.is_empty());
            }
        }

        #[test]
        fn unquoted_matches_split_whitespace(line in "[a-z0-9 \t-]{0,64}") {
            let expected: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            prop_assert_eq!(parse(&line), expected);
        }
    }
}
