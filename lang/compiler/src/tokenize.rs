use nom::{
    bytes::complete::take_till1,
    character::complete::{char, none_of, space0},
    multi::many0,
    IResult,
};

/// A raw source token annotated with where it came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub source: String,
    pub line_no: usize,
}

impl Token {
    pub fn new(text: &str, source: &str, line_no: usize) -> Self {
        Token {
            text: text.to_string(),
            source: source.to_string(),
            line_no,
        }
    }
}

// A double-quoted literal becomes a single token starting with '$', spaces
// included. No escape sequences; the literal must close on the same line.
fn tokenize_string(s: &str) -> IResult<&str, String> {
    let (s, _) = char('"')(s)?;
    let (s, chars) = many0(none_of("\""))(s)?;
    let (s, _) = char('"')(s)?;
    let string: String = chars.into_iter().collect();
    Ok((s, format!("${}", string)))
}

fn tokenize_word(s: &str) -> IResult<&str, String> {
    let (s, word) = take_till1(|c: char| c.is_whitespace())(s)?;
    Ok((s, word.to_string()))
}

/// Splits one logical line into tokens: whitespace-separated words, with
/// quoted string literals folded into single `$` tokens.
pub fn tokenize_line(line: &str) -> IResult<&str, Vec<String>> {
    let mut words: Vec<String> = Vec::new();
    let mut input = line;

    loop {
        let (s, _) = space0(input)?;
        input = s;
        if input.is_empty() {
            break;
        }

        // A leading quote commits to a string literal so that an
        // unterminated one is an error, not a word.
        let (s, word) = if input.starts_with('"') {
            tokenize_string(input)?
        } else {
            tokenize_word(input)?
        };
        input = s;
        words.push(word);
    }

    Ok((input, words))
}

#[cfg(test)]
mod tokenizer_test {
    use super::*;

    fn test_tokenize_1(expected: Vec<&str>, input: &str) {
        if let Ok(("", result)) = tokenize_line(input) {
            assert_eq!(expected, result);
        } else {
            println!("result = {:?}", tokenize_line(input));
            assert!(false);
        }
    }

    #[test]
    fn test_tokenize_empty() {
        test_tokenize_1(vec![], "");
        test_tokenize_1(vec![], "   \t ");
    }

    #[test]
    fn test_tokenize_words() {
        test_tokenize_1(vec!["store", "#5", "+", "#7", "at", "#10"], "store #5 + #7 at #10");
    }

    #[test]
    fn test_tokenize_string_literal() {
        test_tokenize_1(vec!["output", "$hello"], "output \"hello\"");
        test_tokenize_1(vec!["$ two words "], "\" two words \"");
        test_tokenize_1(vec!["$"], "\"\"");
    }

    #[test]
    fn test_tokenize_unterminated_string() {
        assert!(tokenize_line("store \"oops").is_err());
    }

    #[test]
    fn test_tokenize_mixed() {
        test_tokenize_1(
            vec!["store", "$hello", "cat", "$ world", "at", "#50"],
            "store \"hello\" cat \" world\" at #50",
        );
    }
}
