//! Tokenizer for the formula language.
//!
//! Keywords (`if`, `and`, `val2`, `sum`...) are lexed as plain identifiers
//! and classified by the compiler, so the token set stays small.

use super::ledger::CompileError;
use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""[^"]*""#, |lex| unquote(lex.slice()))]
    #[regex(r"'[^']*'", |lex| unquote(lex.slice()))]
    Str(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,

    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    #[token("=")]
    Eq,
    #[token("!=")]
    #[token("<>")]
    Ne,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
}

fn unquote(s: &str) -> String {
    s[1..s.len() - 1].to_string()
}

pub type Spanned = (Token, Range<usize>);

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut out = Vec::new();
    for (tok, span) in Token::lexer(src).spanned() {
        match tok {
            Ok(t) => out.push((t, span)),
            Err(()) => {
                return Err(CompileError::Syntax {
                    pos: span.start,
                    msg: format!("unexpected input '{}'", &src[span]),
                })
            }
        }
    }
    if out.is_empty() {
        return Err(CompileError::Empty);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[rstest]
    #[case("1", 1.0)]
    #[case("2.5", 2.5)]
    #[case(".5", 0.5)]
    #[case("1e-3", 0.001)]
    fn test_numbers(#[case] src: &str, #[case] expected: f64) {
        assert_eq!(kinds(src), vec![Token::Number(expected)]);
    }

    #[test]
    fn test_operators_and_aliases() {
        assert_eq!(
            kinds("a <= b <> c = d"),
            vec![
                Token::Ident("a".into()),
                Token::Le,
                Token::Ident("b".into()),
                Token::Ne,
                Token::Ident("c".into()),
                Token::Eq,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn test_strings_and_index() {
        assert_eq!(
            kinds("category[t] == 'Tech'"),
            vec![
                Token::Ident("category".into()),
                Token::LBracket,
                Token::Ident("t".into()),
                Token::RBracket,
                Token::Eq,
                Token::Str("Tech".into()),
            ]
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(tokenize("1 $ 2"), Err(CompileError::Syntax { pos: 2, .. })));
        assert_eq!(tokenize("   "), Err(CompileError::Empty));
    }
}
