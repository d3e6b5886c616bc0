//! Tokenizer for the script language.
//!
//! Identifiers, numbers and comments are recognized with `nom` combinators;
//! string literals and punctuators are scanned by hand because they need
//! escape decoding and longest-match selection respectively.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until, take_while, take_while1},
    character::complete::{char, digit0, digit1, hex_digit1, not_line_ending, one_of},
    combinator::{opt, recognize},
    sequence::{delimited, pair, preceded, terminated, tuple},
};
use thiserror::Error;

use crate::ast::Pos;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {pos}")]
pub struct LexError {
    pub message: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword; the parser decides which
    Identifier(String),
    Number(f64),
    BigInt(i128),
    String(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    /// A line terminator appeared between the previous token and this one
    pub newline_before: bool,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(self.kind, TokenKind::Punct(q) if q == p)
    }

    pub fn is_word(&self, w: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(name) if name == w)
    }
}

// Longest first so that prefix matching picks the maximal munch
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@", "#", "`",
];

fn is_id_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_id_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(take_while1(is_id_start), take_while(is_id_continue)))(input)
}

fn hex_number(input: &str) -> IResult<&str, &str> {
    preceded(tag_no_case("0x"), hex_digit1)(input)
}

fn bigint_literal(input: &str) -> IResult<&str, &str> {
    terminated(digit1, char('n'))(input)
}

fn decimal_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), not_line_ending))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(delimited(tag("/*"), take_until("*/"), tag("*/")))(input)
}

struct Lexer<'a> {
    rest: &'a str,
    line: u32,
    col: u32,
    newline_pending: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            rest: source,
            line: 1,
            col: 1,
            newline_pending: false,
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            pos: self.pos(),
        }
    }

    /// Advance past `consumed`, which must be a prefix of `rest`
    fn advance(&mut self, consumed: usize) {
        let (taken, rest) = self.rest.split_at(consumed);
        for c in taken.chars() {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
                self.newline_pending = true;
            } else {
                self.col += 1;
            }
        }
        self.rest = rest;
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            let trimmed = self.rest.trim_start();
            let ws = self.rest.len() - trimmed.len();
            if ws > 0 {
                self.advance(ws);
                continue;
            }
            if let Ok((_, comment)) = line_comment(self.rest) {
                self.advance(comment.len());
                continue;
            }
            if self.rest.starts_with("/*") {
                match block_comment(self.rest) {
                    Ok((_, comment)) => {
                        self.advance(comment.len());
                        continue;
                    }
                    Err(_) => return Err(self.error("unterminated block comment")),
                }
            }
            return Ok(());
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let pos = self.pos();
        let newline_before = std::mem::take(&mut self.newline_pending);
        let kind = self.scan_kind()?;
        Ok(Token {
            kind,
            pos,
            newline_before,
        })
    }

    fn scan_kind(&mut self) -> Result<TokenKind, LexError> {
        let Some(first) = self.rest.chars().next() else {
            return Ok(TokenKind::Eof);
        };

        if is_id_start(first) {
            let (_, word) = identifier(self.rest).map_err(|_| self.error("invalid identifier"))?;
            let word = word.to_string();
            self.advance(word.len());
            return Ok(TokenKind::Identifier(word));
        }

        if first == '"' || first == '\'' {
            return self.scan_string(first);
        }

        let starts_number = first.is_ascii_digit()
            || (first == '.' && self.rest[1..].starts_with(|c: char| c.is_ascii_digit()));
        if starts_number {
            return self.scan_number();
        }

        for punct in PUNCTUATORS {
            if self.rest.starts_with(punct) {
                // `a?.5:b` is a conditional, not optional chaining
                if *punct == "?." && self.rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
                    continue;
                }
                self.advance(punct.len());
                return Ok(TokenKind::Punct(punct));
            }
        }

        Err(self.error(format!("unexpected character '{first}'")))
    }

    fn scan_number(&mut self) -> Result<TokenKind, LexError> {
        let kind = if let Ok((_, digits)) = hex_number(self.rest) {
            let value = i128::from_str_radix(digits, 16)
                .map(|v| v as f64)
                .map_err(|_| self.error("hex literal out of range"))?;
            self.advance(digits.len() + 2);
            TokenKind::Number(value)
        } else if let Ok((_, digits)) = bigint_literal(self.rest) {
            let value = digits
                .parse::<i128>()
                .map_err(|_| self.error("bigint literal out of range"))?;
            self.advance(digits.len() + 1);
            TokenKind::BigInt(value)
        } else {
            let (_, text) = decimal_number(self.rest).map_err(|_| self.error("invalid number"))?;
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("invalid number '{text}'")))?;
            self.advance(text.len());
            TokenKind::Number(value)
        };
        if self.rest.starts_with(is_id_start) || self.rest.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(self.error("identifier starts immediately after numeric literal"));
        }
        Ok(kind)
    }

    fn scan_string(&mut self, quote: char) -> Result<TokenKind, LexError> {
        let start = self.pos();
        let mut value = String::new();
        let mut chars = self.rest.char_indices().skip(1);
        let end = loop {
            let Some((i, c)) = chars.next() else {
                return Err(LexError {
                    message: "unterminated string literal".to_string(),
                    pos: start,
                });
            };
            match c {
                c if c == quote => break i + c.len_utf8(),
                '\n' => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        pos: start,
                    })
                }
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        continue;
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        'b' => value.push('\u{8}'),
                        'f' => value.push('\u{c}'),
                        'v' => value.push('\u{b}'),
                        '0' => value.push('\0'),
                        '\n' => {}
                        'x' => {
                            let hex: String = (0..2).filter_map(|_| chars.next().map(|(_, c)| c)).collect();
                            let code = u32::from_str_radix(&hex, 16)
                                .map_err(|_| self.error("invalid \\x escape"))?;
                            value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        'u' => {
                            let code = self.scan_unicode_escape(&mut chars)?;
                            value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        other => value.push(other),
                    }
                }
                c => value.push(c),
            }
        };
        self.advance(end);
        Ok(TokenKind::String(value))
    }

    fn scan_unicode_escape(
        &self,
        chars: &mut impl Iterator<Item = (usize, char)>,
    ) -> Result<u32, LexError> {
        let mut hex = String::new();
        let mut braced = false;
        while let Some((_, c)) = chars.next() {
            if c == '{' && hex.is_empty() && !braced {
                braced = true;
                continue;
            }
            if braced && c == '}' {
                break;
            }
            hex.push(c);
            if !braced && hex.len() == 4 {
                break;
            }
        }
        u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid \\u escape"))
    }
}

/// Tokenize a whole source string; the last token is always `Eof`
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_identifiers_and_punctuators() {
        assert_eq!(
            kinds("a.b >>>= c"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Punct("."),
                TokenKind::Identifier("b".into()),
                TokenKind::Punct(">>>="),
                TokenKind::Identifier("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 0xff 12n"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(0.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(255.0),
                TokenKind::BigInt(12),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb" "\x41B\u{43}""#),
            vec![
                TokenKind::String("it's".into()),
                TokenKind::String("a\nb".into()),
                TokenKind::String("ABC".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_and_newlines() {
        let tokens = tokenize("let x = 1;\n  // note\n  x++").unwrap();
        assert_eq!(tokens[0].pos, Pos::new(1, 1));
        assert_eq!(tokens[1].pos, Pos::new(1, 5));
        assert!(!tokens[1].newline_before);
        let x = &tokens[5];
        assert!(x.is_word("x"));
        assert_eq!(x.pos, Pos::new(3, 3));
        assert!(x.newline_before);
    }

    #[test]
    fn test_block_comment_with_newline_counts_as_line_break() {
        let tokens = tokenize("a /* one\n two */ b").unwrap();
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].pos, Pos::new(2, 9));
    }

    #[test]
    fn test_optional_chain_vs_conditional() {
        assert!(kinds("a?.b").contains(&TokenKind::Punct("?.")));
        assert_eq!(kinds("a?.5:1")[1], TokenKind::Punct("?"));
    }

    #[test]
    fn test_lex_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("/* never closed").is_err());
        assert!(tokenize("3in x").is_err());
        let err = tokenize("a\n  \u{00a7}").unwrap_err();
        assert_eq!(err.pos, Pos::new(2, 3));
    }
}
