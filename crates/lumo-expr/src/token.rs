//! Lexer for the sandbox language.

use crate::error::{ExprError, ExprResult};

/// A lexical token with the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Num(f64),
    Str(String),
    Ident(String),

    // Keywords
    Let,
    If,
    Else,
    Return,
    True,
    False,
    Null,

    // Punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Question,
    Colon,
    Semicolon,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl TokenKind {
    /// Short description used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Num(n) => format!("number {n}"),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{other:?}"),
        }
    }
}

/// Tokenize `source` into a flat token list (terminated by `Eof`).
///
/// Supports `//` and `#` line comments. Strings are double-quoted with
/// `\n`, `\t`, `\"` and `\\` escapes.
pub fn tokenize(source: &str) -> ExprResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                skip_line(&mut chars);
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    skip_line(&mut chars);
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Slash,
                        line,
                    });
                }
            }
            '"' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Str(lex_string(&mut chars, line)?),
                    line,
                });
            }
            c if c.is_ascii_digit() => {
                tokens.push(Token {
                    kind: lex_number(&mut chars, line)?,
                    line,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let kind = match word.as_str() {
                    "let" => TokenKind::Let,
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    "return" => TokenKind::Return,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Ident(word),
                };
                tokens.push(Token { kind, line });
            }
            _ => {
                chars.next();
                let kind = match c {
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '%' => TokenKind::Percent,
                    '?' => TokenKind::Question,
                    ':' => TokenKind::Colon,
                    ';' => TokenKind::Semicolon,
                    ',' => TokenKind::Comma,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            TokenKind::NotEq
                        } else {
                            TokenKind::Bang
                        }
                    }
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            TokenKind::Eq
                        } else {
                            TokenKind::Assign
                        }
                    }
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            TokenKind::LtEq
                        } else {
                            TokenKind::Lt
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            TokenKind::GtEq
                        } else {
                            TokenKind::Gt
                        }
                    }
                    '&' => {
                        if chars.peek() == Some(&'&') {
                            chars.next();
                            TokenKind::AndAnd
                        } else {
                            return Err(unexpected(c, line));
                        }
                    }
                    '|' => {
                        if chars.peek() == Some(&'|') {
                            chars.next();
                            TokenKind::OrOr
                        } else {
                            return Err(unexpected(c, line));
                        }
                    }
                    _ => return Err(unexpected(c, line)),
                };
                tokens.push(Token { kind, line });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

/// Consume to (not through) the next newline, so line counting stays right.
fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while let Some(&c) = chars.peek() {
        if c == '\n' {
            break;
        }
        chars.next();
    }
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: u32,
) -> ExprResult<String> {
    let mut s = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(s),
            Some('\\') => match chars.next() {
                Some('n') => s.push('\n'),
                Some('t') => s.push('\t'),
                Some('"') => s.push('"'),
                Some('\\') => s.push('\\'),
                Some(other) => s.push(other),
                None => {
                    return Err(ExprError::Parse {
                        line,
                        message: "unterminated string".to_string(),
                    })
                }
            },
            Some(c) => s.push(c),
            None => {
                return Err(ExprError::Parse {
                    line,
                    message: "unterminated string".to_string(),
                })
            }
        }
    }
}

fn lex_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: u32,
) -> ExprResult<TokenKind> {
    let mut s = String::new();
    let mut seen_dot = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            s.push(c);
            chars.next();
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            s.push(c);
            chars.next();
        } else {
            break;
        }
    }
    s.parse::<f64>()
        .map(TokenKind::Num)
        .map_err(|_| ExprError::Parse {
            line,
            message: format!("invalid number literal `{s}`"),
        })
}

fn unexpected(c: char, line: u32) -> ExprError {
    ExprError::Parse {
        line,
        message: format!("unexpected character `{c}`"),
    }
}
