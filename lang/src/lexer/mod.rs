mod token;


pub use token::{Span, Token, TokenKind};

use std::str::Chars;

pub struct Lexer<'a> {
    source: &'a str,
    chars: Chars<'a>,
    position: usize,
    line: u32,
    column: u32,
    /// Depth of open `(`/`[` pairs. Newlines inside them are plain
    /// whitespace; at depth zero they separate statements.
    bracket_depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars(),
            position: 0,
            line: 1,
            column: 1,
            bracket_depth: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start_position = self.position;
        let start_line = self.line;
        let start_column = self.column;

        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '\n' => {
                    self.advance();
                    TokenKind::Newline
                }

                // `#` followed by a name is codeblock syntax; anything else
                // after `#` starts a line comment.
                '#' if !self.is_identifier_start_next() => {
                    self.skip_comment();
                    return self.next_token();
                }
                '#' => {
                    self.advance();
                    let name = self.identifier_text();
                    if self.peek() == Some('#') {
                        self.advance();
                        TokenKind::HashRun(name)
                    } else {
                        TokenKind::HashName(name)
                    }
                }

                '(' => {
                    self.advance();
                    self.bracket_depth += 1;
                    TokenKind::LeftParen
                }
                ')' => {
                    self.advance();
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    TokenKind::RightParen
                }
                '[' if self.peek_next() == Some(']') && self.peek_third() == Some('>') => {
                    self.advance();
                    self.advance();
                    self.advance();
                    TokenKind::IndexInto
                }
                '[' => {
                    self.advance();
                    self.bracket_depth += 1;
                    TokenKind::LeftBracket
                }
                ']' => {
                    self.advance();
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    TokenKind::RightBracket
                }
                '{' => {
                    self.advance();
                    TokenKind::LeftBrace
                }
                '}' => {
                    self.advance();
                    TokenKind::RightBrace
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                ':' => {
                    self.advance();
                    TokenKind::Colon
                }
                '&' => {
                    self.advance();
                    TokenKind::Amp
                }
                '@' => {
                    self.advance();
                    TokenKind::At
                }

                '+' => {
                    self.advance();
                    TokenKind::Plus
                }
                '*' => {
                    self.advance();
                    TokenKind::Star
                }
                '/' => {
                    self.advance();
                    TokenKind::Slash
                }

                '-' if self.peek_next() == Some('>') => {
                    self.advance();
                    self.advance();
                    TokenKind::Arrow
                }
                '-' => {
                    self.advance();
                    TokenKind::Minus
                }

                '=' if self.peek_next() == Some('=') => {
                    self.advance();
                    self.advance();
                    TokenKind::EqualEqual
                }

                '.' if self.peek_next() == Some('.') => {
                    self.advance();
                    self.advance();
                    TokenKind::DotDot
                }

                '?' if self.peek_next() == Some('%') => {
                    self.advance();
                    self.advance();
                    if self.peek() == Some('>') {
                        self.advance();
                        TokenKind::CondArrow
                    } else {
                        return Err(LexError {
                            message: "Expected '>' after '?%'".to_string(),
                            line: start_line,
                            column: start_column,
                        });
                    }
                }
                '?' => {
                    let mut count = 0u8;
                    while self.peek() == Some('?') {
                        self.advance();
                        count = count.saturating_add(1);
                    }
                    TokenKind::Question(count)
                }

                '%' if self.peek_next() == Some('>') => {
                    self.advance();
                    self.advance();
                    TokenKind::CallMarker
                }

                '~' => {
                    self.advance();
                    self.special(start_line, start_column)?
                }

                '!' if self.peek_next() == Some('"') => {
                    self.advance();
                    self.string(true)?
                }
                '"' => self.string(false)?,

                c if c.is_ascii_digit() => self.number(),

                c if self.is_identifier_start(c) => self.identifier_or_keyword(),

                c => {
                    return Err(LexError {
                        message: format!("Unexpected character: '{c}'"),
                        line: start_line,
                        column: start_column,
                    });
                }
            },
        };

        let span = Span {
            start: start_position,
            end: self.position,
            line: start_line,
            column: start_column,
        };

        let spaced = self.peek().is_some_and(|c| c.is_whitespace());

        Ok(Token { kind, span, spaced })
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.clone().nth(1)
    }

    fn peek_third(&self) -> Option<char> {
        self.chars.clone().nth(2)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            let skippable = c == ' '
                || c == '\t'
                || c == '\r'
                || (c == '\n' && self.bracket_depth > 0);
            if skippable {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        // Leave the terminating newline in place; it still separates
        // statements.
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn is_identifier_start(&self, c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn is_identifier_start_next(&self) -> bool {
        self.peek_next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    }

    fn identifier_text(&mut self) -> String {
        let start = self.position;

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        self.source[start..self.position].to_string()
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let text = self.identifier_text();

        match text.as_str() {
            "loop" => TokenKind::Loop,
            "pool" => TokenKind::Pool,
            _ => TokenKind::Identifier(text),
        }
    }

    fn number(&mut self) -> TokenKind {
        let start = self.position;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        // The raw text is kept: number literals are evaluated through the
        // literal-patch table, which is keyed by source text.
        let text = self.source[start..self.position].to_string();
        TokenKind::Number { text }
    }

    fn special(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        let start = self.position;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.position];
        let code: i64 = text.parse().map_err(|_| LexError {
            message: format!("Invalid special literal: ~{text}"),
            line,
            column,
        })?;

        Ok(TokenKind::Special(code))
    }

    fn string(&mut self, reversed: bool) -> Result<TokenKind, LexError> {
        let start_line = self.line;
        let start_column = self.column;

        self.advance();

        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        message: "Unterminated string literal".to_string(),
                        line: start_line,
                        column: start_column,
                    });
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('\\') => {
                            self.advance();
                            value.push('\\');
                        }
                        Some('"') => {
                            self.advance();
                            value.push('"');
                        }
                        Some(c) => {
                            return Err(LexError {
                                message: format!("Invalid escape sequence: \\{c}"),
                                line: self.line,
                                column: self.column,
                            });
                        }
                        None => {
                            return Err(LexError {
                                message: "Unterminated string literal".to_string(),
                                line: start_line,
                                column: start_column,
                            });
                        }
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(TokenKind::Str { value, reversed })
    }
}
