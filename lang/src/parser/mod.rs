pub mod ast;

#[cfg(test)]
mod tests;

pub use ast::*;

use crate::lexer::{Span, Token, TokenKind};
use std::rc::Rc;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// What terminates the statement list currently being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    /// End of input.
    TopLevel,
    /// `name ()` — closes a function body and names the function.
    FuncDef,
    /// The `pool` keyword closing a loop body.
    Pool,
    /// `}` closing a codeblock body.
    Brace,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens = tokens;
        if tokens.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span {
                    start: 0,
                    end: 0,
                    line: 1,
                    column: 1,
                },
                spaced: false,
            });
        }
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let statements = self.parse_statements(BlockEnd::TopLevel)?;
        Ok(Program { statements })
    }

    fn parse_statements(&mut self, end: BlockEnd) -> Result<Vec<SpannedStmt>, ParseError> {
        let mut statements = Vec::new();

        loop {
            self.skip_separators();
            if self.block_ends(end) {
                break;
            }
            if self.at_end() {
                return Err(ParseError::new(
                    match end {
                        BlockEnd::FuncDef => "Unterminated function body: expected 'name ()'",
                        BlockEnd::Pool => "Unterminated loop body: expected 'pool'",
                        BlockEnd::Brace => "Unterminated codeblock body: expected '}'",
                        BlockEnd::TopLevel => "Unexpected end of input",
                    },
                    self.current().span,
                ));
            }
            statements.push(self.parse_statement()?);
        }

        Ok(statements)
    }

    fn block_ends(&self, end: BlockEnd) -> bool {
        match end {
            BlockEnd::TopLevel => self.at_end(),
            BlockEnd::FuncDef => {
                matches!(self.kind(), TokenKind::Identifier(_))
                    && matches!(self.kind_at(1), TokenKind::LeftParen)
                    && matches!(self.kind_at(2), TokenKind::RightParen)
            }
            BlockEnd::Pool => matches!(self.kind(), TokenKind::Pool),
            BlockEnd::Brace => matches!(self.kind(), TokenKind::RightBrace),
        }
    }

    fn parse_statement(&mut self) -> Result<SpannedStmt, ParseError> {
        let span = self.current().span;

        match self.kind() {
            TokenKind::LeftParen
                if matches!(self.kind_at(1), TokenKind::Identifier(_))
                    && matches!(self.kind_at(2), TokenKind::RightParen) =>
            {
                self.parse_func_def(span)
            }
            TokenKind::Loop => self.parse_loop(span),
            TokenKind::HashRun(name) => {
                let name = name.clone();
                self.advance();
                Ok(Spanned::new(Stmt::CodeblockRun { name }, span))
            }
            TokenKind::HashName(_) => self.parse_codeblock(span),
            TokenKind::At => {
                self.advance();
                let marks = self.expect_question()?;
                Ok(Spanned::new(Stmt::PrintNewline { marks }, span))
            }
            _ => {
                let expr = self.parse_expression()?;
                match self.kind() {
                    TokenKind::Arrow => {
                        self.advance();
                        let target = self.parse_assign_target()?;
                        Ok(Spanned::new(
                            Stmt::Assignment {
                                value: expr,
                                target,
                            },
                            span,
                        ))
                    }
                    TokenKind::CondArrow => {
                        self.advance();
                        let consequent = if matches!(self.kind(), TokenKind::Pool) {
                            self.advance();
                            Consequent::Break
                        } else {
                            Consequent::Stmt(Box::new(self.parse_statement()?))
                        };
                        Ok(Spanned::new(
                            Stmt::Conditional {
                                condition: expr,
                                consequent,
                            },
                            span,
                        ))
                    }
                    TokenKind::Question(count) => {
                        let marks = *count;
                        self.advance();
                        Ok(Spanned::new(Stmt::Print { expr, marks }, span))
                    }
                    _ => Ok(Spanned::new(Stmt::Expr(expr), span)),
                }
            }
        }
    }

    fn parse_func_def(&mut self, span: Span) -> Result<SpannedStmt, ParseError> {
        self.advance(); // (
        let arg = self.expect_identifier("formal argument name")?;
        self.expect_kind(&TokenKind::RightParen, "')'")?;

        let body = Rc::new(self.parse_statements(BlockEnd::FuncDef)?);

        let name = self.expect_identifier("function name")?;
        self.expect_kind(&TokenKind::LeftParen, "'('")?;
        self.expect_kind(&TokenKind::RightParen, "')'")?;

        Ok(Spanned::new(Stmt::FuncDef { arg, body, name }, span))
    }

    fn parse_loop(&mut self, span: Span) -> Result<SpannedStmt, ParseError> {
        self.advance(); // loop
        let var = self.expect_identifier("loop variable")?;
        self.expect_kind(&TokenKind::Amp, "'&'")?;
        let iterable = self.parse_expression()?;

        let body = Rc::new(self.parse_statements(BlockEnd::Pool)?);
        self.expect_kind(&TokenKind::Pool, "'pool'")?;

        // An identifier directly after `pool` (same line, since a newline
        // would intervene as a token) labels the pool.
        let label = if let TokenKind::Identifier(name) = self.kind() {
            let name = name.clone();
            self.advance();
            Some(name)
        } else {
            None
        };

        Ok(Spanned::new(
            Stmt::Loop {
                var,
                iterable,
                body,
                label,
            },
            span,
        ))
    }

    fn parse_codeblock(&mut self, span: Span) -> Result<SpannedStmt, ParseError> {
        let name = if let TokenKind::HashName(name) = self.kind() {
            let name = name.clone();
            self.advance();
            name
        } else {
            return Err(ParseError::new(
                "Expected a codeblock name",
                self.current().span,
            ));
        };

        match self.kind() {
            TokenKind::At => {
                self.advance();
                self.expect_kind(&TokenKind::LeftBrace, "'{'")?;
                let body = Rc::new(self.parse_statements(BlockEnd::Brace)?);
                self.expect_kind(&TokenKind::RightBrace, "'}'")?;
                Ok(Spanned::new(
                    Stmt::CodeblockDef {
                        name,
                        delayed: true,
                        body,
                    },
                    span,
                ))
            }
            TokenKind::LeftBrace => {
                self.advance();
                let body = Rc::new(self.parse_statements(BlockEnd::Brace)?);
                self.expect_kind(&TokenKind::RightBrace, "'}'")?;
                Ok(Spanned::new(
                    Stmt::CodeblockDef {
                        name,
                        delayed: false,
                        body,
                    },
                    span,
                ))
            }
            _ => Err(ParseError::new(
                "Expected '{' or '@{' after codeblock name",
                self.current().span,
            )),
        }
    }

    fn parse_assign_target(&mut self) -> Result<AssignTarget, ParseError> {
        match self.kind().clone() {
            TokenKind::Number { text } => {
                self.advance();
                Ok(AssignTarget::Literal(text))
            }
            TokenKind::Minus if matches!(self.kind_at(1), TokenKind::Number { .. }) => {
                self.advance();
                if let TokenKind::Number { text } = self.kind().clone() {
                    self.advance();
                    Ok(AssignTarget::Literal(format!("-{text}")))
                } else {
                    Err(ParseError::new(
                        "Expected a number literal",
                        self.current().span,
                    ))
                }
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(AssignTarget::Variable(name))
            }
            _ => Err(ParseError::new(
                "Assignment target must be a name or a number literal",
                self.current().span,
            )),
        }
    }

    fn parse_expression(&mut self) -> Result<SpannedExpr, ParseError> {
        let first = self.parse_term()?;
        let span = first.span;
        let mut rest = Vec::new();

        loop {
            let token = self.current().clone();
            let op = match token.kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::EqualEqual => BinOp::Eq,
                TokenKind::IndexInto => BinOp::Index,
                TokenKind::CallMarker => {
                    self.advance();
                    self.expect_kind(&TokenKind::LeftParen, "'('")?;
                    self.expect_kind(&TokenKind::RightParen, "')'")?;
                    rest.push(ChainItem::Apply { span: token.span });
                    continue;
                }
                _ => break,
            };

            self.advance();
            let term = self.parse_term()?;
            rest.push(ChainItem::Op {
                op,
                spaced: token.spaced,
                term,
            });
        }

        Ok(Spanned::new(Expr { first, rest }, span))
    }

    fn parse_term(&mut self) -> Result<SpannedTerm, ParseError> {
        let token = self.current().clone();
        let span = token.span;

        match token.kind {
            TokenKind::Number { text } => {
                self.advance();
                let value = parse_number(&text, span)?;
                Ok(Spanned::new(Term::Number { text, value }, span))
            }
            TokenKind::Minus if matches!(self.kind_at(1), TokenKind::Number { .. }) => {
                self.advance();
                if let TokenKind::Number { text } = self.kind().clone() {
                    self.advance();
                    let text = format!("-{text}");
                    let value = parse_number(&text, span)?;
                    Ok(Spanned::new(Term::Number { text, value }, span))
                } else {
                    Err(ParseError::new("Expected a number literal", span))
                }
            }
            TokenKind::Str { value, reversed } => {
                self.advance();
                Ok(Spanned::new(Term::Str { value, reversed }, span))
            }
            TokenKind::Special(code) => {
                self.advance();
                Ok(Spanned::new(Term::Special(code), span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Spanned::new(Term::Variable(name), span))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_kind(&TokenKind::RightParen, "')'")?;
                Ok(Spanned::new(Term::Group(Box::new(expr)), span))
            }
            TokenKind::LeftBracket => self.parse_list_or_generator(span),
            kind => Err(ParseError::new(
                format!("Expected a value, found '{kind}'"),
                span,
            )),
        }
    }

    fn parse_list_or_generator(&mut self, span: Span) -> Result<SpannedTerm, ParseError> {
        self.advance(); // [

        if matches!(self.kind(), TokenKind::RightBracket) {
            self.advance();
            return self.finish_list(Vec::new(), span);
        }

        let mut elements = Vec::new();
        let ellipsis;

        loop {
            elements.push(self.parse_expression()?);
            match self.kind() {
                TokenKind::Comma => {
                    self.advance();
                    if matches!(self.kind(), TokenKind::DotDot) {
                        self.advance();
                        self.expect_kind(&TokenKind::RightBracket, "']'")?;
                        ellipsis = true;
                        break;
                    }
                }
                TokenKind::RightBracket => {
                    self.advance();
                    ellipsis = false;
                    break;
                }
                kind => {
                    return Err(ParseError::new(
                        format!("Expected ',' or ']' in list, found '{kind}'"),
                        self.current().span,
                    ));
                }
            }
        }

        if !ellipsis {
            return self.finish_list(elements, span);
        }

        // A bare identifier directly before `,..` is always the recurrence
        // function name; otherwise one element repeats and two form an
        // arithmetic progression.
        if let Some(func) = elements.last().and_then(bare_variable_name) {
            let func = func.to_string();
            elements.pop();
            return Ok(Spanned::new(
                Term::GenFunc {
                    seeds: elements,
                    func,
                },
                span,
            ));
        }

        let mut it = elements.into_iter();
        match (it.next(), it.next(), it.next()) {
            (Some(value), None, _) => Ok(Spanned::new(Term::GenConst(Box::new(value)), span)),
            (Some(first), Some(second), None) => Ok(Spanned::new(
                Term::GenArith(Box::new(first), Box::new(second)),
                span,
            )),
            _ => Err(ParseError::new(
                "Invalid generator: expected '[value ,..]', '[first, second ,..]' or seeds followed by a function name",
                span,
            )),
        }
    }

    fn finish_list(
        &mut self,
        elements: Vec<SpannedExpr>,
        span: Span,
    ) -> Result<SpannedTerm, ParseError> {
        // A list literal directly followed by `( name )` prepares a call.
        if matches!(self.kind(), TokenKind::LeftParen)
            && matches!(self.kind_at(1), TokenKind::Identifier(_))
            && matches!(self.kind_at(2), TokenKind::RightParen)
        {
            self.advance();
            let name = self.expect_identifier("function name")?;
            self.expect_kind(&TokenKind::RightParen, "')'")?;
            return Ok(Spanned::new(
                Term::FuncPrep {
                    args: elements,
                    name,
                },
                span,
            ));
        }

        Ok(Spanned::new(Term::List(elements), span))
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn kind_at(&self, offset: usize) -> &TokenKind {
        let index = (self.position + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn skip_separators(&mut self) {
        while matches!(self.kind(), TokenKind::Newline | TokenKind::Colon) {
            self.advance();
        }
    }

    fn expect_kind(&mut self, expected: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.kind() == expected {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                format!("Expected {what}, found '{}'", self.kind()),
                self.current().span,
            ))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        if let TokenKind::Identifier(name) = self.kind() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(ParseError::new(
                format!("Expected {what}, found '{}'", self.kind()),
                self.current().span,
            ))
        }
    }

    fn expect_question(&mut self) -> Result<u8, ParseError> {
        if let TokenKind::Question(count) = self.kind() {
            let count = *count;
            self.advance();
            Ok(count)
        } else {
            Err(ParseError::new(
                format!("Expected '?', found '{}'", self.kind()),
                self.current().span,
            ))
        }
    }
}

fn parse_number(text: &str, span: Span) -> Result<i64, ParseError> {
    text.parse().map_err(|_| {
        ParseError::new(format!("Integer literal out of range: {text}"), span)
    })
}

fn bare_variable_name(expr: &SpannedExpr) -> Option<&str> {
    if !expr.node.rest.is_empty() {
        return None;
    }
    match &expr.node.first.node {
        Term::Variable(name) => Some(name.as_str()),
        _ => None,
    }
}
