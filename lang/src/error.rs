use crate::interp::EvalError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use std::fmt;

/// Unified error type for every stage of a run.
#[derive(Debug)]
pub enum RillError {
    Lex(LexError),
    Parse(ParseError),
    Eval(EvalError),
}

impl From<LexError> for RillError {
    fn from(err: LexError) -> Self {
        RillError::Lex(err)
    }
}

impl From<ParseError> for RillError {
    fn from(err: ParseError) -> Self {
        RillError::Parse(err)
    }
}

impl From<EvalError> for RillError {
    fn from(err: EvalError) -> Self {
        RillError::Eval(err)
    }
}

impl fmt::Display for RillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RillError::Lex(err) => write!(
                f,
                "Lexical error at line {}, column {}: {}",
                err.line, err.column, err.message
            ),
            RillError::Parse(err) => write!(
                f,
                "Parse error at line {}, column {}: {}",
                err.span.line, err.span.column, err.message
            ),
            RillError::Eval(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RillError {}

impl RillError {
    /// Format error with source context
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, column, message, kind) = match self {
            RillError::Lex(err) => (err.line, err.column, err.message.clone(), "Lexical error"),
            RillError::Parse(err) => (
                err.span.line,
                err.span.column,
                err.message.clone(),
                "Parse error",
            ),
            RillError::Eval(err) => (err.line, 0, err.message.clone(), err.kind_label()),
        };

        let mut output = String::new();

        // Error header
        output.push_str(&format!("\n{} at line {}", kind, line));
        if column > 0 {
            output.push_str(&format!(", column {}", column));
        }
        output.push_str(&format!(": {}\n\n", message));

        // Source context (5 lines around error)
        let lines: Vec<&str> = source.lines().collect();
        let error_line_idx = (line as usize).saturating_sub(1);

        let start = error_line_idx.saturating_sub(2);
        let end = (error_line_idx + 3).min(lines.len());

        for (idx, line_content) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = idx + 1;
            let is_error_line = idx == error_line_idx;

            if is_error_line {
                output.push_str(&format!(" → {:4} | {}\n", line_num, line_content));

                // Add caret pointing to error position
                if column > 0 {
                    output.push_str("        | ");
                    output.push_str(&" ".repeat(column as usize - 1));
                    output.push_str("^\n");
                }
            } else {
                output.push_str(&format!("   {:4} | {}\n", line_num, line_content));
            }
        }

        output
    }
}
