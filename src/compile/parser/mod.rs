use std::iter::Peekable;

use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::{Parser, error::RichReason, input::Input, prelude::Rich};
use thiserror::Error;

use crate::compile::ast::{Block, FunctionDef, Program, Stmt, StmtKind};

use lex::Token;
use parse::{Header, Line, line_parser};

pub mod lex;
pub mod parse;

pub use crate::compile::ast::SourcePos;
pub type Spanned<T> = (T, SourcePos);

/// Maps byte offsets to 1-based line and column numbers.
#[derive(Debug, Clone)]
pub struct LineIndex<'src> {
    src: &'src str,
    starts: Vec<usize>,
}

impl<'src> LineIndex<'src> {
    pub fn new(src: &'src str) -> Self {
        let starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self { src, starts }
    }

    pub fn line(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.line(offset);
        let start = self.starts[line - 1];
        let column = match self.src.get(start..offset) {
            Some(prefix) => prefix.chars().count(),
            None => offset.saturating_sub(start),
        };

        (line, column + 1)
    }

    /// Converts a byte range to the character range the snippet renderer counts in.
    pub fn char_span(&self, span: &SourcePos) -> SourcePos {
        let to_char = |offset: usize| match self.src.get(..offset) {
            Some(prefix) => prefix.chars().count(),
            None => self.src.chars().count(),
        };

        to_char(span.start)..to_char(span.end)
    }
}

/// Renders a labelled source snippet for a diagnostic.
pub fn render_snippet(src: &str, span: &SourcePos, message: &str, hint: Option<&str>) -> String {
    let index = LineIndex::new(src);
    let span = index.char_span(span);

    let mut report = Report::build(ReportKind::Error, span.clone())
        .with_config(Config::default().with_color(false))
        .with_message(message)
        .with_label(Label::new(span).with_message(message));

    if let Some(hint) = hint {
        report = report.with_help(hint);
    }

    let mut out = Vec::new();
    match report.finish().write(Source::from(src.to_string()), &mut out) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => message.to_string(),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at line {line}, column {column}")]
pub struct SyntaxError {
    pub message: String,
    pub hint: Option<String>,
    pub line: usize,
    pub column: usize,
    pub span: SourcePos,
}

impl SyntaxError {
    fn new(message: impl Into<String>, span: SourcePos, index: &LineIndex) -> Self {
        let (line, column) = index.position(span.start);

        Self {
            message: message.into(),
            hint: None,
            line,
            column,
            span,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// The error rendered against its source text, with the offending range underlined.
    pub fn report(&self, src: &str) -> String {
        render_snippet(src, &self.span, &self.to_string(), self.hint.as_deref())
    }
}

/// Tokens that share one logical line. Lines continue while brackets are open.
struct LogicalLine<'t, 'src> {
    indent: usize,
    tokens: &'t [Spanned<Token<'src>>],
}

impl LogicalLine<'_, '_> {
    fn span(&self) -> SourcePos {
        match (self.tokens.first(), self.tokens.last()) {
            (Some((_, first)), Some((_, last))) => first.start..last.end,
            _ => 0..0,
        }
    }
}

fn logical_lines<'t, 'src>(
    tokens: &'t [Spanned<Token<'src>>],
    index: &LineIndex,
) -> Vec<LogicalLine<'t, 'src>> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;

    for (i, (token, span)) in tokens.iter().enumerate() {
        match token {
            Token::L_ROUND | Token::L_SQUARE => depth += 1,
            Token::R_ROUND | Token::R_SQUARE => depth = depth.saturating_sub(1),
            _ => {}
        }

        let breaks = match tokens.get(i + 1) {
            Some((_, next)) => depth == 0 && index.line(next.start) != index.line(span.start),
            None => true,
        };

        if breaks {
            let line = &tokens[start..=i];
            let indent = index.position(line[0].1.start).1 - 1;

            lines.push(LogicalLine {
                indent,
                tokens: line,
            });
            start = i + 1;
        }
    }

    lines
}

fn is_header_keyword(token: &Token) -> bool {
    matches!(
        token,
        Token::IF
            | Token::ELSE
            | Token::WHILE
            | Token::FOR
            | Token::DEF
            | Token::TRY
            | Token::EXCEPT
    )
}

fn line_error(
    err: &Rich<'_, Token<'_>, SourcePos>,
    line: &LogicalLine,
    index: &LineIndex,
) -> SyntaxError {
    let message = match err.reason() {
        RichReason::Custom(message) => message.to_string(),
        _ => match err.found() {
            Some(token) => format!("unexpected token {token}"),
            None => "unexpected end of line".to_string(),
        },
    };

    let error = SyntaxError::new(message, err.span().clone(), index);

    let opens = line
        .tokens
        .iter()
        .filter(|(t, _)| matches!(t, Token::L_ROUND | Token::L_SQUARE))
        .count();
    let closes = line
        .tokens
        .iter()
        .filter(|(t, _)| matches!(t, Token::R_ROUND | Token::R_SQUARE))
        .count();

    let header = line.tokens.first().map(|(t, _)| t).filter(|t| is_header_keyword(t));
    let has_colon = line.tokens.iter().any(|(t, _)| *t == Token::COLON);

    if let Some(keyword) = header.filter(|_| !has_colon) {
        error.with_hint(format!("add ':' at the end of the '{}' header", keyword.lexeme()))
    } else if opens > closes {
        error.with_hint("a bracket is opened but never closed")
    } else if err.found().is_none() {
        error.with_hint("the statement is incomplete")
    } else {
        error
    }
}

struct ParsedLine {
    indent: usize,
    span: SourcePos,
    line: Line,
}

fn parse_line(logical: &LogicalLine, index: &LineIndex) -> Result<ParsedLine, SyntaxError> {
    let span = logical.span();
    let token_stream = logical.tokens.map(span.end..span.end, |(t, s)| (t, s));

    match line_parser().parse(token_stream).into_result() {
        Ok(line) => Ok(ParsedLine {
            indent: logical.indent,
            span,
            line,
        }),
        Err(errors) => {
            let fallback = SyntaxError::new("invalid syntax", span.clone(), index);

            Err(errors
                .first()
                .map_or(fallback, |err| line_error(err, logical, index)))
        }
    }
}

/// Assembles parsed lines into nested blocks by their indentation column.
struct Layout<'a, I: Iterator<Item = ParsedLine>> {
    lines: Peekable<I>,
    index: &'a LineIndex<'a>,
    last_indent: usize,
}

impl<I: Iterator<Item = ParsedLine>> Layout<'_, I> {
    fn advance(&mut self) -> Option<ParsedLine> {
        let line = self.lines.next()?;
        self.last_indent = line.indent;

        Some(line)
    }

    fn block(&mut self, indent: usize) -> Result<Block, SyntaxError> {
        let mut body = Vec::new();

        while let Some(line) = self.lines.peek() {
            if line.indent < indent {
                break;
            }

            if line.indent > indent && self.last_indent > line.indent {
                return Err(
                    SyntaxError::new("inconsistent dedent", line.span.clone(), self.index)
                        .with_hint("dedent to the column of an enclosing block"),
                );
            }

            if line.indent > indent {
                return Err(
                    SyntaxError::new("unexpected indent", line.span.clone(), self.index)
                        .with_hint("indentation must match the enclosing block"),
                );
            }

            body.push(self.statement()?);
        }

        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        let Some(ParsedLine { indent, span, line }) = self.advance() else {
            return Err(SyntaxError::new("unexpected end of input", 0..0, self.index));
        };

        let (header, inline) = match line {
            Line::Simple(stmt) => return Ok(stmt),
            Line::Header(header, inline) => (header, inline),
        };

        let kind = match header {
            Header::Else => {
                return Err(SyntaxError::new(
                    "'else' without a matching 'if'",
                    span,
                    self.index,
                ));
            }
            Header::Except => {
                return Err(SyntaxError::new(
                    "'except' without a matching 'try'",
                    span,
                    self.index,
                ));
            }
            Header::If(cond) => {
                let then = self.body(indent, &span, "if", inline)?;
                let otherwise = self.clause(indent, Header::Else)?;

                StmtKind::If(cond, then, otherwise)
            }
            Header::While(cond) => StmtKind::While(cond, self.body(indent, &span, "while", inline)?),
            Header::For(var, iterable) => {
                StmtKind::For(var, iterable, self.body(indent, &span, "for", inline)?)
            }
            Header::Def(name, params) => {
                let body = self.body(indent, &span, "def", inline)?;

                StmtKind::FunctionDef(FunctionDef { name, params, body })
            }
            Header::Try => {
                let body = self.body(indent, &span, "try", inline)?;
                let Some(handler) = self.clause(indent, Header::Except)? else {
                    return Err(SyntaxError::new("'try' without 'except'", span, self.index)
                        .with_hint("every 'try' block needs an 'except:' clause at the same indentation"));
                };

                StmtKind::TryExcept(body, handler)
            }
        };

        Ok(Stmt::new(kind, span))
    }

    /// The body of a compound statement: the inline statement after the colon, or the
    /// more deeply indented lines that follow.
    fn body(
        &mut self,
        indent: usize,
        span: &SourcePos,
        keyword: &str,
        inline: Option<Stmt>,
    ) -> Result<Block, SyntaxError> {
        if let Some(stmt) = inline {
            return Ok(vec![stmt]);
        }

        match self.lines.peek() {
            Some(next) if next.indent > indent => {
                let indent = next.indent;
                self.block(indent)
            }
            _ => Err(SyntaxError::new(
                format!("expected an indented block after '{keyword}'"),
                span.end..span.end,
                self.index,
            )
            .with_hint("indent the statements that belong to this block")),
        }
    }

    /// An optional `else:` or `except:` line that continues the statement just read.
    fn clause(&mut self, indent: usize, expected: Header) -> Result<Option<Block>, SyntaxError> {
        let continues = match self.lines.peek() {
            Some(ParsedLine {
                indent: next,
                line: Line::Header(header, _),
                ..
            }) => *next == indent && *header == expected,
            _ => false,
        };

        if !continues {
            return Ok(None);
        }

        let Some(ParsedLine { span, line, .. }) = self.advance() else {
            return Ok(None);
        };

        let inline = match line {
            Line::Header(_, inline) => inline,
            Line::Simple(_) => None,
        };

        self.body(indent, &span, expected.keyword(), inline).map(Some)
    }
}

/// Parses a token list produced by [`lex::tokenize`] into a program.
///
/// Parsing stops at the first line that does not match the grammar.
pub fn parse(src: &str, tokens: &[Spanned<Token<'_>>]) -> Result<Program, SyntaxError> {
    let index = LineIndex::new(src);

    let lines = logical_lines(tokens, &index)
        .iter()
        .map(|line| parse_line(line, &index))
        .collect::<Result<Vec<_>, _>>()?;

    let mut layout = Layout {
        lines: lines.into_iter().peekable(),
        index: &index,
        last_indent: 0,
    };

    layout.block(0).map(Program::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::{BinaryOp, Expr};

    fn parse_src(src: &str) -> Result<Program, SyntaxError> {
        let lexed = lex::tokenize(src);
        parse(src, &lexed.tokens)
    }

    fn kinds(program: &Program) -> Vec<&StmtKind> {
        program.body.iter().map(|stmt| &stmt.kind).collect()
    }

    #[test]
    fn line_index_counts_from_one() {
        let index = LineIndex::new("ab\ncd\n\nx");

        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(4), (2, 2));
        assert_eq!(index.position(7), (4, 1));
    }

    #[test]
    fn parses_precedence() {
        let program = parse_src("x = 1 + 2 * 3").unwrap();

        assert_eq!(
            kinds(&program),
            vec![&StmtKind::Assign(
                "x".into(),
                Expr::Binary(
                    BinaryOp::Add,
                    Expr::Int(1).boxed(),
                    Expr::Binary(BinaryOp::Mul, Expr::Int(2).boxed(), Expr::Int(3).boxed())
                        .boxed(),
                )
            )]
        );
    }

    #[test]
    fn parses_if_else_blocks() {
        let program = parse_src("if x > 1:\n    print(x)\nelse:\n    print(0)\nprint(2)").unwrap();

        assert_eq!(program.body.len(), 2);
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::If(_, then, Some(otherwise)) if then.len() == 1 && otherwise.len() == 1
        ));
    }

    #[test]
    fn inline_body_after_colon() {
        let program = parse_src("while x < 3: x = x + 1").unwrap();

        assert!(matches!(&program.body[0].kind, StmtKind::While(_, body) if body.len() == 1));
    }

    #[test]
    fn brackets_continue_lines() {
        let program = parse_src("xs = [1,\n  2,\n  3]\nprint(len(xs))").unwrap();

        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn nested_function_body() {
        let program =
            parse_src("def f(a, b):\n    if a:\n        return b\n    return a\nprint(f(1, 2))")
                .unwrap();

        let StmtKind::FunctionDef(def) = &program.body[0].kind else {
            panic!("expected a function definition");
        };
        assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(def.body.len(), 2);
    }

    #[test]
    fn missing_colon_has_hint() {
        let err = parse_src("if x > 5\n    print(x)").unwrap_err();

        assert_eq!(err.line, 1);
        assert!(err.hint.as_deref().unwrap_or_default().contains("':'"));
    }

    #[test]
    fn missing_block_is_reported() {
        let err = parse_src("while True:\nprint(1)").unwrap_err();

        assert!(err.message.contains("expected an indented block"));
    }

    #[test]
    fn stray_indent_is_reported() {
        let err = parse_src("x = 1\n    y = 2").unwrap_err();

        assert_eq!(err.message, "unexpected indent");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn inconsistent_dedent_is_reported() {
        let err = parse_src("if x:\n    y = 1\n  z = 2").unwrap_err();

        assert_eq!(err.message, "inconsistent dedent");
    }

    #[test]
    fn else_without_if_is_reported() {
        let err = parse_src("x = 1\nelse:\n    x = 2").unwrap_err();

        assert!(err.message.contains("'else'"));
    }

    #[test]
    fn oversized_integer_literal_is_named() {
        let err = parse_src("x = 100000000000000000000").unwrap_err();

        assert_eq!(err.message, "integer literal 100000000000000000000 is too large");
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    fn try_requires_except() {
        assert!(parse_src("try:\n    x = 1\ny = 2").is_err());
        assert!(parse_src("try:\n    x = 1\nexcept:\n    x = 2").is_ok());
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let err = parse_src("def f(a, a):\n    return a").unwrap_err();

        assert!(err.message.contains("duplicate parameter"));
    }

    #[test]
    fn report_points_at_source() {
        let src = "x = (1 + 2";
        let err = parse_src(src).unwrap_err();

        assert!(err.report(src).contains("x = (1 + 2"));
    }
}
