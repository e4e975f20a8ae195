use std::fmt::{self, Display, Formatter};

use chumsky::prelude::*;
use thiserror::Error;

use super::{LineIndex, SourcePos, Spanned};

#[derive(Clone, Debug, PartialEq)]
#[allow(non_camel_case_types)]
pub enum Token<'src> {
    IDENT(&'src str),
    INT(&'src str),
    FLOAT(&'src str),
    STRING(String),
    IF,
    ELSE,
    WHILE,
    FOR,
    IN,
    DEF,
    RETURN,
    BREAK,
    CONTINUE,
    TRY,
    EXCEPT,
    PRINT,
    LEN,
    RANGE,
    AND,
    OR,
    NOT,
    TRUE,
    FALSE,
    L_ROUND,
    R_ROUND,
    L_SQUARE,
    R_SQUARE,
    COLON,
    COMMA,
    DOT,
    ASSIGN,
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    EQ,
    NOT_EQ,
    LESS,
    LESS_EQ,
    GREATER,
    GREATER_EQ,
    /// A character no other token starts with. Never leaves [`tokenize`].
    UNKNOWN(char),
    /// A quote with no closing partner on its line. Never leaves [`tokenize`].
    UNTERMINATED,
}

/// Token classes used by the token table summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenCategory {
    Keyword,
    Identifier,
    Literal,
    Operator,
    Delimiter,
}

impl Display for TokenCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyword => "Keywords",
            Self::Identifier => "Identifiers",
            Self::Literal => "Literals",
            Self::Operator => "Operators",
            Self::Delimiter => "Delimiters",
        };

        write!(f, "{name}")
    }
}

impl Token<'_> {
    /// The kind name shown in token listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IDENT(_) => "IDENTIFIER",
            Self::INT(_) | Self::FLOAT(_) => "NUMBER",
            Self::STRING(_) => "STRING",
            Self::IF => "IF",
            Self::ELSE => "ELSE",
            Self::WHILE => "WHILE",
            Self::FOR => "FOR",
            Self::IN => "IN",
            Self::DEF => "DEF",
            Self::RETURN => "RETURN",
            Self::BREAK => "BREAK",
            Self::CONTINUE => "CONTINUE",
            Self::TRY => "TRY",
            Self::EXCEPT => "EXCEPT",
            Self::PRINT => "PRINT",
            Self::LEN => "LEN",
            Self::RANGE => "RANGE",
            Self::AND => "AND",
            Self::OR => "OR",
            Self::NOT => "NOT",
            Self::TRUE => "TRUE",
            Self::FALSE => "FALSE",
            Self::L_ROUND => "LPAREN",
            Self::R_ROUND => "RPAREN",
            Self::L_SQUARE => "LBRACKET",
            Self::R_SQUARE => "RBRACKET",
            Self::COLON => "COLON",
            Self::COMMA => "COMMA",
            Self::DOT => "DOT",
            Self::ASSIGN => "EQUALS",
            Self::PLUS => "PLUS",
            Self::MINUS => "MINUS",
            Self::STAR => "TIMES",
            Self::SLASH => "DIVIDE",
            Self::PERCENT => "MODULO",
            Self::EQ => "EQ",
            Self::NOT_EQ => "NE",
            Self::LESS => "LT",
            Self::LESS_EQ => "LE",
            Self::GREATER => "GT",
            Self::GREATER_EQ => "GE",
            Self::UNKNOWN(_) => "UNKNOWN",
            Self::UNTERMINATED => "UNTERMINATED",
        }
    }

    pub fn category(&self) -> TokenCategory {
        match self {
            Self::IDENT(_) => TokenCategory::Identifier,
            Self::INT(_) | Self::FLOAT(_) | Self::STRING(_) | Self::TRUE | Self::FALSE => {
                TokenCategory::Literal
            }
            Self::L_ROUND
            | Self::R_ROUND
            | Self::L_SQUARE
            | Self::R_SQUARE
            | Self::COLON
            | Self::COMMA
            | Self::DOT => TokenCategory::Delimiter,
            Self::ASSIGN
            | Self::PLUS
            | Self::MINUS
            | Self::STAR
            | Self::SLASH
            | Self::PERCENT
            | Self::EQ
            | Self::NOT_EQ
            | Self::LESS
            | Self::LESS_EQ
            | Self::GREATER
            | Self::GREATER_EQ => TokenCategory::Operator,
            _ => TokenCategory::Keyword,
        }
    }

    /// Source-like spelling of the token, strings without quotes.
    pub fn lexeme(&self) -> String {
        match self {
            Self::IDENT(text) | Self::INT(text) | Self::FLOAT(text) => text.to_string(),
            Self::STRING(value) => value.clone(),
            Self::TRUE => "True".to_string(),
            Self::FALSE => "False".to_string(),
            Self::UNKNOWN(c) => c.to_string(),
            other => other.symbol().to_string(),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::IF => "if",
            Self::ELSE => "else",
            Self::WHILE => "while",
            Self::FOR => "for",
            Self::IN => "in",
            Self::DEF => "def",
            Self::RETURN => "return",
            Self::BREAK => "break",
            Self::CONTINUE => "continue",
            Self::TRY => "try",
            Self::EXCEPT => "except",
            Self::PRINT => "print",
            Self::LEN => "len",
            Self::RANGE => "range",
            Self::AND => "and",
            Self::OR => "or",
            Self::NOT => "not",
            Self::L_ROUND => "(",
            Self::R_ROUND => ")",
            Self::L_SQUARE => "[",
            Self::R_SQUARE => "]",
            Self::COLON => ":",
            Self::COMMA => ",",
            Self::DOT => ".",
            Self::ASSIGN => "=",
            Self::PLUS => "+",
            Self::MINUS => "-",
            Self::STAR => "*",
            Self::SLASH => "/",
            Self::PERCENT => "%",
            Self::EQ => "==",
            Self::NOT_EQ => "!=",
            Self::LESS => "<",
            Self::LESS_EQ => "<=",
            Self::GREATER => ">",
            Self::GREATER_EQ => ">=",
            _ => "",
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::STRING(value) => write!(f, "{value:?}"),
            other => write!(f, "'{}'", other.lexeme()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unrecognized character {character:?} at line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
        span: SourcePos,
    },

    #[error("unterminated string literal at line {line}, column {column}")]
    UnterminatedString {
        line: usize,
        column: usize,
        span: SourcePos,
    },
}

/// Tokens of a source text together with the problems the lexer skipped over.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexed<'src> {
    pub tokens: Vec<Spanned<Token<'src>>>,
    pub errors: Vec<LexError>,
}

type ErrorParserExtra<'src> = extra::Err<Rich<'src, char, SimpleSpan>>;

fn number<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> {
    text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(|value: &'src str| {
            if value.contains('.') {
                Token::FLOAT(value)
            } else {
                Token::INT(value)
            }
        })
}

fn string<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> {
    let escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('0').to('\0'),
        just('\\'),
        just('"'),
        just('\''),
        any(),
    )));

    let double = just('"')
        .ignore_then(
            none_of(['\\', '"', '\n'])
                .or(escape.clone())
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'));

    let single = just('\'')
        .ignore_then(
            none_of(['\\', '\'', '\n'])
                .or(escape)
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('\''));

    double.or(single).map(Token::STRING)
}

/// An opening quote the string rule could not close. The rest of the line belongs to it.
fn unterminated<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> {
    one_of(['"', '\''])
        .then(none_of(['\n']).repeated())
        .to(Token::UNTERMINATED)
}

pub fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<Token<'src>>>, ErrorParserExtra<'src>> {
    let ident = text::ascii::ident().map(|ident| match ident {
        "if" => Token::IF,
        "else" => Token::ELSE,
        "while" => Token::WHILE,
        "for" => Token::FOR,
        "in" => Token::IN,
        "def" => Token::DEF,
        "return" => Token::RETURN,
        "break" => Token::BREAK,
        "continue" => Token::CONTINUE,
        "try" => Token::TRY,
        "except" => Token::EXCEPT,
        "print" => Token::PRINT,
        "len" => Token::LEN,
        "range" => Token::RANGE,
        "and" => Token::AND,
        "or" => Token::OR,
        "not" => Token::NOT,
        "True" => Token::TRUE,
        "False" => Token::FALSE,
        _ => Token::IDENT(ident),
    });

    let op = choice((
        just("==").to(Token::EQ),
        just("!=").to(Token::NOT_EQ),
        just("<=").to(Token::LESS_EQ),
        just(">=").to(Token::GREATER_EQ),
        just("<").to(Token::LESS),
        just(">").to(Token::GREATER),
        just("=").to(Token::ASSIGN),
        just("+").to(Token::PLUS),
        just("-").to(Token::MINUS),
        just("*").to(Token::STAR),
        just("/").to(Token::SLASH),
        just("%").to(Token::PERCENT),
    ));

    let delimiter = choice((
        just("(").to(Token::L_ROUND),
        just(")").to(Token::R_ROUND),
        just("[").to(Token::L_SQUARE),
        just("]").to(Token::R_SQUARE),
        just(":").to(Token::COLON),
        just(",").to(Token::COMMA),
        just(".").to(Token::DOT),
    ));

    let comment = just('#')
        .then(any().and_is(just('\n').not()).repeated())
        .padded()
        .to(());

    let unknown = any().map(Token::UNKNOWN);

    choice((number(), string(), unterminated(), ident, op, delimiter, unknown))
        .map_with(|token, ctx| (token, ctx.span().into()))
        .padded_by(comment.repeated())
        .padded()
        .repeated()
        .collect()
        .then_ignore(end())
}

/// Tokenizes the whole source. Unrecognized characters and unterminated strings are
/// reported and skipped, so a token list is always produced.
pub fn tokenize(src: &str) -> Lexed<'_> {
    // every character matches some rule, so the lexer itself never fails
    let lexed = lexer().parse(src).into_output().unwrap_or_default();
    let index = LineIndex::new(src);

    let mut tokens = Vec::with_capacity(lexed.len());
    let mut errors = Vec::new();

    for (token, span) in lexed {
        let (line, column) = index.position(span.start);

        match token {
            Token::UNKNOWN(character) => errors.push(LexError::UnexpectedCharacter {
                character,
                line,
                column,
                span,
            }),
            Token::UNTERMINATED => {
                errors.push(LexError::UnterminatedString { line, column, span })
            }
            token => tokens.push((token, span)),
        }
    }

    Lexed { tokens, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token<'_>> {
        tokenize(src).tokens.into_iter().map(|(token, _)| token).collect()
    }

    #[test]
    fn lexes_assignment_with_spans() {
        let lexed = tokenize("x = 10 + 2.5");

        assert!(lexed.errors.is_empty());
        assert_eq!(
            lexed.tokens,
            vec![
                (Token::IDENT("x"), 0..1),
                (Token::ASSIGN, 2..3),
                (Token::INT("10"), 4..6),
                (Token::PLUS, 7..8),
                (Token::FLOAT("2.5"), 9..12),
            ]
        );
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(
            kinds("while True and not x_1"),
            vec![
                Token::WHILE,
                Token::TRUE,
                Token::AND,
                Token::NOT,
                Token::IDENT("x_1"),
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("a<=b == c != d"),
            vec![
                Token::IDENT("a"),
                Token::LESS_EQ,
                Token::IDENT("b"),
                Token::EQ,
                Token::IDENT("c"),
                Token::NOT_EQ,
                Token::IDENT("d"),
            ]
        );
    }

    #[test]
    fn strings_decode_escapes_in_both_quote_styles() {
        assert_eq!(
            kinds(r#""a\tb\n" 'it\'s'"#),
            vec![
                Token::STRING("a\tb\n".to_string()),
                Token::STRING("it's".to_string()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("x = 1 # set x\n# whole line\nprint(x)"),
            vec![
                Token::IDENT("x"),
                Token::ASSIGN,
                Token::INT("1"),
                Token::PRINT,
                Token::L_ROUND,
                Token::IDENT("x"),
                Token::R_ROUND,
            ]
        );
    }

    #[test]
    fn unknown_characters_are_reported_and_skipped() {
        let lexed = tokenize("x = 1 $ 2\ny = @");

        assert_eq!(lexed.errors.len(), 2);
        assert!(matches!(
            lexed.errors[0],
            LexError::UnexpectedCharacter {
                character: '$',
                line: 1,
                column: 7,
                ..
            }
        ));
        assert!(matches!(
            lexed.errors[1],
            LexError::UnexpectedCharacter {
                character: '@',
                line: 2,
                ..
            }
        ));
        assert!(lexed.tokens.iter().any(|(token, _)| *token == Token::INT("2")));
    }

    #[test]
    fn unterminated_strings_swallow_the_rest_of_the_line() {
        let lexed = tokenize("print(\"abc)\nx = 'ok'");

        assert_eq!(
            lexed.errors,
            vec![LexError::UnterminatedString {
                line: 1,
                column: 7,
                span: 6..11,
            }]
        );
        assert_eq!(
            lexed.tokens.into_iter().map(|(token, _)| token).collect::<Vec<_>>(),
            vec![
                Token::PRINT,
                Token::L_ROUND,
                Token::IDENT("x"),
                Token::ASSIGN,
                Token::STRING("ok".to_string()),
            ]
        );
    }

    #[test]
    fn categories_group_tokens() {
        assert_eq!(Token::DEF.category(), TokenCategory::Keyword);
        assert_eq!(Token::TRUE.category(), TokenCategory::Literal);
        assert_eq!(Token::COLON.category(), TokenCategory::Delimiter);
        assert_eq!(Token::PERCENT.category(), TokenCategory::Operator);
        assert_eq!(Token::INT("3").kind(), "NUMBER");
    }
}
