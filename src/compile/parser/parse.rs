use chumsky::input::ValueInput;
use chumsky::prelude::*;

use crate::compile::ast::{BinaryOp, Expr, SourcePos, Stmt, StmtKind, UnaryOp};
use crate::compile::parser::lex::Token;

type ErrorParserExtra<'tokens, 'src> = extra::Err<Rich<'tokens, Token<'src>, SourcePos>>;

/// One logical line of source, either a complete simple statement or the header of a
/// compound statement, optionally followed by a simple statement on the same line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Simple(Stmt),
    Header(Header, Option<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    If(Expr),
    Else,
    While(Expr),
    For(String, Expr),
    Def(String, Vec<String>),
    Try,
    Except,
}

impl Header {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::If(_) => "if",
            Self::Else => "else",
            Self::While(_) => "while",
            Self::For(..) => "for",
            Self::Def(..) => "def",
            Self::Try => "try",
            Self::Except => "except",
        }
    }
}

enum Postfix {
    Index(Expr),
    Method(String, Vec<Expr>),
}

pub fn expr_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Expr, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let ident = select! {Token::IDENT(ident) => ident.to_string()};

    recursive(|expr| {
        let args = expr
            .clone()
            .separated_by(just(Token::COMMA))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND))
            .boxed();

        let literal = select! {
            Token::TRUE => Expr::Bool(true),
            Token::FALSE => Expr::Bool(false),
            Token::STRING(value) => Expr::Str(value),
        };

        // an oversized literal still parses so that its own message is the one reported
        let int = select! {Token::INT(value) => value}.validate(|value: &str, e, emitter| {
            value.parse::<i64>().map(Expr::Int).unwrap_or_else(|_| {
                emitter.emit(Rich::custom(
                    e.span(),
                    format!("integer literal {value} is too large"),
                ));
                Expr::Int(0)
            })
        });

        let float = select! {Token::FLOAT(value) => value}.try_map(|value: &str, span| {
            value
                .parse::<f64>()
                .map(Expr::Float)
                .map_err(|_| Rich::custom(span, format!("invalid float literal {value}")))
        });

        let list = expr
            .clone()
            .separated_by(just(Token::COMMA))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::L_SQUARE), just(Token::R_SQUARE))
            .map(Expr::List);

        let len = just(Token::LEN)
            .ignore_then(
                expr.clone()
                    .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND)),
            )
            .map(|target: Expr| Expr::Len(target.boxed()));

        let range = just(Token::RANGE)
            .ignore_then(args.clone())
            .try_map(|args: Vec<Expr>, span| {
                Expr::range(args)
                    .ok_or_else(|| Rich::custom(span, "range() takes at most 3 arguments"))
            });

        let call = ident
            .clone()
            .then(args.clone())
            .map(|(name, args)| Expr::Call(name, args));

        let atomic_expr = choice((
            literal,
            int,
            float,
            list,
            len,
            range,
            call,
            ident.clone().map(Expr::Ident),
            expr.clone()
                .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND)),
        ))
        .boxed();

        let index = expr
            .clone()
            .delimited_by(just(Token::L_SQUARE), just(Token::R_SQUARE))
            .map(Postfix::Index);

        let method = just(Token::DOT)
            .ignore_then(ident)
            .then(args)
            .map(|(name, args)| Postfix::Method(name, args));

        let postfix = atomic_expr
            .foldl(choice((index, method)).repeated(), |target, op| match op {
                Postfix::Index(index) => Expr::Index(target.boxed(), index.boxed()),
                Postfix::Method(name, args) => Expr::Method(target.boxed(), name, args),
            })
            .boxed();

        let unary_op = just(Token::MINUS)
            .to(UnaryOp::Neg)
            .or(just(Token::NOT).to(UnaryOp::Not));

        let unary = unary_op
            .repeated()
            .foldr(postfix, |op, operand| Expr::Unary(op, operand.boxed()))
            .boxed();

        let mult_op = just(Token::STAR)
            .to(BinaryOp::Mul)
            .or(just(Token::SLASH).to(BinaryOp::Div))
            .or(just(Token::PERCENT).to(BinaryOp::Mod));

        let mult = unary
            .clone()
            .foldl(mult_op.then(unary).repeated(), |a, (op, b)| {
                Expr::Binary(op, a.boxed(), b.boxed())
            })
            .boxed();

        let sum_op = just(Token::PLUS)
            .to(BinaryOp::Add)
            .or(just(Token::MINUS).to(BinaryOp::Sub));

        let sum = mult
            .clone()
            .foldl(sum_op.then(mult).repeated(), |a, (op, b)| {
                Expr::Binary(op, a.boxed(), b.boxed())
            })
            .boxed();

        let rel_op = choice((
            just(Token::LESS_EQ).to(BinaryOp::LessEq),
            just(Token::GREATER_EQ).to(BinaryOp::GreaterEq),
            just(Token::LESS).to(BinaryOp::Less),
            just(Token::GREATER).to(BinaryOp::Greater),
        ));

        let rel = sum
            .clone()
            .foldl(rel_op.then(sum).repeated(), |a, (op, b)| {
                Expr::Binary(op, a.boxed(), b.boxed())
            })
            .boxed();

        let eq_op = just(Token::EQ)
            .to(BinaryOp::Eq)
            .or(just(Token::NOT_EQ).to(BinaryOp::NotEq));

        let eq = rel
            .clone()
            .foldl(eq_op.then(rel).repeated(), |a, (op, b)| {
                Expr::Binary(op, a.boxed(), b.boxed())
            })
            .boxed();

        let and = eq
            .clone()
            .foldl(
                just(Token::AND).to(BinaryOp::And).then(eq).repeated(),
                |a, (op, b)| Expr::Binary(op, a.boxed(), b.boxed()),
            )
            .boxed();

        and.clone().foldl(
            just(Token::OR).to(BinaryOp::Or).then(and).repeated(),
            |a, (op, b)| Expr::Binary(op, a.boxed(), b.boxed()),
        )
    })
}

fn simple_stmt_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Stmt, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let expr = expr_parser();
    let ident = select! {Token::IDENT(ident) => ident.to_string()};

    let print = just(Token::PRINT)
        .ignore_then(expr.clone())
        .map(StmtKind::Print);

    let ret = just(Token::RETURN)
        .ignore_then(expr.clone().or_not())
        .map(StmtKind::Return);

    let brk = just(Token::BREAK).to(StmtKind::Break);
    let cont = just(Token::CONTINUE).to(StmtKind::Continue);

    let assign = ident
        .clone()
        .then_ignore(just(Token::ASSIGN))
        .then(expr.clone())
        .map(|(name, value)| StmtKind::Assign(name, value));

    let index_assign = ident
        .then(
            expr.clone()
                .delimited_by(just(Token::L_SQUARE), just(Token::R_SQUARE)),
        )
        .then_ignore(just(Token::ASSIGN))
        .then(expr.clone())
        .map(|((name, index), value)| StmtKind::IndexAssign(name, index, value));

    choice((
        print,
        ret,
        brk,
        cont,
        assign,
        index_assign,
        expr.map(StmtKind::Expr),
    ))
    .map_with(|kind, ctx| Stmt::new(kind, ctx.span()))
}

fn header_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Header, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let expr = expr_parser();
    let ident = select! {Token::IDENT(ident) => ident.to_string()};
    let colon = just(Token::COLON);

    let if_header = just(Token::IF)
        .ignore_then(expr.clone())
        .then_ignore(colon.clone())
        .map(Header::If);

    let else_header = just(Token::ELSE).then(colon.clone()).to(Header::Else);

    let while_header = just(Token::WHILE)
        .ignore_then(expr.clone())
        .then_ignore(colon.clone())
        .map(Header::While);

    let for_header = just(Token::FOR)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::IN))
        .then(expr)
        .then_ignore(colon.clone())
        .map(|(var, iterable)| Header::For(var, iterable));

    let params = ident
        .clone()
        .separated_by(just(Token::COMMA))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND))
        .try_map(|params: Vec<String>, span| {
            match params
                .iter()
                .enumerate()
                .find(|&(i, param)| params[..i].contains(param))
            {
                Some((_, param)) => Err(Rich::custom(
                    span,
                    format!("duplicate parameter '{param}'"),
                )),
                None => Ok(params),
            }
        });

    let def_header = just(Token::DEF)
        .ignore_then(ident)
        .then(params)
        .then_ignore(colon.clone())
        .map(|(name, params)| Header::Def(name, params));

    let try_header = just(Token::TRY).then(colon.clone()).to(Header::Try);
    let except_header = just(Token::EXCEPT).then(colon).to(Header::Except);

    choice((
        if_header,
        else_header,
        while_header,
        for_header,
        def_header,
        try_header,
        except_header,
    ))
}

pub fn line_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Line, ErrorParserExtra<'tokens, 'src>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let simple = simple_stmt_parser();

    let compound = header_parser()
        .then(simple.clone().or_not())
        .map(|(header, inline)| Line::Header(header, inline));

    compound
        .or(simple.map(Line::Simple))
        .then_ignore(end())
}
