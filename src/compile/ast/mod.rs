use std::fmt::{self, Display, Formatter};

pub mod render;
pub mod simplify;
pub mod tree;

pub type SourcePos = core::ops::Range<usize>;

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    List(Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Method(Box<Expr>, String, Vec<Expr>),
    Len(Box<Expr>),
    /// `range(start, stop, step)`, each bound optional.
    Range(Option<Box<Expr>>, Option<Box<Expr>>, Option<Box<Expr>>),
}

impl Expr {
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Builds a range node from up to three call arguments the way `range()` reads them.
    pub fn range(args: Vec<Expr>) -> Option<Expr> {
        let mut args = args.into_iter().map(Expr::boxed);

        let range = match (args.next(), args.next(), args.next()) {
            (None, _, _) => Expr::Range(None, None, None),
            (Some(stop), None, _) => Expr::Range(None, Some(stop), None),
            (Some(start), Some(stop), step) => Expr::Range(Some(start), Some(stop), step),
        };

        match args.next() {
            Some(_) => None,
            None => Some(range),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neg => write!(f, "-"),
            Self::Not => write!(f, "not"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    //
    Eq,
    NotEq,
    //
    Less,
    LessEq,
    Greater,
    GreaterEq,
    //
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Less | Self::LessEq | Self::Greater | Self::GreaterEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::And => "and",
            Self::Or => "or",
        };

        write!(f, "{symbol}")
    }
}

/// A statement together with the source range of its first line.
///
/// Equality ignores the position, so a program re-parsed from its rendering
/// compares equal to the original.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourcePos,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: SourcePos) -> Self {
        Self { kind, span }
    }
}

impl PartialEq for Stmt {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Print(Expr),
    Assign(String, Expr),
    IndexAssign(String, Expr, Expr),
    If(Expr, Block, Option<Block>),
    While(Expr, Block),
    For(String, Expr, Block),
    FunctionDef(FunctionDef),
    Return(Option<Expr>),
    Break,
    Continue,
    TryExcept(Block, Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Block,
}

impl Program {
    pub fn new(body: Block) -> Self {
        Self { body }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.body.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::FunctionDef(def) => Some(def),
            _ => None,
        })
    }
}
