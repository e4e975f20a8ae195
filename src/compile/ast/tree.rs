//! Box-drawing rendering of the syntax tree.

use std::fmt::{self, Display, Formatter};

use crate::infra::format_float;

use super::{Block, Expr, Program, Stmt, StmtKind};

/// A labelled node of the rendered tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub label: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    fn branch(label: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }

    /// Wraps a single node under a caption, like `Left` or `Condition`.
    fn captioned(caption: &str, node: TreeNode) -> Self {
        Self::branch(caption, vec![node])
    }

    fn block(caption: &str, block: &Block) -> Self {
        Self::branch(caption, block.iter().map(TreeNode::from).collect())
    }

    fn write_children(&self, f: &mut Formatter<'_>, prefix: &str) -> fmt::Result {
        for (i, child) in self.children.iter().enumerate() {
            let last = i + 1 == self.children.len();
            let (branch, extension) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };

            writeln!(f, "{prefix}{branch}{}", child.label)?;
            child.write_children(f, &format!("{prefix}{extension}"))?;
        }

        Ok(())
    }
}

impl Display for TreeNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.label)?;
        self.write_children(f, "")
    }
}

impl From<&Expr> for TreeNode {
    fn from(expr: &Expr) -> Self {
        let many = |exprs: &[Expr]| exprs.iter().map(TreeNode::from).collect::<Vec<_>>();

        match expr {
            Expr::Int(value) => Self::leaf(format!("Number: {value}")),
            Expr::Float(value) => Self::leaf(format!("Number: {}", format_float(*value))),
            Expr::Str(value) => Self::leaf(format!("String: {value:?}")),
            Expr::Bool(true) => Self::leaf("Boolean: True"),
            Expr::Bool(false) => Self::leaf("Boolean: False"),
            Expr::Ident(name) => Self::leaf(format!("Identifier: {name}")),
            Expr::List(items) => Self::branch("List", many(items)),
            Expr::Index(target, index) => Self::branch(
                "Index",
                vec![
                    Self::captioned("Target", target.as_ref().into()),
                    Self::captioned("Index", index.as_ref().into()),
                ],
            ),
            Expr::Unary(op, operand) => Self::branch(
                format!("Unary Operation: {op}"),
                vec![Self::captioned("Expression", operand.as_ref().into())],
            ),
            Expr::Binary(op, lhs, rhs) => Self::branch(
                format!("Binary Operation: {op}"),
                vec![
                    Self::captioned("Left", lhs.as_ref().into()),
                    Self::captioned("Right", rhs.as_ref().into()),
                ],
            ),
            Expr::Call(name, args) => Self::branch(format!("Function Call: {name}"), many(args)),
            Expr::Method(receiver, method, args) => {
                let mut children = vec![Self::captioned("Receiver", receiver.as_ref().into())];
                children.extend(many(args));
                Self::branch(format!("Method Call: {method}"), children)
            }
            Expr::Len(target) => Self::branch("Length", vec![target.as_ref().into()]),
            Expr::Range(start, stop, step) => {
                let bounds = [("Start", start), ("Stop", stop), ("Step", step)];
                Self::branch(
                    "Range",
                    bounds
                        .into_iter()
                        .filter_map(|(caption, bound)| {
                            bound
                                .as_deref()
                                .map(|bound| Self::captioned(caption, bound.into()))
                        })
                        .collect(),
                )
            }
        }
    }
}

impl From<&Stmt> for TreeNode {
    fn from(stmt: &Stmt) -> Self {
        match &stmt.kind {
            StmtKind::Expr(expr) => Self::captioned("Expression Statement", expr.into()),
            StmtKind::Print(expr) => {
                Self::branch("Print Statement", vec![Self::captioned("Expression", expr.into())])
            }
            StmtKind::Assign(name, value) => Self::branch(
                "Assignment",
                vec![
                    Self::leaf(format!("Variable: {name}")),
                    Self::captioned("Value", value.into()),
                ],
            ),
            StmtKind::IndexAssign(name, index, value) => Self::branch(
                "Index Assignment",
                vec![
                    Self::leaf(format!("Variable: {name}")),
                    Self::captioned("Index", index.into()),
                    Self::captioned("Value", value.into()),
                ],
            ),
            StmtKind::If(cond, then, otherwise) => {
                let mut children = vec![
                    Self::captioned("Condition", cond.into()),
                    Self::block("If Body", then),
                ];
                if let Some(otherwise) = otherwise {
                    children.push(Self::block("Else Body", otherwise));
                }
                Self::branch("If-Else Statement", children)
            }
            StmtKind::While(cond, body) => Self::branch(
                "While Loop",
                vec![
                    Self::captioned("Condition", cond.into()),
                    Self::block("Body", body),
                ],
            ),
            StmtKind::For(var, iterable, body) => Self::branch(
                "For Loop",
                vec![
                    Self::leaf(format!("Variable: {var}")),
                    Self::captioned("Iterable", iterable.into()),
                    Self::block("Body", body),
                ],
            ),
            StmtKind::FunctionDef(def) => Self::branch(
                format!("Function Definition: {}", def.name),
                vec![
                    Self::leaf(format!("Parameters: {}", def.params.join(", "))),
                    Self::block("Body", &def.body),
                ],
            ),
            StmtKind::Return(Some(value)) => Self::captioned("Return", value.into()),
            StmtKind::Return(None) => Self::leaf("Return"),
            StmtKind::Break => Self::leaf("Break"),
            StmtKind::Continue => Self::leaf("Continue"),
            StmtKind::TryExcept(body, handler) => Self::branch(
                "Try-Except",
                vec![Self::block("Try Body", body), Self::block("Except Body", handler)],
            ),
        }
    }
}

impl From<&Program> for TreeNode {
    fn from(program: &Program) -> Self {
        Self::block("Program", &program.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::parser::{lex::tokenize, parse};

    fn tree(src: &str) -> String {
        let lexed = tokenize(src);
        let program = parse(src, &lexed.tokens).unwrap();

        TreeNode::from(&program).to_string()
    }

    #[test]
    fn draws_nested_branches() {
        assert_eq!(
            tree("x = 1 + y\nprint(x)"),
            "Program\n\
             ├── Assignment\n\
             │   ├── Variable: x\n\
             │   └── Value\n\
             │       └── Binary Operation: +\n\
             │           ├── Left\n\
             │           │   └── Number: 1\n\
             │           └── Right\n\
             │               └── Identifier: y\n\
             └── Print Statement\n\
             \x20   └── Expression\n\
             \x20       └── Identifier: x\n"
        );
    }

    #[test]
    fn else_body_only_when_present() {
        let rendered = tree("if x:\n    print(1)");

        assert!(rendered.contains("If Body"));
        assert!(!rendered.contains("Else Body"));
    }
}
