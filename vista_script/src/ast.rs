use std::sync::Arc;

use vista_variant::Variant;

/// A compiled property reference. Names are interned (`Arc<str>`) at compile
/// time; the resolver maps them onto slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropRef {
    /// Bare `name`: a property of the binding's own object.
    Own(Arc<str>),
    /// `parent.name`.
    Parent(Arc<str>),
    /// `ident.name`: property of a named object found by scope walk.
    Named { object: Arc<str>, prop: Arc<str> },
}

impl std::fmt::Display for PropRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropRef::Own(name) => write!(f, "{name}"),
            PropRef::Parent(name) => write!(f, "parent.{name}"),
            PropRef::Named { object, prop } => write!(f, "{object}.{prop}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Builtin functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Min,
    Max,
    Abs,
    Floor,
    Ceil,
    Round,
    Clamp,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            "abs" => Some(Builtin::Abs),
            "floor" => Some(Builtin::Floor),
            "ceil" => Some(Builtin::Ceil),
            "round" => Some(Builtin::Round),
            "clamp" => Some(Builtin::Clamp),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Abs => "abs",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Round => "round",
            Builtin::Clamp => "clamp",
        }
    }

    /// (min, max) accepted argument counts.
    pub const fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Min | Builtin::Max => (2, 2),
            Builtin::Abs | Builtin::Floor | Builtin::Ceil | Builtin::Round => (1, 1),
            Builtin::Clamp => (3, 3),
        }
    }
}

/// A compiled expression tree. Built once per binding by [`crate::compile`];
/// re-evaluated every time the binding runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Variant),
    Property(PropRef),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Collect every property reference that could be read by this
    /// expression (both ternary branches included). Used for diagnostics;
    /// the live dependency set comes from the reads actually recorded
    /// during evaluation.
    pub fn referenced_properties(&self) -> Vec<&PropRef> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Property(p) = e {
                out.push(p);
            }
        });
        out
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Property(_) => {}
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.walk(visit);
                then_branch.walk(visit);
                else_branch.walk(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }
}
