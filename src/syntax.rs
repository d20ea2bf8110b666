use std::fmt;

/// Identity given to a binder by the renamer. Zero means "not yet renamed".
pub type VarId = usize;

#[derive(Debug, PartialEq, Clone)]
pub struct Name {
    pub text: String,
    pub id: VarId,
}

impl Name {
    pub fn new(text: &str) -> Name {
        Name {
            text: text.to_string(),
            id: 0,
        }
    }
}

// Clone is needed to tokenize.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Op2 {
    Add,
    Sub,
    Mul,
    Div,
    Leq,
    LT,
    Eq,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Type {
    Int,
    Bool,
    Arrow(Box<Type>, Box<Type>),
    // Unification variable, only produced by the type checker.
    Var(usize),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Bool => f.write_str("bool"),
            Type::Arrow(a, b) => match **a {
                Type::Arrow(_, _) => write!(f, "({}) -> {}", a, b),
                _ => write!(f, "{} -> {}", a, b),
            },
            Type::Var(n) => write!(f, "'t{}", n),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Num(i32),
    Bln(bool),
    Var(Name),
    Op2(Op2, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Let(Name, Option<Type>, Box<Expr>, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Fn(Name, Option<Type>, Box<Expr>),
    App(Box<Expr>, Box<Expr>),
}

// Shorthands used by the parser and throughout the tests.
impl Expr {
    pub fn var(x: &str) -> Expr {
        Expr::Var(Name::new(x))
    }

    pub fn op2(op: Op2, e1: Expr, e2: Expr) -> Expr {
        Expr::Op2(op, Box::new(e1), Box::new(e2))
    }

    pub fn and(e1: Expr, e2: Expr) -> Expr {
        Expr::And(Box::new(e1), Box::new(e2))
    }

    pub fn or(e1: Expr, e2: Expr) -> Expr {
        Expr::Or(Box::new(e1), Box::new(e2))
    }

    pub fn neg(e: Expr) -> Expr {
        Expr::Neg(Box::new(e))
    }

    pub fn not(e: Expr) -> Expr {
        Expr::Not(Box::new(e))
    }

    pub fn let_(x: &str, e1: Expr, e2: Expr) -> Expr {
        Expr::Let(Name::new(x), None, Box::new(e1), Box::new(e2))
    }

    pub fn if_(c: Expr, t: Expr, e: Expr) -> Expr {
        Expr::If(Box::new(c), Box::new(t), Box::new(e))
    }

    pub fn fn_(x: &str, body: Expr) -> Expr {
        Expr::Fn(Name::new(x), None, Box::new(body))
    }

    pub fn app(f: Expr, arg: Expr) -> Expr {
        Expr::App(Box::new(f), Box::new(arg))
    }
}
