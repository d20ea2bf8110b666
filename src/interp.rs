//! Direct evaluation of a renamed expression. Functions evaluate to closures
//! holding the environment of their definition.

use crate::error::Error;
use crate::syntax::{Expr, Op2, VarId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

type Env<'a> = HashMap<VarId, Value<'a>>;

#[derive(Debug, Clone)]
pub enum Value<'a> {
    Int(i32),
    Bool(bool),
    Fn(VarId, &'a Expr, Rc<Env<'a>>),
}

impl<'a> Value<'a> {
    /// The machine word for a first-order value.
    pub fn as_word(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i32),
            Value::Fn(_, _, _) => None,
        }
    }

    fn int(&self) -> Result<i32, Error> {
        match self {
            Value::Int(n) => Ok(*n),
            v => Err(Error::Type(format!("expected an integer, found {}", v))),
        }
    }

    fn bool(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(b) => Ok(*b),
            v => Err(Error::Type(format!("expected a boolean, found {}", v))),
        }
    }
}

impl<'a> fmt::Display for Value<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Fn(_, _, _) => f.write_str("fn"),
        }
    }
}

fn arith(op: Op2, m: i32, n: i32) -> Result<Value<'static>, Error> {
    match op {
        Op2::Add => Ok(Value::Int(m.wrapping_add(n))),
        Op2::Sub => Ok(Value::Int(m.wrapping_sub(n))),
        Op2::Mul => Ok(Value::Int(m.wrapping_mul(n))),
        Op2::Div => m
            .checked_div(n)
            .map(Value::Int)
            .ok_or_else(|| Error::Runtime(format!("{} / {} is undefined", m, n))),
        Op2::Leq => Ok(Value::Bool(m <= n)),
        Op2::LT => Ok(Value::Bool(m < n)),
        Op2::Eq => Ok(Value::Bool(m == n)),
    }
}

fn eval_in<'a>(env: &Env<'a>, exp: &'a Expr) -> Result<Value<'a>, Error> {
    match exp {
        Expr::Num(n) => Ok(Value::Int(*n)),
        Expr::Bln(b) => Ok(Value::Bool(*b)),
        Expr::Var(x) => env
            .get(&x.id)
            .cloned()
            .ok_or_else(|| Error::Lookup(format!("unbound variable {}", x.text))),
        Expr::Op2(Op2::Eq, e1, e2) => match (eval_in(env, e1)?, eval_in(env, e2)?) {
            (Value::Int(m), Value::Int(n)) => Ok(Value::Bool(m == n)),
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
            (a, b) => Err(Error::Type(format!("cannot compare {} and {}", a, b))),
        },
        Expr::Op2(op, e1, e2) => {
            let m = eval_in(env, e1)?.int()?;
            let n = eval_in(env, e2)?.int()?;
            arith(*op, m, n)
        }
        Expr::And(e1, e2) => {
            if eval_in(env, e1)?.bool()? {
                Ok(Value::Bool(eval_in(env, e2)?.bool()?))
            } else {
                Ok(Value::Bool(false))
            }
        }
        Expr::Or(e1, e2) => {
            if eval_in(env, e1)?.bool()? {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(eval_in(env, e2)?.bool()?))
            }
        }
        Expr::Neg(e) => Ok(Value::Int(eval_in(env, e)?.int()?.wrapping_neg())),
        Expr::Not(e) => Ok(Value::Bool(!eval_in(env, e)?.bool()?)),
        Expr::Let(x, _, e1, e2) => {
            let v = eval_in(env, e1)?;
            let mut inner = env.clone();
            inner.insert(x.id, v);
            eval_in(&inner, e2)
        }
        Expr::If(c, t, e) => {
            if eval_in(env, c)?.bool()? {
                eval_in(env, t)
            } else {
                eval_in(env, e)
            }
        }
        Expr::Fn(x, _, body) => Ok(Value::Fn(x.id, body, Rc::new(env.clone()))),
        Expr::App(f, arg) => match eval_in(env, f)? {
            Value::Fn(formal, body, closure) => {
                let v = eval_in(env, arg)?;
                let mut inner = (*closure).clone();
                inner.insert(formal, v);
                eval_in(&inner, body)
            }
            v => Err(Error::Type(format!("{} is not a function", v))),
        },
    }
}

/// Evaluates a renamed expression.
pub fn eval(exp: &Expr) -> Result<Value, Error> {
    eval_in(&HashMap::new(), exp)
}

#[cfg(test)]
mod tests {

    use super::eval;
    use crate::error::Error;
    use crate::rename::rename;
    use crate::syntax::{Expr, Op2};

    fn run(e: Expr) -> Result<String, Error> {
        let mut e = e;
        rename(&mut e).unwrap();
        eval(&e).map(|v| v.to_string())
    }

    fn num(n: i32) -> Expr {
        Expr::Num(n)
    }

    #[test]
    fn test_arith() {
        let e = Expr::op2(Op2::Sub, Expr::op2(Op2::Mul, num(2), num(7)), num(3));
        assert_eq!(run(e).unwrap(), "11");
        assert_eq!(run(Expr::op2(Op2::Div, num(-7), num(2))).unwrap(), "-3");
    }

    #[test]
    fn test_division_by_zero() {
        match run(Expr::op2(Op2::Div, num(1), num(0))) {
            Err(Error::Runtime(_)) => (),
            r => panic!("expected a runtime error, got {:?}", r),
        }
    }

    #[test]
    fn test_short_circuit() {
        let boom = Expr::op2(Op2::Eq, Expr::op2(Op2::Div, num(1), num(0)), num(0));
        assert_eq!(run(Expr::and(Expr::Bln(false), boom.clone())).unwrap(), "false");
        assert_eq!(run(Expr::or(Expr::Bln(true), boom)).unwrap(), "true");
    }

    #[test]
    fn test_closure_keeps_its_environment() {
        // let mk <- fn x => fn y => x + y in
        //   let a <- mk 1 in let b <- mk 2 in a 10 end end
        // end
        let mk = Expr::fn_("x", Expr::fn_("y", Expr::op2(Op2::Add, Expr::var("x"), Expr::var("y"))));
        let body = Expr::let_(
            "a",
            Expr::app(Expr::var("mk"), num(1)),
            Expr::let_(
                "b",
                Expr::app(Expr::var("mk"), num(2)),
                Expr::app(Expr::var("a"), num(10)),
            ),
        );
        assert_eq!(run(Expr::let_("mk", mk, body)).unwrap(), "11");
    }

    #[test]
    fn test_function_value() {
        assert_eq!(run(Expr::fn_("x", Expr::var("x"))).unwrap(), "fn");
    }

    #[test]
    fn test_comparing_functions_fails() {
        let f = Expr::fn_("x", Expr::var("x"));
        let e = Expr::let_("f", f, Expr::op2(Op2::Eq, Expr::var("f"), Expr::var("f")));
        match run(e) {
            Err(Error::Type(_)) => (),
            r => panic!("expected a type error, got {:?}", r),
        }
    }

    #[test]
    fn test_apply_non_function() {
        assert!(run(Expr::app(num(1), num(2))).is_err());
    }
}
