use crate::error::Error;
use crate::syntax::{Expr, Op2, Type, VarId};
use std::collections::HashMap;

// Binders carry unique ids after renaming, so one flat environment suffices.
struct Infer {
    subst: Vec<Option<Type>>,
    env: HashMap<VarId, Type>,
    // Operand types of every `=`, checked once inference is done.
    compared: Vec<Type>,
}

impl Infer {
    fn fresh(&mut self) -> Type {
        self.subst.push(None);
        Type::Var(self.subst.len() - 1)
    }

    fn resolve(&self, t: &Type) -> Type {
        match t {
            Type::Var(n) => match &self.subst[*n] {
                Some(t) => self.resolve(t),
                None => t.clone(),
            },
            Type::Arrow(a, b) => Type::Arrow(Box::new(self.resolve(a)), Box::new(self.resolve(b))),
            _ => t.clone(),
        }
    }

    fn occurs(&self, n: usize, t: &Type) -> bool {
        match self.resolve(t) {
            Type::Var(m) => n == m,
            Type::Arrow(a, b) => self.occurs(n, &a) || self.occurs(n, &b),
            _ => false,
        }
    }

    fn unify(&mut self, t1: &Type, t2: &Type) -> Result<(), Error> {
        let t1 = self.resolve(t1);
        let t2 = self.resolve(t2);
        match (&t1, &t2) {
            (Type::Int, Type::Int) | (Type::Bool, Type::Bool) => Ok(()),
            (Type::Var(n), Type::Var(m)) if n == m => Ok(()),
            (Type::Var(n), t) | (t, Type::Var(n)) => {
                if self.occurs(*n, t) {
                    return Err(Error::Type(format!("{} occurs in {}", t1, t2)));
                }
                self.subst[*n] = Some(t.clone());
                Ok(())
            }
            (Type::Arrow(a1, b1), Type::Arrow(a2, b2)) => {
                self.unify(a1, a2)?;
                self.unify(b1, b2)
            }
            _ => Err(Error::Type(format!("expected {}, found {}", t1, t2))),
        }
    }

    fn expect(&mut self, e: &Expr, t: &Type) -> Result<(), Error> {
        let found = self.infer(e)?;
        self.unify(t, &found)
    }

    fn bind(&mut self, id: VarId, annot: &Option<Type>) -> Result<Type, Error> {
        let t = self.fresh();
        if let Some(a) = annot {
            self.unify(&t, a)?;
        }
        self.env.insert(id, t.clone());
        Ok(t)
    }

    fn infer(&mut self, exp: &Expr) -> Result<Type, Error> {
        match exp {
            Expr::Num(_) => Ok(Type::Int),
            Expr::Bln(_) => Ok(Type::Bool),
            Expr::Var(x) => self
                .env
                .get(&x.id)
                .cloned()
                .ok_or_else(|| Error::Lookup(format!("unbound variable {}", x.text))),
            Expr::Op2(op, e1, e2) => match op {
                Op2::Add | Op2::Sub | Op2::Mul | Op2::Div => {
                    self.expect(e1, &Type::Int)?;
                    self.expect(e2, &Type::Int)?;
                    Ok(Type::Int)
                }
                Op2::LT | Op2::Leq => {
                    self.expect(e1, &Type::Int)?;
                    self.expect(e2, &Type::Int)?;
                    Ok(Type::Bool)
                }
                Op2::Eq => {
                    let t = self.infer(e1)?;
                    self.expect(e2, &t)?;
                    self.compared.push(t);
                    Ok(Type::Bool)
                }
            },
            Expr::And(e1, e2) | Expr::Or(e1, e2) => {
                self.expect(e1, &Type::Bool)?;
                self.expect(e2, &Type::Bool)?;
                Ok(Type::Bool)
            }
            Expr::Neg(e) => {
                self.expect(e, &Type::Int)?;
                Ok(Type::Int)
            }
            Expr::Not(e) => {
                self.expect(e, &Type::Bool)?;
                Ok(Type::Bool)
            }
            Expr::Let(x, annot, e1, e2) => {
                let t = self.bind(x.id, annot)?;
                self.expect(e1, &t)?;
                self.infer(e2)
            }
            Expr::If(c, t, e) => {
                self.expect(c, &Type::Bool)?;
                let ty = self.infer(t)?;
                self.expect(e, &ty)?;
                Ok(ty)
            }
            Expr::Fn(x, annot, body) => {
                let a = self.bind(x.id, annot)?;
                let b = self.infer(body)?;
                Ok(Type::Arrow(Box::new(a), Box::new(b)))
            }
            Expr::App(f, arg) => {
                let tf = self.infer(f)?;
                let ta = self.infer(arg)?;
                let r = self.fresh();
                self.unify(&tf, &Type::Arrow(Box::new(ta), Box::new(r.clone())))?;
                Ok(r)
            }
        }
    }
}

/// Infers the type of a renamed expression. Type variables that remain
/// unconstrained are left in the result.
pub fn tc(exp: &Expr) -> Result<Type, Error> {
    let mut st = Infer {
        subst: Vec::new(),
        env: HashMap::new(),
        compared: Vec::new(),
    };
    let t = st.infer(exp)?;
    // A later application may have made an operand of `=` a function.
    for c in st.compared.iter() {
        if let Type::Arrow(_, _) = st.resolve(c) {
            return Err(Error::Type(format!(
                "cannot compare values of type {}",
                st.resolve(c)
            )));
        }
    }
    Ok(st.resolve(&t))
}
