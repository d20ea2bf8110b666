use crate::error::Error;
use crate::syntax::{Expr, Name, VarId};
use std::collections::HashMap;

struct Renamer {
    next_id: VarId,
    scope: HashMap<String, VarId>,
}

impl Renamer {
    fn bind<F>(&mut self, x: &mut Name, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Renamer) -> Result<(), Error>,
    {
        self.next_id += 1;
        x.id = self.next_id;
        let outer = self.scope.insert(x.text.clone(), x.id);
        let r = body(self);
        match outer {
            Some(id) => self.scope.insert(x.text.clone(), id),
            None => self.scope.remove(&x.text),
        };
        r
    }

    fn rename(&mut self, exp: &mut Expr) -> Result<(), Error> {
        match exp {
            Expr::Num(_) | Expr::Bln(_) => Ok(()),
            Expr::Var(x) => match self.scope.get(&x.text) {
                Some(id) => {
                    x.id = *id;
                    Ok(())
                }
                None => Err(Error::Lookup(format!("unbound variable {}", x.text))),
            },
            Expr::Op2(_, e1, e2) | Expr::And(e1, e2) | Expr::Or(e1, e2) | Expr::App(e1, e2) => {
                self.rename(e1)?;
                self.rename(e2)
            }
            Expr::Neg(e) | Expr::Not(e) => self.rename(e),
            Expr::If(c, t, e) => {
                self.rename(c)?;
                self.rename(t)?;
                self.rename(e)
            }
            // The bound expression is outside the binder's scope.
            Expr::Let(x, _, e1, e2) => {
                self.rename(e1)?;
                self.bind(x, |r| r.rename(e2))
            }
            Expr::Fn(x, _, body) => self.bind(x, |r| r.rename(body)),
        }
    }
}

/// Gives every binder in `exp` a distinct identity and points every
/// variable at its binder.
pub fn rename(exp: &mut Expr) -> Result<(), Error> {
    let mut r = Renamer {
        next_id: 0,
        scope: HashMap::new(),
    };
    r.rename(exp)
}
