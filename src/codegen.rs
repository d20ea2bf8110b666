//! Lowers a renamed expression into straight-line code over symbolic
//! registers.
//!
//! Every sub-expression yields the register that holds its value once the
//! emitted code has run. Functions are compiled in place and jumped over.
//! A function value is the address of a closure record on the heap, which
//! grows up from address 0 through `hp`: word 0 holds the entry address and
//! the following words hold the captured variables. The caller pushes the
//! record and passes the argument in `a0`; the callee keeps `ra` on the
//! stack, reloads its captured variables from the record and returns its
//! result in `a0`. Around each call the caller saves the registers of every
//! enclosing function body, so a body re-entered through a higher-order
//! argument finds its own values intact when the inner activation returns.

use crate::asm::{Instr, Op, Program, Reg, Target};
use crate::error::Error;
use crate::syntax::{Expr, Op2, VarId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub struct GenVisitor {
    next_var_counter: usize,
    bindings: HashMap<VarId, Reg>,
    // Registers known to be written at this point, one list per active
    // function body. The first list is the top level, which is never
    // re-entered and so never saved.
    frames: Vec<Vec<Reg>>,
}

impl GenVisitor {
    pub fn new() -> GenVisitor {
        GenVisitor {
            next_var_counter: 0,
            bindings: HashMap::new(),
            frames: vec![Vec::new()],
        }
    }

    pub fn next_var_name(&mut self) -> Reg {
        self.next_var_counter += 1;
        Reg::Sym(format!("v{}", self.next_var_counter))
    }

    /// Number of symbolic registers minted so far.
    pub fn registers(&self) -> usize {
        self.next_var_counter
    }

    fn defined(&mut self, r: &Reg) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(r.clone());
        }
    }

    fn frame_len(&self) -> usize {
        self.frames.last().map_or(0, |f| f.len())
    }

    // Registers written inside a branch are not known to be written after it.
    fn forget_since(&mut self, len: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.truncate(len);
        }
    }

    fn live_across_call(&self) -> Vec<Reg> {
        let mut seen = HashSet::new();
        self.frames[1..]
            .iter()
            .flat_map(|frame| frame.iter())
            .filter(|r| seen.insert((*r).clone()))
            .cloned()
            .collect()
    }

    /// Register holding the next free heap address.
    pub fn heap_pointer() -> Reg {
        Reg::Sym("hp".to_string())
    }

    // Variables bound outside `exp` that it reads, each with the register
    // that holds it here, in order of first use.
    fn free_vars(&self, exp: &Expr, out: &mut Vec<(VarId, Reg)>) {
        match exp {
            Expr::Num(_) | Expr::Bln(_) => (),
            Expr::Var(x) => {
                if let Some(r) = self.bindings.get(&x.id) {
                    if out.iter().all(|(id, _)| *id != x.id) {
                        out.push((x.id, r.clone()));
                    }
                }
            }
            Expr::Op2(_, e1, e2) | Expr::And(e1, e2) | Expr::Or(e1, e2) | Expr::App(e1, e2) => {
                self.free_vars(e1, out);
                self.free_vars(e2, out);
            }
            Expr::Neg(e) | Expr::Not(e) => self.free_vars(e, out),
            Expr::If(c, t, e) => {
                self.free_vars(c, out);
                self.free_vars(t, out);
                self.free_vars(e, out);
            }
            Expr::Let(_, _, e1, e2) => {
                self.free_vars(e1, out);
                self.free_vars(e2, out);
            }
            Expr::Fn(_, _, body) => self.free_vars(body, out),
        }
    }

    fn has_fn(exp: &Expr) -> bool {
        match exp {
            Expr::Num(_) | Expr::Bln(_) | Expr::Var(_) => false,
            Expr::Fn(_, _, _) => true,
            Expr::Op2(_, e1, e2)
            | Expr::And(e1, e2)
            | Expr::Or(e1, e2)
            | Expr::App(e1, e2)
            | Expr::Let(_, _, e1, e2) => GenVisitor::has_fn(e1) || GenVisitor::has_fn(e2),
            Expr::Neg(e) | Expr::Not(e) => GenVisitor::has_fn(e),
            Expr::If(c, t, e) => {
                GenVisitor::has_fn(c) || GenVisitor::has_fn(t) || GenVisitor::has_fn(e)
            }
        }
    }

    fn copy(prog: &mut Program, dst: &Reg, src: &Reg) {
        prog.add_inst(Instr::I(Op::Add, dst.clone(), src.clone(), 0));
    }

    // `dst = (a == b)`
    fn gen_eq(prog: &mut Program, dst: &Reg, a: &Reg, b: &Reg) {
        prog.add_inst(Instr::I(Op::Add, dst.clone(), Reg::X0, 1));
        let skip = prog.add_inst(Instr::Beq(a.clone(), b.clone(), 0));
        prog.add_inst(Instr::I(Op::Add, dst.clone(), Reg::X0, 0));
        let end = prog.next_index();
        prog.patch_target(skip, end);
    }

    fn jump(prog: &mut Program) -> usize {
        prog.add_inst(Instr::Jal(Reg::X0, 0))
    }

    fn land(prog: &mut Program, from: usize) {
        let here: Target = prog.next_index();
        prog.patch_target(from, here);
    }

    pub fn gen(&mut self, exp: &Expr, prog: &mut Program) -> Result<Reg, Error> {
        match exp {
            Expr::Num(n) => {
                let v = self.next_var_name();
                prog.add_inst(Instr::I(Op::Add, v.clone(), Reg::X0, *n));
                self.defined(&v);
                Ok(v)
            }
            Expr::Bln(b) => {
                let v = self.next_var_name();
                prog.add_inst(Instr::I(Op::Add, v.clone(), Reg::X0, *b as i32));
                self.defined(&v);
                Ok(v)
            }
            Expr::Var(x) => self.bindings.get(&x.id).cloned().ok_or_else(|| {
                Error::Lookup(format!("no register bound to {} (#{})", x.text, x.id))
            }),
            Expr::Op2(op, e1, e2) => {
                let a = self.gen(e1, prog)?;
                let b = self.gen(e2, prog)?;
                let v = self.next_var_name();
                let alu = match op {
                    Op2::Add => Op::Add,
                    Op2::Sub => Op::Sub,
                    Op2::Mul => Op::Mul,
                    Op2::Div => Op::Div,
                    Op2::LT => Op::Slt,
                    Op2::Leq => {
                        // a <= b is not (b < a)
                        let t = self.next_var_name();
                        prog.add_inst(Instr::R(Op::Slt, t.clone(), b, a));
                        self.defined(&t);
                        prog.add_inst(Instr::I(Op::Xor, v.clone(), t, 1));
                        self.defined(&v);
                        return Ok(v);
                    }
                    Op2::Eq => {
                        GenVisitor::gen_eq(prog, &v, &a, &b);
                        self.defined(&v);
                        return Ok(v);
                    }
                };
                prog.add_inst(Instr::R(alu, v.clone(), a, b));
                self.defined(&v);
                Ok(v)
            }
            Expr::And(e1, e2) => {
                let a = self.gen(e1, prog)?;
                let v = self.next_var_name();
                GenVisitor::copy(prog, &v, &a);
                self.defined(&v);
                let done = prog.add_inst(Instr::Beq(a, Reg::X0, 0));
                let mark = self.frame_len();
                let b = self.gen(e2, prog)?;
                GenVisitor::copy(prog, &v, &b);
                self.forget_since(mark);
                GenVisitor::land(prog, done);
                Ok(v)
            }
            Expr::Or(e1, e2) => {
                let a = self.gen(e1, prog)?;
                let v = self.next_var_name();
                GenVisitor::copy(prog, &v, &a);
                self.defined(&v);
                let right = prog.add_inst(Instr::Beq(a, Reg::X0, 0));
                let done = GenVisitor::jump(prog);
                GenVisitor::land(prog, right);
                let mark = self.frame_len();
                let b = self.gen(e2, prog)?;
                GenVisitor::copy(prog, &v, &b);
                self.forget_since(mark);
                GenVisitor::land(prog, done);
                Ok(v)
            }
            Expr::Neg(e) => {
                let a = self.gen(e, prog)?;
                let v = self.next_var_name();
                prog.add_inst(Instr::R(Op::Sub, v.clone(), Reg::X0, a));
                self.defined(&v);
                Ok(v)
            }
            Expr::Not(e) => {
                let a = self.gen(e, prog)?;
                let v = self.next_var_name();
                GenVisitor::gen_eq(prog, &v, &a, &Reg::X0);
                self.defined(&v);
                Ok(v)
            }
            Expr::Let(x, _, e1, e2) => {
                let r = self.gen(e1, prog)?;
                let shadowed = self.bindings.insert(x.id, r);
                let result = self.gen(e2, prog);
                match shadowed {
                    Some(r) => self.bindings.insert(x.id, r),
                    None => self.bindings.remove(&x.id),
                };
                result
            }
            Expr::If(c, t, e) => {
                let cond = self.gen(c, prog)?;
                let v = self.next_var_name();
                let to_else = prog.add_inst(Instr::Beq(cond, Reg::X0, 0));
                let mark = self.frame_len();
                let r = self.gen(t, prog)?;
                GenVisitor::copy(prog, &v, &r);
                self.forget_since(mark);
                let done = GenVisitor::jump(prog);
                GenVisitor::land(prog, to_else);
                let r = self.gen(e, prog)?;
                GenVisitor::copy(prog, &v, &r);
                self.forget_since(mark);
                GenVisitor::land(prog, done);
                self.defined(&v);
                Ok(v)
            }
            Expr::Fn(x, _, body) => {
                let mut captured = Vec::new();
                self.free_vars(body, &mut captured);

                let code = self.next_var_name();
                let skip = prog.add_inst(Instr::Jal(code.clone(), 0));
                prog.add_inst(Instr::I(Op::Add, Reg::Sp, Reg::Sp, -1));
                prog.add_inst(Instr::Sw(Reg::Sp, 0, Reg::Ra));
                let formal = self.next_var_name();
                GenVisitor::copy(prog, &formal, &Reg::A0);
                // The record sits just above the saved `ra`.
                let env = self.next_var_name();
                prog.add_inst(Instr::Lw(Reg::Sp, 1, env.clone()));
                let mut frame = vec![formal.clone(), env.clone()];
                let mut shadowed = vec![(x.id, self.bindings.insert(x.id, formal))];
                for (k, (id, _)) in captured.iter().enumerate() {
                    let r = self.next_var_name();
                    prog.add_inst(Instr::Lw(env.clone(), k as i32 + 1, r.clone()));
                    frame.push(r.clone());
                    shadowed.push((*id, self.bindings.insert(*id, r)));
                }

                self.frames.push(frame);
                let result = self.gen(body, prog);
                self.frames.pop();
                for (id, outer) in shadowed.into_iter().rev() {
                    match outer {
                        Some(r) => self.bindings.insert(id, r),
                        None => self.bindings.remove(&id),
                    };
                }
                GenVisitor::copy(prog, &Reg::A0, &result?);
                prog.add_inst(Instr::Lw(Reg::Sp, 0, Reg::Ra));
                prog.add_inst(Instr::I(Op::Add, Reg::Sp, Reg::Sp, 1));
                prog.add_inst(Instr::Jalr(Reg::X0, Reg::Ra));
                GenVisitor::land(prog, skip);
                self.defined(&code);

                let hp = GenVisitor::heap_pointer();
                prog.add_inst(Instr::Sw(hp.clone(), 0, code));
                for (k, (_, r)) in captured.iter().enumerate() {
                    prog.add_inst(Instr::Sw(hp.clone(), k as i32 + 1, r.clone()));
                }
                let f = self.next_var_name();
                GenVisitor::copy(prog, &f, &hp);
                prog.add_inst(Instr::I(Op::Add, hp.clone(), hp, captured.len() as i32 + 1));
                self.defined(&f);
                Ok(f)
            }
            Expr::App(e1, e2) => {
                let f = self.gen(e1, prog)?;
                let arg = self.gen(e2, prog)?;
                let saved = self.live_across_call();
                let n = saved.len() as i32;
                if n > 0 {
                    prog.add_inst(Instr::I(Op::Add, Reg::Sp, Reg::Sp, -n));
                    for (k, r) in saved.iter().enumerate() {
                        prog.add_inst(Instr::Sw(Reg::Sp, k as i32, r.clone()));
                    }
                }
                prog.add_inst(Instr::I(Op::Add, Reg::Sp, Reg::Sp, -1));
                prog.add_inst(Instr::Sw(Reg::Sp, 0, f.clone()));
                let code = self.next_var_name();
                prog.add_inst(Instr::Lw(f, 0, code.clone()));
                GenVisitor::copy(prog, &Reg::A0, &arg);
                prog.add_inst(Instr::Jalr(Reg::Ra, code));
                prog.add_inst(Instr::I(Op::Add, Reg::Sp, Reg::Sp, 1));
                if n > 0 {
                    for (k, r) in saved.iter().enumerate() {
                        prog.add_inst(Instr::Lw(Reg::Sp, k as i32, r.clone()));
                    }
                    prog.add_inst(Instr::I(Op::Add, Reg::Sp, Reg::Sp, n));
                }
                let v = self.next_var_name();
                GenVisitor::copy(prog, &v, &Reg::A0);
                self.defined(&v);
                Ok(v)
            }
        }
    }
}

/// Appends the code for `exp` to `prog` and returns the register holding its
/// value. Programs with functions start by pointing `hp` at address 0.
pub fn gen(exp: &Expr, prog: &mut Program) -> Result<Reg, Error> {
    if GenVisitor::has_fn(exp) {
        prog.add_inst(Instr::I(Op::Add, GenVisitor::heap_pointer(), Reg::X0, 0));
    }
    let mut visitor = GenVisitor::new();
    let answer = visitor.gen(exp, prog)?;
    debug!(
        instructions = prog.insts().len(),
        registers = visitor.registers(),
        "generated code, answer in {}",
        answer
    );
    Ok(answer)
}
