use crate::asm::{Instr, Op, Program};
use crate::error::Error;

type R = Result<(), Error>;

fn eval_op(op: Op, m: i32, n: i32) -> Result<i32, Error> {
    match op {
        Op::Add => Ok(m.wrapping_add(n)),
        Op::Sub => Ok(m.wrapping_sub(n)),
        Op::Mul => Ok(m.wrapping_mul(n)),
        // Truncates toward zero, like the source language.
        Op::Div => m
            .checked_div(n)
            .ok_or_else(|| Error::Runtime(format!("{} / {} is undefined", m, n))),
        Op::Xor => Ok(m ^ n),
        Op::Slt => Ok(if m < n { 1 } else { 0 }),
    }
}

impl Program {
    /// Runs from the current program counter until it moves past the last
    /// instruction. A program that loops forever never returns.
    pub fn eval(&mut self) -> R {
        while self.pc < self.insts().len() {
            self.step()?;
        }
        Ok(())
    }

    /// Executes the instruction under the program counter.
    pub fn step(&mut self) -> R {
        let inst = match self.insts().get(self.pc) {
            Some(inst) => inst.clone(),
            None => {
                return Err(Error::Control(format!(
                    "no instruction at address {}",
                    self.pc
                )))
            }
        };
        let next = self.pc + 1;
        match inst {
            Instr::R(op, rd, rs1, rs2) => {
                let m = self.get_val(&rs1)?;
                let n = self.get_val(&rs2)?;
                let v = eval_op(op, m, n)?;
                self.set_val(&rd, v);
                self.pc = next;
            }
            Instr::I(op, rd, rs1, imm) => {
                let m = self.get_val(&rs1)?;
                let v = eval_op(op, m, imm)?;
                self.set_val(&rd, v);
                self.pc = next;
            }
            Instr::Lw(base, offset, rd) => {
                let addr = self.get_val(&base)?.wrapping_add(offset);
                let v = self.get_mem(addr)?;
                self.set_val(&rd, v);
                self.pc = next;
            }
            Instr::Sw(base, offset, rs) => {
                let addr = self.get_val(&base)?.wrapping_add(offset);
                let v = self.get_val(&rs)?;
                self.set_mem(addr, v)?;
                self.pc = next;
            }
            Instr::Jal(rd, target) => {
                self.set_val(&rd, next as i32);
                self.pc = target;
            }
            Instr::Jalr(rd, rs) => {
                // Read before the link is written: `rd` and `rs` may coincide.
                let target = self.get_val(&rs)?;
                if target < 0 {
                    return Err(Error::Control(format!(
                        "jalr {}, {} jumps to invalid code address {}",
                        rd, rs, target
                    )));
                }
                self.set_val(&rd, next as i32);
                self.pc = target as usize;
            }
            Instr::Beq(rs1, rs2, target) => {
                if self.get_val(&rs1)? == self.get_val(&rs2)? {
                    self.pc = target;
                } else {
                    self.pc = next;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use crate::asm::{Instr, Program, Reg, MAX_MEM_WORDS};
    use crate::error::Error;

    fn run(insts: Vec<Instr>) -> Program {
        let mut p = Program::with_insts(1000, insts).unwrap();
        p.eval().unwrap();
        p
    }

    fn val(p: &Program, r: &str) -> i32 {
        p.get_val(&Reg::from(r)).unwrap()
    }

    #[test]
    fn test_addi() {
        let p = run(vec![Instr::addi("a", "x0", 3)]);
        assert_eq!(val(&p, "a"), 3);
    }

    #[test]
    fn test_arith() {
        let p = run(vec![
            Instr::addi("a", "x0", 28),
            Instr::addi("b", "x0", 4),
            Instr::add("c", "a", "b"),
            Instr::sub("d", "a", "b"),
            Instr::mul("e", "a", "b"),
            Instr::div("f", "a", "b"),
            Instr::xor("g", "a", "b"),
        ]);
        assert_eq!(val(&p, "c"), 32);
        assert_eq!(val(&p, "d"), 24);
        assert_eq!(val(&p, "e"), 112);
        assert_eq!(val(&p, "f"), 7);
        assert_eq!(val(&p, "g"), 28 ^ 4);
    }

    #[test]
    fn test_div_truncates_toward_zero() {
        let p = run(vec![
            Instr::addi("a", "x0", -7),
            Instr::addi("b", "x0", 2),
            Instr::div("c", "a", "b"),
        ]);
        assert_eq!(val(&p, "c"), -3);
    }

    #[test]
    fn test_div_by_zero_is_an_error() {
        let mut p = Program::with_insts(
            10,
            vec![Instr::addi("a", "x0", 1), Instr::div("b", "a", "x0")],
        ).unwrap();
        match p.eval() {
            Err(Error::Runtime(_)) => (),
            r => panic!("expected a runtime error, got {:?}", r),
        }
    }

    #[test]
    fn test_slt_slti_xori() {
        let p = run(vec![
            Instr::addi("a", "x0", 3),
            Instr::addi("b", "x0", 4),
            Instr::slt("c", "a", "b"),
            Instr::slt("d", "b", "a"),
            Instr::slti("e", "a", 2),
            Instr::xori("f", "c", 5),
        ]);
        assert_eq!(val(&p, "c"), 1);
        assert_eq!(val(&p, "d"), 0);
        assert_eq!(val(&p, "e"), 0);
        assert_eq!(val(&p, "f"), 4);
    }

    #[test]
    fn test_zero_register_ignores_writes() {
        let p = run(vec![
            Instr::addi("x0", "x0", 5),
            Instr::jal("x0", 2),
            Instr::addi("a", "x0", 1),
        ]);
        assert_eq!(val(&p, "x0"), 0);
    }

    #[test]
    fn test_load_store() {
        let p = run(vec![
            Instr::addi("sp", "sp", -1),
            Instr::addi("a", "x0", 7),
            Instr::sw("sp", 0, "a"),
            Instr::lw("sp", 0, "b"),
            Instr::addi("c", "b", 6),
        ]);
        assert_eq!(val(&p, "sp"), 999);
        assert_eq!(p.get_mem(999).unwrap(), 7);
        assert_eq!(val(&p, "c"), 13);
    }

    #[test]
    fn test_uninitialized_register() {
        let mut p = Program::with_insts(10, vec![Instr::addi("a", "b", 1)]).unwrap();
        match p.eval() {
            Err(Error::Lookup(_)) => (),
            r => panic!("expected a lookup error, got {:?}", r),
        }
    }

    #[test]
    fn test_uninitialized_memory() {
        let mut p = Program::with_insts(10, vec![Instr::lw("sp", -1, "a")]).unwrap();
        match p.eval() {
            Err(Error::Lookup(_)) => (),
            r => panic!("expected a lookup error, got {:?}", r),
        }
    }

    #[test]
    fn test_store_outside_memory() {
        let mut p = Program::with_insts(10, vec![Instr::sw("sp", 0, "x0")]).unwrap();
        match p.eval() {
            Err(Error::Resource(_)) => (),
            r => panic!("expected a resource error, got {:?}", r),
        }
    }

    #[test]
    fn test_memory_size_is_bounded() {
        match Program::new(MAX_MEM_WORDS + 1) {
            Err(Error::Resource(_)) => (),
            r => panic!("expected a resource error, got {:?}", r),
        }
        assert!(Program::new(usize::max_value()).is_err());
    }

    #[test]
    fn test_jal() {
        let p = run(vec![Instr::jal("a", 30)]);
        assert_eq!(p.get_pc(), 30);
        assert_eq!(val(&p, "a"), 1);
    }

    #[test]
    fn test_jalr() {
        let p = run(vec![Instr::addi("a", "x0", 30), Instr::jalr("b", "a")]);
        assert_eq!(p.get_pc(), 30);
        assert_eq!(val(&p, "b"), 2);
    }

    #[test]
    fn test_jalr_negative_target() {
        let mut p = Program::with_insts(
            10,
            vec![Instr::addi("a", "x0", -4), Instr::jalr("b", "a")],
        ).unwrap();
        match p.eval() {
            Err(Error::Control(_)) => (),
            r => panic!("expected a control error, got {:?}", r),
        }
    }

    #[test]
    fn test_beq_taken() {
        let p = run(vec![
            Instr::addi("a", "x0", 3),
            Instr::addi("b", "a", 0),
            Instr::beq("a", "b", 30),
        ]);
        assert_eq!(p.get_pc(), 30);
    }

    #[test]
    fn test_beq_loop() {
        // Sum 5 + 4 + 3 + 2 + 1.
        let p = run(vec![
            Instr::addi("n", "x0", 5),
            Instr::addi("s", "x0", 0),
            Instr::beq("n", "x0", 6),
            Instr::add("s", "s", "n"),
            Instr::addi("n", "n", -1),
            Instr::jal("x0", 2),
        ]);
        assert_eq!(val(&p, "s"), 15);
        assert_eq!(p.get_pc(), 6);
    }

    #[test]
    fn test_reset() {
        let mut p = run(vec![Instr::addi("sp", "sp", -1), Instr::sw("sp", 0, "sp")]);
        p.reset();
        assert_eq!(p.get_pc(), 0);
        assert_eq!(val(&p, "sp"), 1000);
        assert!(p.get_mem(999).is_err());
        p.eval().unwrap();
        assert_eq!(p.get_mem(999).unwrap(), 999);
    }
}
