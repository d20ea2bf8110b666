use crate::error::Error;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

/// Largest memory the machine accepts, in words.
pub const MAX_MEM_WORDS: usize = 1 << 24;

/// A machine register. The first seven are the physical register file; the
/// code generator mints `Sym` registers without bound, and register
/// allocation removes them.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub enum Reg {
    X0,
    Sp,
    Ra,
    A0,
    A1,
    A2,
    A3,
    Sym(String),
}

impl Reg {
    pub fn is_physical(&self) -> bool {
        match self {
            Reg::Sym(_) => false,
            _ => true,
        }
    }
}

impl<'a> From<&'a str> for Reg {
    fn from(name: &'a str) -> Reg {
        match name {
            "x0" => Reg::X0,
            "sp" => Reg::Sp,
            "ra" => Reg::Ra,
            "a0" => Reg::A0,
            "a1" => Reg::A1,
            "a2" => Reg::A2,
            "a3" => Reg::A3,
            _ => Reg::Sym(name.to_string()),
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reg::X0 => f.write_str("x0"),
            Reg::Sp => f.write_str("sp"),
            Reg::Ra => f.write_str("ra"),
            Reg::A0 => f.write_str("a0"),
            Reg::A1 => f.write_str("a1"),
            Reg::A2 => f.write_str("a2"),
            Reg::A3 => f.write_str("a3"),
            Reg::Sym(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Xor,
    Slt,
}

impl Op {
    fn mnemonic(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Xor => "xor",
            Op::Slt => "slt",
        }
    }
}

pub type Target = usize;

#[derive(Debug, PartialEq, Clone)]
pub enum Instr {
    /// `rd = rs1 op rs2`
    R(Op, Reg, Reg, Reg),
    /// `rd = rs1 op imm`
    I(Op, Reg, Reg, i32),
    /// `rd = mem[base + offset]`, written `Lw(base, offset, rd)`.
    Lw(Reg, i32, Reg),
    /// `mem[base + offset] = rs`, written `Sw(base, offset, rs)`.
    Sw(Reg, i32, Reg),
    Jal(Reg, Target),
    Jalr(Reg, Reg),
    Beq(Reg, Reg, Target),
}

impl Instr {
    pub fn add(rd: &str, rs1: &str, rs2: &str) -> Instr {
        Instr::R(Op::Add, rd.into(), rs1.into(), rs2.into())
    }

    pub fn sub(rd: &str, rs1: &str, rs2: &str) -> Instr {
        Instr::R(Op::Sub, rd.into(), rs1.into(), rs2.into())
    }

    pub fn mul(rd: &str, rs1: &str, rs2: &str) -> Instr {
        Instr::R(Op::Mul, rd.into(), rs1.into(), rs2.into())
    }

    pub fn div(rd: &str, rs1: &str, rs2: &str) -> Instr {
        Instr::R(Op::Div, rd.into(), rs1.into(), rs2.into())
    }

    pub fn xor(rd: &str, rs1: &str, rs2: &str) -> Instr {
        Instr::R(Op::Xor, rd.into(), rs1.into(), rs2.into())
    }

    pub fn slt(rd: &str, rs1: &str, rs2: &str) -> Instr {
        Instr::R(Op::Slt, rd.into(), rs1.into(), rs2.into())
    }

    pub fn addi(rd: &str, rs1: &str, imm: i32) -> Instr {
        Instr::I(Op::Add, rd.into(), rs1.into(), imm)
    }

    pub fn slti(rd: &str, rs1: &str, imm: i32) -> Instr {
        Instr::I(Op::Slt, rd.into(), rs1.into(), imm)
    }

    pub fn xori(rd: &str, rs1: &str, imm: i32) -> Instr {
        Instr::I(Op::Xor, rd.into(), rs1.into(), imm)
    }

    pub fn lw(base: &str, offset: i32, rd: &str) -> Instr {
        Instr::Lw(base.into(), offset, rd.into())
    }

    pub fn sw(base: &str, offset: i32, rs: &str) -> Instr {
        Instr::Sw(base.into(), offset, rs.into())
    }

    pub fn jal(rd: &str, target: Target) -> Instr {
        Instr::Jal(rd.into(), target)
    }

    pub fn jalr(rd: &str, rs: &str) -> Instr {
        Instr::Jalr(rd.into(), rs.into())
    }

    pub fn beq(rs1: &str, rs2: &str, target: Target) -> Instr {
        Instr::Beq(rs1.into(), rs2.into(), target)
    }

    /// The register this instruction writes, if any.
    pub fn def(&self) -> Option<&Reg> {
        match self {
            Instr::R(_, rd, _, _)
            | Instr::I(_, rd, _, _)
            | Instr::Lw(_, _, rd)
            | Instr::Jal(rd, _)
            | Instr::Jalr(rd, _) => Some(rd),
            Instr::Sw(_, _, _) | Instr::Beq(_, _, _) => None,
        }
    }

    /// The registers this instruction reads, in operand order.
    pub fn uses(&self) -> Vec<&Reg> {
        match self {
            Instr::R(_, _, rs1, rs2) => vec![rs1, rs2],
            Instr::I(_, _, rs1, _) => vec![rs1],
            Instr::Lw(base, _, _) => vec![base],
            Instr::Sw(base, _, rs) => vec![base, rs],
            Instr::Jal(_, _) => vec![],
            Instr::Jalr(_, rs) => vec![rs],
            Instr::Beq(rs1, rs2, _) => vec![rs1, rs2],
        }
    }

    pub fn target(&self) -> Option<Target> {
        match self {
            Instr::Jal(_, t) | Instr::Beq(_, _, t) => Some(*t),
            _ => None,
        }
    }

    pub fn set_target(&mut self, target: Target) {
        match self {
            Instr::Jal(_, t) | Instr::Beq(_, _, t) => *t = target,
            _ => (),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instr::R(op, rd, rs1, rs2) => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), rd, rs1, rs2)
            }
            Instr::I(op, rd, rs1, imm) => {
                write!(f, "{}i {}, {}, {}", op.mnemonic(), rd, rs1, imm)
            }
            Instr::Lw(base, offset, rd) => {
                write!(f, "lw {}, {}({})", rd, offset, base)
            }
            Instr::Sw(base, offset, rs) => {
                write!(f, "sw {}, {}({})", rs, offset, base)
            }
            Instr::Jal(rd, t) => write!(f, "jal {}, {}", rd, t),
            Instr::Jalr(rd, rs) => write!(f, "jalr {}, {}", rd, rs),
            Instr::Beq(rs1, rs2, t) => write!(f, "beq {}, {}, {}", rs1, rs2, t),
        }
    }
}

/// The abstract machine: a register environment, a word-addressed memory,
/// the instruction sequence and a program counter. Execution lives in
/// `eval.rs`.
#[derive(Debug, Clone)]
pub struct Program {
    mem_size: usize,
    // `mem_size` as an address; the initial stack pointer.
    top: i32,
    pub(crate) env: HashMap<Reg, i32>,
    pub(crate) mem: Vec<Option<i32>>,
    insts: Vec<Instr>,
    pub(crate) pc: usize,
}

impl Program {
    pub fn new(mem_size: usize) -> Result<Program, Error> {
        Program::with_insts(mem_size, Vec::new())
    }

    pub fn with_insts(mem_size: usize, insts: Vec<Instr>) -> Result<Program, Error> {
        let top = i32::try_from(mem_size)
            .ok()
            .filter(|_| mem_size <= MAX_MEM_WORDS)
            .ok_or_else(|| {
                Error::Resource(format!(
                    "{} words of memory exceeds the limit of {}",
                    mem_size, MAX_MEM_WORDS
                ))
            })?;
        let mut prog = Program {
            mem_size,
            top,
            env: HashMap::new(),
            mem: Vec::new(),
            insts,
            pc: 0,
        };
        prog.reset();
        Ok(prog)
    }

    /// Clears registers, memory and the program counter. The stack pointer
    /// starts at the top of memory.
    pub fn reset(&mut self) {
        self.env.clear();
        self.env.insert(Reg::Sp, self.top);
        self.mem = vec![None; self.mem_size];
        self.pc = 0;
    }

    pub fn mem_size(&self) -> usize {
        self.mem_size
    }

    /// One past the highest address.
    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn insts(&self) -> &[Instr] {
        &self.insts
    }

    pub fn set_insts(&mut self, insts: Vec<Instr>) {
        self.insts = insts;
    }

    /// Appends an instruction and returns its index.
    pub fn add_inst(&mut self, inst: Instr) -> usize {
        self.insts.push(inst);
        self.insts.len() - 1
    }

    /// Index the next appended instruction will have.
    pub fn next_index(&self) -> Target {
        self.insts.len()
    }

    pub fn patch_target(&mut self, index: usize, target: Target) {
        self.insts[index].set_target(target);
    }

    pub fn get_pc(&self) -> usize {
        self.pc
    }

    pub fn get_val(&self, reg: &Reg) -> Result<i32, Error> {
        if *reg == Reg::X0 {
            return Ok(0);
        }
        self.env
            .get(reg)
            .cloned()
            .ok_or_else(|| Error::Lookup(format!("register {} read before written", reg)))
    }

    /// Writes to `x0` are discarded.
    pub fn set_val(&mut self, reg: &Reg, v: i32) {
        if *reg != Reg::X0 {
            self.env.insert(reg.clone(), v);
        }
    }

    fn address(&self, addr: i32) -> Result<usize, Error> {
        if addr < 0 || addr >= self.top {
            return Err(Error::Resource(format!(
                "address {} outside memory of {} words",
                addr, self.mem_size
            )));
        }
        Ok(addr as usize)
    }

    pub fn get_mem(&self, addr: i32) -> Result<i32, Error> {
        let a = self.address(addr)?;
        self.mem[a]
            .ok_or_else(|| Error::Lookup(format!("memory cell {} read before written", a)))
    }

    pub fn set_mem(&mut self, addr: i32, v: i32) -> Result<(), Error> {
        let a = self.address(addr)?;
        self.mem[a] = Some(v);
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, inst) in self.insts.iter().enumerate() {
            writeln!(f, "{:4}: {}", i, inst)?;
        }
        Ok(())
    }
}
