//! Register allocation for straight-line code with jumps.
//!
//! Every symbolic register becomes a word at the top of memory. Each
//! instruction is rewritten on its own: symbolic operands are loaded into
//! scratch registers, the instruction runs on the scratch registers, and a
//! symbolic result is stored straight back to its slot. A prologue moves
//! `sp` below the slots so the program's own stack traffic cannot reach them.
//!
//! Since one instruction becomes several, jump targets are renumbered to the
//! first instruction of the rewritten target, and link values written by
//! `jal`/`jalr` into symbolic registers name the rewritten successor.

use crate::asm::{Instr, Op, Program, Reg, Target};
use crate::error::Error;
use std::collections::HashMap;
use tracing::{debug, trace};

/// A pass that replaces the instructions of a program.
pub trait Optimizer {
    fn optimize(&mut self, prog: &mut Program) -> Result<(), Error>;
}

// What to fill in once the rewritten layout is known.
#[derive(Debug, Clone, Copy)]
enum Fixup {
    Done,
    // Jump target, as an original instruction index.
    Target(Target),
    // Immediate holding the address of an original instruction.
    Link(Target),
}

pub struct RegAllocator {
    dst: Reg,
    src: [Reg; 2],
    slots: HashMap<Reg, i32>,
}

impl RegAllocator {
    /// Results pass through `a1`; operands are loaded into `a2` and `a3`.
    pub fn new() -> RegAllocator {
        RegAllocator {
            dst: Reg::A1,
            src: [Reg::A2, Reg::A3],
            slots: HashMap::new(),
        }
    }

    pub fn with_scratch(dst: Reg, src1: Reg, src2: Reg) -> Result<RegAllocator, Error> {
        for r in [&dst, &src1, &src2].iter() {
            match r {
                Reg::A0 | Reg::A1 | Reg::A2 | Reg::A3 => (),
                _ => {
                    return Err(Error::Config(format!(
                        "{} cannot be used as a scratch register",
                        r
                    )))
                }
            }
        }
        if dst == src1 || dst == src2 || src1 == src2 {
            return Err(Error::Config(format!(
                "scratch registers {}, {}, {} must be distinct",
                dst, src1, src2
            )));
        }
        Ok(RegAllocator {
            dst,
            src: [src1, src2],
            slots: HashMap::new(),
        })
    }

    /// Memory address of the slot given to a symbolic register.
    pub fn slot(&self, reg: &Reg) -> Option<i32> {
        self.slots.get(reg).cloned()
    }

    /// Reads `reg` from an allocated program: symbolic registers from their
    /// slots, physical ones from the register file.
    pub fn get_val(&self, prog: &Program, reg: &Reg) -> Result<i32, Error> {
        match self.slots.get(reg) {
            Some(addr) => prog.get_mem(*addr),
            None if reg.is_physical() => prog.get_val(reg),
            None => Err(Error::Lookup(format!("{} was never allocated", reg))),
        }
    }

    fn is_scratch(&self, reg: &Reg) -> bool {
        *reg == self.dst || self.src.contains(reg)
    }

    fn assign_slots(&mut self, prog: &Program) -> Result<(), Error> {
        self.slots.clear();
        let top = prog.top();
        for inst in prog.insts() {
            for r in inst.def().into_iter().chain(inst.uses()) {
                if self.is_scratch(r) {
                    return Err(Error::Config(format!(
                        "`{}` uses scratch register {}",
                        inst, r
                    )));
                }
                if !r.is_physical() && !self.slots.contains_key(r) {
                    if self.slots.len() >= prog.mem_size() {
                        return Err(Error::Resource(format!(
                            "{} words of memory cannot hold every symbolic register",
                            prog.mem_size()
                        )));
                    }
                    let addr = top - 1 - self.slots.len() as i32;
                    self.slots.insert(r.clone(), addr);
                }
            }
        }
        Ok(())
    }

    fn slot_of(&self, reg: &Reg) -> Result<i32, Error> {
        self.slot(reg)
            .ok_or_else(|| Error::Lookup(format!("{} has no slot", reg)))
    }

    fn load(&self, out: &mut Vec<(Instr, Fixup)>, reg: &Reg, k: usize) -> Result<Reg, Error> {
        if reg.is_physical() {
            return Ok(reg.clone());
        }
        let scratch = self.src[k].clone();
        out.push((Instr::Lw(Reg::X0, self.slot_of(reg)?, scratch.clone()), Fixup::Done));
        Ok(scratch)
    }

    fn dest(&self, reg: &Reg) -> Reg {
        if reg.is_physical() {
            reg.clone()
        } else {
            self.dst.clone()
        }
    }

    fn store(&self, out: &mut Vec<(Instr, Fixup)>, reg: &Reg) -> Result<(), Error> {
        if !reg.is_physical() {
            out.push((Instr::Sw(Reg::X0, self.slot_of(reg)?, self.dst.clone()), Fixup::Done));
        }
        Ok(())
    }

    // A link into a symbolic register is stored before the jump, which would
    // otherwise skip the store.
    fn link(&self, out: &mut Vec<(Instr, Fixup)>, rd: &Reg, next: Target) -> Result<(), Error> {
        if !rd.is_physical() {
            out.push((Instr::I(Op::Add, self.dst.clone(), Reg::X0, 0), Fixup::Link(next)));
            self.store(out, rd)?;
        }
        Ok(())
    }

    fn expand(&self, i: usize, inst: &Instr) -> Result<Vec<(Instr, Fixup)>, Error> {
        let mut out = Vec::new();
        match inst {
            Instr::R(op, rd, rs1, rs2) => {
                let s1 = self.load(&mut out, rs1, 0)?;
                let s2 = self.load(&mut out, rs2, 1)?;
                out.push((Instr::R(*op, self.dest(rd), s1, s2), Fixup::Done));
                self.store(&mut out, rd)?;
            }
            Instr::I(op, rd, rs1, imm) => {
                let s1 = self.load(&mut out, rs1, 0)?;
                out.push((Instr::I(*op, self.dest(rd), s1, *imm), Fixup::Done));
                self.store(&mut out, rd)?;
            }
            Instr::Lw(base, offset, rd) => {
                let b = self.load(&mut out, base, 0)?;
                out.push((Instr::Lw(b, *offset, self.dest(rd)), Fixup::Done));
                self.store(&mut out, rd)?;
            }
            Instr::Sw(base, offset, rs) => {
                let b = self.load(&mut out, base, 0)?;
                let s = self.load(&mut out, rs, 1)?;
                out.push((Instr::Sw(b, *offset, s), Fixup::Done));
            }
            Instr::Jal(rd, target) => {
                self.link(&mut out, rd, i + 1)?;
                out.push((Instr::Jal(self.dest(rd), *target), Fixup::Done));
            }
            Instr::Jalr(rd, rs) => {
                let s = self.load(&mut out, rs, 0)?;
                self.link(&mut out, rd, i + 1)?;
                out.push((Instr::Jalr(self.dest(rd), s), Fixup::Done));
            }
            Instr::Beq(rs1, rs2, target) => {
                let s1 = self.load(&mut out, rs1, 0)?;
                let s2 = self.load(&mut out, rs2, 1)?;
                out.push((Instr::Beq(s1, s2, *target), Fixup::Done));
            }
        }
        // The jump is always the last instruction of its group.
        if let Some(t) = inst.target() {
            if let Some(last) = out.last_mut() {
                last.1 = Fixup::Target(t);
            }
        }
        Ok(out)
    }
}

impl Optimizer for RegAllocator {
    fn optimize(&mut self, prog: &mut Program) -> Result<(), Error> {
        self.assign_slots(prog)?;

        let mut expanded = Vec::with_capacity(prog.insts().len());
        for (i, inst) in prog.insts().iter().enumerate() {
            expanded.push(self.expand(i, inst)?);
        }

        let prologue = if self.slots.is_empty() { 0 } else { 1 };
        // start[i] is where original instruction i begins; start[n] is the end.
        let mut start = Vec::with_capacity(expanded.len() + 1);
        let mut at = prologue;
        for insts in expanded.iter() {
            start.push(at);
            at += insts.len();
        }
        start.push(at);
        let end = at;
        // Targets past the end still halt, at the same index when possible.
        let remap = |t: Target| if t < start.len() { start[t] } else { t.max(end) };

        let mut insts = Vec::with_capacity(end);
        if prologue > 0 {
            let n = self.slots.len() as i32;
            insts.push(Instr::I(Op::Add, Reg::Sp, Reg::Sp, -n));
        }
        for (i, group) in expanded.into_iter().enumerate() {
            for (mut inst, fixup) in group {
                match fixup {
                    Fixup::Done => (),
                    Fixup::Target(t) => inst.set_target(remap(t)),
                    Fixup::Link(t) => {
                        if let Instr::I(_, _, _, imm) = &mut inst {
                            *imm = remap(t) as i32;
                        }
                    }
                }
                trace!("{:4} <- {:4}: {}", insts.len(), i, inst);
                insts.push(inst);
            }
        }

        debug!(
            before = prog.insts().len(),
            after = insts.len(),
            slots = self.slots.len(),
            "allocated registers"
        );
        prog.set_insts(insts);
        prog.reset();
        Ok(())
    }
}
