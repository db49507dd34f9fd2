use super::error::{Chip8Error, Result};

pub type Reg = u8;
pub type Addr = u16;

fn nibbles(opcode: u16) -> (u8, u8, u8, u8) {
    (
        ((opcode >> 12) & 0xF) as u8,
        ((opcode >> 8) & 0xF) as u8,
        ((opcode >> 4) & 0xF) as u8,
        (opcode & 0xF) as u8,
    )
}

/// A decoded CHIP-8 instruction. Operands are register numbers (`Reg`),
/// 12-bit addresses (`Addr`) or immediate bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Sys(Addr),
    Clear,
    Return,
    Jump(Addr),
    Call(Addr),
    SkipEqIm(Reg, u8),
    SkipNeIm(Reg, u8),
    SkipEq(Reg, Reg),
    LoadIm(Reg, u8),
    AddIm(Reg, u8),
    Move(Reg, Reg),
    Or(Reg, Reg),
    And(Reg, Reg),
    Xor(Reg, Reg),
    Add(Reg, Reg),
    Sub(Reg, Reg),
    Shr(Reg),
    SubN(Reg, Reg),
    Shl(Reg),
    SkipNe(Reg, Reg),
    LoadI(Addr),
    JumpOff(Addr),
    Rnd(Reg, u8),
    Draw(Reg, Reg, u8),
    SkipPressed(Reg),
    SkipNotPressed(Reg),
    LoadFromDelayTimer(Reg),
    WaitKeypress(Reg),
    LoadDelayTimer(Reg),
    LoadSoundTimer(Reg),
    AddI(Reg),
    SetSpriteAddr(Reg),
    StoreBcd(Reg),
    StoreRegs(Reg),
    LoadRegs(Reg),
}

use Instruction::*;

impl Instruction {
    pub fn decode(opcode: u16) -> Result<Instruction> {
        let nnn: Addr = opcode & 0x0FFF;
        let kk: u8 = (opcode & 0x00FF) as u8;
        let insn = match nibbles(opcode) {
            (0, 0, 0xE, 0) => Clear,
            (0, 0, 0xE, 0xE) => Return,
            (0, _, _, _) => Sys(nnn),
            (1, _, _, _) => Jump(nnn),
            (2, _, _, _) => Call(nnn),
            (3, x, _, _) => SkipEqIm(x, kk),
            (4, x, _, _) => SkipNeIm(x, kk),
            (5, x, y, 0) => SkipEq(x, y),
            (6, x, _, _) => LoadIm(x, kk),
            (7, x, _, _) => AddIm(x, kk),
            (8, x, y, 0) => Move(x, y),
            (8, x, y, 1) => Or(x, y),
            (8, x, y, 2) => And(x, y),
            (8, x, y, 3) => Xor(x, y),
            (8, x, y, 4) => Add(x, y),
            (8, x, y, 5) => Sub(x, y),
            (8, x, _, 6) => Shr(x),
            (8, x, y, 7) => SubN(x, y),
            (8, x, _, 0xE) => Shl(x),
            (9, x, y, 0) => SkipNe(x, y),
            (0xA, _, _, _) => LoadI(nnn),
            (0xB, _, _, _) => JumpOff(nnn),
            (0xC, x, _, _) => Rnd(x, kk),
            (0xD, x, y, n) => Draw(x, y, n),
            (0xE, x, 9, 0xE) => SkipPressed(x),
            (0xE, x, 0xA, 1) => SkipNotPressed(x),
            (0xF, x, 0, 7) => LoadFromDelayTimer(x),
            (0xF, x, 0, 0xA) => WaitKeypress(x),
            (0xF, x, 1, 5) => LoadDelayTimer(x),
            (0xF, x, 1, 8) => LoadSoundTimer(x),
            (0xF, x, 1, 0xE) => AddI(x),
            (0xF, x, 2, 9) => SetSpriteAddr(x),
            (0xF, x, 3, 3) => StoreBcd(x),
            (0xF, x, 5, 5) => StoreRegs(x),
            (0xF, x, 6, 5) => LoadRegs(x),
            _ => return Err(Chip8Error::UnknownOpcode { opcode }),
        };
        Ok(insn)
    }
}
