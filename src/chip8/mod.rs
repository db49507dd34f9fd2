use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::path::Path;

pub mod constants;
pub mod error;
pub mod instruction;
pub mod sound;

use constants::*;
pub use error::{Chip8Error, Result};
pub use instruction::Instruction;
use instruction::Instruction::*;
pub use sound::{LogSink, SoundSink};

/// Monochrome 64x32 display, row-major (`x + y * 64`).
pub type FrameBuffer = [bool; CHIP8_FRAME_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Running,
    /// Suspended on `FX0A` until a key is observed pressed.
    AwaitingKey { register: u8 },
}

pub struct Interpreter {
    v: [u8; CHIP8_REGISTERS],
    i: u16,
    delay_timer: u8,
    sound_timer: u8,
    pc: u16,
    // Number of occupied stack slots; the top entry is `stack[sp - 1]`.
    sp: usize,
    stack: [u16; CHIP8_STACK_DEPTH],
    memory: [u8; CHIP8_MEMORY_SIZE],
    frame: FrameBuffer,
    draw_flag: bool,
    keypad: [bool; CHIP8_KEYS],
    state: MachineState,
    cycles: u64,
    rng: StdRng,
    sound: Box<dyn SoundSink>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Same as `new` but with a reproducible `CXNN` sequence.
    pub fn with_seed(seed: u64) -> Interpreter {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Interpreter {
        let mut chip = Interpreter {
            v: [0; CHIP8_REGISTERS],
            i: 0,
            delay_timer: 0,
            sound_timer: 0,
            pc: CHIP8_PROGRAM_START,
            sp: 0,
            stack: [0; CHIP8_STACK_DEPTH],
            memory: [0; CHIP8_MEMORY_SIZE],
            frame: [false; CHIP8_FRAME_SIZE],
            draw_flag: false,
            keypad: [false; CHIP8_KEYS],
            state: MachineState::Running,
            cycles: 0,
            rng,
            sound: Box::new(LogSink),
        };
        chip.load_fonts();
        chip
    }

    pub fn with_sound_sink(mut self, sink: Box<dyn SoundSink>) -> Self {
        self.sound = sink;
        self
    }

    /// Clears all architectural state and reloads the font table.
    /// The random generator and sound sink are kept.
    pub fn reset(&mut self) {
        self.v = [0; CHIP8_REGISTERS];
        self.i = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.pc = CHIP8_PROGRAM_START;
        self.sp = 0;
        self.stack = [0; CHIP8_STACK_DEPTH];
        self.memory = [0; CHIP8_MEMORY_SIZE];
        self.frame = [false; CHIP8_FRAME_SIZE];
        self.draw_flag = false;
        self.keypad = [false; CHIP8_KEYS];
        self.state = MachineState::Running;
        self.cycles = 0;
        self.load_fonts();
    }

    fn load_fonts(&mut self) {
        self.memory[0..CHIP8_FONT.len()].copy_from_slice(&CHIP8_FONT);
    }

    /// Copies `rom` into memory at 0x200. Other state is left alone.
    pub fn load(&mut self, rom: &[u8]) -> Result<()> {
        if rom.len() > CHIP8_MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max: CHIP8_MAX_ROM_SIZE,
            });
        }
        let start = CHIP8_PROGRAM_START as usize;
        self.memory[start..start + rom.len()].copy_from_slice(rom);
        debug!("Loaded {} byte ROM at {:#06x}.", rom.len(), start);
        Ok(())
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!("Loading binary {}.", path.display());
        let buffer = std::fs::read(path)?;
        self.load(&buffer)
    }

    pub fn set_keys(&mut self, keys: [bool; CHIP8_KEYS]) {
        self.keypad = keys;
    }

    pub fn press_key(&mut self, key: u8) {
        if let Some(pressed) = self.keypad.get_mut(key as usize) {
            *pressed = true;
        }
    }

    pub fn release_key(&mut self, key: u8) {
        if let Some(pressed) = self.keypad.get_mut(key as usize) {
            *pressed = false;
        }
    }

    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn draw_flag(&self) -> bool {
        self.draw_flag
    }

    /// Called by the renderer once it has consumed the frame buffer.
    pub fn clear_draw_flag(&mut self) {
        self.draw_flag = false;
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn i(&self) -> u16 {
        self.i
    }

    pub fn v(&self, reg: u8) -> u8 {
        self.v[(reg & 0xF) as usize]
    }

    /// Number of occupied stack slots, 0..=16. The top return address sits
    /// at slot `sp() - 1`, which always lies in 0..=15.
    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs one cycle: either one instruction or one poll of a pending
    /// key wait, followed by a timer tick.
    pub fn step(&mut self) -> Result<()> {
        match self.state {
            MachineState::AwaitingKey { register } => self.poll_keypress(register),
            MachineState::Running => {
                let opcode = self.fetch()?;
                let insn = Instruction::decode(opcode)?;
                trace!("Decoded instruction {:?}", insn);
                self.execute(insn)?;
                trace!("Executed instruction {:?}", insn);
            }
        }
        self.update_timers();
        self.cycles = self.cycles.wrapping_add(1);
        Ok(())
    }

    // Bounds-checked span of `len` bytes starting at `start`.
    fn span(&self, start: usize, len: usize) -> Result<Range<usize>> {
        let end = start + len;
        if end > CHIP8_MEMORY_SIZE {
            return Err(Chip8Error::MemoryAccess {
                address: start.max(CHIP8_MEMORY_SIZE),
            });
        }
        Ok(start..end)
    }

    fn fetch(&mut self) -> Result<u16> {
        let at = self.span(self.pc as usize, 2)?;
        let instruction = u16::from_be_bytes([self.memory[at.start], self.memory[at.start + 1]]);
        trace!(
            "Fetched instruction {:#06x} from address {:#06x}.",
            instruction,
            self.pc,
        );
        self.pc = self.pc.wrapping_add(2);
        Ok(instruction)
    }

    fn skip(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }

    fn first_pressed_key(&self) -> Option<u8> {
        self.keypad.iter().position(|&pressed| pressed).map(|key| key as u8)
    }

    fn poll_keypress(&mut self, register: u8) {
        if let Some(key) = self.first_pressed_key() {
            debug!("Key {:X} pressed, resuming with V{:X}", key, register);
            self.v[register as usize] = key;
            self.state = MachineState::Running;
        }
    }

    fn execute(&mut self, insn: Instruction) -> Result<()> {
        match insn {
            Sys(addr) => {
                debug!("Ignoring machine code routine at {:#05x}", addr);
            }

            Clear => {
                self.frame = [false; CHIP8_FRAME_SIZE];
            }

            Return => {
                if self.sp == 0 {
                    return Err(Chip8Error::StackUnderflow {
                        pc: self.pc.wrapping_sub(2),
                    });
                }
                self.sp -= 1;
                self.pc = self.stack[self.sp];
            }

            Jump(addr) => {
                self.pc = addr;
            }

            Call(addr) => {
                if self.sp == CHIP8_STACK_DEPTH {
                    return Err(Chip8Error::StackOverflow {
                        pc: self.pc.wrapping_sub(2),
                    });
                }
                self.stack[self.sp] = self.pc;
                self.sp += 1;
                self.pc = addr;
            }

            SkipEqIm(reg, value) => {
                if self.v[reg as usize] == value {
                    self.skip();
                }
            }

            SkipNeIm(reg, value) => {
                if self.v[reg as usize] != value {
                    self.skip();
                }
            }

            SkipEq(reg0, reg1) => {
                if self.v[reg0 as usize] == self.v[reg1 as usize] {
                    self.skip();
                }
            }

            LoadIm(reg, value) => {
                self.v[reg as usize] = value;
            }

            AddIm(reg, value) => {
                self.v[reg as usize] = self.v[reg as usize].wrapping_add(value);
            }

            Move(dst, src) => {
                self.v[dst as usize] = self.v[src as usize];
            }

            Or(src_dst, src) => {
                self.v[src_dst as usize] |= self.v[src as usize];
            }

            And(src_dst, src) => {
                self.v[src_dst as usize] &= self.v[src as usize];
            }

            Xor(src_dst, src) => {
                self.v[src_dst as usize] ^= self.v[src as usize];
            }

            Add(src_dst, src) => {
                let (result, overflow) =
                    self.v[src_dst as usize].overflowing_add(self.v[src as usize]);
                self.v[src_dst as usize] = result;
                self.v[0xf] = u8::from(overflow);
            }

            Sub(src_dst, src) => {
                let (x, y) = (self.v[src_dst as usize], self.v[src as usize]);
                self.v[src_dst as usize] = x.wrapping_sub(y);
                self.v[0xf] = u8::from(x >= y);
            }

            Shr(src_dst) => {
                let src_dst = src_dst as usize;
                let vf = self.v[src_dst] & 0x1;
                self.v[src_dst] >>= 1;
                self.v[0xf] = vf;
            }

            SubN(src_dst, src) => {
                let (x, y) = (self.v[src_dst as usize], self.v[src as usize]);
                self.v[src_dst as usize] = y.wrapping_sub(x);
                self.v[0xf] = u8::from(y >= x);
            }

            Shl(src_dst) => {
                let src_dst = src_dst as usize;
                let vf = (self.v[src_dst] >> 7) & 0x1;
                self.v[src_dst] <<= 1;
                self.v[0xf] = vf;
            }

            SkipNe(reg0, reg1) => {
                if self.v[reg0 as usize] != self.v[reg1 as usize] {
                    self.skip();
                }
            }

            LoadI(addr) => {
                self.i = addr;
            }

            JumpOff(addr) => {
                self.pc = u16::from(self.v[0]) + addr;
            }

            Rnd(reg, mask) => {
                let random_num: u8 = self.rng.gen();
                self.v[reg as usize] = random_num & mask;
            }

            Draw(x, y, rows) => {
                self.draw(self.v[x as usize], self.v[y as usize], rows)?;
            }

            SkipPressed(reg) => {
                let key = (self.v[reg as usize] & 0xF) as usize;
                if self.keypad[key] {
                    self.skip();
                }
            }

            SkipNotPressed(reg) => {
                let key = (self.v[reg as usize] & 0xF) as usize;
                if !self.keypad[key] {
                    self.skip();
                }
            }

            LoadFromDelayTimer(reg) => {
                self.v[reg as usize] = self.delay_timer;
            }

            WaitKeypress(reg) => match self.first_pressed_key() {
                Some(key) => self.v[reg as usize] = key,
                None => {
                    debug!("Waiting for a key press into V{:X}", reg);
                    self.state = MachineState::AwaitingKey { register: reg };
                }
            },

            LoadDelayTimer(reg) => {
                self.delay_timer = self.v[reg as usize];
            }

            LoadSoundTimer(reg) => {
                self.sound_timer = self.v[reg as usize];
            }

            AddI(reg) => {
                self.i = self.i.wrapping_add(u16::from(self.v[reg as usize]));
            }

            SetSpriteAddr(reg) => {
                self.i = u16::from(self.v[reg as usize]) * CHIP8_GLYPH_LEN;
            }

            StoreBcd(reg) => {
                let value = self.v[reg as usize];
                let at = self.span(self.i as usize, 3)?;
                self.memory[at].copy_from_slice(&[value / 100, (value / 10) % 10, value % 10]);
            }

            StoreRegs(reg) => {
                let last = reg as usize;
                let at = self.span(self.i as usize, last + 1)?;
                self.memory[at].copy_from_slice(&self.v[..=last]);
            }

            LoadRegs(reg) => {
                let last = reg as usize;
                let at = self.span(self.i as usize, last + 1)?;
                self.v[..=last].copy_from_slice(&self.memory[at]);
            }
        }
        Ok(())
    }

    /// XORs an 8-pixel-wide sprite of `rows` bytes from `memory[I..]` onto
    /// the frame buffer at (`x`, `y`), wrapping at the edges. VF ends up 1 if
    /// any lit pixel was switched off.
    fn draw(&mut self, x: u8, y: u8, rows: u8) -> Result<()> {
        let at = self.span(self.i as usize, rows as usize)?;
        let sprite = &self.memory[at];

        self.v[0xf] = 0;
        for (row, line) in sprite.iter().enumerate() {
            let yoff = ((y as usize + row) % CHIP8_HEIGHT) * CHIP8_WIDTH;
            for col in 0..8 {
                if line & (0x80 >> col) == 0 {
                    continue;
                }
                let xoff = (x as usize + col) % CHIP8_WIDTH;
                let pixel = &mut self.frame[xoff + yoff];
                if *pixel {
                    self.v[0xf] = 1;
                }
                *pixel = !*pixel;
            }
        }
        self.draw_flag = true;
        Ok(())
    }

    fn update_timers(&mut self) {
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }
        if self.sound_timer > 0 {
            if self.sound_timer == 1 {
                self.sound.pulse();
            }
            self.sound_timer -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingSink(Rc<Cell<u32>>);

    impl SoundSink for CountingSink {
        fn pulse(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn with_program(program: &[u16]) -> Interpreter {
        let rom: Vec<u8> = program.iter().flat_map(|op| op.to_be_bytes()).collect();
        let mut chip = Interpreter::with_seed(0);
        chip.load(&rom).unwrap();
        chip
    }

    fn run(program: &[u16]) -> Interpreter {
        let mut chip = with_program(program);
        for _ in program {
            chip.step().unwrap();
        }
        chip
    }

    #[test]
    fn test_new_interpreter_has_fonts_and_start_pc() {
        let chip = Interpreter::new();
        assert_eq!(chip.pc(), 0x200);
        assert_eq!(chip.sp(), 0);
        assert_eq!(&chip.memory()[..80], &CHIP8_FONT[..]);
        assert!(chip.memory()[80..].iter().all(|&b| b == 0));
        assert!(!chip.draw_flag());
        assert_eq!(chip.state(), MachineState::Running);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut chip = run(&[0x6A42, 0xA123, 0x2300]);
        chip.press_key(3);
        chip.reset();
        assert_eq!(chip.pc(), 0x200);
        assert_eq!(chip.v(0xA), 0);
        assert_eq!(chip.i(), 0);
        assert_eq!(chip.sp(), 0);
        assert_eq!(chip.cycles(), 0);
        assert_eq!(chip.memory()[0x200], 0);
        assert_eq!(&chip.memory()[..80], &CHIP8_FONT[..]);
        assert!(chip.frame_buffer().iter().all(|&p| !p));
    }

    #[test]
    fn test_load_rejects_oversized_rom() {
        let mut chip = Interpreter::new();
        let rom = vec![0xAA; CHIP8_MAX_ROM_SIZE + 1];
        assert!(matches!(
            chip.load(&rom),
            Err(Chip8Error::RomTooLarge { size, max }) if size == 3585 && max == 3584
        ));
        assert_eq!(chip.memory()[0x200], 0);
    }

    #[test]
    fn test_load_fills_memory_to_the_end() {
        let mut chip = Interpreter::new();
        let rom = vec![0xAA; CHIP8_MAX_ROM_SIZE];
        chip.load(&rom).unwrap();
        assert_eq!(chip.memory()[0x1FF], 0);
        assert_eq!(chip.memory()[0x200], 0xAA);
        assert_eq!(chip.memory()[0xFFF], 0xAA);
    }

    #[test]
    fn test_load_file_reports_missing_file() {
        let mut chip = Interpreter::new();
        assert!(matches!(
            chip.load_file("/nonexistent/rom.ch8"),
            Err(Chip8Error::Io(_))
        ));
    }

    #[test]
    fn test_6xkk_loads_every_immediate() {
        let mut chip = Interpreter::with_seed(0);
        for nn in 0..=255u8 {
            chip.execute(LoadIm(0x3, nn)).unwrap();
            assert_eq!(chip.v(0x3), nn);
        }
    }

    #[test]
    fn test_7xkk_wraps_and_leaves_vf() {
        let mut chip = Interpreter::with_seed(0);
        for a in 0..=255u8 {
            for nn in [0u8, 1, 0x7F, 0x80, 0xFF] {
                chip.v[0x2] = a;
                chip.v[0xf] = 0xAB;
                chip.execute(AddIm(0x2, nn)).unwrap();
                assert_eq!(chip.v(0x2), ((a as u16 + nn as u16) % 256) as u8);
                assert_eq!(chip.v(0xf), 0xAB);
            }
        }
    }

    #[test]
    fn test_8xy4_sets_carry() {
        let mut chip = Interpreter::with_seed(0);
        for a in 0..=255u16 {
            for b in 0..=255u16 {
                chip.v[0x1] = a as u8;
                chip.v[0x2] = b as u8;
                chip.execute(Add(0x1, 0x2)).unwrap();
                assert_eq!(chip.v(0x1), ((a + b) % 256) as u8);
                assert_eq!(chip.v(0xf), u8::from(a + b > 255));
            }
        }
    }

    #[test]
    fn test_8xy5_sets_no_borrow() {
        let mut chip = Interpreter::with_seed(0);
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                chip.v[0x1] = a;
                chip.v[0x2] = b;
                chip.execute(Sub(0x1, 0x2)).unwrap();
                assert_eq!(chip.v(0x1), a.wrapping_sub(b));
                assert_eq!(chip.v(0xf), u8::from(a >= b));
            }
        }
    }

    #[test]
    fn test_8xy7_subtracts_reversed() {
        let mut chip = Interpreter::with_seed(0);
        chip.v[0x1] = 10;
        chip.v[0x2] = 3;
        chip.execute(SubN(0x1, 0x2)).unwrap();
        assert_eq!(chip.v(0x1), 249);
        assert_eq!(chip.v(0xf), 0);

        chip.v[0x1] = 3;
        chip.v[0x2] = 3;
        chip.execute(SubN(0x1, 0x2)).unwrap();
        assert_eq!(chip.v(0x1), 0);
        assert_eq!(chip.v(0xf), 1);
    }

    #[test]
    fn test_flag_wins_when_vf_is_the_destination() {
        let mut chip = Interpreter::with_seed(0);
        chip.v[0xf] = 0xFF;
        chip.v[0x1] = 0x01;
        chip.execute(Add(0xf, 0x1)).unwrap();
        assert_eq!(chip.v(0xf), 1);

        // 0x05 - 0x03: no borrow
        chip.v[0xf] = 0x05;
        chip.v[0x1] = 0x03;
        chip.execute(Sub(0xf, 0x1)).unwrap();
        assert_eq!(chip.v(0xf), 1);

        // 0x03 - 0x05: borrow
        chip.v[0xf] = 0x05;
        chip.v[0x1] = 0x03;
        chip.execute(SubN(0xf, 0x1)).unwrap();
        assert_eq!(chip.v(0xf), 0);

        chip.v[0xf] = 0b0000_0010;
        chip.execute(Shr(0xf)).unwrap();
        assert_eq!(chip.v(0xf), 0);

        chip.v[0xf] = 0b1000_0000;
        chip.execute(Shl(0xf)).unwrap();
        assert_eq!(chip.v(0xf), 1);
    }

    #[test]
    fn test_8xy6_and_8xye_shift_with_flag() {
        let mut chip = Interpreter::with_seed(0);
        chip.v[0x4] = 0b1000_0011;
        chip.execute(Shr(0x4)).unwrap();
        assert_eq!(chip.v(0x4), 0b0100_0001);
        assert_eq!(chip.v(0xf), 1);

        chip.v[0x4] = 0b1000_0010;
        chip.execute(Shl(0x4)).unwrap();
        assert_eq!(chip.v(0x4), 0b0000_0100);
        assert_eq!(chip.v(0xf), 1);

        chip.execute(Shl(0x4)).unwrap();
        assert_eq!(chip.v(0x4), 0b0000_1000);
        assert_eq!(chip.v(0xf), 0);
    }

    #[test]
    fn test_8xy_bitwise_ops() {
        let chip = run(&[0x60F0, 0x613C, 0x8201, 0x8211, 0x8300, 0x8312, 0x8403, 0x8413]);
        assert_eq!(chip.v(0x2), 0xF0 | 0x3C);
        assert_eq!(chip.v(0x3), 0xF0 & 0x3C);
        assert_eq!(chip.v(0x4), 0xF0 ^ 0x3C);
    }

    #[test]
    fn test_skips() {
        assert_eq!(run(&[0x6111, 0x3111]).pc(), 0x206);
        assert_eq!(run(&[0x3111]).pc(), 0x202);
        assert_eq!(run(&[0x4111]).pc(), 0x204);
        assert_eq!(run(&[0x6111, 0x4111]).pc(), 0x204);
        assert_eq!(run(&[0x6111, 0x6211, 0x5120]).pc(), 0x208);
        assert_eq!(run(&[0x6111, 0x5120]).pc(), 0x204);
        assert_eq!(run(&[0x6111, 0x9120]).pc(), 0x206);
        assert_eq!(run(&[0x9120]).pc(), 0x202);
    }

    #[test]
    fn test_jumps() {
        assert_eq!(run(&[0x1ABC]).pc(), 0xABC);
        assert_eq!(run(&[0x6010, 0xB300]).pc(), 0x310);
    }

    #[test]
    fn test_call_and_return_restore_pc_and_sp() {
        let mut chip = with_program(&[0x2300, 0x2300]);
        chip.memory[0x300..0x304].copy_from_slice(&[0x71, 0x01, 0x00, 0xEE]);
        for expected_return in [0x202, 0x204] {
            chip.step().unwrap();
            assert_eq!(chip.pc(), 0x300);
            assert_eq!(chip.sp(), 1);
            chip.step().unwrap();
            chip.step().unwrap();
            assert_eq!(chip.pc(), expected_return);
            assert_eq!(chip.sp(), 0);
        }
        assert_eq!(chip.v(0x1), 2);
    }

    #[test]
    fn test_nested_calls_overflow_at_depth_16() {
        // Each subroutine calls the next one two bytes further on.
        let program: Vec<u16> = (0..17).map(|n| 0x2202 + 2 * n).collect();
        let mut chip = with_program(&program);
        for depth in 1..=CHIP8_STACK_DEPTH {
            chip.step().unwrap();
            assert_eq!(chip.sp(), depth);
        }
        assert!(matches!(
            chip.step(),
            Err(Chip8Error::StackOverflow { pc: 0x220 })
        ));
    }

    #[test]
    fn test_return_on_empty_stack_underflows() {
        let mut chip = with_program(&[0x00EE]);
        assert!(matches!(
            chip.step(),
            Err(Chip8Error::StackUnderflow { pc: 0x200 })
        ));
    }

    #[test]
    fn test_sys_is_ignored() {
        let chip = run(&[0x0123]);
        assert_eq!(chip.pc(), 0x202);
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let mut chip = with_program(&[0x5121]);
        assert!(matches!(
            chip.step(),
            Err(Chip8Error::UnknownOpcode { opcode: 0x5121 })
        ));
    }

    #[test]
    fn test_fetch_past_end_of_memory() {
        let mut chip = run(&[0x1FFF]);
        assert!(matches!(
            chip.step(),
            Err(Chip8Error::MemoryAccess { address: 0x1000 })
        ));
    }

    #[test]
    fn test_annn_fx1e_fx29() {
        let chip = run(&[0xA123, 0x6010, 0xF01E]);
        assert_eq!(chip.i(), 0x133);

        let mut chip = Interpreter::with_seed(0);
        chip.i = 0xFFFF;
        chip.v[0x0] = 2;
        chip.execute(AddI(0x0)).unwrap();
        assert_eq!(chip.i(), 1);

        let chip = run(&[0x650B, 0xF529]);
        assert_eq!(chip.i(), 0xB * 5);
    }

    #[test]
    fn test_cxkk_is_masked_and_seeded() {
        let chip = run(&[0x6AFF, 0xCA00]);
        assert_eq!(chip.v(0xA), 0);

        let program = [0xC00F, 0xC1FF, 0xC2F0];
        let first = run(&program);
        let second = run(&program);
        assert!(first.v(0x0) <= 0x0F);
        assert_eq!(first.v(0x2) & 0x0F, 0);
        assert_eq!(first.v, second.v);
    }

    #[test]
    fn test_fx33_stores_decimal_digits() {
        let chip = run(&[0x60FE, 0xA300, 0xF033]);
        assert_eq!(&chip.memory()[0x300..0x303], &[2, 5, 4]);
        let chip = run(&[0x6007, 0xA300, 0xF033]);
        assert_eq!(&chip.memory()[0x300..0x303], &[0, 0, 7]);
    }

    #[test]
    fn test_fx55_fx65_round_trip() {
        let mut chip = Interpreter::with_seed(0);
        let original: [u8; 16] = core::array::from_fn(|n| (n as u8) * 13 + 7);
        chip.v = original;
        chip.i = 0x400;
        chip.execute(StoreRegs(0xF)).unwrap();
        chip.v = [0; 16];
        chip.execute(LoadRegs(0xF)).unwrap();
        assert_eq!(chip.v, original);
        assert_eq!(chip.i(), 0x400);
    }

    #[test]
    fn test_fx55_only_touches_up_to_x() {
        let chip = run(&[0x6011, 0x6122, 0x6233, 0xA300, 0xF155]);
        assert_eq!(&chip.memory()[0x300..0x303], &[0x11, 0x22, 0]);
    }

    #[test]
    fn test_register_dump_past_end_of_memory() {
        let mut chip = Interpreter::with_seed(0);
        chip.i = 0xFFF;
        assert!(chip.execute(StoreRegs(0x0)).is_ok());
        assert!(matches!(
            chip.execute(StoreRegs(0x1)),
            Err(Chip8Error::MemoryAccess { address: 0x1000 })
        ));
        chip.i = 0x2000;
        assert!(matches!(
            chip.execute(LoadRegs(0x0)),
            Err(Chip8Error::MemoryAccess { address: 0x2000 })
        ));
        assert!(chip.execute(StoreBcd(0x0)).is_err());
    }

    fn lit(chip: &Interpreter, x: usize, y: usize) -> bool {
        chip.frame_buffer()[x + y * CHIP8_WIDTH]
    }

    #[test]
    fn test_draw_twice_restores_frame() {
        let mut chip = with_program(&[0xA000, 0xD015, 0xD015]);
        chip.step().unwrap();
        chip.step().unwrap();
        let after_first = *chip.frame_buffer();
        assert_eq!(chip.v(0xf), 0);
        assert!(chip.draw_flag());
        assert!(after_first.iter().any(|&p| p));

        chip.clear_draw_flag();
        chip.step().unwrap();
        assert_eq!(chip.v(0xf), 1);
        assert!(chip.draw_flag());
        assert!(chip.frame_buffer().iter().all(|&p| !p));
    }

    #[test]
    fn test_draw_clears_vf_when_no_collision() {
        let mut chip = run(&[0xA000, 0xD015]);
        chip.v[0xf] = 1;
        chip.execute(Draw(0x0, 0x1, 0)).unwrap();
        assert_eq!(chip.v(0xf), 0);
        assert!(chip.draw_flag());
    }

    #[test]
    fn test_draw_wraps_around_edges() {
        // "0" glyph at (62, 30): columns 62,63,0,1 and rows 30,31,0,1,2
        let chip = run(&[0x603E, 0x611E, 0xA000, 0xD015]);
        assert!(lit(&chip, 62, 30));
        assert!(lit(&chip, 1, 30));
        assert!(!lit(&chip, 2, 30));
        assert!(lit(&chip, 62, 2));
        assert!(lit(&chip, 62, 0));
        assert!(!lit(&chip, 63, 0));
        assert!(!lit(&chip, 62, 3));
    }

    #[test]
    fn test_draw_coordinates_wrap_from_register_values() {
        // x = 64 + 2, y = 32 + 1
        let chip = run(&[0x6042, 0x6121, 0xA000, 0xD011]);
        assert!(lit(&chip, 2, 1));
        assert!(lit(&chip, 5, 1));
        assert!(!lit(&chip, 6, 1));
    }

    #[test]
    fn test_draw_reads_sprite_within_memory() {
        let mut chip = run(&[0xAFFE]);
        chip.v[0x0] = 0;
        assert!(matches!(
            chip.execute(Draw(0x0, 0x0, 3)),
            Err(Chip8Error::MemoryAccess { address: 0x1000 })
        ));
        assert!(chip.frame_buffer().iter().all(|&p| !p));
    }

    #[test]
    fn test_00e0_clears_without_touching_draw_flag() {
        let mut chip = run(&[0xA000, 0xD015]);
        chip.clear_draw_flag();
        chip.execute(Clear).unwrap();
        assert!(chip.frame_buffer().iter().all(|&p| !p));
        assert!(!chip.draw_flag());
    }

    #[test]
    fn test_ex9e_exa1_skip_on_key_state() {
        let mut chip = with_program(&[0x6005, 0xE09E, 0x0000, 0xE0A1]);
        chip.press_key(5);
        chip.step().unwrap();
        chip.step().unwrap();
        assert_eq!(chip.pc(), 0x206);
        chip.step().unwrap();
        assert_eq!(chip.pc(), 0x208);
        chip.release_key(5);
        chip.pc = 0x206;
        chip.step().unwrap();
        assert_eq!(chip.pc(), 0x20A);

        let mut chip = with_program(&[0x6005, 0xE0A1]);
        chip.set_keys([false; 16]);
        chip.step().unwrap();
        chip.step().unwrap();
        assert_eq!(chip.pc(), 0x206);
    }

    #[test]
    fn test_fx0a_waits_for_a_key() {
        let mut chip = with_program(&[0xF30A, 0x6001]);
        chip.step().unwrap();
        assert_eq!(chip.state(), MachineState::AwaitingKey { register: 3 });
        assert_eq!(chip.pc(), 0x202);

        for _ in 0..5 {
            chip.step().unwrap();
        }
        assert_eq!(chip.pc(), 0x202);
        assert_eq!(chip.v(0x0), 0);

        let mut keys = [false; 16];
        keys[0xB] = true;
        keys[0xE] = true;
        chip.set_keys(keys);
        chip.step().unwrap();
        assert_eq!(chip.state(), MachineState::Running);
        assert_eq!(chip.v(0x3), 0xB);
        assert_eq!(chip.pc(), 0x202);

        chip.step().unwrap();
        assert_eq!(chip.v(0x0), 1);
    }

    #[test]
    fn test_fx0a_with_key_already_down() {
        let mut chip = with_program(&[0xF20A]);
        chip.press_key(0x7);
        chip.step().unwrap();
        assert_eq!(chip.state(), MachineState::Running);
        assert_eq!(chip.v(0x2), 0x7);
    }

    #[test]
    fn test_fx0a_accepts_a_key_still_held() {
        // One held key satisfies back-to-back waits; no release edge needed.
        let mut chip = with_program(&[0xF10A, 0xF20A]);
        chip.step().unwrap();
        assert_eq!(chip.state(), MachineState::AwaitingKey { register: 1 });
        chip.press_key(0x4);
        chip.step().unwrap();
        chip.step().unwrap();
        assert_eq!(chip.state(), MachineState::Running);
        assert_eq!((chip.v(0x1), chip.v(0x2)), (0x4, 0x4));
        assert_eq!(chip.pc(), 0x204);
    }

    #[test]
    fn test_timers_tick_while_waiting_for_key() {
        let mut chip = with_program(&[0x6003, 0xF015, 0xF00A]);
        for _ in 0..3 {
            chip.step().unwrap();
        }
        assert_eq!(chip.delay_timer(), 1);
        chip.step().unwrap();
        assert_eq!(chip.delay_timer(), 0);
    }

    #[test]
    fn test_delay_timer_counts_down_per_cycle() {
        let chip = run(&[0x6005, 0xF015, 0xF107]);
        // Set to 5, ticked once at the end of its own cycle, read next cycle.
        assert_eq!(chip.v(0x1), 4);
        assert_eq!(chip.delay_timer(), 3);
    }

    #[test]
    fn test_sound_timer_pulses_once_on_expiry() {
        let pulses = Rc::new(Cell::new(0));
        let mut chip = with_program(&[0x6001, 0xF018, 0x6003, 0xF018, 0x1208])
            .with_sound_sink(Box::new(CountingSink(pulses.clone())));
        chip.step().unwrap();
        chip.step().unwrap();
        assert_eq!(chip.sound_timer(), 0);
        assert_eq!(pulses.get(), 1);

        chip.step().unwrap();
        chip.step().unwrap();
        assert_eq!(chip.sound_timer(), 2);
        assert_eq!(pulses.get(), 1);
        for _ in 0..5 {
            chip.step().unwrap();
        }
        assert_eq!(chip.sound_timer(), 0);
        assert_eq!(pulses.get(), 2);
    }

    #[test]
    fn test_draws_font_glyph_and_loops() {
        let mut chip = Interpreter::with_seed(0);
        chip.load(&[0x60, 0x05, 0xA0, 0x00, 0xD0, 0x05, 0x12, 0x04])
            .unwrap();
        for _ in 0..3 {
            chip.step().unwrap();
        }
        assert!(chip.draw_flag());
        // D005 draws at (V0, V0) = (5, 5).
        for row in 0..5 {
            for col in 0..8 {
                let expected = CHIP8_FONT[row] & (0x80 >> col) != 0;
                assert_eq!(lit(&chip, 5 + col, 5 + row), expected);
            }
        }
        assert_eq!(chip.frame_buffer().iter().filter(|&&p| p).count(), 14);

        chip.step().unwrap();
        assert_eq!(chip.pc(), 0x204);
        for _ in 0..10 {
            chip.step().unwrap();
            chip.step().unwrap();
            assert_eq!(chip.pc(), 0x204);
        }
        assert_eq!(chip.cycles(), 24);
    }
}
