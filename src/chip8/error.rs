use thiserror::Error;

/// Fatal conditions raised while loading or running a program.
#[derive(Debug, Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max} bytes")]
    RomTooLarge { size: usize, max: usize },

    #[error("Stack overflow: call at {pc:#06x} with a full call stack")]
    StackOverflow { pc: u16 },

    #[error("Stack underflow: return at {pc:#06x} with an empty call stack")]
    StackUnderflow { pc: u16 },

    #[error("Memory access out of bounds at address {address:#06x}")]
    MemoryAccess { address: usize },

    #[error("Unknown opcode: {opcode:#06x}")]
    UnknownOpcode { opcode: u16 },

    #[error("Could not read ROM: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Chip8Error>;
