pub const CHIP8_WIN_SCALING: u32 = 10;
pub const CHIP8_SPEED_HZ: u32 = 500;
pub const IPS_MEASURE_CYCLE: u64 = CHIP8_SPEED_HZ as u64;
pub const CHIP8_ON_COLOUR: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
pub const CHIP8_OFF_COLOUR: [u8; 4] = [0x00, 0x00, 0x00, 0xff];
