use std::collections::HashMap;
use winit::event::VirtualKeyCode;

// Left-hand 4x4 block of a QWERTY keyboard laid over the hex keypad:
//   1 2 3 C       1 2 3 4
//   4 5 6 D  <->  Q W E R
//   7 8 9 E       A S D F
//   A 0 B F       Z X C V
pub const CHIP8_KEYBOARD_MAP: [(VirtualKeyCode, u8); 16] = [
    (VirtualKeyCode::Key1, 0x1),
    (VirtualKeyCode::Key2, 0x2),
    (VirtualKeyCode::Key3, 0x3),
    (VirtualKeyCode::Key4, 0xC),
    (VirtualKeyCode::Q, 0x4),
    (VirtualKeyCode::W, 0x5),
    (VirtualKeyCode::E, 0x6),
    (VirtualKeyCode::R, 0xD),
    (VirtualKeyCode::A, 0x7),
    (VirtualKeyCode::S, 0x8),
    (VirtualKeyCode::D, 0x9),
    (VirtualKeyCode::F, 0xE),
    (VirtualKeyCode::Z, 0xA),
    (VirtualKeyCode::X, 0x0),
    (VirtualKeyCode::C, 0xB),
    (VirtualKeyCode::V, 0xF),
];

// Same layout for the terminal front end, keyed by the character typed.
pub const CHIP8_TERMINAL_MAP: [(char, u8); 16] = [
    ('1', 0x1),
    ('2', 0x2),
    ('3', 0x3),
    ('4', 0xC),
    ('q', 0x4),
    ('w', 0x5),
    ('e', 0x6),
    ('r', 0xD),
    ('a', 0x7),
    ('s', 0x8),
    ('d', 0x9),
    ('f', 0xE),
    ('z', 0xA),
    ('x', 0x0),
    ('c', 0xB),
    ('v', 0xF),
];

/// Tracks which hex keys are held, fed from window keyboard events.
#[derive(Debug)]
pub struct Keypad {
    map: HashMap<VirtualKeyCode, u8>,
    keys: [bool; 16],
}

impl Keypad {
    pub fn new() -> Self {
        Keypad {
            map: HashMap::from(CHIP8_KEYBOARD_MAP),
            keys: [false; 16],
        }
    }

    /// Returns the hex key affected, if the key is mapped.
    pub fn update(&mut self, code: VirtualKeyCode, pressed: bool) -> Option<u8> {
        let key = *self.map.get(&code)?;
        self.keys[key as usize] = pressed;
        Some(key)
    }

    pub fn snapshot(&self) -> [bool; 16] {
        self.keys
    }
}
