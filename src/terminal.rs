use crate::display::render_ascii;
use crate::keymap::CHIP8_TERMINAL_MAP;
use chip8_interp::chip8::constants::CHIP8_KEYS;
use chip8_interp::chip8::FrameBuffer;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute, queue};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{self, Stdout, Write};
use std::time::{Duration, Instant};

/// Most terminals only report presses (plus auto-repeat), so a key counts as
/// held for this long after its last press.
pub const KEY_HOLD: Duration = Duration::from_millis(150);

#[derive(Debug)]
pub struct HeldKeys {
    map: HashMap<char, u8>,
    pressed_at: [Option<Instant>; CHIP8_KEYS],
}

impl HeldKeys {
    pub fn new() -> Self {
        HeldKeys {
            map: HashMap::from(CHIP8_TERMINAL_MAP),
            pressed_at: [None; CHIP8_KEYS],
        }
    }

    pub fn press(&mut self, c: char, now: Instant) -> Option<u8> {
        let key = *self.map.get(&c.to_ascii_lowercase())?;
        self.pressed_at[key as usize] = Some(now);
        Some(key)
    }

    pub fn release(&mut self, c: char) -> Option<u8> {
        let key = *self.map.get(&c.to_ascii_lowercase())?;
        self.pressed_at[key as usize] = None;
        Some(key)
    }

    pub fn snapshot(&self, now: Instant) -> [bool; CHIP8_KEYS] {
        self.pressed_at.map(|at| at.map_or(false, |at| now.duration_since(at) < KEY_HOLD))
    }
}

/// Raw-mode alternate screen; the terminal is restored on drop.
pub struct Terminal {
    out: Stdout,
    keys: HeldKeys,
}

impl Terminal {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut term = Terminal {
            out: io::stdout(),
            keys: HeldKeys::new(),
        };
        execute!(
            term.out,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(term)
    }

    pub fn draw(&mut self, frame: &FrameBuffer) -> io::Result<()> {
        // Raw mode does not return the carriage on '\n', so place each row.
        for (y, line) in render_ascii(frame).lines().enumerate() {
            queue!(self.out, cursor::MoveTo(0, y as u16), Print(line))?;
        }
        self.out.flush()
    }

    /// Drains pending key events and returns the keypad for this cycle, or
    /// `None` once Esc or Ctrl-C has been pressed.
    pub fn poll_keys(&mut self) -> io::Result<Option<[bool; CHIP8_KEYS]>> {
        while event::poll(Duration::ZERO)? {
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };
            match code {
                KeyCode::Esc => return Ok(None),
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(None)
                }
                KeyCode::Char(c) if kind == KeyEventKind::Release => {
                    self.keys.release(c);
                }
                KeyCode::Char(c) => {
                    if let Some(key) = self.keys.press(c, Instant::now()) {
                        debug!("Updating keypad {:X}({:?}) to true", key, c);
                    }
                }
                _ => (),
            }
        }
        Ok(Some(self.keys.snapshot(Instant::now())))
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Err(err) = execute!(self.out, cursor::Show, terminal::LeaveAlternateScreen) {
            warn!("Could not leave alternate screen: {}", err);
        }
        if let Err(err) = terminal::disable_raw_mode() {
            warn!("Could not disable raw mode: {}", err);
        }
    }
}
