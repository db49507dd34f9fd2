use crate::constants::{CHIP8_OFF_COLOUR, CHIP8_ON_COLOUR};
use chip8_interp::chip8::constants::{CHIP8_HEIGHT, CHIP8_WIDTH};
use chip8_interp::chip8::FrameBuffer;
use pixels::{Error, Pixels, SurfaceTexture, TextureError};
use winit::window::Window;

/// Window renderer: a 64x32 RGBA texture scaled up to the window surface.
pub struct Screen {
    pixels: Pixels,
}

impl Screen {
    pub fn new(window: &Window) -> Result<Self, Error> {
        let window_size = window.inner_size();
        let surface_texture = SurfaceTexture::new(window_size.width, window_size.height, window);
        let pixels = Pixels::new(CHIP8_WIDTH as u32, CHIP8_HEIGHT as u32, surface_texture)?;
        Ok(Screen { pixels })
    }

    pub fn paint(&mut self, frame: &FrameBuffer) {
        let fb = self.pixels.frame_mut();
        for (pixel, &lit) in fb.chunks_exact_mut(4).zip(frame.iter()) {
            let colour = if lit { CHIP8_ON_COLOUR } else { CHIP8_OFF_COLOUR };
            pixel.copy_from_slice(&colour);
        }
    }

    pub fn render(&self) -> Result<(), Error> {
        self.pixels.render()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), TextureError> {
        self.pixels.resize_surface(width, height)
    }
}

/// Terminal renderer: one line per row, `#` for lit pixels.
pub fn render_ascii(frame: &FrameBuffer) -> String {
    let mut out = String::with_capacity((CHIP8_WIDTH + 1) * CHIP8_HEIGHT);
    for row in frame.chunks_exact(CHIP8_WIDTH) {
        out.extend(row.iter().map(|&lit| if lit { '#' } else { ' ' }));
        out.push('\n');
    }
    out
}
