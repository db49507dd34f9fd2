mod constants;
mod display;
mod keymap;
mod sleeper;
mod terminal;

use crate::constants::*;
use crate::display::Screen;
use crate::keymap::Keypad;
use crate::sleeper::Sleeper;
use crate::terminal::Terminal;
use chip8_interp::chip8::constants::{CHIP8_HEIGHT, CHIP8_WIDTH};
use chip8_interp::chip8::Interpreter;

use clap::Parser;
use log::{debug, error, info};
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, WindowEvent},
    event_loop::EventLoop,
    window::WindowBuilder,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ROM image to run
    #[arg(long)]
    binary: PathBuf,

    /// Cycles per second
    #[arg(long, default_value_t = CHIP8_SPEED_HZ)]
    hz: u32,

    /// Window pixels per CHIP-8 pixel
    #[arg(long, default_value_t = CHIP8_WIN_SCALING)]
    scale: u32,

    /// Draw to the terminal instead of opening a window (Esc quits)
    #[arg(long)]
    ascii: bool,

    /// Stop after this many cycles
    #[arg(long, requires = "ascii")]
    cycles: Option<u64>,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(path) = log_file {
        builder.target(env_logger::Target::Pipe(Box::new(File::create(path)?)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;
    info!(
        "Starting Chip8 interpreter with binary {}",
        args.binary.display()
    );

    let mut chip8 = Interpreter::new();
    chip8.load_file(&args.binary)?;

    if args.ascii {
        run_terminal(chip8, args.hz, args.cycles)
    } else {
        run_window(chip8, args.hz, args.scale)
    }
}

fn report_ips(chip8: &Interpreter, timer: &mut Instant) {
    if chip8.cycles() % IPS_MEASURE_CYCLE == 0 {
        let elapsed_ms = timer.elapsed().as_millis().max(1);
        let ips = 1000 * IPS_MEASURE_CYCLE as u128 / elapsed_ms;
        debug!("OPS: {}. Cycle count: {}", ips, chip8.cycles());
        *timer = Instant::now();
    }
}

fn run_window(mut chip8: Interpreter, hz: u32, scale: u32) -> Result<(), Box<dyn Error>> {
    let event_loop = EventLoop::new();
    let window = {
        let size = LogicalSize::new(
            (CHIP8_WIDTH as u32 * scale) as f64,
            (CHIP8_HEIGHT as u32 * scale) as f64,
        );
        WindowBuilder::new()
            .with_title("Chip8")
            .with_inner_size(size)
            .with_min_inner_size(size)
            .build(&event_loop)?
    };
    let mut screen = Screen::new(&window)?;
    let mut keypad = Keypad::new();
    let mut sleeper = Sleeper::with_frequency(hz);
    let mut timer = Instant::now();

    event_loop.run(move |event, _, control_flow| {
        control_flow.set_poll();
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    debug!("Exiting");
                    control_flow.set_exit();
                }
                WindowEvent::Resized(size) => {
                    debug!("Resizing window...");
                    if let Err(err) = screen.resize(size.width, size.height) {
                        error!("Could not resize window: {}", err);
                        control_flow.set_exit_with_code(1);
                        return;
                    }
                    window.request_redraw();
                }
                WindowEvent::KeyboardInput { input, .. } => {
                    let Some(code) = input.virtual_keycode else {
                        return;
                    };
                    let pressed = input.state == ElementState::Pressed;
                    if let Some(key) = keypad.update(code, pressed) {
                        debug!("Updating keypad {:X}({:?}) to {}", key, code, pressed);
                    }
                }
                _ => (),
            },
            Event::MainEventsCleared => {
                chip8.set_keys(keypad.snapshot());
                if let Err(err) = chip8.step() {
                    error!("Halting at {:#06x}: {}", chip8.pc(), err);
                    control_flow.set_exit_with_code(1);
                    return;
                }
                if chip8.draw_flag() {
                    screen.paint(chip8.frame_buffer());
                    chip8.clear_draw_flag();
                    window.request_redraw();
                }
                report_ips(&chip8, &mut timer);
                sleeper.sleep();
            }
            Event::RedrawRequested(_) => {
                if let Err(err) = screen.render() {
                    error!("Error while rendering: {}", err);
                    control_flow.set_exit_with_code(1);
                }
            }
            _ => (),
        }
    })
}

fn run_terminal(mut chip8: Interpreter, hz: u32, cycles: Option<u64>) -> Result<(), Box<dyn Error>> {
    let mut sleeper = Sleeper::with_frequency(hz);
    let mut timer = Instant::now();
    let mut term = Terminal::new()?;

    while cycles.map_or(true, |limit| chip8.cycles() < limit) {
        let Some(keys) = term.poll_keys()? else {
            debug!("Exiting");
            break;
        };
        chip8.set_keys(keys);
        if let Err(err) = chip8.step() {
            error!("Halting at {:#06x}: {}", chip8.pc(), err);
            return Err(err.into());
        }
        if chip8.draw_flag() {
            term.draw(chip8.frame_buffer())?;
            chip8.clear_draw_flag();
        }
        report_ips(&chip8, &mut timer);
        sleeper.sleep();
    }
    info!("Stopped after {} cycles", chip8.cycles());
    Ok(())
}
