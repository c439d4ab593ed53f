use crate::client::{Framebuffer, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::input::RawMode;
use std::io;
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders};
use tui::Terminal;

/// Renderer is handed the emulator's framebuffer whenever the scheduler says
/// a frame is due. It never times itself; it should abstract the
/// implementation details, so a variety of kinds of screen would work.
pub trait Renderer {
    /// draw one frame; `frame` is only borrowed for the duration of the call
    fn render(&mut self, frame: &Framebuffer) -> Result<(), io::Error>;
}

// store useful metadata about the grid
struct Resolution(usize, usize);

impl Resolution {
    fn pixel_count(&self) -> usize {
        self.0 * self.1
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.0 - 1) as f64]
    }

    fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * (self.1 - 1) as f64, 0.0]
    }

    /// canvas coordinates of every pixel whose value matches `lit`
    fn points_from_data<'a>(
        &self,
        data: &'a [u8],
        lit: bool,
    ) -> impl std::iter::Iterator<Item = (f64, f64)> + 'a {
        let w = self.0;
        data.iter()
            .take(self.pixel_count())
            .enumerate()
            .filter(move |(_, px)| (**px != 0) == lit)
            .map(move |(i, _)| {
                (
                    (i % w) as f64,        // x
                    -1.0 * (i / w) as f64, // y
                )
            })
    }
}

/// monochrome display in a terminal, rendered using TUI and crossterm
pub struct TermRenderer {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    resolution: Resolution,
    _raw: RawMode,
}

impl TermRenderer {
    pub fn new() -> Result<TermRenderer, io::Error> {
        let raw = RawMode::acquire()?;
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        Ok(TermRenderer {
            terminal,
            resolution: Resolution(DISPLAY_WIDTH, DISPLAY_HEIGHT),
            _raw: raw,
        })
    }
}

impl Renderer for TermRenderer {
    fn render(&mut self, frame: &Framebuffer) -> Result<(), io::Error> {
        let resolution = &self.resolution;
        let lit: Vec<(f64, f64)> = resolution.points_from_data(frame, true).collect();
        let dark: Vec<(f64, f64)> = resolution.points_from_data(frame, false).collect();

        // for now this assumes a 1:1 ratio between terminal, chip8 and the
        // internal TUI canvas
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + resolution.0 as u16, 2 + resolution.1 as u16);

            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title("CHIP-8")
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(resolution.x_bounds())
                .y_bounds(resolution.y_bounds())
                .marker(Marker::Block)
                .paint(|ctx| {
                    ctx.draw(&Points {
                        coords: &dark,
                        color: Color::Black,
                    });
                    ctx.draw(&Points {
                        coords: &lit,
                        color: Color::White,
                    });
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }
}

impl Drop for TermRenderer {
    fn drop(&mut self) {
        // raw mode is left afterwards, when `_raw` drops
        let _ = self.terminal.show_cursor();
    }
}

/// useful for headless runs and testing; remembers what it was shown
pub struct DummyRenderer {
    pub frames: usize,
    pub lit_pixels: usize,
}

impl DummyRenderer {
    pub fn new() -> Self {
        DummyRenderer {
            frames: 0,
            lit_pixels: 0,
        }
    }
}

impl Default for DummyRenderer {
    fn default() -> Self {
        DummyRenderer::new()
    }
}

impl Renderer for DummyRenderer {
    fn render(&mut self, frame: &Framebuffer) -> Result<(), io::Error> {
        self.frames += 1;
        self.lit_pixels = frame.iter().filter(|px| **px != 0).count();
        Ok(())
    }
}
