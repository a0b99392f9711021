use crate::core::{FaceRect, FaceVerdict, FrameView, SessionObserver, StopSignal};
use image::DynamicImage;
use std::io::{self, Write};
use std::time::Duration;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent},
    terminal::{self, ClearType},
};

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Half resolution keeps redraws cheap.
        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(1),
            height: height.unwrap_or((term_height.saturating_sub(5) / 2).min(DEFAULT_HEIGHT / 2)).max(1),
        }
    }

    pub fn render(&self, image: &DynamicImage, faces: &[FaceRect], status: &str) -> String {
        let mut grid = self.image_to_ascii(image);
        let (img_width, img_height) = (image.width() as f32, image.height() as f32);

        for face in faces {
            self.draw_face_box(&mut grid, face, img_width, img_height);
        }

        let mut out = self.grid_to_string(&grid);
        out.push_str("\r\n");
        out.push_str(status);
        out.push_str("\r\n(q / Esc to stop)");
        out
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();

        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();

        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ramp[brightness * (ramp.len() - 1) / 255];
                }
            }
        }

        grid
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceRect, img_width: f32, img_height: f32) {
        let scale_x = |v: u32| ((v as f32 / img_width) * self.width as f32) as usize;
        let scale_y = |v: u32| ((v as f32 / img_height) * self.height as f32) as usize;

        let x1 = scale_x(face.x).min(self.width - 1);
        let y1 = scale_y(face.y).min(self.height - 1);
        let x2 = scale_x(face.x + face.width).saturating_sub(1).clamp(x1, self.width - 1);
        let y2 = scale_y(face.y + face.height).saturating_sub(1).clamp(y1, self.height - 1);

        for x in x1..=x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2 + 1).skip(y1) {
            row[x1] = '│';
            row[x2] = '│';
        }
        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

/// Live terminal preview that doubles as the operator's stop button.
///
/// Puts the terminal in raw mode for its lifetime so single key presses
/// arrive without Enter.
pub struct TerminalPreview {
    renderer: AsciiRenderer,
    stop: StopSignal,
    raw_mode: bool,
}

impl TerminalPreview {
    pub fn new(width: Option<usize>, height: Option<usize>, stop: StopSignal) -> Self {
        let raw_mode = terminal::enable_raw_mode().is_ok();
        Self {
            renderer: AsciiRenderer::new(width, height),
            stop,
            raw_mode,
        }
    }

    fn status_line(view: &FrameView<'_>) -> String {
        let mut parts = Vec::new();
        if let Some((captured, total)) = view.progress {
            parts.push(format!("{} [{}/{}]", progress_bar(captured, total), captured, total));
        }
        if let Some(remaining) = view.remaining {
            parts.push(format!("Time left: {}s", remaining.as_secs()));
        }
        match view.verdicts.last() {
            Some(verdict @ (FaceVerdict::Accepted { distance, .. }
                | FaceVerdict::LowConfidence { distance, .. }
                | FaceVerdict::Mismatch { distance, .. })) => {
                parts.push(format!("{} (distance {:.1})", verdict.message(), distance));
            }
            Some(verdict) => parts.push(verdict.message().to_string()),
            None if view.faces.is_empty() => parts.push("Looking for a face...".to_string()),
            None => {}
        }
        parts.join("  ")
    }
}

impl SessionObserver for TerminalPreview {
    fn on_frame(&mut self, view: &FrameView<'_>) {
        let screen = self.renderer.render(view.frame, view.faces, &Self::status_line(view));
        if clear_screen().is_ok() {
            print!("{}", screen);
            let _ = io::stdout().flush();
        }

        if matches!(check_for_quit(), Ok(true)) {
            self.stop.stop();
        }
    }
}

impl Drop for TerminalPreview {
    fn drop(&mut self) {
        if self.raw_mode {
            let _ = terminal::disable_raw_mode();
        }
        println!();
    }
}

fn progress_bar(captured: usize, total: usize) -> String {
    const SLOTS: usize = 10;
    let filled = if total == 0 { SLOTS } else { (captured * SLOTS / total).min(SLOTS) };
    format!("{}{}", "■".repeat(filled), "□".repeat(SLOTS - filled))
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

/// Non-blocking check for `q` or Esc.
pub fn check_for_quit() -> io::Result<bool> {
    if event::poll(Duration::from_millis(0))? {
        if let Event::Key(KeyEvent { code, .. }) = event::read()? {
            return Ok(matches!(code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q')));
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn render_draws_box_corners() {
        let renderer = AsciiRenderer { width: 20, height: 10 };
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 100, Luma([0])));
        let out = renderer.render(&frame, &[FaceRect::new(50, 20, 100, 60)], "status");

        assert!(out.contains('┌'));
        assert!(out.contains('┘'));
        assert!(out.contains("status"));
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0, 30), "□□□□□□□□□□");
        assert_eq!(progress_bar(15, 30), "■■■■■□□□□□");
        assert_eq!(progress_bar(30, 30), "■■■■■■■■■■");
    }
}
