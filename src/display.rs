use embedded_graphics::{
    mono_font::MonoTextStyle, pixelcolor::Rgb565, prelude::*, text::Text,
};
use profont::PROFONT_18_POINT;

use crate::framebuffer::Framebuffer;
use crate::layout::{CELL_H, TEXT_METAR};

/// Fixed-geometry ASCII character display: `rows` lines of `cols` columns.
///
/// `print` fills cells row-major, so text prepared by the reflow pass lays
/// out as fixed-width rows with no further line-breaking here. Writes past
/// the last cell are clipped, which is also what enforces the
/// `cols * rows` character budget of the panel.
pub struct TextGrid {
    cols: usize,
    rows: usize,
    cells: Vec<u8>,
}

impl TextGrid {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![b' '; cols * rows],
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total character budget.
    pub fn capacity(&self) -> usize {
        self.cols * self.rows
    }

    /// Blank every cell.
    pub fn clear(&mut self) {
        self.cells.fill(b' ');
    }

    /// Write `text` row-major starting at row `start_line`, clipping at the
    /// end of the grid. Bytes outside printable ASCII become spaces.
    pub fn print(&mut self, text: &str, start_line: usize) {
        if start_line >= self.rows {
            return;
        }
        let base = start_line * self.cols;
        let room = self.cells.len() - base;
        for (i, &b) in text.as_bytes().iter().take(room).enumerate() {
            self.cells[base + i] = if (0x20..0x7f).contains(&b) { b } else { b' ' };
        }
    }

    /// Row `idx` of the grid as text.
    pub fn line(&self, idx: usize) -> &str {
        let start = idx * self.cols;
        // Cells only ever hold printable ASCII.
        core::str::from_utf8(&self.cells[start..start + self.cols]).unwrap_or("")
    }

    /// Draw every row into the framebuffer, top-left at `origin`.
    pub fn draw(&self, fb: &mut Framebuffer, origin: Point) {
        let style = MonoTextStyle::new(&PROFONT_18_POINT, TEXT_METAR);
        self.draw_styled(fb, origin, style);
    }

    pub fn draw_styled(&self, fb: &mut Framebuffer, origin: Point, style: MonoTextStyle<'_, Rgb565>) {
        for row in 0..self.rows {
            // Text::new positions the baseline; CELL_H per row keeps the
            // grid aligned with the font's character box.
            let y = origin.y + CELL_H * (row as i32 + 1) - 5;
            Text::new(self.line(row), Point::new(origin.x, y), style)
                .draw(fb)
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grid_is_blank() {
        let grid = TextGrid::new(4, 2);
        assert_eq!(grid.line(0), "    ");
        assert_eq!(grid.line(1), "    ");
        assert_eq!(grid.capacity(), 8);
    }

    #[test]
    fn print_fills_rows_in_order() {
        let mut grid = TextGrid::new(4, 3);
        grid.print("AA  BBBB CC", 0);
        assert_eq!(grid.line(0), "AA  ");
        assert_eq!(grid.line(1), "BBBB");
        assert_eq!(grid.line(2), " CC ");
    }

    #[test]
    fn print_clips_at_the_character_budget() {
        let mut grid = TextGrid::new(4, 2);
        grid.print("12345678OVERFLOW", 0);
        assert_eq!(grid.line(0), "1234");
        assert_eq!(grid.line(1), "5678");
    }

    #[test]
    fn print_from_a_later_row() {
        let mut grid = TextGrid::new(3, 3);
        grid.print("XYZ", 1);
        assert_eq!(grid.line(0), "   ");
        assert_eq!(grid.line(1), "XYZ");
        grid.print("ignored", 3);
        assert_eq!(grid.line(2), "   ");
    }

    #[test]
    fn clear_blanks_previous_content() {
        let mut grid = TextGrid::new(3, 1);
        grid.print("ABC", 0);
        grid.clear();
        assert_eq!(grid.line(0), "   ");
    }

    #[test]
    fn non_printable_bytes_become_spaces() {
        let mut grid = TextGrid::new(5, 1);
        grid.print("A\tB\u{7f}C", 0);
        assert_eq!(grid.line(0), "A B C");
    }
}
