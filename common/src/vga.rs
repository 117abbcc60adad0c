use core::{fmt, ptr, slice};

use thiserror::Error;
use x86_64::PhysAddr;

/// Physical address of the EGA-compatible text buffer.
pub const TEXT_BUFFER_ADDR: u64 = 0xb8000;

/// Character cells per display line.
pub const BUFFER_WIDTH: usize = 80;
/// Display lines.
pub const BUFFER_HEIGHT: usize = 25;
/// Total cell count; linear offsets run in `0..CELL_COUNT`, row-major.
pub const CELL_COUNT: usize = BUFFER_WIDTH * BUFFER_HEIGHT;

/// The standard 16 EGA colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

/// A cell attribute byte: background in the high nibble, foreground in
/// the low one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }
}

/// One 16-bit display cell: character code in the low byte, attribute
/// in the high byte. The layout is hardware-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub glyph: u8,
    pub color: ColorCode,
}

impl ScreenChar {
    /// What [`TextBuffer::clear`] fills the grid with.
    pub const BLANK: ScreenChar = ScreenChar {
        glyph: b' ',
        color: ColorCode::new(Color::Black, Color::Black),
    };
}

/// The ways a cell write can be refused. These are contract violations
/// by the caller, reported before any store happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("cell {offset} is outside the {capacity}-cell text buffer")]
    OutOfRange { offset: usize, capacity: usize },
    #[error("{len} cells starting at {offset} do not fit the {capacity}-cell text buffer")]
    DoesNotFit {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("expected a buffer of {expected} cells, got {len}")]
    BadBufferLen { len: usize, expected: usize },
}

/// Bounded view over the character-cell grid.
///
/// All access goes through offset-checked methods, so a write outside
/// `0..CELL_COUNT` is unrepresentable. Every accepted write is a single
/// volatile store into the mapped region; there is no shadow buffer and
/// no diffing, so tooling watching the memory region sees each cell land.
pub struct TextBuffer {
    cells: &'static mut [ScreenChar],
}

impl TextBuffer {
    /// Wraps an existing cell slice. Fails unless the slice covers
    /// exactly the fixed 80×25 grid.
    pub fn new(cells: &'static mut [ScreenChar]) -> Result<TextBuffer, DisplayError> {
        if cells.len() != CELL_COUNT {
            return Err(DisplayError::BadBufferLen {
                len: cells.len(),
                expected: CELL_COUNT,
            });
        }
        Ok(TextBuffer { cells })
    }

    /// Creates the view over the hardware buffer at `base`.
    ///
    /// ## Safety
    ///
    /// `base` must be the identity-mapped text buffer, valid for
    /// [`CELL_COUNT`] cells and aliased by nothing else.
    pub unsafe fn from_raw(base: PhysAddr) -> TextBuffer {
        let cells = unsafe {
            slice::from_raw_parts_mut(base.as_u64() as *mut ScreenChar, CELL_COUNT)
        };
        TextBuffer { cells }
    }

    fn store(&mut self, offset: usize, cell: ScreenChar) {
        // one volatile store per cell, callers have checked the offset
        unsafe { ptr::write_volatile(self.cells.as_mut_ptr().add(offset), cell) };
    }

    /// Overwrites every cell with the blank glyph and the default
    /// black-on-black attribute. Idempotent.
    pub fn clear(&mut self) {
        for offset in 0..CELL_COUNT {
            self.store(offset, ScreenChar::BLANK);
        }
    }

    /// Writes a single cell at a linear offset.
    pub fn write_cell(
        &mut self,
        offset: usize,
        glyph: u8,
        color: ColorCode,
    ) -> Result<(), DisplayError> {
        if offset >= CELL_COUNT {
            return Err(DisplayError::OutOfRange {
                offset,
                capacity: CELL_COUNT,
            });
        }
        self.store(offset, ScreenChar { glyph, color });
        Ok(())
    }

    /// Writes `text` into consecutive cells starting at `offset`, one
    /// attribute for all of them.
    ///
    /// Bytes are stored as-is, one cell each; control characters are not
    /// interpreted, so a newline lands as a glyph rather than moving to
    /// the next line. A string that would run past the end of the grid
    /// is rejected before any cell is touched.
    pub fn write_str(
        &mut self,
        offset: usize,
        text: &str,
        color: ColorCode,
    ) -> Result<(), DisplayError> {
        let len = text.len();
        if offset.checked_add(len).map_or(true, |end| end > CELL_COUNT) {
            return Err(DisplayError::DoesNotFit {
                offset,
                len,
                capacity: CELL_COUNT,
            });
        }
        for (i, byte) in text.bytes().enumerate() {
            self.store(
                offset + i,
                ScreenChar {
                    glyph: glyph_for(byte),
                    color,
                },
            );
        }
        Ok(())
    }

    /// Volatile read-back of one cell, for diagnostics.
    pub fn read_cell(&self, offset: usize) -> Option<ScreenChar> {
        if offset >= CELL_COUNT {
            return None;
        }
        Some(unsafe { ptr::read_volatile(self.cells.as_ptr().add(offset)) })
    }
}

/// Bytes outside printable ASCII land as the code page 437 replacement
/// block instead of whatever glyph shares their value.
fn glyph_for(byte: u8) -> u8 {
    match byte {
        0x20..=0x7e => byte,
        _ => 0xfe,
    }
}

/// Stateful writer over a [`TextBuffer`]: keeps a cursor so consecutive
/// writes append instead of overwriting.
///
/// There is no file-scope instance of this; whoever boots the kernel
/// constructs one console and passes it around.
pub struct Console {
    buffer: TextBuffer,
    cursor: usize,
    color: ColorCode,
}

impl Console {
    /// White-on-black console starting at the top-left cell.
    pub fn new(buffer: TextBuffer) -> Console {
        Console {
            buffer,
            cursor: 0,
            color: ColorCode::new(Color::White, Color::Black),
        }
    }

    /// Attribute used for subsequent appends.
    pub fn set_color(&mut self, color: ColorCode) {
        self.color = color;
    }

    /// Next linear write position. Never exceeds [`CELL_COUNT`].
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Read access to the underlying grid.
    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    /// Clears the grid and rewinds the cursor.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// Appends `text` at the cursor with the current attribute and
    /// advances it one cell per byte.
    ///
    /// Writing clamps at the end of the grid: what fits is stored, the
    /// cursor saturates at [`CELL_COUNT`], and the number of cells
    /// actually written is returned. The cursor never wraps.
    pub fn append(&mut self, text: &str) -> usize {
        let room = CELL_COUNT - self.cursor;
        let written = text.len().min(room);
        for byte in text.bytes().take(written) {
            self.buffer.store(
                self.cursor,
                ScreenChar {
                    glyph: glyph_for(byte),
                    color: self.color,
                },
            );
            self.cursor += 1;
        }
        written
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn grid() -> TextBuffer {
        TextBuffer::new(Box::leak(Box::new([ScreenChar::BLANK; CELL_COUNT]))).unwrap()
    }

    fn dirty_grid() -> TextBuffer {
        let mut buffer = grid();
        for offset in (0..CELL_COUNT).step_by(7) {
            buffer
                .write_cell(offset, b'x', ColorCode::new(Color::Red, Color::Blue))
                .unwrap();
        }
        buffer
    }

    #[test]
    fn cells_are_two_bytes() {
        assert_eq!(core::mem::size_of::<ScreenChar>(), 2);
        assert_eq!(CELL_COUNT, 2000);
    }

    #[test]
    fn attribute_packs_background_high() {
        assert_eq!(ColorCode::new(Color::White, Color::Black), ColorCode(0x0f));
        assert_eq!(ColorCode::new(Color::Yellow, Color::Blue), ColorCode(0x1e));
    }

    #[test]
    fn new_requires_the_exact_grid_size() {
        let short: &'static mut [ScreenChar] = Box::leak(Box::new([ScreenChar::BLANK; 10]));
        assert_eq!(
            TextBuffer::new(short).unwrap_err(),
            DisplayError::BadBufferLen {
                len: 10,
                expected: CELL_COUNT,
            }
        );
    }

    #[test]
    fn clear_blanks_every_cell_and_is_idempotent() {
        let mut buffer = dirty_grid();
        buffer.clear();
        for offset in 0..CELL_COUNT {
            assert_eq!(buffer.read_cell(offset), Some(ScreenChar::BLANK));
        }
        buffer.clear();
        for offset in 0..CELL_COUNT {
            assert_eq!(buffer.read_cell(offset), Some(ScreenChar::BLANK));
        }
    }

    #[test]
    fn write_cell_checks_the_offset() {
        let mut buffer = grid();
        let color = ColorCode::new(Color::White, Color::Black);
        assert!(buffer.write_cell(CELL_COUNT - 1, b'z', color).is_ok());
        assert_eq!(
            buffer.write_cell(CELL_COUNT, b'z', color),
            Err(DisplayError::OutOfRange {
                offset: CELL_COUNT,
                capacity: CELL_COUNT,
            })
        );
    }

    #[test]
    fn write_str_touches_only_its_cells() {
        let mut buffer = grid();
        let color = ColorCode::new(Color::Green, Color::Black);
        buffer.write_str(42, "AB", color).unwrap();

        for offset in 0..CELL_COUNT {
            let cell = buffer.read_cell(offset).unwrap();
            match offset {
                42 => assert_eq!((cell.glyph, cell.color), (b'A', color)),
                43 => assert_eq!((cell.glyph, cell.color), (b'B', color)),
                _ => assert_eq!(cell, ScreenChar::BLANK),
            }
        }
    }

    #[test]
    fn write_str_rejects_overflow_without_partial_writes() {
        let mut buffer = grid();
        let color = ColorCode::new(Color::White, Color::Black);
        assert_eq!(
            buffer.write_str(CELL_COUNT - 1, "AB", color),
            Err(DisplayError::DoesNotFit {
                offset: CELL_COUNT - 1,
                len: 2,
                capacity: CELL_COUNT,
            })
        );
        assert_eq!(buffer.read_cell(CELL_COUNT - 1), Some(ScreenChar::BLANK));

        // a string ending exactly at the edge is fine
        assert!(buffer.write_str(CELL_COUNT - 2, "AB", color).is_ok());
    }

    #[test]
    fn control_bytes_become_the_replacement_glyph() {
        let mut buffer = grid();
        let color = ColorCode::new(Color::White, Color::Black);
        buffer.write_str(0, "A\nB", color).unwrap();
        assert_eq!(buffer.read_cell(0).unwrap().glyph, b'A');
        assert_eq!(buffer.read_cell(1).unwrap().glyph, 0xfe);
        assert_eq!(buffer.read_cell(2).unwrap().glyph, b'B');
    }

    #[test]
    fn append_accumulates_across_calls() {
        let mut console = Console::new(grid());
        assert_eq!(console.append("Hi"), 2);
        assert_eq!(console.append("!"), 1);
        assert_eq!(console.cursor(), 3);

        let text: Vec<u8> = (0..3)
            .map(|offset| console.buffer().read_cell(offset).unwrap().glyph)
            .collect();
        assert_eq!(text, b"Hi!");
        assert_eq!(console.buffer().read_cell(3), Some(ScreenChar::BLANK));
    }

    #[test]
    fn append_clamps_at_the_end_of_the_grid() {
        let mut console = Console::new(grid());
        let filler = "x".repeat(CELL_COUNT - 1);
        assert_eq!(console.append(&filler), CELL_COUNT - 1);

        // only one cell left; the rest of the string is dropped
        assert_eq!(console.append("abc"), 1);
        assert_eq!(console.cursor(), CELL_COUNT);
        assert_eq!(console.buffer().read_cell(CELL_COUNT - 1).unwrap().glyph, b'a');

        // saturated: nothing further lands, the cursor never wraps
        assert_eq!(console.append("z"), 0);
        assert_eq!(console.cursor(), CELL_COUNT);
        assert_eq!(console.buffer().read_cell(0).unwrap().glyph, b'x');
    }

    #[test]
    fn console_clear_rewinds_the_cursor() {
        let mut console = Console::new(grid());
        console.append("some text");
        console.clear();
        assert_eq!(console.cursor(), 0);
        assert_eq!(console.buffer().read_cell(0), Some(ScreenChar::BLANK));
        console.append("A");
        assert_eq!(console.buffer().read_cell(0).unwrap().glyph, b'A');
    }

    #[test]
    fn console_implements_fmt_write() {
        let mut console = Console::new(grid());
        write!(console, "{}-{}", 4, 2).unwrap();
        let text: Vec<u8> = (0..3)
            .map(|offset| console.buffer().read_cell(offset).unwrap().glyph)
            .collect();
        assert_eq!(text, b"4-2");
    }
}
