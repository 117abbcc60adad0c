//! The startup sequence between a validated handoff and the idle loop:
//! decide where the text cells live, render the banner, report what the
//! loader left behind.

use cinder_api::info::{BootInfo, FramebufferKind, MemoryKind};
use cinder_x86_64_common::vga::{self, Color, ColorCode, Console};
use thiserror::Error;
use x86_64::PhysAddr;

/// Knobs for the first render. Compiled in; nothing exists this early
/// that could carry runtime configuration.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Config {
    /// Text placed in the top-left corner once the screen is clear.
    pub banner: &'static str,
    /// Attribute used for the banner.
    pub banner_color: ColorCode,
}

impl Config {
    /// Creates the default configuration: the crate name and version,
    /// white on black.
    pub const fn new_default() -> Self {
        Self {
            banner: concat!("cinder ", env!("CARGO_PKG_VERSION")),
            banner_color: ColorCode::new(Color::White, Color::Black),
        }
    }
}

/// Display records the startup sequence refuses to drive. All fatal:
/// a kernel that cannot render must not scribble over unknown memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("boot loader reported a non-text display ({0:?})")]
    UnsupportedDisplay(FramebufferKind),
    #[error("boot loader reported a null display address")]
    NullDisplay,
    #[error("unusable text geometry {width}x{height}")]
    BadGeometry { width: u32, height: u32 },
}

/// Decides where the character cells live, before anything dereferences
/// the address.
///
/// A loader that says nothing about the display gets the conventional
/// VGA window. A loader that does report one must describe the EGA text
/// mode this driver understands, at the fixed 80×25 geometry, with a
/// non-null address.
pub fn locate_display(info: &BootInfo) -> Result<PhysAddr, StartupError> {
    let Some(fb) = info.framebuffer() else {
        return Ok(PhysAddr::new(vga::TEXT_BUFFER_ADDR));
    };
    match fb.kind {
        FramebufferKind::EgaText => {}
        other => return Err(StartupError::UnsupportedDisplay(other)),
    }
    if fb.addr == 0 {
        return Err(StartupError::NullDisplay);
    }
    if fb.width as usize != vga::BUFFER_WIDTH || fb.height as usize != vga::BUFFER_HEIGHT {
        return Err(StartupError::BadGeometry {
            width: fb.width,
            height: fb.height,
        });
    }
    Ok(PhysAddr::new(u64::from(fb.addr)))
}

/// First visible output: clear the grid once, then put the banner down
/// through the tracked writer.
pub fn greet(console: &mut Console, config: &Config) {
    console.clear();
    console.set_color(config.banner_color);
    console.append(config.banner);
}

/// Logs a summary of the handoff. Runs after the logger is installed;
/// fields the loader did not vouch for are skipped.
pub fn report(info: &BootInfo) {
    if let Some(memory) = info.memory_bounds() {
        log::info!(
            "conventional memory: {} KiB low, {} KiB high",
            memory.lower_kib,
            memory.upper_kib
        );
    }
    if let Some(device) = info.boot_device() {
        log::info!("booted from BIOS device {device:#010x}");
    }
    if let Some(fb) = info.framebuffer() {
        log::info!("display: {}x{} text cells at {:#x}", fb.width, fb.height, fb.addr);
    }
    if let Some(map) = info.memory_map() {
        // the view was handed over by a validated loader and nothing has
        // remapped memory yet, so the buffer is still intact
        let mut regions = 0usize;
        let mut usable = 0u64;
        for entry in unsafe { map.iter() } {
            regions += 1;
            if entry.kind == MemoryKind::Usable {
                usable += entry.len;
            }
        }
        log::info!("memory map: {} regions, {} KiB usable", regions, usable / 1024);
    }
    if let Some(modules) = info.modules() {
        log::info!("{} boot modules at {:#x}", modules.count, modules.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_x86_64_common::vga::{ScreenChar, TextBuffer, CELL_COUNT};

    fn text_mode_info() -> BootInfo {
        let mut info = BootInfo::empty();
        info.flags = BootInfo::FLAG_FRAMEBUFFER;
        info.framebuffer_addr = 0xb8000;
        info.framebuffer_pitch = 160;
        info.framebuffer_width = 80;
        info.framebuffer_height = 25;
        info.framebuffer_bpp = 16;
        info.framebuffer_type = 2;
        info
    }

    fn console() -> Console {
        let cells: &'static mut [ScreenChar; CELL_COUNT] =
            Box::leak(Box::new([ScreenChar::BLANK; CELL_COUNT]));
        Console::new(TextBuffer::new(cells).unwrap())
    }

    #[test]
    fn silent_loader_falls_back_to_the_vga_window() {
        let info = BootInfo::empty();
        assert_eq!(locate_display(&info), Ok(PhysAddr::new(0xb8000)));
    }

    #[test]
    fn reported_text_mode_address_wins() {
        let mut info = text_mode_info();
        info.framebuffer_addr = 0xc0000;
        assert_eq!(locate_display(&info), Ok(PhysAddr::new(0xc0000)));
    }

    #[test]
    fn pixel_displays_are_refused() {
        let mut info = text_mode_info();
        info.framebuffer_type = 1;
        assert_eq!(
            locate_display(&info),
            Err(StartupError::UnsupportedDisplay(FramebufferKind::Rgb))
        );

        info.framebuffer_type = 0;
        assert_eq!(
            locate_display(&info),
            Err(StartupError::UnsupportedDisplay(FramebufferKind::Indexed))
        );
    }

    #[test]
    fn null_addresses_and_odd_geometry_are_refused() {
        let mut info = text_mode_info();
        info.framebuffer_addr = 0;
        assert_eq!(locate_display(&info), Err(StartupError::NullDisplay));

        let mut info = text_mode_info();
        info.framebuffer_width = 132;
        info.framebuffer_height = 43;
        assert_eq!(
            locate_display(&info),
            Err(StartupError::BadGeometry {
                width: 132,
                height: 43,
            })
        );
    }

    #[test]
    fn greet_clears_once_then_renders_the_banner() {
        let mut console = console();
        // leftovers from a previous owner of the buffer
        console.append("stale diagnostic output that must disappear");

        let config = Config::new_default();
        greet(&mut console, &config);

        let banner = config.banner.as_bytes();
        for (offset, expected) in banner.iter().enumerate() {
            let cell = console.buffer().read_cell(offset).unwrap();
            assert_eq!(cell.glyph, *expected);
            assert_eq!(cell.color, config.banner_color);
        }
        // everything after the banner is freshly cleared, which also
        // proves the clear ran before the render, not after
        for offset in banner.len()..CELL_COUNT {
            assert_eq!(console.buffer().read_cell(offset), Some(ScreenChar::BLANK));
        }
        assert_eq!(console.cursor(), banner.len());
    }

    #[test]
    fn banner_fits_the_first_line() {
        let config = Config::new_default();
        assert!(config.banner.len() <= vga::BUFFER_WIDTH);
    }
}
