#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Provides a logger type that fans `log` records out to the text
/// console and the serial port.
pub mod logger;
/// Serial port wrapper used for off-screen diagnostics.
pub mod serial;
/// Driver for the memory-mapped VGA text buffer.
pub mod vga;

use vga::Console;

/// Initialize a `log` logger over the given sinks.
///
/// The console, if any, is moved into the logger; later output to it
/// goes through the `log` macros. Must be called at most once.
pub fn init_logger(console: Option<Console>, serial: bool) {
    let logger = logger::LOGGER.get_or_init(move || logger::LockedLogger::new(console, serial));
    log::set_logger(logger).expect("logger already set");
    log::set_max_level(log::LevelFilter::Trace);
}

/// Stops the processor for good.
///
/// The terminal state of the kernel, on both the idle and the panic
/// path. The `!` return type is the contract: callers can never observe
/// control coming back.
pub fn halt() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        x86_64::instructions::hlt();
    }
}
