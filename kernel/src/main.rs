#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![deny(unsafe_op_in_unsafe_fn)]

mod startup;

use cinder_api::info::BootInfo;
use cinder_x86_64_common::{
    halt, init_logger,
    vga::{Console, TextBuffer},
};
use startup::Config;

#[cfg(target_os = "none")]
core::arch::global_asm!(include_str!("boot.s"));

cinder_api::entry_point!(kmain);

fn kmain(magic: u32, info: *const BootInfo) -> ! {
    let info = match unsafe { BootInfo::load(magic, info) } {
        Ok(info) => info,
        Err(err) => panic!("boot handshake failed: {err}"),
    };
    let base = match startup::locate_display(info) {
        Ok(base) => base,
        Err(err) => panic!("display probe failed: {err}"),
    };

    let mut console = Console::new(unsafe { TextBuffer::from_raw(base) });
    startup::greet(&mut console, &Config::new_default());

    init_logger(Some(console), true);
    startup::report(info);

    // nothing else exists yet; idle until the machine is powered off
    halt()
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use cinder_x86_64_common::{logger::LOGGER, serial::SerialPort};
    use core::fmt::Write;

    match LOGGER.get() {
        Some(logger) => {
            unsafe { logger.force_unlock() };
            log::error!("{info}");
        }
        None => {
            // handshake failures panic before the logger exists; fall
            // back to a freshly initialized port
            let mut serial = unsafe { SerialPort::init() };
            let _ = writeln!(serial, "PANIC: {info}");
        }
    }
    halt()
}

#[cfg(not(target_os = "none"))]
fn main() {
    // the kernel image only does something under a Multiboot loader
}
