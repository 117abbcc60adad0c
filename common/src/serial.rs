use core::fmt::{self, Write};

/// I/O port base of the first serial port.
const COM1: u16 = 0x3f8;

/// The UART behind COM1, used for logging and panic diagnostics that
/// must survive a broken display.
pub struct SerialPort {
    port: uart_16550::SerialPort,
}

impl SerialPort {
    /// # Safety
    ///
    /// unsafe because this function must only be called once
    pub unsafe fn init() -> Self {
        let mut port = unsafe { uart_16550::SerialPort::new(COM1) };
        port.init();
        Self { port }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            match byte {
                b'\n' => self.port.write_str("\r\n")?,
                byte => self.port.send(byte),
            }
        }
        Ok(())
    }
}
