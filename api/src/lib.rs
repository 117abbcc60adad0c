#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(not(test), no_std)]

pub use info::{BootInfo, HandoffError, MULTIBOOT_BOOTLOADER_MAGIC};

pub mod info;

/// Defines the kernel entry point.
///
/// The function must have the signature `fn(u32, *const BootInfo) -> !`.
/// The first argument is the magic value the loader left in `eax`, the
/// second the address of the boot information block from `ebx`; both are
/// forwarded untouched by the assembly shim. Nothing has been validated
/// at this point; the function is expected to start with
/// [`BootInfo::load`].
///
/// This macro just creates a function named `kernel_main`, which the boot
/// shim calls after the mode switch. The advantage of using this macro
/// instead of providing an own `kernel_main` function is that the macro
/// ensures that the function and argument types are correct.
#[macro_export]
macro_rules! entry_point {
    ($path:path) => {
        #[export_name = "kernel_main"]
        pub extern "C" fn __impl_kernel_main(
            magic: u32,
            info: *const $crate::info::BootInfo,
        ) -> ! {
            // validate the signature of the program entry point
            let f: fn(u32, *const $crate::info::BootInfo) -> ! = $path;

            f(magic, info)
        }
    };
}
