use core::mem;

use thiserror::Error;

/// The value a conforming loader leaves in `eax` before jumping to the
/// kernel. Anything else means the handoff did not follow the protocol
/// and the information block must not be trusted.
pub const MULTIBOOT_BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

/// This structure represents the information block that the boot loader
/// writes into memory before transferring control to the kernel.
///
/// The layout is the legacy fixed 32-bit-field variant keyed by
/// [`MULTIBOOT_BOOTLOADER_MAGIC`]; loader and kernel must agree on it
/// exactly, so the field order below is load-bearing. The block is
/// read-only input: the kernel receives its address in `ebx`, reads the
/// fields it needs, and never writes back. A field is only meaningful
/// when the corresponding bit in [`flags`](Self::flags) is set, which is
/// what the typed accessors check.
///
/// Use [`BootInfo::load`] to turn the raw register pair into a reference;
/// it performs the one-shot handshake validation.
#[derive(Debug)]
#[repr(C)]
pub struct BootInfo {
    /// Bit field declaring which of the remaining fields are valid.
    pub flags: u32,
    /// Conventional memory below 1 MiB, in KiB. Valid with bit 0.
    pub mem_lower: u32,
    /// Memory above 1 MiB, in KiB. Valid with bit 0.
    pub mem_upper: u32,
    /// BIOS disk device the image was loaded from. Valid with bit 1.
    pub boot_device: u32,
    /// Physical address of the kernel command line. Valid with bit 2.
    pub cmdline: u32,
    /// Number of loaded boot modules. Valid with bit 3.
    pub mods_count: u32,
    /// Physical address of the module list. Valid with bit 3.
    pub mods_addr: u32,
    /// Image symbol table words. Never consumed by this kernel.
    pub syms: [u32; 3],
    /// Total size of the memory map buffer in bytes. Valid with bit 6.
    pub mmap_length: u32,
    /// Physical address of the memory map buffer. Valid with bit 6.
    pub mmap_addr: u32,
    pub drives_length: u32,
    pub drives_addr: u32,
    pub config_table: u32,
    /// Physical address of the loader's name string. Valid with bit 9.
    pub boot_loader_name: u32,
    pub apm_table: u32,
    pub vbe_control_info: u32,
    pub vbe_mode_info: u32,
    pub vbe_mode: u16,
    pub vbe_interface_seg: u16,
    pub vbe_interface_off: u32,
    pub vbe_interface_len: u32,
    /// Physical address of the display buffer. Valid with bit 12.
    pub framebuffer_addr: u32,
    /// Bytes per display line. Valid with bit 12.
    pub framebuffer_pitch: u32,
    /// Display width (pixels, or character cells in text mode).
    pub framebuffer_width: u32,
    /// Display height (pixels, or character cells in text mode).
    pub framebuffer_height: u32,
    /// Bits per pixel, or 16 in text mode.
    pub framebuffer_bpp: u8,
    /// Raw color model discriminant, see [`FramebufferKind`].
    pub framebuffer_type: u8,
    /// Color model descriptor bytes; interpretation depends on the type.
    pub color_info: [u8; 5],
}

impl BootInfo {
    pub const FLAG_MEMORY: u32 = 1 << 0;
    pub const FLAG_BOOT_DEVICE: u32 = 1 << 1;
    pub const FLAG_CMDLINE: u32 = 1 << 2;
    pub const FLAG_MODULES: u32 = 1 << 3;
    pub const FLAG_MEMORY_MAP: u32 = 1 << 6;
    pub const FLAG_FRAMEBUFFER: u32 = 1 << 12;

    /// Creates a zeroed information block.
    ///
    /// With no flag bits set every accessor returns `None`. Useful as a
    /// starting point for loader shims and tests.
    pub const fn empty() -> Self {
        Self {
            flags: 0,
            mem_lower: 0,
            mem_upper: 0,
            boot_device: 0,
            cmdline: 0,
            mods_count: 0,
            mods_addr: 0,
            syms: [0; 3],
            mmap_length: 0,
            mmap_addr: 0,
            drives_length: 0,
            drives_addr: 0,
            config_table: 0,
            boot_loader_name: 0,
            apm_table: 0,
            vbe_control_info: 0,
            vbe_mode_info: 0,
            vbe_mode: 0,
            vbe_interface_seg: 0,
            vbe_interface_off: 0,
            vbe_interface_len: 0,
            framebuffer_addr: 0,
            framebuffer_pitch: 0,
            framebuffer_width: 0,
            framebuffer_height: 0,
            framebuffer_bpp: 0,
            framebuffer_type: 0,
            color_info: [0; 5],
        }
    }

    /// Performs the boot handshake: checks the magic value and the
    /// information pointer, then reinterprets the pointed-to memory as a
    /// [`BootInfo`].
    ///
    /// The magic is compared first, so a corrupted handoff is rejected
    /// without touching the pointer at all. There is exactly one
    /// validation attempt per boot; a failed handshake leaves the caller
    /// with nothing but its panic path.
    ///
    /// ## Safety
    ///
    /// When the checks pass, `info` must point to an information block
    /// that a protocol-conforming loader wrote and that stays mapped and
    /// unmodified for the lifetime of the kernel.
    pub unsafe fn load(
        magic: u32,
        info: *const BootInfo,
    ) -> Result<&'static BootInfo, HandoffError> {
        if magic != MULTIBOOT_BOOTLOADER_MAGIC {
            return Err(HandoffError::BadMagic { found: magic });
        }
        if info.is_null() {
            return Err(HandoffError::NullInfo);
        }
        let addr = info as usize;
        let align = mem::align_of::<BootInfo>();
        if addr % align != 0 {
            return Err(HandoffError::MisalignedInfo { addr, align });
        }
        Ok(unsafe { &*info })
    }

    fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// The loader's coarse memory probe, if it performed one.
    pub fn memory_bounds(&self) -> Option<MemoryBounds> {
        self.has(Self::FLAG_MEMORY).then(|| MemoryBounds {
            lower_kib: self.mem_lower,
            upper_kib: self.mem_upper,
        })
    }

    /// The BIOS device the image was loaded from.
    pub fn boot_device(&self) -> Option<u32> {
        self.has(Self::FLAG_BOOT_DEVICE).then_some(self.boot_device)
    }

    /// Location of the boot module list.
    pub fn modules(&self) -> Option<ModulesView> {
        self.has(Self::FLAG_MODULES).then(|| ModulesView {
            addr: self.mods_addr,
            count: self.mods_count,
        })
    }

    /// Location of the loader-provided memory map.
    pub fn memory_map(&self) -> Option<MemoryMapView> {
        self.has(Self::FLAG_MEMORY_MAP).then(|| MemoryMapView {
            addr: self.mmap_addr,
            length: self.mmap_length,
        })
    }

    /// Geometry and color model of the display the loader set up.
    pub fn framebuffer(&self) -> Option<FramebufferInfo> {
        self.has(Self::FLAG_FRAMEBUFFER).then(|| FramebufferInfo {
            addr: self.framebuffer_addr,
            pitch: self.framebuffer_pitch,
            width: self.framebuffer_width,
            height: self.framebuffer_height,
            bpp: self.framebuffer_bpp,
            kind: FramebufferKind::from_raw(self.framebuffer_type),
            color_info: self.color_info,
        })
    }
}

/// The ways a handoff can fail validation. All of them are fatal; the
/// kernel's only recovery granularity is halting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("boot loader magic {found:#010x} does not match 0x2badb002")]
    BadMagic { found: u32 },
    #[error("boot information pointer is null")]
    NullInfo,
    #[error("boot information pointer {addr:#x} is not aligned to {align} bytes")]
    MisalignedInfo { addr: usize, align: usize },
}

/// The loader's coarse conventional/extended memory split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBounds {
    /// KiB of memory below 1 MiB.
    pub lower_kib: u32,
    /// KiB of memory above 1 MiB.
    pub upper_kib: u32,
}

/// Shallow view of the boot module list. The list itself lives in
/// loader-owned memory and is not walked by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModulesView {
    pub addr: u32,
    pub count: u32,
}

/// Shallow view of the loader's memory map buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMapView {
    pub addr: u32,
    pub length: u32,
}

impl MemoryMapView {
    /// Walks the entry list this view points at.
    ///
    /// ## Safety
    ///
    /// `addr..addr + length` must be the mapped, unmodified memory map
    /// buffer the loader reported.
    pub unsafe fn iter(&self) -> MemoryMapIter {
        unsafe { MemoryMapIter::new(self.addr as usize as *const u8, self.length as usize) }
    }
}

/// Describes the layout and color model of the display the loader left
/// behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferInfo {
    /// Physical start address of the buffer.
    pub addr: u32,
    /// Bytes per line.
    pub pitch: u32,
    pub width: u32,
    pub height: u32,
    pub bpp: u8,
    pub kind: FramebufferKind,
    /// Raw color descriptor bytes, meaningful for `Indexed` and `Rgb`.
    pub color_info: [u8; 5],
}

/// Color model of the display buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferKind {
    /// Paletted pixels; the palette location is in the color descriptor.
    Indexed,
    /// Direct-color pixels with the channel layout in the descriptor.
    Rgb,
    /// EGA-compatible character cells, the mode this kernel drives.
    EgaText,
    /// A discriminant this kernel does not know about.
    Unknown(u8),
}

impl FramebufferKind {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Indexed,
            1 => Self::Rgb,
            2 => Self::EgaText,
            other => Self::Unknown(other),
        }
    }
}

/// One parsed memory map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMapEntry {
    /// Physical start address of the region.
    pub start: u64,
    /// Length of the region in bytes.
    pub len: u64,
    /// What the firmware says the region is good for.
    pub kind: MemoryKind,
}

impl MemoryMapEntry {
    /// The physical end address (exclusive) of the region.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }
}

/// Represents the different types of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Unused conventional memory, can be used by the kernel.
    Usable,
    /// Reserved by the firmware, hands off.
    Reserved,
    /// ACPI tables; reclaimable once they have been parsed.
    AcpiReclaimable,
    /// Non-volatile sleep memory.
    Nvs,
    /// Memory the firmware flagged as defective.
    BadRam,
    /// An unknown region type reported by the firmware.
    Unknown(u32),
}

impl MemoryKind {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Usable,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::Nvs,
            5 => Self::BadRam,
            other => Self::Unknown(other),
        }
    }
}

/// On-disk shape of a memory map entry. `size` counts the bytes that
/// follow it, so the next entry starts `size + 4` bytes further on.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct RawMapEntry {
    size: u32,
    addr: u64,
    len: u64,
    kind: u32,
}

/// Iterator over the loader's memory map buffer.
///
/// Stops early on a malformed entry (zero or undersized `size` word)
/// instead of walking off the end of the buffer.
pub struct MemoryMapIter {
    cursor: *const u8,
    remaining: usize,
}

impl MemoryMapIter {
    /// ## Safety
    ///
    /// `base..base + length` must be mapped, readable memory holding a
    /// loader-written entry list.
    pub unsafe fn new(base: *const u8, length: usize) -> Self {
        Self {
            cursor: base,
            remaining: length,
        }
    }
}

impl Iterator for MemoryMapIter {
    type Item = MemoryMapEntry;

    fn next(&mut self) -> Option<MemoryMapEntry> {
        if self.remaining < mem::size_of::<RawMapEntry>() {
            return None;
        }
        let raw = unsafe { self.cursor.cast::<RawMapEntry>().read_unaligned() };
        if (raw.size as usize) < mem::size_of::<RawMapEntry>() - 4 {
            self.remaining = 0;
            return None;
        }
        let stride = raw.size as usize + 4;
        if stride >= self.remaining {
            self.remaining = 0;
        } else {
            self.remaining -= stride;
            self.cursor = unsafe { self.cursor.add(stride) };
        }
        Some(MemoryMapEntry {
            start: raw.addr,
            len: raw.len,
            kind: MemoryKind::from_raw(raw.kind),
        })
    }
}
