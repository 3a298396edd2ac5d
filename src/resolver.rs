//! Bank and window resolution.
//!
//! A banked window covers a fixed slice of the CPU address space whose
//! backing store offset depends on bank registers. Resolution is a pure
//! function of the register file and never fails: anything that cannot be
//! placed lands on [`StoreId::OpenBus`].

use serde::{Deserialize, Serialize};

use crate::{memory::StoreId, registers::RegisterFile, AccessWidth};

pub const MS0515_PAGE_SIZE: u32 = 0o20000;
pub const MS0515_PAGES: u8 = 7;
pub const MS0515_ALT_STRIDE: u32 = 0o160000;
pub const MS0515_VRAM_BASE: u32 = 0o340000;
pub const MS0515_RAM_SIZE: usize = 0o400000;

pub const CONVENTIONAL_RAM_SIZE: u32 = 0xA0000;
pub const EXT_RAM_BASE: u32 = 0x100000;

pub const IPL_BANK_SIZE: u32 = 0x18000;
pub const WINDOW_BANK_SIZE: u32 = 0x10000;
pub const EXT_GVRAM_BANK_SIZE: u32 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankMapping {
    pub store: StoreId,
    pub offset: u32,
    pub width: AccessWidth,
    pub access: Access,
}

impl BankMapping {
    pub fn new(store: StoreId, offset: u32, width: AccessWidth, access: Access) -> Self {
        Self {
            store,
            offset,
            width,
            access,
        }
    }

    pub fn open_bus() -> Self {
        Self::new(StoreId::OpenBus, 0, AccessWidth::Byte, Access::ReadOnly)
    }
}

/// Graphics planes reachable through a GVRAM aperture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GvramPlane {
    /// B/R/G planes at 0xA8000
    Brg,
    /// E plane at 0xE0000
    E,
}

impl GvramPlane {
    fn word_base(self) -> u32 {
        match self {
            GvramPlane::Brg => 0x4000,
            GvramPlane::E => 0,
        }
    }
}

/// Which bank register a banked window consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankSelector {
    Ms0515Page(u8),
    Gvram(GvramPlane),
    Ipl,
    WindowRam,
    ExtGvram,
}

/// Byte offset into graphics VRAM. The store is organised as 16-bit words;
/// the bank register picks one of two 128K-word halves.
pub fn gvram_offset(plane: GvramPlane, bank: u8, window_offset: u32) -> u32 {
    let word = ((window_offset >> 1) + plane.word_base()) | ((bank as u32 & 1) << 16);
    (word << 1) | (window_offset & 1)
}

/// Start address of MS 0515 page `page` in RAM for a bank register value.
pub fn ms0515_page_base(bank: u16, page: u8) -> u32 {
    let page = page as u32;

    if bank & 0x80 != 0 {
        let first = match (bank >> 10) & 3 {
            0 => 0,
            1 => 2,
            _ => 4,
        };
        if page == first {
            return MS0515_VRAM_BASE;
        }
        if page == first + 1 {
            return MS0515_VRAM_BASE + MS0515_PAGE_SIZE;
        }
    }

    let alternate = if bank & (1 << page) != 0 {
        MS0515_ALT_STRIDE
    } else {
        0
    };
    page * MS0515_PAGE_SIZE + alternate
}

/// Physical address the window-bank aperture reaches for `window_offset`.
pub fn window_ram_physical(window_offset: u32, regs: &RegisterFile) -> u32 {
    (window_offset & 0x1FFFF) | (regs.window_bank as u32 * WINDOW_BANK_SIZE)
}

/// Main RAM offset holding a physical PC-98 address. RAM above 1 MB
/// continues right after conventional memory; the video and ROM hole
/// between them has no RAM behind it.
pub fn main_ram_offset(physical: u32) -> Option<u32> {
    if physical < CONVENTIONAL_RAM_SIZE {
        Some(physical)
    } else if physical >= EXT_RAM_BASE {
        Some(physical - EXT_RAM_BASE + CONVENTIONAL_RAM_SIZE)
    } else {
        None
    }
}

pub fn resolve(selector: BankSelector, window_offset: u32, regs: &RegisterFile) -> BankMapping {
    match selector {
        BankSelector::Ms0515Page(page) if page < MS0515_PAGES => {
            let offset = ms0515_page_base(regs.bank_register, page) + window_offset;
            BankMapping::new(StoreId::MainRam, offset, AccessWidth::Word, Access::ReadWrite)
        }
        BankSelector::Ms0515Page(_) => BankMapping::open_bus(),
        BankSelector::Gvram(plane) => BankMapping::new(
            StoreId::Gvram,
            gvram_offset(plane, regs.vram_bank, window_offset),
            AccessWidth::Word,
            Access::ReadWrite,
        ),
        BankSelector::Ipl => BankMapping::new(
            StoreId::SystemRom,
            window_offset + regs.ipl_bank as u32 * IPL_BANK_SIZE,
            AccessWidth::Word,
            Access::ReadOnly,
        ),
        BankSelector::WindowRam => {
            match main_ram_offset(window_ram_physical(window_offset, regs)) {
                Some(offset) => BankMapping::new(
                    StoreId::MainRam,
                    offset,
                    AccessWidth::Dword,
                    Access::ReadWrite,
                ),
                None => BankMapping::open_bus(),
            }
        }
        BankSelector::ExtGvram => BankMapping::new(
            StoreId::ExtGvram,
            window_offset | (regs.analog256.write_bank as u32 * EXT_GVRAM_BANK_SIZE),
            AccessWidth::Dword,
            Access::ReadWrite,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs_with_bank(bank: u16) -> RegisterFile {
        RegisterFile {
            bank_register: bank,
            ..RegisterFile::default()
        }
    }

    #[test]
    fn test_page_selection_bit() {
        let regs = regs_with_bank(0x0000);
        let mapping = resolve(BankSelector::Ms0515Page(0), 0, &regs);
        assert_eq!(mapping.store, StoreId::MainRam);
        assert_eq!(mapping.offset, 0);

        let regs = regs_with_bank(0x0001);
        assert_eq!(resolve(BankSelector::Ms0515Page(0), 0, &regs).offset, 0o160000);
        // other pages unaffected
        assert_eq!(
            resolve(BankSelector::Ms0515Page(3), 0x10, &regs).offset,
            3 * MS0515_PAGE_SIZE + 0x10
        );
    }

    #[test]
    fn test_every_page_bit_maps_to_alternate_bank() {
        for page in 0..MS0515_PAGES {
            let base = page as u32 * MS0515_PAGE_SIZE;
            assert_eq!(ms0515_page_base(0, page), base);
            assert_eq!(ms0515_page_base(1 << page, page), base + MS0515_ALT_STRIDE);
        }
        assert!(ms0515_page_base(0x7F, 6) as usize + MS0515_PAGE_SIZE as usize <= MS0515_RAM_SIZE);
    }

    #[test]
    fn test_page_bits_are_independent_for_all_bank_values() {
        for bank in (0..=u16::MAX).filter(|b| b & 0x80 == 0) {
            for bit in 0..MS0515_PAGES {
                let flipped = bank ^ (1 << bit);
                for page in 0..MS0515_PAGES {
                    let before = ms0515_page_base(bank, page);
                    let after = ms0515_page_base(flipped, page);
                    if page == bit {
                        assert_eq!(before.abs_diff(after), MS0515_ALT_STRIDE, "{:04X}", bank);
                    } else {
                        assert_eq!(before, after, "{:04X} bit {} page {}", bank, bit, page);
                    }
                }
            }
        }
    }

    #[test]
    fn test_page_bits_under_overlay_touch_only_their_page() {
        for bank in (0..=u16::MAX).filter(|b| b & 0x80 != 0) {
            for bit in 0..MS0515_PAGES {
                let flipped = bank ^ (1 << bit);
                for page in 0..MS0515_PAGES {
                    let before = ms0515_page_base(bank, page);
                    let after = ms0515_page_base(flipped, page);
                    let overlaid = before >= MS0515_VRAM_BASE;
                    if page == bit && !overlaid {
                        assert_eq!(before.abs_diff(after), MS0515_ALT_STRIDE);
                    } else {
                        assert_eq!(before, after, "{:04X} bit {} page {}", bank, bit, page);
                    }
                }
            }
        }
    }

    #[test]
    fn test_vram_overlay_sub_fields() {
        for (sub, first) in [(0u16, 0u8), (1, 2), (2, 4), (3, 4)] {
            let bank = 0x80 | (sub << 10) | 0x7F;
            assert_eq!(ms0515_page_base(bank, first), MS0515_VRAM_BASE);
            assert_eq!(
                ms0515_page_base(bank, first + 1),
                MS0515_VRAM_BASE + MS0515_PAGE_SIZE
            );
        }

        for page in 0..MS0515_PAGES {
            assert_eq!(
                ms0515_page_base(0x80 | (2 << 10), page),
                ms0515_page_base(0x80 | (3 << 10), page)
            );
        }
    }

    #[test]
    fn test_overlay_leaves_other_pages_alone() {
        let bank = 0x80 | (1 << 10) | 0x01;
        assert_eq!(ms0515_page_base(bank, 0), MS0515_ALT_STRIDE);
        assert_eq!(ms0515_page_base(bank, 4), 4 * MS0515_PAGE_SIZE);
    }

    #[test]
    fn test_out_of_range_page_is_open_bus() {
        let mapping = resolve(BankSelector::Ms0515Page(7), 0, &RegisterFile::default());
        assert_eq!(mapping.store, StoreId::OpenBus);
    }

    #[test]
    fn test_gvram_bank_and_plane() {
        assert_eq!(gvram_offset(GvramPlane::Brg, 0, 0), 0x8000);
        assert_eq!(gvram_offset(GvramPlane::Brg, 0, 3), 0x8003);
        assert_eq!(gvram_offset(GvramPlane::Brg, 1, 0), 0x28000);
        assert_eq!(gvram_offset(GvramPlane::E, 0, 0x7FFF), 0x7FFF);
        assert_eq!(gvram_offset(GvramPlane::E, 1, 0x10), 0x20010);
    }

    #[test]
    fn test_ipl_and_window_banks() {
        let mut regs = RegisterFile::default();
        regs.ipl_bank = 1;
        regs.window_bank = 0x08;
        assert_eq!(resolve(BankSelector::Ipl, 0x10, &regs).offset, 0x18010);
        assert_eq!(resolve(BankSelector::Ipl, 0x10, &regs).access, Access::ReadOnly);
        assert_eq!(resolve(BankSelector::WindowRam, 0x1234, &regs).offset, 0x81234);

        // 0xA0000..0xFFFFF is not RAM
        regs.window_bank = 0x0A;
        assert_eq!(
            resolve(BankSelector::WindowRam, 0x1234, &regs).store,
            StoreId::OpenBus
        );
        assert_eq!(window_ram_physical(0x1234, &regs), 0xA1234);

        regs.window_bank = 0x10;
        assert_eq!(resolve(BankSelector::WindowRam, 0x1234, &regs).offset, 0xA1234);
        regs.window_bank = 0x3E;
        assert_eq!(
            resolve(BankSelector::WindowRam, 0x1FFFF, &regs).offset,
            0x3FFFFF - EXT_RAM_BASE + CONVENTIONAL_RAM_SIZE
        );
    }

    #[test]
    fn test_main_ram_offset_skips_hole() {
        assert_eq!(main_ram_offset(0x9FFFF), Some(0x9FFFF));
        assert_eq!(main_ram_offset(0xA0000), None);
        assert_eq!(main_ram_offset(0xFFFFF), None);
        assert_eq!(main_ram_offset(0x100000), Some(0xA0000));
    }
}
