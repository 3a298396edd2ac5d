//! Generation-dependent handler variants for the display ports.
//!
//! Newer machines put their extra modes in front of the older handler and
//! fall through to it when their mode is off.

use crate::{
    bus::Bus,
    memory::StoreId,
    peripheral::PeripheralId,
    registers::{RegisterId, WordRegisterId, EX_ANALOG_16, EX_ANALOG_256, EX_EGC_UNLOCK},
    resolver::{self, BankSelector, GvramPlane},
    window::Revision,
};

const WRITE_BANK_OFFSET: u32 = 4;

/// Ports 0xA8..0xAE: the palette when the offset is even with bit 3 set.
fn palette_port(offset: u32) -> bool {
    offset & 1 == 0 && offset & 8 != 0
}

impl Bus {
    pub(crate) fn video_ff_write(&mut self, revision: Revision, address: u32, offset: u32, data: u8) {
        match (revision, offset) {
            (Revision::Rs, 1) => {
                if data & 0xF0 == 0 {
                    self.regs.write_register(RegisterId::ExtVideoFlag, data);
                } else {
                    self.undocumented(address, format!("extended video flag {:02X} on a pre-9821 machine", data));
                }
            }
            (Revision::Pc9821, 1) => {
                if data & 0xFE == 4 && !self.regs.ext_flag(EX_EGC_UNLOCK) {
                    tracing::debug!("[IO] EGC compatibility switch {:02X} locked", data);
                    return;
                }
                self.regs.write_register(RegisterId::ExtVideoFlag, data);
            }
            (_, 0) => self.regs.write_register(RegisterId::VideoFlipFlop, data),
            _ => self.undocumented(address, format!("video flip-flop offset {}", offset)),
        }
    }

    pub(crate) fn palette_read(&mut self, revision: Revision, address: u32, offset: u32) -> u8 {
        if revision == Revision::Pc9821 && palette_port(offset) {
            let analog256 = self.regs.ext_flag(EX_ANALOG_256);
            let analog16 = self.regs.ext_flag(EX_ANALOG_16);

            if analog256 {
                if analog16 {
                    self.inconsistent(address, "256-colour palette", "16-colour palette");
                }
                self.undocumented(address, "256-colour palette read".to_string());
                return 0;
            }
            if analog16 {
                let palette = &self.regs.analog16;
                let entry = palette.entry as usize & 0xF;
                return match offset {
                    0x08 => palette.entry & 0xF,
                    0x0A => palette.g[entry] & 0xF,
                    0x0C => palette.r[entry] & 0xF,
                    _ => palette.b[entry] & 0xF,
                };
            }
        }

        self.base_palette_read(address, offset)
    }

    fn base_palette_read(&mut self, address: u32, offset: u32) -> u8 {
        match offset {
            0x00 | 0x02 => self.read_peripheral(PeripheralId::GdcBitmap, address, offset >> 1),
            0x04 => self.regs.read_register(RegisterId::VramDisplay),
            0x06 => self.regs.read_register(RegisterId::VramBank),
            0x08 | 0x0A | 0x0C | 0x0E => self
                .regs
                .read_register(RegisterId::DigitalPalette(((offset & 6) >> 1) as u8)),
            0x09 => self.cg_window_read(),
            0x01 => self.regs.read_register(RegisterId::FontAddressLow),
            0x03 => self.regs.read_register(RegisterId::FontAddressHigh),
            0x05 => self.regs.read_register(RegisterId::FontLine),
            _ => 0xFF,
        }
    }

    pub(crate) fn palette_write(&mut self, revision: Revision, address: u32, offset: u32, data: u8) {
        if palette_port(offset) {
            let analog256 = revision == Revision::Pc9821 && self.regs.ext_flag(EX_ANALOG_256);
            let analog16 = revision != Revision::Base && self.regs.ext_flag(EX_ANALOG_16);

            if analog256 {
                if analog16 {
                    self.inconsistent(address, "256-colour palette", "16-colour palette");
                }
                let palette = &mut self.regs.analog256;
                let entry = palette.entry as usize;
                match offset {
                    0x08 => palette.entry = data,
                    0x0A => palette.g[entry] = data,
                    0x0C => palette.r[entry] = data,
                    _ => palette.b[entry] = data,
                }
                tracing::trace!("[IO] 256-colour palette [{}] <- {:02X}", offset, data);
                return;
            }

            if analog16 {
                let palette = &mut self.regs.analog16;
                let entry = palette.entry as usize & 0xF;
                match offset {
                    0x08 => palette.entry = data & 0xF,
                    0x0A => palette.g[entry] = data & 0xF,
                    0x0C => palette.r[entry] = data & 0xF,
                    _ => palette.b[entry] = data & 0xF,
                }
                tracing::trace!("[IO] 16-colour palette [{}] <- {:02X}", offset, data);
                return;
            }
        }

        self.base_palette_write(address, offset, data)
    }

    fn base_palette_write(&mut self, address: u32, offset: u32, data: u8) {
        match offset {
            0x00 | 0x02 => self.write_peripheral(PeripheralId::GdcBitmap, address, offset >> 1, data),
            0x04 => self.regs.write_register(RegisterId::VramDisplay, data),
            0x06 => self.regs.write_register(RegisterId::VramBank, data),
            0x08 | 0x0A | 0x0C | 0x0E => self
                .regs
                .write_register(RegisterId::DigitalPalette(((offset & 6) >> 1) as u8), data),
            0x01 => self.regs.write_register(RegisterId::FontAddressLow, data),
            0x03 => self.regs.write_register(RegisterId::FontAddressHigh, data),
            0x05 => self.regs.write_register(RegisterId::FontLine, data),
            0x09 => match self.pcg_offset(self.regs.font_line as u32) {
                Some(pcg) => self.memory.write(StoreId::KanjiRam, pcg, data),
                None => self.undocumented(address, format!("CG write {:02X} outside PCG range", data)),
            },
            _ => self.undocumented(address, format!("display port offset {} <- {:02X}", offset, data)),
        }
    }

    /// Glyph row at the current font address and line.
    fn cg_window_read(&mut self) -> u8 {
        let line = self.regs.font_line as u32;
        if let Some(pcg) = self.pcg_offset(line) {
            return self.memory.read(StoreId::KanjiRam, pcg);
        }

        let font = self.regs.font_address as u32;
        if font & 0xFF == 0 {
            return self.memory.read(StoreId::CharRom, self.char_rom_offset(line >> 1));
        }

        let offset = ((font & 0x7F7F) << 5) | line | self.regs.font_lr as u32;
        self.memory.read(StoreId::KanjiRam, offset)
    }

    pub(crate) fn gvram256_read(&mut self, plane: GvramPlane, offset: u32) -> u8 {
        if self.regs.ext_flag(EX_ANALOG_256) {
            match plane {
                GvramPlane::Brg => {
                    let mapping = resolver::resolve(BankSelector::ExtGvram, offset, &self.regs);
                    return self.read_mapping(mapping);
                }
                GvramPlane::E if offset & !1 == WRITE_BANK_OFFSET => {
                    let bank = self.regs.read_word(WordRegisterId::Analog256WriteBank);
                    return (bank >> ((offset & 1) * 8)) as u8;
                }
                GvramPlane::E => {}
            }
        }

        let mapping = resolver::resolve(BankSelector::Gvram(plane), offset, &self.regs);
        self.read_mapping(mapping)
    }

    pub(crate) fn gvram256_write(&mut self, plane: GvramPlane, offset: u32, data: u8) {
        if self.regs.ext_flag(EX_ANALOG_256) {
            match plane {
                GvramPlane::Brg => {
                    let mapping = resolver::resolve(BankSelector::ExtGvram, offset, &self.regs);
                    self.write_mapping(mapping, data);
                    return;
                }
                GvramPlane::E if offset & !1 == WRITE_BANK_OFFSET => {
                    let shift = (offset & 1) * 8;
                    self.regs.write_word(
                        WordRegisterId::Analog256WriteBank,
                        (data as u16) << shift,
                        0xFF << shift,
                    );
                    tracing::debug!("[BANK] 256-colour write bank {:04X}", self.regs.analog256.write_bank);
                    // the plane write still happens
                }
                GvramPlane::E => {}
            }
        }

        let mapping = resolver::resolve(BankSelector::Gvram(plane), offset, &self.regs);
        self.write_mapping(mapping, data);
    }
}
