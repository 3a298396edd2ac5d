//! PC-98 register block handlers.

use crate::{
    bus::Bus,
    effect::{Effect, FdcUnit, IrqLine},
    error::AccessDiagnostic,
    generation::Generation,
    memory::StoreId,
    peripheral::PeripheralId,
    registers::{
        RegisterId, WordRegisterId, EX_ANALOG_256, EX_EGC_EXTENDED, EX_GDC_5MHZ, FF_DISPLAY,
        FF_FONTSEL, FF_MEMSW, SDIP_WINDOWS,
    },
    window::Block,
};

const MEMSW_PROTECTED: u32 = 0x3FE2;
const TVRAM_ATTRIBUTES: u32 = 0x2000;
const BIOS_IDE_FLAGS: u32 = 0x457;
const AMD98_ID: u8 = 0x18;
const POR_BIT: u8 = 0x20;

impl Bus {
    pub(crate) fn read_block(&mut self, block: Block, address: u32, offset: u32) -> u8 {
        match block {
            Block::Pic => {
                let id = pic(offset);
                self.read_peripheral(id, address, offset & 3)
            }
            Block::TextScroll => self.regs.read_register(RegisterId::TextScroll(offset as u8)),
            Block::Grcg => match offset {
                6 => self.regs.read_register(RegisterId::GrcgMode),
                7 => self.regs.read_register(RegisterId::GrcgTile),
                _ => self.regs.read_register(RegisterId::TextScroll(offset as u8)),
            },
            Block::SasiData => self.sasi_data_read(address),
            Block::SasiControl => self.sasi_status_read(address),
            Block::Fdc2hdControl => self.regs.read_register(RegisterId::Fdc2hdControl),
            Block::Fdc2ddControl => self.regs.read_register(RegisterId::Fdc2ddControl),
            Block::FdcModeControl => self.regs.read_register(RegisterId::FdcModeControl),
            Block::F0Port => self.f0_read(offset),
            Block::A20Control => {
                let closed = !self.regs.gate_a20 as u8;
                match offset {
                    1 => closed | 0xFE,
                    3 => closed | (self.regs.nmi_ff << 1),
                    _ => self.f0_read(offset),
                }
            }
            Block::AccessControl => match offset {
                1 => self.regs.read_register(RegisterId::AccessControl),
                _ => 0xFF,
            },
            Block::IdeControl => {
                // keeps the IDE BIOS from translating 512-byte sectors
                let flags = self.memory.read(StoreId::MainRam, BIOS_IDE_FLAGS);
                self.memory.write(StoreId::MainRam, BIOS_IDE_FLAGS, flags | 0xC0);
                self.regs.read_register(RegisterId::IdeSelect)
            }
            Block::MousePort => self.mouse_port_read(offset),
            Block::WindowBank => match offset {
                1 => self.regs.read_register(RegisterId::WindowBank),
                _ => 0xFF,
            },
            Block::Sdip(n) => {
                let index = self.sdip_index(n);
                if offset == 2 {
                    return self.regs.read_register(RegisterId::Sdip(index));
                }
                self.undocumented(address, format!("SDIP read offset {}", offset));
                0xFF
            }
            Block::Ext2VideoFlipFlop => self.ext2_video_ff_read(address),
            Block::TextVram => self.tvram_read(offset),
            Block::KanjiWindow => self.kanji_window_read(offset),
            Block::VideoFlipFlop(_) => self.regs.read_register(RegisterId::VideoFlipFlop),
            Block::Palette(revision) => self.palette_read(revision, address, offset),
            Block::Gvram256(plane) => self.gvram256_read(plane, offset),

            // write-only ports
            Block::Rtc
            | Block::DmaPage4
            | Block::DmaPage8
            | Block::NmiControl
            | Block::VrtcClear
            | Block::RomRamBank
            | Block::MouseFrequency => {
                tracing::trace!("[IO] read of write-only port {:#06X}", address);
                0xFF
            }

            Block::Egc
            | Block::Timestamp
            | Block::IdeCs(_)
            | Block::Ms0515Bank
            | Block::Ms0515Halt => {
                let shift = (address & 1) * 8;
                let word = self.read_word_block(block, address & !1, offset, 0xFF << shift);
                (word >> shift) as u8
            }
        }
    }

    pub(crate) fn write_block(&mut self, block: Block, address: u32, offset: u32, data: u8) {
        match block {
            Block::Pic => {
                let id = pic(offset);
                self.write_peripheral(id, address, offset & 3, data)
            }
            Block::Rtc => {
                self.write_peripheral(PeripheralId::Rtc, address, 0, data & 0x3F);
                if data & 0xC0 != 0 {
                    self.undocumented(address, format!("RTC undefined bits {:02X}", data & 0xC0));
                }
            }
            Block::DmaPage4 => {
                if offset < 4 {
                    let channel = ((offset + 1) & 3) as u8;
                    self.regs.write_register(RegisterId::DmaPage(channel), data & 0x0F);
                }
            }
            Block::DmaPage8 => {
                if offset == 4 {
                    self.regs.dma_autoinc[data as usize & 3] = (data >> 2) & 3;
                } else if offset < 4 {
                    let channel = ((offset + 1) & 3) as u8;
                    self.regs.write_register(RegisterId::DmaPage(channel), data);
                }
            }
            Block::NmiControl => self.regs.write_register(RegisterId::NmiFlipFlop, offset as u8),
            Block::VrtcClear => self.emit(Effect::irq(IrqLine::VRTC, false)),
            Block::TextScroll => self
                .regs
                .write_register(RegisterId::TextScroll(offset as u8), data),
            Block::Grcg => match offset {
                6 => self.regs.write_register(RegisterId::GrcgMode, data),
                7 => self.regs.write_register(RegisterId::GrcgTile, data),
                _ => self
                    .regs
                    .write_register(RegisterId::TextScroll(offset as u8), data),
            },
            Block::SasiData => self.sasi_data_write(address, data),
            Block::SasiControl => self.sasi_control_write(address, data),
            Block::Fdc2hdControl => self.fdc_2hd_control_write(data),
            Block::Fdc2ddControl => self.fdc_2dd_control_write(data),
            Block::FdcModeControl => {
                self.regs.write_register(RegisterId::FdcModeControl, data);
                let hd = data & 0x02 != 0;
                self.emit(Effect::FdcDataRate {
                    unit: FdcUnit::Hd,
                    rate: if hd { 500_000 } else { 250_000 },
                    rpm: if hd { 360 } else { 300 },
                });
            }
            Block::F0Port => {
                tracing::trace!("[IO] write {:02X} to F0 port {:#06X} ignored", data, address);
            }
            Block::A20Control => self.a20_control_write(offset, data),
            Block::AccessControl => {
                if offset == 1 {
                    self.regs.write_register(RegisterId::AccessControl, data);
                }
            }
            Block::RomRamBank => self.rom_ram_bank_write(address, offset, data),
            Block::IdeControl => {
                if data & 0x80 == 0 {
                    self.regs.write_register(RegisterId::IdeSelect, data);
                }
            }
            Block::MouseFrequency => {
                if offset == 3 {
                    self.regs.write_register(RegisterId::MouseFrequency, data);
                }
            }
            Block::MousePort => self.mouse_port_write(offset, data),
            Block::WindowBank => {
                if offset == 1 {
                    self.regs.write_register(RegisterId::WindowBank, data);
                    tracing::debug!("[BANK] window bank {:02X}", self.regs.window_bank);
                } else {
                    self.undocumented(address, format!("window bank offset {} <- {:02X}", offset, data));
                }
            }
            Block::Sdip(n) => self.sdip_write(n, address, offset, data),
            Block::Ext2VideoFlipFlop => self.regs.write_register(RegisterId::Ext2Index, data),
            Block::TextVram => self.tvram_write(offset, data),
            Block::KanjiWindow => self.kanji_window_write(offset, data),
            Block::VideoFlipFlop(revision) => self.video_ff_write(revision, address, offset, data),
            Block::Palette(revision) => self.palette_write(revision, address, offset, data),
            Block::Gvram256(plane) => self.gvram256_write(plane, offset, data),

            Block::Egc
            | Block::Timestamp
            | Block::IdeCs(_)
            | Block::Ms0515Bank
            | Block::Ms0515Halt => {
                let shift = (address & 1) * 8;
                let word = (data as u16) << shift;
                self.write_word_block(block, address & !1, offset, word, 0xFF << shift);
            }
        }
    }

    pub(crate) fn read_word_block(&mut self, block: Block, address: u32, offset: u32, mask: u16) -> u16 {
        match block {
            Block::Timestamp => {
                if let Some(counter) = self.peripherals.cycles() {
                    return (counter.total_cycles() >> (16 * offset)) as u16;
                }
                self.missing(address, "cycle counter");
                0xFFFF
            }
            Block::IdeCs(cs) => {
                let channel = self.regs.ide_select as usize;
                if let Some(ide) = self.peripherals.ide(channel) {
                    return match cs {
                        0 => ide.read_cs0(offset, mask),
                        _ => ide.read_cs1(offset, mask),
                    };
                }
                self.missing(address, format!("IDE channel {}", channel));
                0xFFFF
            }
            Block::Egc => self.regs.read_word(WordRegisterId::Egc(offset as u8)),
            Block::Ms0515Bank => self.regs.read_word(WordRegisterId::Ms0515Bank),
            Block::Ms0515Halt => self.regs.read_word(WordRegisterId::Ms0515Halt),
            _ => {
                let mut word = 0;
                for lane in 0..2u32 {
                    if mask & (0xFF << (lane * 8)) != 0 {
                        let byte = self.read_block(block, address + lane, offset);
                        word |= (byte as u16) << (lane * 8);
                    }
                }
                word
            }
        }
    }

    pub(crate) fn write_word_block(
        &mut self,
        block: Block,
        address: u32,
        offset: u32,
        value: u16,
        mask: u16,
    ) {
        match block {
            Block::Timestamp => {
                tracing::trace!("[IO] timestamp write {:04X} ignored", value);
            }
            Block::IdeCs(cs) => {
                let channel = self.regs.ide_select as usize;
                if let Some(ide) = self.peripherals.ide(channel) {
                    match cs {
                        0 => ide.write_cs0(offset, value, mask),
                        _ => ide.write_cs1(offset, value, mask),
                    }
                    return;
                }
                self.missing(address, format!("IDE channel {}", channel));
            }
            Block::Egc => self.egc_write(offset, value, mask),
            Block::Ms0515Bank => self.ms0515_bank_write(value, mask),
            Block::Ms0515Halt => self.ms0515_halt_write(value, mask),
            _ => {
                for lane in 0..2u32 {
                    if mask & (0xFF << (lane * 8)) != 0 {
                        self.write_block(block, address + lane, offset, (value >> (lane * 8)) as u8);
                    }
                }
            }
        }
    }

    fn f0_read(&mut self, offset: u32) -> u8 {
        if offset != 0 {
            return 0xFF;
        }
        if self.peripherals.amd98 {
            tracing::debug!("[IO] AMD-98 board present");
            AMD98_ID
        } else {
            0
        }
    }

    fn a20_control_write(&mut self, offset: u32, data: u8) {
        match offset {
            0 => {
                // clear the power-on-reset flag so the BIOS sees a CPU reset
                let port_c = self.read_peripheral(PeripheralId::PpiSystem, 0x35, 2);
                self.write_peripheral(PeripheralId::PpiSystem, 0x35, 2, port_c & !POR_BIT);
                self.emit(Effect::A20 { enabled: false });
                self.emit(Effect::CpuReset);
                self.regs.gate_a20 = false;
            }
            1 => self.regs.gate_a20 = true,
            3 => match data {
                0x02 => self.regs.gate_a20 = true,
                0x03 => self.regs.gate_a20 = false,
                _ => {}
            },
            _ => {}
        }
        tracing::debug!("[IO] A20 gate {}", self.regs.gate_a20);
        self.emit(Effect::A20 {
            enabled: self.regs.gate_a20,
        });
    }

    fn rom_ram_bank_write(&mut self, address: u32, offset: u32, data: u8) {
        match offset {
            1 => {
                if data & 0xED == 0 {
                    self.regs.ipl_bank = (data & 2) >> 1;
                    tracing::debug!("[BANK] IPL bank {}", self.regs.ipl_bank);
                    return;
                }
                self.undocumented(address, format!("EMS ROM setting {:02X}", data));
            }
            3 => {
                if data & 0xF0 == 0x20 {
                    self.regs.vram_bank = (data & 2) >> 1;
                    tracing::debug!("[BANK] VRAM bank {}", self.regs.vram_bank);
                } else {
                    self.undocumented(address, format!("EMS RAM setting {:02X}", data));
                }
            }
            _ => self.undocumented(address, format!("bank offset {} <- {:02X}", offset, data)),
        }
    }

    fn fdc_2hd_control_write(&mut self, data: u8) {
        if self.regs.fdc_2hd_ctrl & 0x80 == 0 && data & 0x80 != 0 {
            self.emit(Effect::FdcSoftReset(FdcUnit::Hd));
        }
        self.regs.write_register(RegisterId::Fdc2hdControl, data);

        self.emit(Effect::FdcReadyLine {
            unit: FdcUnit::Hd,
            connected: data & 0x40 == 0,
        });

        // the F-series 2HD adapter BIOS drives the motor line inverted
        if self.generation() == Generation::Pc9801 {
            self.emit(Effect::FloppyMotor {
                unit: FdcUnit::Hd,
                on: data & 0x08 == 0,
            });
        } else if self.regs.fdc_mode & 0x04 == 0 {
            self.emit(Effect::FloppyMotor {
                unit: FdcUnit::Hd,
                on: data & 0x08 != 0,
            });
        }
    }

    fn fdc_2dd_control_write(&mut self, data: u8) {
        tracing::debug!("[IO] 2DD control {:02X}", data);
        if self.regs.fdc_2dd_ctrl & 0x80 == 0 && data & 0x80 != 0 {
            self.emit(Effect::FdcSoftReset(FdcUnit::Dd));
        }
        self.regs.write_register(RegisterId::Fdc2ddControl, data);
        self.emit(Effect::FloppyMotor {
            unit: FdcUnit::Dd,
            on: data & 0x08 != 0,
        });
    }

    fn sasi_data_read(&mut self, address: u32) -> u8 {
        if let Some(sasi) = self.peripherals.sasi() {
            let data = sasi.data_in();
            if sasi.control_in() & 0x80 != 0 {
                sasi.write_ack(true);
            }
            return data;
        }
        self.missing(address, "SASI bus");
        0xFF
    }

    fn sasi_data_write(&mut self, address: u32, data: u8) {
        self.regs.sasi_data = data;
        if !self.regs.sasi_data_enable {
            return;
        }
        if let Some(sasi) = self.peripherals.sasi() {
            sasi.write_data(data);
            if sasi.control_in() & 0x80 != 0 {
                sasi.write_ack(true);
            }
            return;
        }
        self.missing(address, "SASI bus");
    }

    fn sasi_status_read(&mut self, address: u32) -> u8 {
        // without the status switch the port reports drive media types
        if self.regs.sasi_ctrl & 0x40 == 0 {
            return 0;
        }
        if let Some(sasi) = self.peripherals.sasi() {
            return sasi.control_in();
        }
        self.missing(address, "SASI bus");
        0xFF
    }

    fn sasi_control_write(&mut self, address: u32, data: u8) {
        let falling_reset = self.regs.sasi_ctrl & 0x08 != 0 && data & 0x08 == 0;
        self.regs.sasi_ctrl = data;

        match self.peripherals.sasi() {
            Some(sasi) => {
                sasi.write_sel(data & 0x20 != 0);
                sasi.write_rst(falling_reset);
            }
            None => self.missing(address, "SASI bus"),
        }
    }

    fn mouse_port_read(&mut self, offset: u32) -> u8 {
        match offset {
            0 => {
                let mouse = &self.regs.mouse;
                let input = self.mouse_input;
                let shift = ((mouse.control & 0x20) >> 5) * 4;
                let y = mouse.control & 0x40 != 0;

                let axis = if mouse.control & 0x80 == 0 {
                    if y {
                        input.y
                    } else {
                        input.x
                    }
                } else if y {
                    mouse.ly
                } else {
                    mouse.lx
                };
                (input.buttons & 0xF0) | ((axis >> shift) & 0x0F)
            }
            2 => self.regs.read_register(RegisterId::MouseControl),
            // port B is the DIP switch bank, all open
            _ => 0xFF,
        }
    }

    fn mouse_port_write(&mut self, offset: u32, data: u8) {
        match offset {
            2 => self.mouse_port_c(data),
            3 => {
                if data & 0x80 != 0 {
                    // mode set resets the output latches
                    self.mouse_port_c(0);
                } else {
                    let bit = 1 << ((data >> 1) & 7);
                    let control = self.regs.mouse.control;
                    let value = if data & 1 != 0 {
                        control | bit
                    } else {
                        control & !bit
                    };
                    self.mouse_port_c(value);
                }
            }
            _ => tracing::trace!("[IO] mouse port {} <- {:02X}", offset, data),
        }
    }

    fn mouse_port_c(&mut self, data: u8) {
        if self.regs.mouse.control & 0x80 == 0 && data & 0x80 != 0 {
            self.regs.mouse.lx = self.mouse_input.x;
            self.regs.mouse.ly = self.mouse_input.y;
        }
        self.regs.write_register(RegisterId::MouseControl, data);
    }

    fn sdip_index(&self, n: u8) -> u8 {
        n + self.regs.sdip_bank * SDIP_WINDOWS as u8
    }

    fn sdip_write(&mut self, n: u8, address: u32, offset: u32, data: u8) {
        let last = n as usize == SDIP_WINDOWS - 1;

        if last {
            if offset == 3 {
                self.regs.write_register(RegisterId::SdipBankSelect, data);
            }
            if offset == 2 {
                let index = self.sdip_index(n);
                self.regs.write_register(RegisterId::Sdip(index), data);
            }
            if offset & 2 == 0 {
                self.undocumented(address, format!("SDIP area B offset {} <- {:02X}", offset, data));
            }
            return;
        }

        if offset == 2 {
            let index = self.sdip_index(n);
            self.regs.write_register(RegisterId::Sdip(index), data);
        } else {
            self.undocumented(address, format!("SDIP write offset {} <- {:02X}", offset, data));
        }
    }

    fn ext2_video_ff_read(&mut self, address: u32) -> u8 {
        let index = self.regs.read_register(RegisterId::Ext2Index);
        let mut value = match index {
            0x03 => self.regs.video_ff[FF_DISPLAY] as u8,
            0x0A => self.regs.ext_flag(EX_ANALOG_256) as u8,
            _ => {
                if index < 0x20 {
                    self.undocumented(address, format!("ext2 flip-flop index {:02X}", index));
                }
                0
            }
        };
        value |= (self.regs.ext_flag(EX_GDC_5MHZ) as u8) << 1;
        value
    }

    fn tvram_read(&mut self, offset: u32) -> u8 {
        if offset & TVRAM_ATTRIBUTES != 0 && offset & 1 != 0 {
            return 0xFF;
        }
        self.memory.read(StoreId::TextVram, offset)
    }

    fn tvram_write(&mut self, offset: u32, data: u8) {
        if offset < MEMSW_PROTECTED || self.regs.video_ff[FF_MEMSW] {
            self.memory.write(StoreId::TextVram, offset, data);
        } else {
            tracing::trace!("[IO] memory switch {:#06X} write-protected", offset);
        }
    }

    /// Offset of the current user-definable glyph row in kanji RAM, or
    /// `None` when the font address is outside the PCG range.
    pub(crate) fn pcg_offset(&self, low_bits: u32) -> Option<u32> {
        let font = self.regs.font_address as u32;
        match font & 0xFF00 {
            0x5600 | 0x5700 => Some((font << 5) | low_bits | self.regs.font_lr as u32),
            _ => None,
        }
    }

    /// Character ROM row for a half-width glyph selected by the font
    /// address high byte.
    pub(crate) fn char_rom_offset(&self, row: u32) -> u32 {
        let size = self.regs.video_ff[FF_FONTSEL] as u32;
        let font = self.regs.font_address as u32;
        (font >> 8) * (8 << size) + size * 0x800 + (row & 0xF)
    }

    fn kanji_window_read(&mut self, offset: u32) -> u8 {
        let font = self.regs.font_address as u32;
        if font & 0xFF == 0 {
            let row = offset >> 1;
            return self.memory.read(StoreId::CharRom, self.char_rom_offset(row));
        }
        match self.pcg_offset(offset & 0x1E) {
            Some(pcg) => self.memory.read(StoreId::KanjiRam, pcg),
            None => self.memory.read(StoreId::KanjiRam, (font << 5) | (offset & 0x1F)),
        }
    }

    fn kanji_window_write(&mut self, offset: u32, data: u8) {
        match self.pcg_offset(offset & 0x1E) {
            Some(pcg) => self.memory.write(StoreId::KanjiRam, pcg, data),
            None => tracing::trace!(
                "[IO] kanji write {:02X} outside PCG range (font {:04X})",
                data,
                self.regs.font_address
            ),
        }
    }

    fn egc_write(&mut self, offset: u32, value: u16, mask: u16) {
        if !self.regs.ext_flag(EX_EGC_EXTENDED) {
            tracing::trace!("[EGC] write {:04X} while EGC disabled", value);
            return;
        }

        let index = offset as usize & 7;
        let egc = &self.regs.egc;
        if egc.regs[1] & 0x6000 == 0 || index != 4 {
            self.regs.write_word(WordRegisterId::Egc(index as u8), value, mask);
        }

        let egc = &mut self.regs.egc;
        match index {
            1 | 3 | 5 => {
                let color = match (egc.regs[1] >> 13) & 3 {
                    1 => egc.regs[5],
                    2 => egc.regs[3],
                    _ => return,
                };
                for (plane, pattern) in egc.pattern.iter_mut().enumerate() {
                    *pattern = if color & (1 << plane) != 0 { 0xFFFF } else { 0 };
                }
                tracing::trace!("[EGC] pattern {:?}", egc.pattern);
            }
            6 | 7 => {
                egc.count = (egc.regs[7] & 0xFFF) + 1;
                egc.first = true;
                egc.init = false;
                tracing::trace!("[EGC] count armed {}", egc.count);
            }
            _ => {}
        }
    }

    /// Diagnostic helper for handlers that had to pick one of two mode flags.
    pub(crate) fn inconsistent(&mut self, address: u32, kept: &'static str, discarded: &'static str) {
        self.diagnose(AccessDiagnostic::InconsistentModeCombination {
            address,
            kept,
            discarded,
        });
    }
}

fn pic(offset: u32) -> PeripheralId {
    if offset >= 4 {
        PeripheralId::PicSlave
    } else {
        PeripheralId::PicMaster
    }
}
