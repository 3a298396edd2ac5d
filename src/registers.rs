use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::generation::Generation;

// Base video flip-flop indices (port 0x68, index = (data & 0x0E) >> 1)
pub const FF_ATTRSEL: usize = 0;
pub const FF_WIDTH40: usize = 2;
pub const FF_FONTSEL: usize = 3;
pub const FF_INTERLACE: usize = 4;
pub const FF_MEMSW: usize = 6;
pub const FF_DISPLAY: usize = 7;

// Extended video flags (port 0x6A, index = (data & 0xFE) >> 1)
pub const EX_ANALOG_16: usize = 0x00;
pub const EX_EGC_EXTENDED: usize = 0x02;
pub const EX_EGC_UNLOCK: usize = 0x03;
pub const EX_ANALOG_256: usize = 0x10;
pub const EX_GDC_5MHZ: usize = 0x42;

pub const EXT_VIDEO_FLAGS: usize = 128;
pub const SDIP_WINDOWS: usize = 12;

/// Merge `value` into `old` on the lanes selected by `mask`.
pub fn combine(old: u16, value: u16, mask: u16) -> u16 {
    (old & !mask) | (value & mask)
}

/// How a byte register answers a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Returns the stored byte.
    Readback,
    /// Returns a fixed byte whatever was written.
    Sentinel(u8),
    /// Returns `(stored & keep) | force`.
    Masked { keep: u8, force: u8 },
}

/// Byte-wide registers reachable through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterId {
    VideoFlipFlop,
    ExtVideoFlag,
    Ext2Index,
    TextScroll(u8),
    GrcgMode,
    GrcgTile,
    DigitalPalette(u8),
    VramDisplay,
    VramBank,
    FontAddressLow,
    FontAddressHigh,
    FontLine,
    AccessControl,
    WindowBank,
    SdipBankSelect,
    Sdip(u8),
    DmaPage(u8),
    NmiFlipFlop,
    Fdc2hdControl,
    Fdc2ddControl,
    FdcModeControl,
    IdeSelect,
    MouseControl,
    MouseFrequency,
}

impl RegisterId {
    pub fn read_policy(self) -> ReadPolicy {
        use RegisterId::*;

        match self {
            TextScroll(_) | DigitalPalette(_) | VramDisplay | VramBank | AccessControl
            | Sdip(_) | IdeSelect | MouseControl | Ext2Index => ReadPolicy::Readback,
            WindowBank => ReadPolicy::Masked {
                keep: 0xFE,
                force: 0x00,
            },
            FdcModeControl => ReadPolicy::Masked {
                keep: 0x03,
                force: 0xFC,
            },
            // the 2HD control port answers a constant whose meaning is unknown
            Fdc2hdControl => ReadPolicy::Sentinel(0x44),
            Fdc2ddControl => ReadPolicy::Sentinel(0x40),
            VideoFlipFlop | ExtVideoFlag | GrcgMode | GrcgTile | FontAddressLow
            | FontAddressHigh | FontLine | SdipBankSelect | DmaPage(_) | NmiFlipFlop
            | MouseFrequency => ReadPolicy::Sentinel(0xFF),
        }
    }
}

/// 16-bit registers written with a byte-lane mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordRegisterId {
    Egc(u8),
    Analog256WriteBank,
    Ms0515Bank,
    Ms0515Halt,
}

impl WordRegisterId {
    pub fn readable(self) -> bool {
        matches!(
            self,
            WordRegisterId::Analog256WriteBank | WordRegisterId::Ms0515Halt
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Egc {
    pub regs: [u16; 8],
    pub pattern: [u16; 4],
    pub count: u16,
    pub first: bool,
    pub init: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grcg {
    pub mode: u8,
    pub tile: [u8; 4],
    pub tile_index: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analog16Palette {
    pub entry: u8,
    pub r: [u8; 16],
    pub g: [u8; 16],
    pub b: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analog256Palette {
    pub entry: u8,
    #[serde(with = "BigArray")]
    pub r: [u8; 256],
    #[serde(with = "BigArray")]
    pub g: [u8; 256],
    #[serde(with = "BigArray")]
    pub b: [u8; 256],
    pub write_bank: u16,
}

impl Default for Analog256Palette {
    fn default() -> Self {
        Self {
            entry: 0,
            r: [0; 256],
            g: [0; 256],
            b: [0; 256],
            write_bank: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MouseState {
    pub control: u8,
    pub lx: u8,
    pub ly: u8,
    pub freq_reg: u8,
    pub freq_index: u8,
}

/// All mutable control state of the bus. Mutated only by the dispatch write
/// path and by reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterFile {
    pub video_ff: [bool; 8],
    #[serde(with = "BigArray")]
    pub ext_video_ff: [bool; EXT_VIDEO_FLAGS],
    pub ext2_index: u8,

    pub text_scroll: [u8; 8],
    pub grcg: Grcg,
    pub egc: Egc,
    pub digital_palette: [u8; 4],
    pub analog16: Analog16Palette,
    pub analog256: Analog256Palette,
    pub vram_display: u8,
    pub vram_bank: u8,
    pub font_address: u16,
    pub font_line: u8,
    pub font_lr: u8,

    pub ipl_bank: u8,
    pub window_bank: u8,
    pub access_control: u8,
    pub sdip_bank: u8,
    pub sdip: [u8; SDIP_WINDOWS * 2],

    pub dma_page: [u8; 4],
    pub dma_autoinc: [u8; 4],
    pub nmi_ff: u8,
    pub gate_a20: bool,

    pub fdc_2hd_ctrl: u8,
    pub fdc_2dd_ctrl: u8,
    pub fdc_mode: u8,

    pub ide_select: u8,
    pub ide_irq: [bool; 2],
    pub sasi_ctrl: u8,
    pub sasi_data: u8,
    pub sasi_data_enable: bool,

    pub mouse: MouseState,

    pub bank_register: u16,
    pub halt_register: u16,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            video_ff: [false; 8],
            ext_video_ff: [false; EXT_VIDEO_FLAGS],
            ext2_index: 0,
            text_scroll: [0; 8],
            grcg: Grcg::default(),
            egc: Egc::default(),
            digital_palette: [0; 4],
            analog16: Analog16Palette::default(),
            analog256: Analog256Palette::default(),
            vram_display: 0,
            vram_bank: 0,
            font_address: 0,
            font_line: 0,
            font_lr: 0,
            ipl_bank: 0,
            window_bank: 0,
            access_control: 0,
            sdip_bank: 0,
            sdip: [0; SDIP_WINDOWS * 2],
            dma_page: [0; 4],
            dma_autoinc: [0; 4],
            nmi_ff: 0,
            gate_a20: false,
            fdc_2hd_ctrl: 0,
            fdc_2dd_ctrl: 0,
            fdc_mode: 0,
            ide_select: 0,
            ide_irq: [false; 2],
            sasi_ctrl: 0,
            sasi_data: 0,
            sasi_data_enable: false,
            mouse: MouseState::default(),
            bank_register: 0,
            halt_register: 0,
        }
    }
}

impl RegisterFile {
    /// Power-on values for a generation.
    pub fn for_generation(generation: Generation) -> Self {
        let mut regs = RegisterFile::default();

        if generation != Generation::Ms0515 {
            regs.mouse.control = 0xFF;
        }

        if generation.is_at_least(Generation::Pc9801Ux) {
            regs.fdc_mode = 3;
        }

        if generation == Generation::Pc9821 {
            regs.window_bank = 0x08;
        }

        regs
    }

    pub fn ext_flag(&self, index: usize) -> bool {
        self.ext_video_ff.get(index).copied().unwrap_or(false)
    }

    pub fn set_ext_flag(&mut self, index: usize, value: bool) {
        if let Some(flag) = self.ext_video_ff.get_mut(index) {
            *flag = value;
        }
    }

    fn stored(&self, id: RegisterId) -> u8 {
        use RegisterId::*;

        match id {
            VideoFlipFlop | ExtVideoFlag => 0,
            Ext2Index => self.ext2_index,
            TextScroll(i) => self.text_scroll[i as usize & 7],
            GrcgMode => self.grcg.mode,
            GrcgTile => self.grcg.tile[self.grcg.tile_index as usize & 3],
            DigitalPalette(i) => self.digital_palette[i as usize & 3],
            VramDisplay => self.vram_display,
            VramBank => self.vram_bank,
            FontAddressLow => self.font_address as u8,
            FontAddressHigh => (self.font_address >> 8) as u8,
            FontLine => self.font_line,
            AccessControl => self.access_control,
            WindowBank => self.window_bank,
            SdipBankSelect => self.sdip_bank << 6,
            Sdip(i) => self.sdip[i as usize % self.sdip.len()],
            DmaPage(i) => self.dma_page[i as usize & 3],
            NmiFlipFlop => self.nmi_ff,
            Fdc2hdControl => self.fdc_2hd_ctrl,
            Fdc2ddControl => self.fdc_2dd_ctrl,
            FdcModeControl => self.fdc_mode,
            IdeSelect => self.ide_select,
            MouseControl => self.mouse.control,
            MouseFrequency => self.mouse.freq_reg,
        }
    }

    pub fn read_register(&self, id: RegisterId) -> u8 {
        let stored = self.stored(id);
        let value = match id.read_policy() {
            ReadPolicy::Readback => stored,
            ReadPolicy::Sentinel(value) => value,
            ReadPolicy::Masked { keep, force } => (stored & keep) | force,
        };
        tracing::trace!("[REG] [RD] {:?} = {:02X}", id, value);
        value
    }

    /// Stores a byte without any side effect on other subsystems.
    pub fn write_register(&mut self, id: RegisterId, value: u8) {
        use RegisterId::*;

        tracing::trace!("[REG] [WR] {:?} <- {:02X}", id, value);
        match id {
            VideoFlipFlop => self.video_ff[((value & 0x0E) >> 1) as usize] = value & 1 != 0,
            ExtVideoFlag => self.set_ext_flag(((value & 0xFE) >> 1) as usize, value & 1 != 0),
            Ext2Index => self.ext2_index = value,
            TextScroll(i) => self.text_scroll[i as usize & 7] = value,
            GrcgMode => {
                self.grcg.mode = value;
                self.grcg.tile_index = 0;
            }
            GrcgTile => {
                self.grcg.tile[self.grcg.tile_index as usize & 3] = value.reverse_bits();
                self.grcg.tile_index = (self.grcg.tile_index + 1) & 3;
            }
            DigitalPalette(i) => self.digital_palette[i as usize & 3] = value,
            VramDisplay => self.vram_display = value & 1,
            VramBank => self.vram_bank = value & 1,
            FontAddressLow => self.font_address = (self.font_address & 0xFF00) | value as u16,
            FontAddressHigh => {
                self.font_address = (self.font_address & 0x00FF) | ((value as u16 & 0x7F) << 8)
            }
            FontLine => {
                self.font_line = (value & 0x0F) << 1;
                self.font_lr = ((value & 0x20) >> 5) ^ 1;
            }
            AccessControl => self.access_control = value,
            WindowBank => self.window_bank = value & 0xFE,
            SdipBankSelect => self.sdip_bank = (value & 0x40) >> 6,
            Sdip(i) => {
                let len = self.sdip.len();
                self.sdip[i as usize % len] = value;
            }
            DmaPage(i) => self.dma_page[i as usize & 3] = value,
            NmiFlipFlop => self.nmi_ff = value,
            Fdc2hdControl => self.fdc_2hd_ctrl = value,
            Fdc2ddControl => self.fdc_2dd_ctrl = value,
            FdcModeControl => self.fdc_mode = value,
            IdeSelect => self.ide_select = value & 1,
            MouseControl => self.mouse.control = value,
            MouseFrequency => {
                self.mouse.freq_reg = value & 3;
                self.mouse.freq_index = 0;
            }
        }
    }

    pub fn read_word(&self, id: WordRegisterId) -> u16 {
        match id {
            WordRegisterId::Analog256WriteBank => self.analog256.write_bank,
            WordRegisterId::Ms0515Halt => self.halt_register,
            WordRegisterId::Egc(_) | WordRegisterId::Ms0515Bank => 0xFFFF,
        }
    }

    /// Merges `value` under `mask` and returns the previous contents.
    pub fn write_word(&mut self, id: WordRegisterId, value: u16, mask: u16) -> u16 {
        let slot = match id {
            WordRegisterId::Egc(i) => &mut self.egc.regs[i as usize & 7],
            WordRegisterId::Analog256WriteBank => &mut self.analog256.write_bank,
            WordRegisterId::Ms0515Bank => &mut self.bank_register,
            WordRegisterId::Ms0515Halt => &mut self.halt_register,
        };
        let old = *slot;
        *slot = combine(old, value, mask);
        tracing::trace!(
            "[REG] [WR] {:?} <- {:04X} & {:04X} = {:04X}",
            id,
            value,
            mask,
            *slot
        );
        old
    }
}
