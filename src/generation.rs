//! Machine generations and their composed address decoders.
//!
//! Each PC-98 generation reuses its predecessor's table and layers its own
//! windows on top: `Pc9801 = common + base`, `Pc9801Ux = common + ux`,
//! `Pc9801Rs = Pc9801Ux + rs`, `Pc9821 = Pc9801Rs + 9821`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{
    memory::StoreId,
    peripheral::PeripheralId,
    resolver::{
        BankSelector, GvramPlane, CONVENTIONAL_RAM_SIZE, EXT_RAM_BASE, MS0515_PAGES,
        MS0515_PAGE_SIZE,
    },
    window::{AddressWindow, Block, DispatchTable, Lanes, Revision, Stub, Target},
    AccessWidth,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generation {
    /// 8086, 20-bit addressing
    Pc9801,
    /// V30/80286, 24-bit addressing with A20 gate
    Pc9801Ux,
    /// 80386SX
    Pc9801Rs,
    /// 486/Pentium, 32-bit bus
    Pc9821,
    /// PDP-11 compatible MS 0515
    Ms0515,
}

impl Generation {
    fn rank(self) -> Option<u8> {
        match self {
            Generation::Pc9801 => Some(0),
            Generation::Pc9801Ux => Some(1),
            Generation::Pc9801Rs => Some(2),
            Generation::Pc9821 => Some(3),
            Generation::Ms0515 => None,
        }
    }

    /// True when both are PC-98 generations and `self` is `other` or newer.
    pub fn is_at_least(self, other: Generation) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => self == other,
        }
    }

    pub fn is_pc98(self) -> bool {
        self.rank().is_some()
    }

    pub fn parent(self) -> Option<Generation> {
        match self {
            Generation::Pc9801Rs => Some(Generation::Pc9801Ux),
            Generation::Pc9821 => Some(Generation::Pc9801Rs),
            _ => None,
        }
    }

    pub fn bus_width(self) -> AccessWidth {
        match self {
            Generation::Pc9821 => AccessWidth::Dword,
            _ => AccessWidth::Word,
        }
    }

    /// Address lines the CPU drives on the program bus.
    pub fn address_mask(self) -> u32 {
        match self {
            Generation::Pc9801 => 0x000F_FFFF,
            Generation::Pc9801Ux | Generation::Pc9801Rs => 0x00FF_FFFF,
            Generation::Pc9821 => 0xFFFF_FFFF,
            Generation::Ms0515 => 0x0000_FFFF,
        }
    }

    pub fn has_a20_gate(self) -> bool {
        self.is_at_least(Generation::Pc9801Ux)
    }

    pub fn default_ram_size(self) -> usize {
        match self {
            Generation::Pc9801 => 0xA0000,
            Generation::Pc9801Ux | Generation::Pc9801Rs => 0x1A0000,
            Generation::Pc9821 => 0x3A0000,
            Generation::Ms0515 => crate::resolver::MS0515_RAM_SIZE,
        }
    }

    /// Devices the machine cannot run without.
    pub fn required_peripherals(self) -> &'static [PeripheralId] {
        match self {
            Generation::Ms0515 => &[],
            _ => &[PeripheralId::PicMaster, PeripheralId::PicSlave],
        }
    }

    /// Backing stores and their sizes. ROM stores may be replaced by images.
    pub fn stores(self) -> Vec<(StoreId, usize, bool)> {
        match self {
            Generation::Ms0515 => vec![(StoreId::SystemRom, 0x4000, true)],
            _ => {
                let mut stores = vec![
                    (StoreId::TextVram, 0x4000, false),
                    (StoreId::Gvram, 0x40000, false),
                ];
                if self == Generation::Pc9801 {
                    stores.push((StoreId::SystemRom, 0x18000, true));
                    stores.push((StoreId::SoundBios, 0x2000, true));
                    stores.push((StoreId::FdcBios2dd, 0x1000, true));
                    stores.push((StoreId::FdcBios2hd, 0x1000, true));
                } else {
                    stores.push((StoreId::SystemRom, 0x30000, true));
                    stores.push((StoreId::CharRom, 0x4000, true));
                    stores.push((StoreId::KanjiRam, 0x100000, false));
                }
                if self.is_at_least(Generation::Pc9801Rs) {
                    stores.push((StoreId::IdeRam, 0x2000, false));
                }
                if self == Generation::Pc9821 {
                    stores.push((StoreId::SoundBios, 0x2000, true));
                    stores.push((StoreId::ExtGvram, 0xA0000, false));
                }
                stores
            }
        }
    }

    pub fn program_table(self) -> &'static DispatchTable {
        match self {
            Generation::Pc9801 => &PC9801_PROGRAM,
            Generation::Pc9801Ux => &PC9801UX_PROGRAM,
            Generation::Pc9801Rs => &PC9801RS_PROGRAM,
            Generation::Pc9821 => &PC9821_PROGRAM,
            Generation::Ms0515 => &MS0515_PROGRAM,
        }
    }

    pub fn io_table(self) -> &'static DispatchTable {
        match self {
            Generation::Pc9801 => &PC9801_IO,
            Generation::Pc9801Ux => &PC9801UX_IO,
            Generation::Pc9801Rs => &PC9801RS_IO,
            Generation::Pc9821 => &PC9821_IO,
            Generation::Ms0515 => &NO_IO,
        }
    }
}

fn reg(name: &'static str, start: u32, end: u32, lanes: Lanes, block: Block) -> AddressWindow {
    AddressWindow::new(name, start..=end, lanes, Target::Register(block))
}

fn dev(name: &'static str, start: u32, end: u32, lanes: Lanes, id: PeripheralId) -> AddressWindow {
    AddressWindow::new(name, start..=end, lanes, Target::Peripheral(id))
}

fn banked(name: &'static str, start: u32, end: u32, selector: BankSelector) -> AddressWindow {
    AddressWindow::new(name, start..=end, Lanes::All, Target::Banked(selector))
}

fn stub(name: &'static str, start: u32, end: u32, lanes: Lanes, stub: Stub) -> AddressWindow {
    AddressWindow::new(name, start..=end, lanes, Target::Stub(stub))
}

// Program space

fn pc9801_program() -> Vec<AddressWindow> {
    vec![
        AddressWindow::ram("ram", 0x00000..=0x9FFFF, StoreId::MainRam, 0),
        reg("tvram", 0xA0000, 0xA3FFF, Lanes::All, Block::TextVram),
        banked("gvram", 0xA8000, 0xBFFFF, BankSelector::Gvram(GvramPlane::Brg)),
        AddressWindow::rom("sound_bios", 0xCC000..=0xCDFFF, StoreId::SoundBios, 0),
        AddressWindow::rom("fdc_bios_2dd", 0xD6000..=0xD6FFF, StoreId::FdcBios2dd, 0),
        AddressWindow::rom("fdc_bios_2hd", 0xD7000..=0xD7FFF, StoreId::FdcBios2hd, 0),
        AddressWindow::rom("ipl", 0xE8000..=0xFFFFF, StoreId::SystemRom, 0),
    ]
}

fn ux_program() -> Vec<AddressWindow> {
    vec![
        AddressWindow::ram("ram", 0x00000..=0x9FFFF, StoreId::MainRam, 0),
        AddressWindow::ram(
            "ext_ram",
            EXT_RAM_BASE..=0xFFFFFF,
            StoreId::MainRam,
            CONVENTIONAL_RAM_SIZE,
        ),
        reg("tvram", 0xA0000, 0xA3FFF, Lanes::All, Block::TextVram),
        reg("knjram", 0xA4000, 0xA4FFF, Lanes::All, Block::KanjiWindow),
        banked("grcg_gvram", 0xA8000, 0xBFFFF, BankSelector::Gvram(GvramPlane::Brg)),
        banked("grcg_gvram0", 0xE0000, 0xE7FFF, BankSelector::Gvram(GvramPlane::E)),
        banked("ipl_bank", 0xE8000, 0xFFFFF, BankSelector::Ipl),
    ]
}

fn rs_program() -> Vec<AddressWindow> {
    vec![
        AddressWindow::ram("ide_ram", 0xDA000..=0xDBFFF, StoreId::IdeRam, 0),
        banked("ipl_bank_mirror", 0xEE8000, 0xEFFFFF, BankSelector::Ipl),
        banked("ipl_bank_high", 0xFE8000, 0xFFFFFF, BankSelector::Ipl),
    ]
}

fn pc9821_program() -> Vec<AddressWindow> {
    vec![
        banked("winram", 0x80000, 0x9FFFF, BankSelector::WindowRam),
        reg("gvram", 0xA8000, 0xBFFFF, Lanes::All, Block::Gvram256(GvramPlane::Brg)),
        AddressWindow::rom("sound_bios", 0xCC000..=0xCDFFF, StoreId::SoundBios, 0),
        reg("gvram0", 0xE0000, 0xE7FFF, Lanes::All, Block::Gvram256(GvramPlane::E)),
        AddressWindow::ram("ext_gvram", 0xF00000..=0xF9FFFF, StoreId::ExtGvram, 0),
        banked("ipl_bank_ffee", 0xFFEE8000, 0xFFEFFFFF, BankSelector::Ipl),
        banked("ipl_bank_fffe", 0xFFFE8000, 0xFFFFFFFF, BankSelector::Ipl),
    ]
}

fn ms0515_program() -> Vec<AddressWindow> {
    let mut windows: Vec<AddressWindow> = (0..MS0515_PAGES)
        .map(|page| {
            let start = page as u32 * MS0515_PAGE_SIZE;
            banked(
                "ram_bank",
                start,
                start + MS0515_PAGE_SIZE - 1,
                BankSelector::Ms0515Page(page),
            )
        })
        .collect();

    windows.extend([
        AddressWindow::rom("rom", 0o160000..=0o177377, StoreId::SystemRom, 0),
        reg("bank", 0o177400, 0o177437, Lanes::Word, Block::Ms0515Bank),
        dev("i8251kbd", 0o177440, 0o177441, Lanes::Even, PeripheralId::KeyboardUart).read_only(),
        dev("i8251kbd", 0o177442, 0o177443, Lanes::Even, PeripheralId::KeyboardUart)
            .from_offset(1),
        dev("i8251kbd_w", 0o177460, 0o177463, Lanes::Even, PeripheralId::KeyboardUart)
            .write_only(),
        dev("pit8253", 0o177500, 0o177507, Lanes::Even, PeripheralId::Pit),
        dev("pit8253_w", 0o177520, 0o177527, Lanes::Even, PeripheralId::Pit).write_only(),
        stub("ms7007", 0o177540, 0o177547, Lanes::All, Stub::LogAndIgnore),
        dev("ppi8255", 0o177600, 0o177607, Lanes::Even, PeripheralId::PpiSystem),
        dev("vg93", 0o177640, 0o177647, Lanes::Even, PeripheralId::Fdc),
        dev("i8251line", 0o177700, 0o177701, Lanes::Even, PeripheralId::LineUart).read_only(),
        dev("i8251line", 0o177702, 0o177703, Lanes::Even, PeripheralId::LineUart).from_offset(1),
        dev("i8251line_w", 0o177720, 0o177723, Lanes::Even, PeripheralId::LineUart)
            .write_only(),
        reg("halt", 0o177770, 0o177771, Lanes::Word, Block::Ms0515Halt),
    ]);
    windows
}

// I/O space

fn common_io() -> Vec<AddressWindow> {
    use Lanes::{Even, Odd};
    use PeripheralId as P;

    vec![
        dev("i8237", 0x0000, 0x001F, Odd, P::Dma),
        reg("pic", 0x0000, 0x001F, Even, Block::Pic),
        reg("rtc", 0x0020, 0x002F, Even, Block::Rtc),
        dev("ppi8255_sys", 0x0030, 0x0037, Odd, P::PpiSystem),
        dev("ppi8255_prn", 0x0040, 0x0047, Even, P::PpiPrinter),
        dev("keyb", 0x0040, 0x0047, Odd, P::Keyboard),
        dev("ppi8255_fdd", 0x0050, 0x0057, Odd, P::PpiFdd),
        reg("nmi_ctrl", 0x0050, 0x0057, Even, Block::NmiControl),
        dev("upd7220_chr", 0x0060, 0x0063, Even, P::GdcText),
        reg("vrtc_clear", 0x0064, 0x0065, Even, Block::VrtcClear),
        dev("pit8253", 0x0070, 0x007F, Odd, P::Pit),
        reg("txt_scrl", 0x0070, 0x007F, Even, Block::TextScroll),
        reg("sasi_data", 0x0080, 0x0081, Even, Block::SasiData),
        reg("sasi_status", 0x0082, 0x0083, Even, Block::SasiControl),
        dev("upd765_2hd", 0x0090, 0x0093, Even, P::Fdc2hd),
        reg("fdc_2hd_ctrl", 0x0094, 0x0095, Even, Block::Fdc2hdControl),
        dev("upd8251", 0x0090, 0x0093, Odd, P::Uart),
        reg("ppi8255_mouse", 0x7FD8, 0x7FDF, Odd, Block::MousePort),
    ]
}

fn pc9801_io() -> Vec<AddressWindow> {
    use Lanes::{All, Even, Odd};

    vec![
        reg("dmapg4", 0x0020, 0x002F, Odd, Block::DmaPage4),
        reg("video_ff", 0x0068, 0x0069, Even, Block::VideoFlipFlop(Revision::Base)),
        reg("a0", 0x00A0, 0x00AF, All, Block::Palette(Revision::Base)),
        dev("upd765_2dd", 0x00C8, 0x00CB, Even, PeripheralId::Fdc2dd),
        reg("fdc_2dd_ctrl", 0x00CC, 0x00CD, Even, Block::Fdc2ddControl),
        reg("f0", 0x00F0, 0x00FF, Even, Block::F0Port),
    ]
}

fn ux_io() -> Vec<AddressWindow> {
    use Lanes::{All, Even, Odd, Word};

    vec![
        reg("dmapg8", 0x0020, 0x002F, Odd, Block::DmaPage8),
        stub("nop_50", 0x0050, 0x0057, All, Stub::LogAndIgnore),
        reg("timestamp", 0x005C, 0x005F, Word, Block::Timestamp),
        reg("video_ff", 0x0068, 0x006B, Even, Block::VideoFlipFlop(Revision::Rs)),
        reg("grcg", 0x0070, 0x007F, Even, Block::Grcg),
        reg("a0", 0x00A0, 0x00AF, All, Block::Palette(Revision::Rs)),
        reg("fdc_mode_ctrl", 0x00BC, 0x00BF, All, Block::FdcModeControl),
        dev("upd765_2hd", 0x00C8, 0x00CB, Even, PeripheralId::Fdc2hd),
        reg("fdc_2hd_ctrl", 0x00CC, 0x00CD, Even, Block::Fdc2hdControl),
        reg("a20_ctrl", 0x00F0, 0x00FF, Even, Block::A20Control),
        reg("access_ctrl", 0x0438, 0x043B, All, Block::AccessControl),
        reg("bank", 0x043C, 0x043F, All, Block::RomRamBank),
        reg("egc", 0x04A0, 0x04AF, Word, Block::Egc),
        dev("pit8253_mirror", 0x3FD8, 0x3FDF, Odd, PeripheralId::Pit),
    ]
}

fn rs_io() -> Vec<AddressWindow> {
    use Lanes::{All, Even, Word};

    vec![
        reg("ide_ctrl", 0x0430, 0x0433, Even, Block::IdeControl),
        reg("ide_cs0", 0x0640, 0x064F, Word, Block::IdeCs(0)),
        reg("ide_cs1", 0x0740, 0x074F, Word, Block::IdeCs(1)),
        stub("ide_ram_switch", 0x1E8C, 0x1E8F, All, Stub::LogAndIgnore),
        reg("mouse_freq", 0xBFD8, 0xBFDF, All, Block::MouseFrequency),
        stub("midi", 0xE0D0, 0xE0D3, All, Stub::Constant(0xFF)),
    ]
}

fn pc9821_io() -> Vec<AddressWindow> {
    use Lanes::{All, Dword0, Even, Odd};

    let mut windows = vec![
        reg("nmi_ctrl", 0x0050, 0x0053, Even, Block::NmiControl),
        stub("unk_60", 0x0060, 0x0063, Odd, Stub::Constant(0xFF)),
        reg("video_ff", 0x0068, 0x006B, Even, Block::VideoFlipFlop(Revision::Pc9821)),
        reg("a0", 0x00A0, 0x00AF, All, Block::Palette(Revision::Pc9821)),
        reg("window_bank", 0x0460, 0x0463, All, Block::WindowBank),
        reg("ext2_video_ff", 0x09A0, 0x09A3, Dword0, Block::Ext2VideoFlipFlop),
    ];

    windows.extend((0..crate::registers::SDIP_WINDOWS as u32).map(|n| {
        let start = 0x841C + n * 0x100;
        reg("sdip", start, start + 3, All, Block::Sdip(n as u8))
    }));
    windows
}

fn compose(parent: Option<&DispatchTable>, layers: &[Vec<AddressWindow>]) -> DispatchTable {
    let mut table = parent.map(DispatchTable::derive).unwrap_or_default();
    for layer in layers {
        table.extend(layer.iter().cloned());
    }
    table
}

static PC9801_PROGRAM: Lazy<DispatchTable> = Lazy::new(|| compose(None, &[pc9801_program()]));
static PC9801UX_PROGRAM: Lazy<DispatchTable> = Lazy::new(|| compose(None, &[ux_program()]));
static PC9801RS_PROGRAM: Lazy<DispatchTable> =
    Lazy::new(|| compose(Some(&*PC9801UX_PROGRAM), &[rs_program()]));
static PC9821_PROGRAM: Lazy<DispatchTable> =
    Lazy::new(|| compose(Some(&*PC9801RS_PROGRAM), &[pc9821_program()]));
static MS0515_PROGRAM: Lazy<DispatchTable> = Lazy::new(|| compose(None, &[ms0515_program()]));

static PC9801_IO: Lazy<DispatchTable> = Lazy::new(|| compose(None, &[common_io(), pc9801_io()]));
static PC9801UX_IO: Lazy<DispatchTable> = Lazy::new(|| compose(None, &[common_io(), ux_io()]));
static PC9801RS_IO: Lazy<DispatchTable> = Lazy::new(|| compose(Some(&*PC9801UX_IO), &[rs_io()]));
static PC9821_IO: Lazy<DispatchTable> = Lazy::new(|| compose(Some(&*PC9801RS_IO), &[pc9821_io()]));
static NO_IO: Lazy<DispatchTable> = Lazy::new(DispatchTable::new);
