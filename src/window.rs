use std::ops::RangeInclusive;

use crate::{
    memory::StoreId,
    peripheral::PeripheralId,
    resolver::{Access, BankSelector, GvramPlane},
};

/// Which byte lanes of a range a window answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lanes {
    /// Every byte; handler offset is `addr - start`.
    All,
    /// Even addresses of a 16-bit bus.
    Even,
    /// Odd addresses of a 16-bit bus.
    Odd,
    /// Byte 0 of each dword on a 32-bit bus.
    Dword0,
    /// A native 16-bit register block. The handler sees whole words with a
    /// lane mask; the offset is the word index.
    Word,
}

impl Lanes {
    fn stride(self) -> u32 {
        match self {
            Lanes::All => 1,
            Lanes::Even | Lanes::Odd | Lanes::Word => 2,
            Lanes::Dword0 => 4,
        }
    }

    pub fn matches(self, start: u32, address: u32) -> bool {
        let delta = address.wrapping_sub(start);
        match self {
            Lanes::All | Lanes::Word => true,
            Lanes::Even => delta % 2 == 0,
            Lanes::Odd => delta % 2 == 1,
            Lanes::Dword0 => delta % 4 == 0,
        }
    }

    pub fn offset(self, start: u32, address: u32) -> u32 {
        address.wrapping_sub(start) / self.stride()
    }
}

/// PC-98 handler variants chosen by machine generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    Base,
    Rs,
    Pc9821,
}

/// Register handlers with no device of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Pic,
    Rtc,
    DmaPage4,
    DmaPage8,
    NmiControl,
    VrtcClear,
    VideoFlipFlop(Revision),
    TextScroll,
    Grcg,
    SasiData,
    SasiControl,
    Fdc2hdControl,
    Fdc2ddControl,
    FdcModeControl,
    Palette(Revision),
    F0Port,
    A20Control,
    AccessControl,
    RomRamBank,
    Egc,
    Timestamp,
    IdeControl,
    IdeCs(u8),
    MouseFrequency,
    MousePort,
    WindowBank,
    Sdip(u8),
    Ext2VideoFlipFlop,
    TextVram,
    KanjiWindow,
    Gvram256(GvramPlane),
    Ms0515Bank,
    Ms0515Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stub {
    /// Reads answer a fixed byte, writes are dropped.
    Constant(u8),
    /// Reads answer all-ones and both directions leave a trace.
    LogAndIgnore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Store offset is `base + (addr - start)`.
    Fixed {
        store: StoreId,
        base: u32,
        access: Access,
    },
    Banked(BankSelector),
    Register(Block),
    Peripheral(PeripheralId),
    Stub(Stub),
}

/// Access directions a window decodes. The other direction falls through to
/// earlier windows, or is unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Both,
    ReadOnly,
    WriteOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressWindow {
    pub name: &'static str,
    pub range: RangeInclusive<u32>,
    pub lanes: Lanes,
    pub target: Target,
    pub direction: Direction,
    /// Handler offset of the first lane.
    pub first: u32,
}

impl AddressWindow {
    pub fn new(name: &'static str, range: RangeInclusive<u32>, lanes: Lanes, target: Target) -> Self {
        Self {
            name,
            range,
            lanes,
            target,
            direction: Direction::Both,
            first: 0,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.direction = Direction::ReadOnly;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.direction = Direction::WriteOnly;
        self
    }

    /// Shifts handler offsets so the window starts at register `first`.
    pub fn from_offset(mut self, first: u32) -> Self {
        self.first = first;
        self
    }

    pub fn ram(name: &'static str, range: RangeInclusive<u32>, store: StoreId, base: u32) -> Self {
        Self::new(
            name,
            range,
            Lanes::All,
            Target::Fixed {
                store,
                base,
                access: Access::ReadWrite,
            },
        )
    }

    pub fn rom(name: &'static str, range: RangeInclusive<u32>, store: StoreId, base: u32) -> Self {
        Self::new(
            name,
            range,
            Lanes::All,
            Target::Fixed {
                store,
                base,
                access: Access::ReadOnly,
            },
        )
    }

    pub fn start(&self) -> u32 {
        *self.range.start()
    }

    pub fn claims(&self, address: u32) -> bool {
        self.range.contains(&address) && self.lanes.matches(self.start(), address)
    }

    pub fn claims_read(&self, address: u32) -> bool {
        self.direction != Direction::WriteOnly && self.claims(address)
    }

    pub fn claims_write(&self, address: u32) -> bool {
        self.direction != Direction::ReadOnly && self.claims(address)
    }

    pub fn offset(&self, address: u32) -> u32 {
        self.first + self.lanes.offset(self.start(), address)
    }
}

/// Ordered window list; a window registered later wins over earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTable {
    windows: Vec<AddressWindow>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child table starts as a copy of its parent.
    pub fn derive(parent: &DispatchTable) -> Self {
        parent.clone()
    }

    pub fn add(&mut self, window: AddressWindow) -> &mut Self {
        self.windows.push(window);
        self
    }

    pub fn extend(&mut self, windows: impl IntoIterator<Item = AddressWindow>) -> &mut Self {
        self.windows.extend(windows);
        self
    }

    /// Window covering `address` in either direction.
    pub fn find(&self, address: u32) -> Option<&AddressWindow> {
        self.windows.iter().rev().find(|w| w.claims(address))
    }

    pub fn find_read(&self, address: u32) -> Option<&AddressWindow> {
        self.windows.iter().rev().find(|w| w.claims_read(address))
    }

    pub fn find_write(&self, address: u32) -> Option<&AddressWindow> {
        self.windows.iter().rev().find(|w| w.claims_write(address))
    }

    pub fn windows(&self) -> &[AddressWindow] {
        &self.windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(name: &'static str, range: RangeInclusive<u32>, lanes: Lanes, value: u8) -> AddressWindow {
        AddressWindow::new(name, range, lanes, Target::Stub(Stub::Constant(value)))
    }

    #[test]
    fn test_lane_offsets() {
        assert_eq!(Lanes::Even.offset(0xF0, 0xF6), 3);
        assert_eq!(Lanes::Odd.offset(0x20, 0x27), 3);
        assert_eq!(Lanes::All.offset(0x43C, 0x43D), 1);
        assert_eq!(Lanes::Dword0.offset(0x94, 0x94), 0);
        assert_eq!(Lanes::Word.offset(0x4A0, 0x4AB), 5);
    }

    #[test]
    fn test_even_odd_split() {
        let mut table = DispatchTable::new();
        table
            .add(stub("pic", 0x00..=0x1F, Lanes::Even, 1))
            .add(stub("dma", 0x00..=0x1F, Lanes::Odd, 2));

        assert_eq!(table.find(0x02).map(|w| w.name), Some("pic"));
        assert_eq!(table.find(0x03).map(|w| w.name), Some("dma"));
        assert!(table.find(0x20).is_none());
    }

    #[test]
    fn test_later_window_wins() {
        let mut base = DispatchTable::new();
        base.add(stub("txt_scrl", 0x70..=0x7F, Lanes::Even, 1))
            .add(stub("pit", 0x70..=0x7F, Lanes::Odd, 2));

        let mut child = DispatchTable::derive(&base);
        child.add(stub("grcg", 0x70..=0x7F, Lanes::Even, 3));

        assert_eq!(child.find(0x7C).map(|w| w.name), Some("grcg"));
        assert_eq!(child.find(0x71).map(|w| w.name), Some("pit"));
        assert_eq!(base.find(0x7C).map(|w| w.name), Some("txt_scrl"));
    }

    #[test]
    fn test_direction_limits_lookup() {
        let mut table = DispatchTable::new();
        table
            .add(stub("uart", 0o177440..=0o177441, Lanes::Even, 1).read_only())
            .add(stub("uart", 0o177442..=0o177443, Lanes::Even, 2).from_offset(1))
            .add(stub("uart_w", 0o177460..=0o177463, Lanes::Even, 3).write_only());

        assert_eq!(table.find_read(0o177440).map(|w| w.name), Some("uart"));
        assert!(table.find_write(0o177440).is_none());
        assert!(table.find_read(0o177462).is_none());
        assert_eq!(table.find_write(0o177462).map(|w| w.offset(0o177462)), Some(1));
        assert_eq!(table.find(0o177462).map(|w| w.name), Some("uart_w"));

        let status = table.find_read(0o177442);
        assert_eq!(status.map(|w| w.offset(0o177442)), Some(1));
        assert!(table.find_write(0o177442).is_some());
    }

    #[test]
    fn test_dword_lane_zero_only() {
        let mut table = DispatchTable::new();
        table.add(stub("ext2", 0x9A0..=0x9A3, Lanes::Dword0, 0));
        assert!(table.find(0x9A0).is_some());
        assert!(table.find(0x9A1).is_none());
        assert!(table.find(0x9A2).is_none());
    }
}
