use std::collections::BTreeMap;

use derivative::Derivative;
use serde::{Deserialize, Serialize};

/// Byte-wide devices the bus forwards register windows to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeripheralId {
    PicMaster,
    PicSlave,
    Dma,
    Rtc,
    PpiSystem,
    PpiPrinter,
    PpiFdd,
    Keyboard,
    GdcText,
    GdcBitmap,
    Pit,
    Uart,
    Fdc2hd,
    Fdc2dd,
    // MS 0515
    KeyboardUart,
    LineUart,
    Fdc,
}

/// An 8-bit register device. `offset` is the handler offset computed by
/// the dispatch table, i.e. already lane-compressed.
pub trait Peripheral {
    fn read(&mut self, offset: u32) -> u8;
    fn write(&mut self, offset: u32, data: u8);
}

/// One ATA channel. Both chip-select blocks are 16 bits wide.
pub trait IdeChannel {
    fn read_cs0(&mut self, offset: u32, mask: u16) -> u16;
    fn write_cs0(&mut self, offset: u32, data: u16, mask: u16);
    fn read_cs1(&mut self, offset: u32, mask: u16) -> u16;
    fn write_cs1(&mut self, offset: u32, data: u16, mask: u16);
}

/// The SASI bus seen from the host adapter.
pub trait SasiBus {
    /// Latched data lines.
    fn data_in(&mut self) -> u8;
    /// Control lines: REQ(7) ACK(6) BSY(5) MSG(4) CD(3) IO(2) INT(0).
    fn control_in(&mut self) -> u8;
    fn write_data(&mut self, data: u8);
    fn write_ack(&mut self, state: bool);
    fn write_sel(&mut self, state: bool);
    fn write_rst(&mut self, state: bool);
}

pub trait CycleCounter {
    fn total_cycles(&self) -> u64;
}

/// Adapters injected at build time. Anything absent reads all-ones and
/// swallows writes.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct Peripherals {
    #[derivative(Debug(format_with = "fmt_ids"))]
    devices: BTreeMap<PeripheralId, Box<dyn Peripheral>>,
    #[derivative(Debug = "ignore")]
    ide: [Option<Box<dyn IdeChannel>>; 2],
    #[derivative(Debug = "ignore")]
    sasi: Option<Box<dyn SasiBus>>,
    #[derivative(Debug = "ignore")]
    cycles: Option<Box<dyn CycleCounter>>,
    pub amd98: bool,
}

fn fmt_ids(
    devices: &BTreeMap<PeripheralId, Box<dyn Peripheral>>,
    f: &mut std::fmt::Formatter,
) -> std::fmt::Result {
    f.debug_list().entries(devices.keys()).finish()
}

impl Peripherals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: PeripheralId, device: Box<dyn Peripheral>) {
        self.devices.insert(id, device);
    }

    pub fn contains(&self, id: PeripheralId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn set_ide(&mut self, channel: usize, device: Box<dyn IdeChannel>) -> bool {
        match self.ide.get_mut(channel) {
            Some(slot) => {
                *slot = Some(device);
                true
            }
            None => false,
        }
    }

    pub fn set_sasi(&mut self, bus: Box<dyn SasiBus>) {
        self.sasi = Some(bus);
    }

    pub fn set_cycle_counter(&mut self, counter: Box<dyn CycleCounter>) {
        self.cycles = Some(counter);
    }

    pub fn device(&mut self, id: PeripheralId) -> Option<&mut (dyn Peripheral + 'static)> {
        self.devices.get_mut(&id).map(|d| d.as_mut())
    }

    pub fn ide(&mut self, channel: usize) -> Option<&mut (dyn IdeChannel + 'static)> {
        self.ide.get_mut(channel)?.as_mut().map(|d| d.as_mut())
    }

    pub fn sasi(&mut self) -> Option<&mut (dyn SasiBus + 'static)> {
        self.sasi.as_mut().map(|d| d.as_mut())
    }

    pub fn cycles(&self) -> Option<&(dyn CycleCounter + 'static)> {
        self.cycles.as_ref().map(|d| d.as_ref())
    }
}
