use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Backing stores a window or bank mapping can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StoreId {
    MainRam,
    SystemRom,
    TextVram,
    Gvram,
    ExtGvram,
    CharRom,
    KanjiRam,
    SoundBios,
    FdcBios2dd,
    FdcBios2hd,
    IdeRam,
    /// The default region: reads float high, writes vanish.
    OpenBus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    Ram,
    Rom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,
    pub data: Vec<u8>,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RegionKind::Ram => write!(f, "RAM size={:#X}", self.data.len()),
            RegionKind::Rom => write!(f, "ROM size={:#X}", self.data.len()),
        }
    }
}

impl Region {
    pub fn ram(size: usize) -> Self {
        Region {
            kind: RegionKind::Ram,
            data: vec![0; size],
        }
    }

    /// Builds a ROM of `size` bytes. Images shorter than the region are
    /// mirrored to fill it.
    pub fn rom(image: &[u8], size: usize) -> Self {
        let mut data = vec![0xFF; size];
        if !image.is_empty() {
            for (i, byte) in data.iter_mut().enumerate() {
                *byte = image[i % image.len()];
            }
        }

        Region {
            kind: RegionKind::Rom,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read(&self, offset: u32) -> u8 {
        match self.data.get(offset as usize) {
            Some(byte) => *byte,
            None => {
                tracing::trace!("[MEM] read past end of {} at {:#X}", self, offset);
                0xFF
            }
        }
    }

    pub fn write(&mut self, offset: u32, value: u8) {
        if self.kind == RegionKind::Rom {
            tracing::trace!("[MEM] write to ROM offset {:#X} ignored", offset);
            return;
        }

        match self.data.get_mut(offset as usize) {
            Some(byte) => *byte = value,
            None => tracing::trace!("[MEM] write past end of {} at {:#X}", self, offset),
        }
    }
}

/// All backing stores of one machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    regions: BTreeMap<StoreId, Region>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, store: StoreId, region: Region) {
        self.regions.insert(store, region);
    }

    pub fn region(&self, store: StoreId) -> Option<&Region> {
        self.regions.get(&store)
    }

    pub fn region_mut(&mut self, store: StoreId) -> Option<&mut Region> {
        self.regions.get_mut(&store)
    }

    pub fn read(&self, store: StoreId, offset: u32) -> u8 {
        self.regions
            .get(&store)
            .map(|region| region.read(offset))
            .unwrap_or(0xFF)
    }

    pub fn write(&mut self, store: StoreId, offset: u32, value: u8) {
        if let Some(region) = self.regions.get_mut(&store) {
            region.write(offset, value);
        }
    }
}
