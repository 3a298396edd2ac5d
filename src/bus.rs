use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    effect::{Effect, TimerId},
    error::AccessDiagnostic,
    generation::Generation,
    memory::{Memory, StoreId},
    peripheral::{PeripheralId, Peripherals},
    registers::RegisterFile,
    resolver::{self, Access, BankMapping, BankSelector},
    window::{AddressWindow, DispatchTable, Lanes, Stub, Target},
    AccessWidth, AddressSpace,
};

const DIAGNOSTIC_HISTORY: usize = 256;
const MOUSE_TIMER_HZ: u32 = 120;

const MEMSW_OFFSET: u32 = 0x3FE0;
const DEFAULT_MEMSW: [u8; 16] = [
    0xE1, 0x48, 0xE1, 0x05, 0xE1, 0x04, 0xE1, 0x00, 0xE1, 0x01, 0xE1, 0x00, 0xE1, 0x00, 0xE1,
    0x6E,
];

/// Host-side mouse inputs sampled by the mouse PPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseInput {
    pub x: u8,
    pub y: u8,
    pub buttons: u8,
}

impl Default for MouseInput {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            buttons: 0xF0,
        }
    }
}

/// The address decoder of one machine: dispatch tables, register file,
/// backing stores and the peripheral adapters they forward to.
#[derive(Debug)]
pub struct Bus {
    generation: Generation,
    pub(crate) regs: RegisterFile,
    pub(crate) memory: Memory,
    pub(crate) peripherals: Peripherals,
    pub(crate) mouse_input: MouseInput,

    effects: Vec<Effect>,
    diagnostics: VecDeque<AccessDiagnostic>,
}

impl Bus {
    pub fn new(generation: Generation, memory: Memory, peripherals: Peripherals) -> Self {
        Self {
            generation,
            regs: RegisterFile::for_generation(generation),
            memory,
            peripherals,
            mouse_input: MouseInput::default(),
            effects: Vec::new(),
            diagnostics: VecDeque::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &AccessDiagnostic> {
        self.diagnostics.iter()
    }

    pub fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
    }

    fn table(&self, space: AddressSpace) -> &'static DispatchTable {
        match space {
            AddressSpace::Program => self.generation.program_table(),
            AddressSpace::Io => self.generation.io_table(),
        }
    }

    /// Applies address-line limits: the CPU's address width and, on machines
    /// that have one, the A20 gate.
    pub fn effective_address(&self, space: AddressSpace, address: u32) -> u32 {
        match space {
            AddressSpace::Program => {
                let mut address = address & self.generation.address_mask();
                if self.generation.has_a20_gate() && !self.regs.gate_a20 {
                    address &= !(1 << 20);
                }
                address
            }
            AddressSpace::Io => address & 0xFFFF,
        }
    }

    /// Where a program address currently lands.
    pub fn resolve(&self, address: u32) -> BankMapping {
        let address = self.effective_address(AddressSpace::Program, address);
        let Some(window) = self.table(AddressSpace::Program).find(address) else {
            return BankMapping::open_bus();
        };

        let offset = window.offset(address);
        match window.target {
            Target::Fixed {
                store,
                base,
                access,
            } => BankMapping::new(store, base + offset, self.generation.bus_width(), access),
            Target::Banked(selector) => match self.window_ram_hole(selector, offset) {
                Some(physical) => self.resolve(physical),
                None => resolver::resolve(selector, offset, &self.regs),
            },
            _ => BankMapping::open_bus(),
        }
    }

    pub(crate) fn emit(&mut self, effect: Effect) {
        tracing::trace!("[BUS] effect {:?}", effect);
        self.effects.push(effect);
    }

    /// Drains effects raised outside a write call (line inputs, reset).
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub(crate) fn diagnose(&mut self, diagnostic: AccessDiagnostic) {
        match &diagnostic {
            AccessDiagnostic::UnmappedAccess { .. } => tracing::trace!("[BUS] {}", diagnostic),
            _ => tracing::debug!("[BUS] {}", diagnostic),
        }
        if self.diagnostics.len() == DIAGNOSTIC_HISTORY {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(diagnostic);
    }

    pub(crate) fn undocumented(&mut self, address: u32, detail: String) {
        self.diagnose(AccessDiagnostic::UndocumentedPortAccess { address, detail });
    }

    pub(crate) fn missing(&mut self, address: u32, what: impl Into<String>) {
        self.diagnose(AccessDiagnostic::MissingDependency {
            address,
            what: what.into(),
        });
    }

    pub fn read(&mut self, space: AddressSpace, address: u32, width: AccessWidth) -> u32 {
        self.read_masked(space, address, width, width.full_mask())
    }

    /// Reads `width` bytes starting at `address`, little-endian. Lanes not in
    /// `mask` are not accessed and read as zero.
    pub fn read_masked(
        &mut self,
        space: AddressSpace,
        address: u32,
        width: AccessWidth,
        mask: u32,
    ) -> u32 {
        let table = self.table(space);
        let bytes = width.bytes();
        let mut value = 0u32;
        let mut lane = 0;

        while lane < bytes {
            let lane_mask = 0xFFu32 << (lane * 8);
            let addr = self.effective_address(space, address.wrapping_add(lane));

            match table.find_read(addr) {
                Some(window) if window.lanes == Lanes::Word => {
                    let first = addr & 1;
                    let span = (2 - first).min(bytes - lane);
                    let word_mask = word_lanes(mask, lane, first, span);
                    if word_mask != 0 {
                        let word = self.read_word_window(window, addr & !1, word_mask);
                        for i in 0..span {
                            let byte = (word >> ((first + i) * 8)) & 0xFF;
                            value |= (byte as u32) << ((lane + i) * 8);
                        }
                    }
                    lane += span;
                }
                Some(window) => {
                    if mask & lane_mask != 0 {
                        value |= (self.read_window(window, addr) as u32) << (lane * 8);
                    }
                    lane += 1;
                }
                None => {
                    if mask & lane_mask != 0 {
                        self.diagnose(AccessDiagnostic::UnmappedAccess {
                            space,
                            address: addr,
                        });
                        value |= lane_mask;
                    }
                    lane += 1;
                }
            }
        }

        value & mask
    }

    /// Writes the lanes of `value` selected by `mask` and returns the effects
    /// the write raised, in order.
    pub fn write(
        &mut self,
        space: AddressSpace,
        address: u32,
        width: AccessWidth,
        value: u32,
        mask: u32,
    ) -> Vec<Effect> {
        let table = self.table(space);
        let bytes = width.bytes();
        let mut lane = 0;

        while lane < bytes {
            let lane_mask = 0xFFu32 << (lane * 8);
            let addr = self.effective_address(space, address.wrapping_add(lane));

            match table.find_write(addr) {
                Some(window) if window.lanes == Lanes::Word => {
                    let first = addr & 1;
                    let span = (2 - first).min(bytes - lane);
                    let word_mask = word_lanes(mask, lane, first, span);
                    if word_mask != 0 {
                        let mut word = 0u16;
                        for i in 0..span {
                            let byte = (value >> ((lane + i) * 8)) & 0xFF;
                            word |= (byte as u16) << ((first + i) * 8);
                        }
                        self.write_word_window(window, addr & !1, word, word_mask);
                    }
                    lane += span;
                }
                Some(window) => {
                    if mask & lane_mask != 0 {
                        let byte = (value >> (lane * 8)) as u8;
                        self.write_window(window, addr, byte);
                    }
                    lane += 1;
                }
                None => {
                    if mask & lane_mask != 0 {
                        self.diagnose(AccessDiagnostic::UnmappedAccess {
                            space,
                            address: addr,
                        });
                    }
                    lane += 1;
                }
            }
        }

        self.take_effects()
    }

    fn read_window(&mut self, window: &AddressWindow, address: u32) -> u8 {
        let offset = window.offset(address);
        match window.target {
            Target::Fixed { store, base, .. } => self.memory.read(store, base + offset),
            Target::Banked(selector) => match self.window_ram_hole(selector, offset) {
                Some(physical) => self.read_physical(physical),
                None => {
                    let mapping = resolver::resolve(selector, offset, &self.regs);
                    self.read_mapping(mapping)
                }
            },
            Target::Register(block) => self.read_block(block, address, offset),
            Target::Peripheral(id) => self.read_peripheral(id, address, offset),
            Target::Stub(stub) => {
                tracing::trace!("[BUS] stub {} read at {:#06X}", window.name, address);
                match stub {
                    Stub::Constant(value) => value,
                    Stub::LogAndIgnore => 0xFF,
                }
            }
        }
    }

    fn write_window(&mut self, window: &AddressWindow, address: u32, value: u8) {
        let offset = window.offset(address);
        match window.target {
            Target::Fixed {
                store,
                base,
                access,
            } => {
                if access == Access::ReadWrite {
                    self.memory.write(store, base + offset, value);
                } else {
                    tracing::trace!("[BUS] write to ROM {} at {:#X} ignored", window.name, address);
                }
            }
            Target::Banked(selector) => match self.window_ram_hole(selector, offset) {
                Some(physical) => self.write_physical(physical, value),
                None => {
                    let mapping = resolver::resolve(selector, offset, &self.regs);
                    self.write_mapping(mapping, value);
                }
            },
            Target::Register(block) => self.write_block(block, address, offset, value),
            Target::Peripheral(id) => self.write_peripheral(id, address, offset, value),
            Target::Stub(_) => {
                tracing::trace!(
                    "[BUS] stub {} write {:02X} at {:#06X} ignored",
                    window.name,
                    value,
                    address
                );
            }
        }
    }

    /// Physical address of a window-bank access that falls between
    /// conventional and extended RAM. Those reach whatever the program map
    /// decodes there.
    fn window_ram_hole(&self, selector: BankSelector, offset: u32) -> Option<u32> {
        if selector != BankSelector::WindowRam {
            return None;
        }
        let physical = resolver::window_ram_physical(offset, &self.regs);
        match resolver::main_ram_offset(physical) {
            Some(_) => None,
            None => Some(physical),
        }
    }

    fn read_physical(&mut self, physical: u32) -> u8 {
        match self.table(AddressSpace::Program).find_read(physical) {
            Some(window) => self.read_window(window, physical),
            None => {
                self.diagnose(AccessDiagnostic::UnmappedAccess {
                    space: AddressSpace::Program,
                    address: physical,
                });
                0xFF
            }
        }
    }

    fn write_physical(&mut self, physical: u32, value: u8) {
        match self.table(AddressSpace::Program).find_write(physical) {
            Some(window) => self.write_window(window, physical, value),
            None => self.diagnose(AccessDiagnostic::UnmappedAccess {
                space: AddressSpace::Program,
                address: physical,
            }),
        }
    }

    fn read_word_window(&mut self, window: &AddressWindow, address: u32, mask: u16) -> u16 {
        match window.target {
            Target::Register(block) => self.read_word_block(block, address, window.offset(address), mask),
            _ => {
                let mut word = 0u16;
                for lane in 0..2u32 {
                    if mask & (0xFF << (lane * 8)) != 0 {
                        word |= (self.read_window(window, address + lane) as u16) << (lane * 8);
                    }
                }
                word
            }
        }
    }

    fn write_word_window(&mut self, window: &AddressWindow, address: u32, value: u16, mask: u16) {
        match window.target {
            Target::Register(block) => {
                self.write_word_block(block, address, window.offset(address), value, mask)
            }
            _ => {
                for lane in 0..2u32 {
                    if mask & (0xFF << (lane * 8)) != 0 {
                        self.write_window(window, address + lane, (value >> (lane * 8)) as u8);
                    }
                }
            }
        }
    }

    /// Graphics VRAM is stored with each byte bit-reversed relative to the
    /// CPU view.
    pub(crate) fn read_mapping(&self, mapping: BankMapping) -> u8 {
        let byte = self.memory.read(mapping.store, mapping.offset);
        match mapping.store {
            StoreId::Gvram => byte.reverse_bits(),
            _ => byte,
        }
    }

    pub(crate) fn write_mapping(&mut self, mapping: BankMapping, value: u8) {
        if mapping.access == Access::ReadOnly {
            tracing::trace!("[BANK] write to read-only {:?} ignored", mapping.store);
            return;
        }
        let value = match mapping.store {
            StoreId::Gvram => value.reverse_bits(),
            _ => value,
        };
        self.memory.write(mapping.store, mapping.offset, value);
    }

    pub(crate) fn read_peripheral(&mut self, id: PeripheralId, address: u32, offset: u32) -> u8 {
        if let Some(device) = self.peripherals.device(id) {
            let value = device.read(offset);
            tracing::trace!("[IO] [RD] {:?} [{:#06X}] = {:02X}", id, address, value);
            return value;
        }
        self.missing(address, format!("{:?}", id));
        0xFF
    }

    pub(crate) fn write_peripheral(&mut self, id: PeripheralId, address: u32, offset: u32, value: u8) {
        if let Some(device) = self.peripherals.device(id) {
            tracing::trace!("[IO] [WR] {:?} [{:#06X}] <- {:02X}", id, address, value);
            device.write(offset, value);
            return;
        }
        self.missing(address, format!("{:?}", id));
    }

    /// Returns the machine to power-on register state. Backing RAM keeps its
    /// contents apart from text VRAM, which is cleared and reseeded with the
    /// memory-switch defaults.
    pub fn reset(&mut self) -> Vec<Effect> {
        let bank = self.regs.bank_register;
        self.regs = RegisterFile::for_generation(self.generation);

        if self.generation == Generation::Ms0515 {
            // the bank register goes through its write path so a pending
            // overlay interrupt is released
            self.regs.bank_register = bank;
            self.ms0515_bank_write(0, 0xFFFF);
        } else {
            if let Some(tvram) = self.memory.region_mut(StoreId::TextVram) {
                tvram.data.iter_mut().for_each(|b| *b = 0);
            }
            for (i, byte) in DEFAULT_MEMSW.iter().enumerate() {
                let offset = MEMSW_OFFSET + 2 * i as u32;
                self.memory.write(StoreId::TextVram, offset, *byte);
            }

            if self.generation.has_a20_gate() {
                self.emit(Effect::A20 { enabled: false });
            }
            self.emit(Effect::ScheduleTimer {
                timer: TimerId::MouseIrq,
                hz: MOUSE_TIMER_HZ,
            });
        }

        tracing::info!("[BUS] reset {:?}", self.generation);
        self.take_effects()
    }
}

/// Lane mask inside a 16-bit word for the access lanes `lane..lane + span`,
/// which start at byte `first` of the word.
fn word_lanes(mask: u32, lane: u32, first: u32, span: u32) -> u16 {
    let mut word_mask = 0u16;
    for i in 0..span {
        if mask & (0xFF << ((lane + i) * 8)) != 0 {
            word_mask |= 0xFF << ((first + i) * 8);
        }
    }
    word_mask
}
