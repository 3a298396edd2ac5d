use std::collections::BTreeMap;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::{
    bus::Bus,
    effect::{Effect, FdcUnit, IrqLine},
    error::{AccessDiagnostic, ConfigError},
    generation::Generation,
    hexdump,
    memory::{Memory, Region, StoreId},
    peripheral::{CycleCounter, IdeChannel, Peripheral, PeripheralId, Peripherals, SasiBus},
    registers::{RegisterFile, RegisterId},
    resolver::BankMapping,
    AccessWidth, AddressSpace,
};

const PC98_CONVENTIONAL_RAM: usize = 0xA0000;
const DMA_PAGE_END: u16 = 0xFFFF;

/// One machine's bus: decoding tables, register file, stores and adapters.
/// The CPU core and the devices live outside; they talk to the machine
/// through reads, writes and line inputs and apply the returned effects.
#[derive(Debug)]
pub struct Machine {
    bus: Bus,
}

impl Machine {
    pub fn generation(&self) -> Generation {
        self.bus.generation()
    }

    pub fn read(&mut self, space: AddressSpace, address: u32, width: AccessWidth) -> u32 {
        self.bus.read(space, address, width)
    }

    pub fn read_masked(
        &mut self,
        space: AddressSpace,
        address: u32,
        width: AccessWidth,
        mask: u32,
    ) -> u32 {
        self.bus.read_masked(space, address, width, mask)
    }

    pub fn write(
        &mut self,
        space: AddressSpace,
        address: u32,
        width: AccessWidth,
        value: u32,
        mask: u32,
    ) -> Vec<Effect> {
        self.bus.write(space, address, width, value, mask)
    }

    pub fn reset(&mut self) -> Vec<Effect> {
        self.bus.reset()
    }

    /// Where a program address lands with the current bank registers.
    pub fn resolve(&self, address: u32) -> BankMapping {
        self.bus.resolve(address)
    }

    pub fn registers(&self) -> &RegisterFile {
        self.bus.registers()
    }

    pub fn memory(&self) -> &Memory {
        self.bus.memory()
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &AccessDiagnostic> {
        self.bus.diagnostics()
    }

    pub fn clear_diagnostics(&mut self) {
        self.bus.clear_diagnostics();
    }

    pub fn memory_dump(&self, store: StoreId, start: u32, end: u32) -> String {
        self.bus
            .memory()
            .region(store)
            .map(|region| hexdump(&region.data, start, end))
            .unwrap_or_default()
    }

    /// Vertical retrace edge from the display.
    pub fn vblank(&mut self, state: bool) -> Vec<Effect> {
        if self.generation() == Generation::Ms0515 {
            if self.bus.ms0515_timer_enabled() {
                self.bus.emit(Effect::irq(IrqLine::MS0515_TIMER, state));
            }
        } else if state {
            self.bus.emit(Effect::irq(IrqLine::VRTC, true));
        }
        self.bus.take_effects()
    }

    /// Interrupt output of a floppy controller, routed by the 2DD control
    /// port or the FDC mode register.
    pub fn fdc_irq(&mut self, unit: FdcUnit, state: bool) -> Vec<Effect> {
        let regs = self.bus.registers();
        let line = match unit {
            FdcUnit::Dd if regs.fdc_2dd_ctrl & 0x08 != 0 => Some(IrqLine::FDC_2DD),
            FdcUnit::Dd => None,
            FdcUnit::Hd if self.generation() == Generation::Pc9801 => Some(IrqLine::FDC_2HD),
            FdcUnit::Hd if regs.fdc_mode & 1 != 0 => Some(IrqLine::FDC_2HD),
            FdcUnit::Hd => Some(IrqLine::FDC_2DD),
        };

        tracing::trace!("[FDC] {:?} irq {} -> {:?}", unit, state, line);
        if let Some(line) = line {
            self.bus.emit(Effect::irq(line, state));
        }
        self.bus.take_effects()
    }

    /// DMA request of the 2HD controller.
    pub fn fdc_drq(&mut self, state: bool) -> Vec<Effect> {
        let channel = if self.generation() == Generation::Pc9801
            || self.bus.registers().fdc_mode & 1 != 0
        {
            2
        } else {
            3
        };
        self.bus.emit(Effect::DmaRequest {
            channel,
            asserted: state,
        });
        self.bus.take_effects()
    }

    /// Both IDE channels share one interrupt input.
    pub fn ide_irq(&mut self, channel: usize, state: bool) -> Vec<Effect> {
        match self.bus.regs.ide_irq.get_mut(channel) {
            Some(irq) => *irq = state,
            None => {
                tracing::warn!("[IDE] interrupt from unknown channel {}", channel);
                return Vec::new();
            }
        }
        let asserted = self.bus.regs.ide_irq.iter().any(|irq| *irq);
        self.bus.emit(Effect::irq(IrqLine::DISK, asserted));
        self.bus.take_effects()
    }

    /// SASI I/O line: high while the target drives the data bus.
    pub fn sasi_io(&mut self, state: bool) -> Vec<Effect> {
        self.bus.regs.sasi_data_enable = !state;
        let enabled = self.bus.regs.sasi_data_enable;
        let data = self.bus.regs.sasi_data;

        if let Some(sasi) = self.bus.peripherals.sasi() {
            sasi.write_data(if enabled { data } else { 0 });
        }
        self.sasi_interrupt();
        self.bus.take_effects()
    }

    pub fn sasi_req(&mut self, state: bool) -> Vec<Effect> {
        let ctrl = self.bus.regs.sasi_ctrl;
        let mut status = 0;
        if let Some(sasi) = self.bus.peripherals.sasi() {
            if !state {
                sasi.write_ack(false);
            }
            status = sasi.control_in();
        }

        self.sasi_interrupt();
        self.bus.emit(Effect::DmaRequest {
            channel: 0,
            asserted: state && status & 0x08 == 0 && ctrl & 0x02 != 0,
        });
        self.bus.take_effects()
    }

    // status phase with REQ up raises the interrupt if the host enabled it
    fn sasi_interrupt(&mut self) {
        let ctrl = self.bus.regs.sasi_ctrl;
        let status = match self.bus.peripherals.sasi() {
            Some(sasi) => sasi.control_in(),
            None => 0,
        };
        let asserted = status & 0x9C == 0x8C && ctrl & 1 != 0;
        self.bus.emit(Effect::irq(IrqLine::DISK, asserted));
    }

    /// One period of the 120 Hz mouse timer.
    pub fn mouse_timer_tick(&mut self) -> Vec<Effect> {
        let mouse = &mut self.bus.regs.mouse;
        if mouse.control & 0x10 == 0 {
            mouse.freq_index = mouse.freq_index.wrapping_add(1);
            if mouse.freq_index > mouse.freq_reg {
                mouse.freq_index = 0;
                self.bus.emit(Effect::irq(IrqLine::MOUSE, false));
                self.bus.emit(Effect::irq(IrqLine::MOUSE, true));
            }
        }
        self.bus.take_effects()
    }

    pub fn set_mouse(&mut self, x: u8, y: u8, buttons: u8) {
        let input = &mut self.bus.mouse_input;
        input.x = x;
        input.y = y;
        input.buttons = buttons;
    }

    /// Program address a DMA channel reaches at `offset`. The final byte of
    /// a page bumps the page register when auto-increment is on.
    fn dma_address(&mut self, channel: u8, offset: u16) -> u32 {
        let channel = channel as usize & 3;
        let page = self.bus.regs.dma_page[channel];
        let address = ((page as u32) << 16) | offset as u32;

        if offset == DMA_PAGE_END {
            let next = match self.bus.regs.dma_autoinc[channel] {
                1 => ((page.wrapping_add(1)) & 0x0F) | (page & 0xF0),
                3 => page.wrapping_add(1),
                _ => page,
            };
            if next != page {
                tracing::trace!("[DMA] channel {} page {:02X} -> {:02X}", channel, page, next);
                self.bus
                    .regs
                    .write_register(RegisterId::DmaPage(channel as u8), next);
            }
        }
        address
    }

    pub fn dma_read(&mut self, channel: u8, offset: u16) -> u8 {
        let address = self.dma_address(channel, offset);
        self.bus
            .read(AddressSpace::Program, address, AccessWidth::Byte) as u8
    }

    pub fn dma_write(&mut self, channel: u8, offset: u16, data: u8) -> Vec<Effect> {
        let address = self.dma_address(channel, offset);
        self.bus.write(
            AddressSpace::Program,
            address,
            AccessWidth::Byte,
            data as u32,
            0xFF,
        )
    }

    pub fn save_state(&self) -> anyhow::Result<String> {
        let state = SavedStateRef {
            generation: self.generation(),
            registers: self.bus.registers(),
            memory: self.bus.memory(),
        };
        Ok(serde_json::to_string(&state)?)
    }

    pub fn load_state(&mut self, state: &str) -> anyhow::Result<()> {
        let state: SavedState = serde_json::from_str(state)?;
        if state.generation != self.generation() {
            bail!(
                "state was saved on {:?}, this machine is {:?}",
                state.generation,
                self.generation()
            );
        }
        self.bus.regs = state.registers;
        self.bus.memory = state.memory;
        tracing::info!("[MACHINE] state restored");
        Ok(())
    }
}

#[derive(Serialize)]
struct SavedStateRef<'a> {
    generation: Generation,
    registers: &'a RegisterFile,
    memory: &'a Memory,
}

#[derive(Deserialize)]
struct SavedState {
    generation: Generation,
    registers: RegisterFile,
    memory: Memory,
}

#[derive(Debug)]
pub struct MachineBuilder {
    generation: Generation,
    ram_size: Option<usize>,
    roms: BTreeMap<StoreId, Vec<u8>>,
    peripherals: Peripherals,
    bad_ide_channel: Option<usize>,
}

impl MachineBuilder {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            ram_size: None,
            roms: BTreeMap::new(),
            peripherals: Peripherals::new(),
            bad_ide_channel: None,
        }
    }

    pub fn ram_size(&mut self, size: usize) -> &mut Self {
        self.ram_size = Some(size);
        self
    }

    pub fn rom(&mut self, store: StoreId, image: &[u8]) -> &mut Self {
        self.roms.insert(store, image.to_vec());
        self
    }

    pub fn peripheral(&mut self, id: PeripheralId, device: Box<dyn Peripheral>) -> &mut Self {
        self.peripherals.insert(id, device);
        self
    }

    pub fn ide_channel(&mut self, channel: usize, device: Box<dyn IdeChannel>) -> &mut Self {
        if !self.peripherals.set_ide(channel, device) {
            self.bad_ide_channel = Some(channel);
        }
        self
    }

    pub fn sasi(&mut self, bus: Box<dyn SasiBus>) -> &mut Self {
        self.peripherals.set_sasi(bus);
        self
    }

    pub fn cycle_counter(&mut self, counter: Box<dyn CycleCounter>) -> &mut Self {
        self.peripherals.set_cycle_counter(counter);
        self
    }

    /// Installs the AMD-98 sound board, which answers the detection read on port 0xF0.
    pub fn amd98(&mut self, present: bool) -> &mut Self {
        self.peripherals.amd98 = present;
        self
    }

    fn check_ram_size(&self, size: usize) -> Result<(), ConfigError> {
        let valid = match self.generation {
            Generation::Ms0515 => size == self.generation.default_ram_size(),
            _ => size >= PC98_CONVENTIONAL_RAM,
        };
        if valid {
            Ok(())
        } else {
            Err(ConfigError::RamSize {
                size,
                generation: self.generation,
            })
        }
    }

    /// Validates the configuration and hands the adapters over to a new
    /// machine. Call [`Machine::reset`] before the first bus cycle.
    pub fn build(&mut self) -> anyhow::Result<Machine> {
        let generation = self.generation;

        if let Some(channel) = self.bad_ide_channel {
            return Err(ConfigError::IdeChannel(channel).into());
        }

        for id in generation.required_peripherals() {
            if !self.peripherals.contains(*id) {
                return Err(ConfigError::MissingPeripheral {
                    generation,
                    id: *id,
                }
                .into());
            }
        }

        let ram_size = self.ram_size.unwrap_or_else(|| generation.default_ram_size());
        self.check_ram_size(ram_size)?;

        let mut memory = Memory::new();
        memory.insert(StoreId::MainRam, Region::ram(ram_size));

        let mut roms = self.roms.clone();
        for (store, size, is_rom) in generation.stores() {
            if !is_rom {
                memory.insert(store, Region::ram(size));
                continue;
            }

            let image = roms.remove(&store).unwrap_or_default();
            if image.len() > size {
                return Err(ConfigError::RomTooLarge {
                    store,
                    size: image.len(),
                    capacity: size,
                }
                .into());
            }
            tracing::debug!("[MACHINE] {:?} <- {:#X} byte image", store, image.len());
            memory.insert(store, Region::rom(&image, size));
        }

        if let Some(store) = roms.keys().next() {
            return Err(ConfigError::NotARom {
                store: *store,
                generation,
            }
            .into());
        }

        let peripherals = std::mem::take(&mut self.peripherals);
        tracing::info!(
            "[MACHINE] {:?} with {:#X} bytes RAM, peripherals {:?}",
            generation,
            ram_size,
            peripherals
        );

        Ok(Machine {
            bus: Bus::new(generation, memory, peripherals),
        })
    }
}
