use std::{cell::RefCell, rc::Rc};

use pc98bus::{
    memory::StoreId,
    peripheral::{IdeChannel, Peripheral, PeripheralId, SasiBus},
    utils::Latch,
    AccessDiagnostic, AccessWidth, AddressSpace, Effect, Generation, IrqLine, Machine,
    MachineBuilder,
};
use tracing_subscriber::fmt;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

#[derive(Debug, Clone, PartialEq)]
enum Access {
    Read(u32),
    Write(u32, u8),
}

/// Records every access and answers reads with a fixed byte.
#[derive(Clone)]
struct Recorder {
    log: Rc<RefCell<Vec<Access>>>,
    answer: u8,
}

impl Recorder {
    fn new(answer: u8) -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            answer,
        }
    }

    fn take(&self) -> Vec<Access> {
        self.log.borrow_mut().drain(..).collect()
    }
}

impl Peripheral for Recorder {
    fn read(&mut self, offset: u32) -> u8 {
        self.log.borrow_mut().push(Access::Read(offset));
        self.answer
    }

    fn write(&mut self, offset: u32, data: u8) {
        self.log.borrow_mut().push(Access::Write(offset, data));
    }
}

#[derive(Default)]
struct FakeIde {
    regs: Rc<RefCell<[u16; 16]>>,
}

impl IdeChannel for FakeIde {
    fn read_cs0(&mut self, offset: u32, _mask: u16) -> u16 {
        self.regs.borrow()[offset as usize & 7]
    }

    fn write_cs0(&mut self, offset: u32, data: u16, mask: u16) {
        let mut regs = self.regs.borrow_mut();
        let slot = &mut regs[offset as usize & 7];
        *slot = (*slot & !mask) | (data & mask);
    }

    fn read_cs1(&mut self, offset: u32, _mask: u16) -> u16 {
        self.regs.borrow()[8 + (offset as usize & 7)]
    }

    fn write_cs1(&mut self, offset: u32, data: u16, mask: u16) {
        let mut regs = self.regs.borrow_mut();
        let slot = &mut regs[8 + (offset as usize & 7)];
        *slot = (*slot & !mask) | (data & mask);
    }
}

#[derive(Default)]
struct SasiLines {
    data: u8,
    control: u8,
    written: Vec<u8>,
    acks: Vec<bool>,
    sel: Vec<bool>,
    rst: Vec<bool>,
}

#[derive(Default, Clone)]
struct FakeSasi(Rc<RefCell<SasiLines>>);

impl SasiBus for FakeSasi {
    fn data_in(&mut self) -> u8 {
        self.0.borrow().data
    }

    fn control_in(&mut self) -> u8 {
        self.0.borrow().control
    }

    fn write_data(&mut self, data: u8) {
        self.0.borrow_mut().written.push(data);
    }

    fn write_ack(&mut self, state: bool) {
        self.0.borrow_mut().acks.push(state);
    }

    fn write_sel(&mut self, state: bool) {
        self.0.borrow_mut().sel.push(state);
    }

    fn write_rst(&mut self, state: bool) {
        self.0.borrow_mut().rst.push(state);
    }
}

fn with_latches(generation: Generation) -> MachineBuilder {
    let mut builder = MachineBuilder::new(generation);
    for id in generation.required_peripherals() {
        builder.peripheral(*id, Box::new(Latch::default()));
    }
    builder
}

fn out(m: &mut Machine, port: u32, data: u8) -> Vec<Effect> {
    m.write(AddressSpace::Io, port, AccessWidth::Byte, data as u32, 0xFF)
}

fn inp(m: &mut Machine, port: u32) -> u8 {
    m.read(AddressSpace::Io, port, AccessWidth::Byte) as u8
}

#[test]
fn test_pic_even_lanes_select_master_and_slave() {
    let master = Recorder::new(0x11);
    let slave = Recorder::new(0x22);
    let mut builder = MachineBuilder::new(Generation::Pc9801);
    builder
        .peripheral(PeripheralId::PicMaster, Box::new(master.clone()))
        .peripheral(PeripheralId::PicSlave, Box::new(slave.clone()));
    let mut m = builder.build().unwrap();

    out(&mut m, 0x00, 0x13);
    out(&mut m, 0x02, 0x08);
    assert_eq!(inp(&mut m, 0x0A), 0x22);

    assert_eq!(master.take(), vec![Access::Write(0, 0x13), Access::Write(1, 0x08)]);
    assert_eq!(slave.take(), vec![Access::Read(1)]);
}

#[test]
fn test_dma_shares_port_range_on_odd_lanes() {
    let dma = Recorder::new(0x5A);
    let mut builder = with_latches(Generation::Pc9801Ux);
    builder.peripheral(PeripheralId::Dma, Box::new(dma.clone()));
    let mut m = builder.build().unwrap();

    assert_eq!(inp(&mut m, 0x03), 0x5A);
    out(&mut m, 0x17, 0x04);
    assert_eq!(dma.take(), vec![Access::Read(1), Access::Write(0x0B, 0x04)]);
}

#[test]
fn test_word_access_splits_across_lanes() {
    let mut builder = with_latches(Generation::Pc9801);
    let master = Recorder::new(0xC3);
    let dma = Recorder::new(0x3C);
    builder
        .peripheral(PeripheralId::PicMaster, Box::new(master.clone()))
        .peripheral(PeripheralId::Dma, Box::new(dma.clone()));
    let mut m = builder.build().unwrap();

    assert_eq!(m.read(AddressSpace::Io, 0x00, AccessWidth::Word), 0x3CC3);
    assert_eq!(master.take(), vec![Access::Read(0)]);
    assert_eq!(dma.take(), vec![Access::Read(0)]);

    // only the high lane enabled
    m.write(AddressSpace::Io, 0x00, AccessWidth::Word, 0xAB00, 0xFF00);
    assert!(master.take().is_empty());
    assert_eq!(dma.take(), vec![Access::Write(0, 0xAB)]);
}

#[test]
fn test_missing_peripheral_reads_all_ones() {
    let mut m = with_latches(Generation::Pc9801).build().unwrap();
    m.clear_diagnostics();

    assert_eq!(inp(&mut m, 0x41), 0xFF);
    assert!(m.diagnostics().any(|d| matches!(
        d,
        AccessDiagnostic::MissingDependency { address: 0x41, .. }
    )));
}

#[test]
fn test_stub_is_not_unmapped() {
    let mut m = with_latches(Generation::Pc9801Rs).build().unwrap();
    m.clear_diagnostics();

    assert_eq!(inp(&mut m, 0xE0D0), 0xFF);
    out(&mut m, 0x1E8C, 0x01);
    assert_eq!(m.diagnostics().count(), 0);

    assert_eq!(inp(&mut m, 0x1234), 0xFF);
    assert_eq!(
        m.diagnostics().last(),
        Some(&AccessDiagnostic::UnmappedAccess {
            space: AddressSpace::Io,
            address: 0x1234
        })
    );
}

#[test]
fn test_ide_channel_select() {
    let first = FakeIde::default();
    let second = FakeIde::default();
    let second_regs = second.regs.clone();
    let mut builder = with_latches(Generation::Pc9801Rs);
    builder
        .ide_channel(0, Box::new(first))
        .ide_channel(1, Box::new(second));
    let mut m = builder.build().unwrap();

    out(&mut m, 0x432, 0x01);
    m.write(AddressSpace::Io, 0x640, AccessWidth::Word, 0xBEEF, 0xFFFF);
    assert_eq!(second_regs.borrow()[0], 0xBEEF);
    assert_eq!(m.read(AddressSpace::Io, 0x640, AccessWidth::Word), 0xBEEF);

    out(&mut m, 0x432, 0x00);
    assert_eq!(m.read(AddressSpace::Io, 0x640, AccessWidth::Word), 0);
}

#[test]
fn test_bad_ide_channel_fails_build() {
    let mut builder = with_latches(Generation::Pc9801Rs);
    builder.ide_channel(2, Box::new(FakeIde::default()));
    let err = builder.build().unwrap_err();
    assert_eq!(
        err.downcast_ref::<pc98bus::ConfigError>(),
        Some(&pc98bus::ConfigError::IdeChannel(2))
    );
}

#[test]
fn test_sasi_data_and_status() {
    let sasi = FakeSasi::default();
    let lines = sasi.0.clone();
    let mut builder = with_latches(Generation::Pc9801);
    builder.sasi(Box::new(sasi));
    let mut m = builder.build().unwrap();

    lines.borrow_mut().data = 0x42;
    lines.borrow_mut().control = 0x80;
    assert_eq!(inp(&mut m, 0x80), 0x42);
    assert_eq!(lines.borrow().acks, vec![true]);

    // status only visible with control bit 6 set
    assert_eq!(inp(&mut m, 0x82), 0x00);
    out(&mut m, 0x82, 0x40);
    assert_eq!(inp(&mut m, 0x82), 0x80);

    // reset is driven only on a falling bit 3
    out(&mut m, 0x82, 0x48);
    out(&mut m, 0x82, 0x40);
    assert_eq!(lines.borrow().rst, vec![false, false, true]);
}

#[test]
fn test_sasi_status_phase_interrupt() {
    let sasi = FakeSasi::default();
    let lines = sasi.0.clone();
    let mut builder = with_latches(Generation::Pc9801);
    builder.sasi(Box::new(sasi));
    let mut m = builder.build().unwrap();

    out(&mut m, 0x82, 0x01);
    lines.borrow_mut().control = 0x8C;
    let effects = m.sasi_req(true);
    assert!(effects.contains(&Effect::irq(IrqLine::DISK, true)));
    assert!(effects.contains(&Effect::DmaRequest {
        channel: 0,
        asserted: false
    }));

    lines.borrow_mut().control = 0x00;
    let effects = m.sasi_req(false);
    assert!(effects.contains(&Effect::irq(IrqLine::DISK, false)));
    assert_eq!(lines.borrow().acks.last(), Some(&false));
}

#[test]
fn test_sasi_io_line_gates_data_out() {
    let sasi = FakeSasi::default();
    let lines = sasi.0.clone();
    let mut builder = with_latches(Generation::Pc9801);
    builder.sasi(Box::new(sasi));
    let mut m = builder.build().unwrap();

    m.sasi_io(false);
    out(&mut m, 0x80, 0x99);
    m.sasi_io(true);
    assert_eq!(lines.borrow().written, vec![0x00, 0x99, 0x00]);
}

#[test]
fn test_ms0515_devices_on_even_lanes() {
    let pit = Recorder::new(0x77);
    let mut builder = MachineBuilder::new(Generation::Ms0515);
    builder.peripheral(PeripheralId::Pit, Box::new(pit.clone()));
    let mut m = builder.build().unwrap();

    assert_eq!(m.read(AddressSpace::Program, 0o177502, AccessWidth::Byte), 0x77);
    m.write(AddressSpace::Program, 0o177522, AccessWidth::Byte, 0x12, 0xFF);
    assert_eq!(pit.take(), vec![Access::Read(1), Access::Write(1, 0x12)]);
}

#[test]
fn test_window_ram_follows_bank() {
    let mut m = with_latches(Generation::Pc9821).build().unwrap();
    m.reset();

    m.write(AddressSpace::Program, 0x80010, AccessWidth::Byte, 0x5C, 0xFF);
    assert_eq!(m.memory().read(StoreId::MainRam, 0x80010), 0x5C);

    out(&mut m, 0x461, 0x10);
    m.write(AddressSpace::Program, 0x80010, AccessWidth::Byte, 0xC5, 0xFF);
    // physical 0x100010 is the first byte past conventional RAM
    assert_eq!(m.memory().read(StoreId::MainRam, 0xA0010), 0xC5);
    assert_eq!(m.memory().read(StoreId::MainRam, 0x80010), 0x5C);
}

#[test]
fn test_ms0515_write_only_ports_do_not_read() {
    let pit = Recorder::new(0x77);
    let uart = Recorder::new(0x31);
    let mut builder = MachineBuilder::new(Generation::Ms0515);
    builder
        .peripheral(PeripheralId::Pit, Box::new(pit.clone()))
        .peripheral(PeripheralId::KeyboardUart, Box::new(uart.clone()));
    let mut m = builder.build().unwrap();
    m.clear_diagnostics();

    assert_eq!(m.read(AddressSpace::Program, 0o177522, AccessWidth::Byte), 0xFF);
    assert_eq!(m.read(AddressSpace::Program, 0o177460, AccessWidth::Byte), 0xFF);
    assert!(pit.take().is_empty());
    assert!(uart.take().is_empty());
    assert_eq!(
        m.diagnostics().last(),
        Some(&AccessDiagnostic::UnmappedAccess {
            space: AddressSpace::Program,
            address: 0o177460
        })
    );

    m.write(AddressSpace::Program, 0o177460, AccessWidth::Byte, 0x4E, 0xFF);
    m.write(AddressSpace::Program, 0o177462, AccessWidth::Byte, 0x37, 0xFF);
    assert_eq!(uart.take(), vec![Access::Write(0, 0x4E), Access::Write(1, 0x37)]);
}

#[test]
fn test_ms0515_uart_data_port_is_read_only() {
    let uart = Recorder::new(0x31);
    let mut builder = MachineBuilder::new(Generation::Ms0515);
    builder.peripheral(PeripheralId::KeyboardUart, Box::new(uart.clone()));
    let mut m = builder.build().unwrap();
    m.clear_diagnostics();

    m.write(AddressSpace::Program, 0o177440, AccessWidth::Byte, 0x55, 0xFF);
    assert!(uart.take().is_empty());
    assert_eq!(
        m.diagnostics().last(),
        Some(&AccessDiagnostic::UnmappedAccess {
            space: AddressSpace::Program,
            address: 0o177440
        })
    );

    // data reads at offset 0, status reads and control writes at offset 1
    assert_eq!(m.read(AddressSpace::Program, 0o177440, AccessWidth::Byte), 0x31);
    assert_eq!(m.read(AddressSpace::Program, 0o177442, AccessWidth::Byte), 0x31);
    m.write(AddressSpace::Program, 0o177442, AccessWidth::Byte, 0x40, 0xFF);
    assert_eq!(
        uart.take(),
        vec![Access::Read(0), Access::Read(1), Access::Write(1, 0x40)]
    );
}
