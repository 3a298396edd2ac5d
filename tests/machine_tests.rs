use pc98bus::{
    memory::StoreId,
    peripheral::PeripheralId,
    resolver::{Access, MS0515_ALT_STRIDE, MS0515_VRAM_BASE},
    utils::Latch,
    AccessWidth, AddressSpace, Effect, FdcUnit, Generation, IrqLine, Machine, MachineBuilder,
    TimerId,
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

const MS0515_BANK: u32 = 0o177400;

fn get_machine(generation: Generation, ipl: &[u8]) -> Machine {
    let mut builder = MachineBuilder::new(generation);
    builder.rom(StoreId::SystemRom, ipl);
    for id in generation.required_peripherals() {
        builder.peripheral(*id, Box::new(Latch::default()));
    }
    if generation.is_pc98() {
        builder.peripheral(PeripheralId::PpiSystem, Box::new(Latch::default()));
    }
    builder.build().unwrap()
}

fn peek(m: &mut Machine, address: u32) -> u8 {
    m.read(AddressSpace::Program, address, AccessWidth::Byte) as u8
}

fn poke(m: &mut Machine, address: u32, data: u8) -> Vec<Effect> {
    m.write(AddressSpace::Program, address, AccessWidth::Byte, data as u32, 0xFF)
}

fn out(m: &mut Machine, port: u32, data: u8) -> Vec<Effect> {
    m.write(AddressSpace::Io, port, AccessWidth::Byte, data as u32, 0xFF)
}

fn set_bank(m: &mut Machine, bank: u16) -> Vec<Effect> {
    m.write(
        AddressSpace::Program,
        MS0515_BANK,
        AccessWidth::Word,
        bank as u32,
        0xFFFF,
    )
}

#[test]
fn test_ms0515_page_switch() {
    let mut m = get_machine(Generation::Ms0515, &[]);
    m.reset();

    poke(&mut m, 0x0010, 0xA1);
    set_bank(&mut m, 0x0001);
    assert_eq!(peek(&mut m, 0x0010), 0x00);
    poke(&mut m, 0x0010, 0xB2);
    assert_eq!(m.memory().read(StoreId::MainRam, MS0515_ALT_STRIDE + 0x10), 0xB2);

    set_bank(&mut m, 0x0000);
    assert_eq!(peek(&mut m, 0x0010), 0xA1);
}

#[test]
fn test_ms0515_vram_overlay() {
    let mut m = get_machine(Generation::Ms0515, &[]);
    m.reset();

    let effects = set_bank(&mut m, 0x0080);
    assert_eq!(effects, vec![Effect::irq(IrqLine::MS0515_VBLANK, true)]);

    poke(&mut m, 0o20002, 0x3C);
    assert_eq!(
        m.memory().read(StoreId::MainRam, MS0515_VRAM_BASE + 0o20002),
        0x3C
    );
    assert_eq!(m.resolve(0x0000).offset, MS0515_VRAM_BASE);

    // overlay moved to pages 4 and 5; fields 2 and 3 agree
    set_bank(&mut m, 0x0880);
    let two = m.resolve(0o100000);
    set_bank(&mut m, 0x0C80);
    assert_eq!(m.resolve(0o100000), two);
    assert_eq!(two.offset, MS0515_VRAM_BASE);
    assert_eq!(m.resolve(0x0000).offset, 0);
}

#[test]
fn test_ms0515_rom_is_read_only() {
    let mut m = get_machine(Generation::Ms0515, &[0x37, 0x00, 0x12, 0x34]);
    assert_eq!(
        m.read(AddressSpace::Program, 0o160002, AccessWidth::Word),
        0x3412
    );
    poke(&mut m, 0o160002, 0xFF);
    assert_eq!(peek(&mut m, 0o160002), 0x12);
}

#[test]
fn test_ms0515_timer_needs_bank_bit_9() {
    let mut m = get_machine(Generation::Ms0515, &[]);
    m.reset();
    assert!(m.vblank(true).is_empty());

    set_bank(&mut m, 0x0200);
    assert_eq!(
        m.vblank(true),
        vec![Effect::irq(IrqLine::MS0515_TIMER, true)]
    );
}

#[test]
fn test_reset_effects() {
    let mut m = get_machine(Generation::Pc9801Ux, &[]);
    let effects = m.reset();
    assert_eq!(
        effects,
        vec![
            Effect::A20 { enabled: false },
            Effect::ScheduleTimer {
                timer: TimerId::MouseIrq,
                hz: 120
            }
        ]
    );
}

#[test]
fn test_ipl_bank_switch() {
    let mut ipl = vec![0xAA; 0x18000];
    ipl.extend(vec![0xBB; 0x18000]);
    let mut m = get_machine(Generation::Pc9801Rs, &ipl);
    m.reset();

    assert_eq!(peek(&mut m, 0xFFFF0), 0xAA);
    out(&mut m, 0x43D, 0x02);
    assert_eq!(peek(&mut m, 0xFFFF0), 0xBB);
    // high mirror follows the same bank
    assert_eq!(peek(&mut m, 0xFFFFF0), 0xBB);
    assert_eq!(m.resolve(0xE8000).access, Access::ReadOnly);

    out(&mut m, 0x43D, 0x00);
    assert_eq!(peek(&mut m, 0xFFFF0), 0xAA);
}

#[test]
fn test_a20_gate() {
    let mut m = get_machine(Generation::Pc9801Ux, &[]);
    m.reset();

    poke(&mut m, 0x000010, 0x11);
    assert_eq!(peek(&mut m, 0x100010), 0x11);

    assert_eq!(out(&mut m, 0xF2, 0x00), vec![Effect::A20 { enabled: true }]);
    poke(&mut m, 0x100010, 0x22);
    assert_eq!(peek(&mut m, 0x000010), 0x11);
    assert_eq!(m.memory().read(StoreId::MainRam, 0xA0010), 0x22);

    assert_eq!(out(&mut m, 0xF6, 0x03), vec![Effect::A20 { enabled: false }]);
    assert_eq!(peek(&mut m, 0x100010), 0x11);
}

#[test]
fn test_cpu_reset_port() {
    let mut m = get_machine(Generation::Pc9801Rs, &[]);
    m.reset();
    out(&mut m, 0xF2, 0x00);

    let effects = out(&mut m, 0xF0, 0x00);
    assert_eq!(
        effects,
        vec![
            Effect::A20 { enabled: false },
            Effect::CpuReset,
            Effect::A20 { enabled: false }
        ]
    );
    assert!(!m.registers().gate_a20);
}

#[test]
fn test_pc9801_wraps_at_one_megabyte() {
    let mut m = get_machine(Generation::Pc9801, &[]);
    poke(&mut m, 0x00020, 0x7E);
    assert_eq!(peek(&mut m, 0x100020), 0x7E);
}

#[test]
fn test_vrtc_interrupt_on_retrace_start() {
    let mut m = get_machine(Generation::Pc9801, &[]);
    assert_eq!(m.vblank(true), vec![Effect::irq(IrqLine::VRTC, true)]);
    assert!(m.vblank(false).is_empty());
}

#[test]
fn test_base_machine_2hd_interrupt() {
    let mut m = get_machine(Generation::Pc9801, &[]);
    assert_eq!(
        m.fdc_irq(FdcUnit::Hd, true),
        vec![Effect::irq(IrqLine::FDC_2HD, true)]
    );
    assert_eq!(
        m.fdc_drq(true),
        vec![Effect::DmaRequest {
            channel: 2,
            asserted: true
        }]
    );
}

#[test]
fn test_text_vram_through_program_space() {
    let mut m = get_machine(Generation::Pc9801Ux, &[]);
    m.reset();

    m.write(AddressSpace::Program, 0xA0000, AccessWidth::Word, 0x3041, 0xFFFF);
    assert_eq!(m.read(AddressSpace::Program, 0xA0000, AccessWidth::Word), 0x3041);
    assert_eq!(m.memory().read(StoreId::TextVram, 0), 0x41);
}

#[test]
fn test_state_survives_round_trip_through_json() {
    let mut m = get_machine(Generation::Ms0515, &[]);
    m.reset();
    set_bank(&mut m, 0x0003);
    poke(&mut m, 0x0100, 0x99);
    let saved = m.save_state().unwrap();

    let mut restored = get_machine(Generation::Ms0515, &[]);
    restored.load_state(&saved).unwrap();
    assert_eq!(restored.registers().bank_register, 0x0003);
    assert_eq!(peek(&mut restored, 0x0100), 0x99);
    assert!(restored.load_state("not json").is_err());
}

#[test]
fn test_window_ram_reaches_extended_memory() {
    let mut m = get_machine(Generation::Pc9821, &[]);
    m.reset();
    out(&mut m, 0xF2, 0x00);

    poke(&mut m, 0x100010, 0xA5);
    out(&mut m, 0x461, 0x10);
    assert_eq!(peek(&mut m, 0x80010), 0xA5);

    poke(&mut m, 0x9FFFF, 0x5A);
    assert_eq!(peek(&mut m, 0x11FFFF), 0x5A);
}

#[test]
fn test_window_ram_in_video_hole_decodes_program_map() {
    let mut m = get_machine(Generation::Pc9821, &[]);
    m.reset();
    poke(&mut m, 0xA0002, 0x41);

    out(&mut m, 0x461, 0x0A);
    assert_eq!(peek(&mut m, 0x80002), 0x41);
    poke(&mut m, 0x80004, 0x42);
    assert_eq!(m.memory().read(StoreId::TextVram, 4), 0x42);
    assert_eq!(m.resolve(0x80004).store, StoreId::OpenBus);
}
