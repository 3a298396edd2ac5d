use serde::{Deserialize, Serialize};

/// Interrupt request input as seen by the interrupt controller. PC-98
/// machines number the cascaded 8259 pair 0..=7 (master) and 8..=15
/// (slave); the MS 0515 uses the inputs of its priority encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrqLine(pub u8);

impl IrqLine {
    pub const VRTC: IrqLine = IrqLine(2);
    /// Slave IR1, shared by SASI and both IDE channels.
    pub const DISK: IrqLine = IrqLine(9);
    pub const FDC_2DD: IrqLine = IrqLine(10);
    pub const FDC_2HD: IrqLine = IrqLine(11);
    pub const MOUSE: IrqLine = IrqLine(13);

    pub const MS0515_VBLANK: IrqLine = IrqLine(2);
    pub const MS0515_TIMER: IrqLine = IrqLine(11);

    pub fn is_slave(self) -> bool {
        self.0 >= 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FdcUnit {
    /// 1 MB (2HD) controller
    Hd,
    /// 640 KB (2DD) controller, base PC-9801 only
    Dd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerId {
    MouseIrq,
}

/// A signal a register write asserts on another part of the system. Writes
/// return these in the order they happened; the host applies them before
/// the CPU issues its next access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Irq { line: IrqLine, asserted: bool },
    /// Logical DREQ level; the host translates to the controller's polarity.
    DmaRequest { channel: u8, asserted: bool },
    A20 { enabled: bool },
    CpuReset,
    FdcSoftReset(FdcUnit),
    FdcReadyLine { unit: FdcUnit, connected: bool },
    FloppyMotor { unit: FdcUnit, on: bool },
    FdcDataRate { unit: FdcUnit, rate: u32, rpm: u32 },
    ScheduleTimer { timer: TimerId, hz: u32 },
}

impl Effect {
    pub fn irq(line: IrqLine, asserted: bool) -> Self {
        Effect::Irq { line, asserted }
    }
}
