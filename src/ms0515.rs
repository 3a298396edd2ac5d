//! MS 0515 system registers.
//!
//! Bank register layout:
//!
//! ```text
//! 6-0    RAM page select (0 = primary, 1 = alternate bank)
//! 7      VRAM overlay enable, also drives the vblank interrupt line
//! 9      timer interrupt enable
//! 11-10  VRAM overlay position
//! 12-13  parallel port strobe lines
//! ```

use crate::{
    bus::Bus,
    effect::{Effect, IrqLine},
    registers::WordRegisterId,
};

const OVERLAY_ENABLE: u16 = 1 << 7;
const TIMER_ENABLE: u16 = 1 << 9;

impl Bus {
    pub(crate) fn ms0515_bank_write(&mut self, value: u16, mask: u16) {
        let old = self
            .regs
            .write_word(WordRegisterId::Ms0515Bank, value, mask);
        let bank = self.regs.bank_register;

        tracing::debug!(
            "[BANK] bank <- {:04X} & {:04X} = {:04X} (overlay {} timer {})",
            value,
            mask,
            bank,
            bank & OVERLAY_ENABLE != 0,
            bank & TIMER_ENABLE != 0
        );

        if (old ^ bank) & OVERLAY_ENABLE != 0 {
            self.emit(Effect::irq(
                IrqLine::MS0515_VBLANK,
                bank & OVERLAY_ENABLE != 0,
            ));
        }
    }

    pub(crate) fn ms0515_halt_write(&mut self, value: u16, mask: u16) {
        self.regs
            .write_word(WordRegisterId::Ms0515Halt, value, mask);
    }

    /// Timer interrupts only reach the CPU while bank bit 9 is set.
    pub(crate) fn ms0515_timer_enabled(&self) -> bool {
        self.regs.bank_register & TIMER_ENABLE != 0
    }
}
