use crate::peripheral::Peripheral;

/// Formats `buffer[start..end]` as 16-byte rows with an ASCII column.
/// Addresses past the buffer are skipped.
pub fn hexdump(buffer: &[u8], start: u32, end: u32) -> String {
    let mut str = String::new();
    let end = end.min(buffer.len() as u32);
    let mut addr = start;

    while addr < end {
        let mut line = format!("{:06x}: ", addr);
        let mut chars = String::new();
        for _ in 0..16 {
            if addr >= end {
                break;
            }
            let byte = buffer[addr as usize];
            line.push_str(&format!("{:02x} ", byte));
            let c = byte as char;
            chars.push(if c.is_ascii_graphic() || c == ' ' {
                c
            } else {
                '.'
            });
            addr += 1;
        }

        str.push_str(&format!("{:<56} {}\n", line, chars));
    }

    str
}

/// A register bank that stores what is written and returns it on read.
/// Stands in for devices a host does not emulate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Latch {
    pub regs: [u8; 16],
}

impl Peripheral for Latch {
    fn read(&mut self, offset: u32) -> u8 {
        self.regs[offset as usize & 0xF]
    }

    fn write(&mut self, offset: u32, data: u8) {
        self.regs[offset as usize & 0xF] = data;
    }
}
