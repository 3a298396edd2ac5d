pub mod bus;
pub mod effect;
pub mod error;
pub mod generation;
mod io;
pub mod machine;
pub mod memory;
mod ms0515;
mod overlay;
pub mod peripheral;
pub mod registers;
pub mod resolver;
pub mod utils;
pub mod window;

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

pub use bus::Bus;
pub use effect::{Effect, FdcUnit, IrqLine, TimerId};
pub use error::{AccessDiagnostic, ConfigError};
pub use generation::Generation;
pub use machine::{Machine, MachineBuilder};
pub use utils::hexdump;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Program,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessWidth {
    Byte,
    Word,
    Dword,
}

impl AccessWidth {
    pub fn bytes(self) -> u32 {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Word => 2,
            AccessWidth::Dword => 4,
        }
    }

    /// Mask selecting every lane of an access of this width.
    pub fn full_mask(self) -> u32 {
        match self {
            AccessWidth::Byte => 0xFF,
            AccessWidth::Word => 0xFFFF,
            AccessWidth::Dword => 0xFFFF_FFFF,
        }
    }

    fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(AccessWidth::Byte),
            2 => Some(AccessWidth::Word),
            4 => Some(AccessWidth::Dword),
            _ => None,
        }
    }
}

fn js_generation(name: &str) -> Result<Generation, JsError> {
    match name {
        "pc9801" => Ok(Generation::Pc9801),
        "pc9801ux" => Ok(Generation::Pc9801Ux),
        "pc9801rs" => Ok(Generation::Pc9801Rs),
        "pc9821" => Ok(Generation::Pc9821),
        "ms0515" => Ok(Generation::Ms0515),
        _ => Err(JsError::new(&format!("unknown machine {name}"))),
    }
}

fn js_width(bytes: u32) -> Result<AccessWidth, JsError> {
    AccessWidth::from_bytes(bytes).ok_or_else(|| JsError::new("width must be 1, 2 or 4"))
}

/// Bus engine handle for a JavaScript host. Peripherals are not wired in
/// this surface, so interrupt controllers are replaced by no-op latches.
#[wasm_bindgen(js_name = Machine)]
pub struct JsMachine(Machine);

#[wasm_bindgen(js_class = Machine)]
impl JsMachine {
    #[wasm_bindgen(constructor)]
    pub fn new(generation: &str, ipl: &[u8]) -> Result<JsMachine, JsError> {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();

        let generation = js_generation(generation)?;
        let mut builder = MachineBuilder::new(generation);
        builder.rom(memory::StoreId::SystemRom, ipl);
        for id in generation.required_peripherals() {
            builder.peripheral(*id, Box::new(utils::Latch::default()));
        }
        let machine = builder.build().map_err(|e| JsError::new(&e.to_string()))?;

        Ok(Self(machine))
    }

    pub fn reset(&mut self) -> Result<String, JsError> {
        let effects = self.0.reset();
        serde_json::to_string(&effects).map_err(|e| JsError::new(&e.to_string()))
    }

    pub fn read(&mut self, address: u32, width: u32) -> Result<u32, JsError> {
        Ok(self.0.read(AddressSpace::Program, address, js_width(width)?))
    }

    /// Returns the emitted effects as JSON.
    pub fn write(&mut self, address: u32, width: u32, value: u32) -> Result<String, JsError> {
        let width = js_width(width)?;
        let effects = self
            .0
            .write(AddressSpace::Program, address, width, value, width.full_mask());
        serde_json::to_string(&effects).map_err(|e| JsError::new(&e.to_string()))
    }

    pub fn input(&mut self, port: u32, width: u32) -> Result<u32, JsError> {
        Ok(self.0.read(AddressSpace::Io, port, js_width(width)?))
    }

    pub fn output(&mut self, port: u32, width: u32, value: u32) -> Result<String, JsError> {
        let width = js_width(width)?;
        let effects = self
            .0
            .write(AddressSpace::Io, port, width, value, width.full_mask());
        serde_json::to_string(&effects).map_err(|e| JsError::new(&e.to_string()))
    }

    #[wasm_bindgen(js_name = saveState)]
    pub fn save_state(&self) -> Result<String, JsError> {
        self.0.save_state().map_err(|e| JsError::new(&e.to_string()))
    }

    #[wasm_bindgen(js_name = loadState)]
    pub fn load_state(&mut self, state: &str) -> Result<(), JsError> {
        self.0
            .load_state(state)
            .map_err(|e| JsError::new(&e.to_string()))
    }
}
