// Configuration errors and runtime access diagnostics

use thiserror::Error;

use crate::{generation::Generation, memory::StoreId, peripheral::PeripheralId, AddressSpace};

/// Problems detected while building a machine. These abort construction
/// before any bus cycle is dispatched.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{generation:?} requires peripheral {id:?} but none was supplied")]
    MissingPeripheral {
        generation: Generation,
        id: PeripheralId,
    },
    #[error("image for {store:?} is {size:#x} bytes, region holds {capacity:#x}")]
    RomTooLarge {
        store: StoreId,
        size: usize,
        capacity: usize,
    },
    #[error("{store:?} is not a ROM region on {generation:?}")]
    NotARom {
        store: StoreId,
        generation: Generation,
    },
    #[error("invalid RAM size {size:#x} for {generation:?}")]
    RamSize { size: usize, generation: Generation },
    #[error("IDE channel {0} does not exist")]
    IdeChannel(usize),
}

/// Conditions recovered inside a single dispatch call. None of these stop
/// the machine; they are traced and kept in a bounded history so firmware
/// probing can be inspected afterwards.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessDiagnostic {
    #[error("unmapped {space:?} access at {address:#x}")]
    UnmappedAccess { space: AddressSpace, address: u32 },
    #[error("undocumented port {address:#x}: {detail}")]
    UndocumentedPortAccess { address: u32, detail: String },
    #[error("mode combination at {address:#x}: {kept} claims the access, {discarded} discarded")]
    InconsistentModeCombination {
        address: u32,
        kept: &'static str,
        discarded: &'static str,
    },
    #[error("{what} not installed (access at {address:#x})")]
    MissingDependency { address: u32, what: String },
}
