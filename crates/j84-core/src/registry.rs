//! Parameter registry
//!
//! Per-run store of discovered modules and the SPNs they support. The
//! registry is owned by the part runner; step controllers get a mutable
//! borrow for the duration of a step and rules only ever see `&self`.
//! All mutation goes through the methods below.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::models::{ModuleRecord, SupportedSpn, MAX_SPN};

/// Result of applying a DM24 response to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportUpdate {
    /// First DM24 seen for the module
    Created,
    /// A newer DM24 replaced the previous SPN set
    Replaced,
    /// Same response delivered again (equal received ordinal)
    Duplicate,
    /// Response older than the one already applied; ignored
    Stale,
}

/// In-memory registry of modules keyed by source address
#[derive(Debug, Default, Clone)]
pub struct ParameterRegistry {
    modules: BTreeMap<u8, ModuleRecord>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for `record.address`
    pub fn put_module(&mut self, record: ModuleRecord) {
        debug!(address = record.address, obd = record.obd, "Registry put module");
        self.modules.insert(record.address, record);
    }

    pub fn get_module(&self, address: u8) -> RegistryResult<&ModuleRecord> {
        self.modules
            .get(&address)
            .ok_or(RegistryError::ModuleNotFound(address))
    }

    pub fn contains(&self, address: u8) -> bool {
        self.modules.contains_key(&address)
    }

    /// Create the record if it does not exist yet
    pub fn discover(&mut self, address: u8) -> &ModuleRecord {
        self.modules.entry(address).or_insert_with(|| {
            debug!(address, "Registry discovered module");
            ModuleRecord::new(address)
        })
    }

    /// Record the DM5 OBD compliance byte for a module
    pub fn set_obd(&mut self, address: u8, obd: bool, compliance: Option<u8>) {
        let record = self
            .modules
            .entry(address)
            .or_insert_with(|| ModuleRecord::new(address));
        record.obd = obd;
        record.obd_compliance = compliance;
    }

    /// Apply a DM24 response. The SPN set is replaced wholesale, never merged.
    pub fn update_supported_spns(
        &mut self,
        address: u8,
        spns: Vec<SupportedSpn>,
        ordinal: u64,
    ) -> RegistryResult<SupportUpdate> {
        if let Some(bad) = spns.iter().find(|s| s.spn > MAX_SPN) {
            return Err(RegistryError::InvalidSpn(bad.spn));
        }

        let record = self
            .modules
            .entry(address)
            .or_insert_with(|| ModuleRecord::new(address));

        let update = match record.support_ordinal {
            None => SupportUpdate::Created,
            Some(previous) if ordinal == previous => SupportUpdate::Duplicate,
            Some(previous) if ordinal < previous => SupportUpdate::Stale,
            Some(_) => SupportUpdate::Replaced,
        };

        if matches!(update, SupportUpdate::Created | SupportUpdate::Replaced) {
            record.set_supported_spns(spns);
            record.support_ordinal = Some(ordinal);
        }

        debug!(address, ordinal, ?update, "Registry applied DM24");
        Ok(update)
    }

    /// All known addresses, ascending
    pub fn addresses(&self) -> Vec<u8> {
        self.modules.keys().copied().collect()
    }

    /// Addresses of OBD modules, ascending
    pub fn obd_addresses(&self) -> Vec<u8> {
        self.modules
            .values()
            .filter(|m| m.obd)
            .map(|m| m.address)
            .collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    pub fn obd_modules(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values().filter(|m| m.obd)
    }

    pub fn validation_spns(&self, address: u8) -> RegistryResult<Vec<u32>> {
        Ok(self.get_module(address)?.validation_spns())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Forget everything; used between runs
    pub fn clear(&mut self) {
        self.modules.clear();
    }
}
