//! Module (ECU) records and DM24 SPN support entries

use serde::{Deserialize, Serialize};

use super::address::{address_label, module_name};

/// Largest SPN representable in 19 bits
pub const MAX_SPN: u32 = 0x7FFFF;

/// One SPN support record from a DM24 response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedSpn {
    /// Suspect parameter number
    pub spn: u32,
    /// Supported in the data stream (broadcast or on request)
    pub data_stream: bool,
    /// Supported in the expanded freeze frame
    pub freeze_frame: bool,
    /// Supported in scaled test results (DM7/DM30)
    pub scaled_test_results: bool,
    /// SPN data length in bytes
    pub length: u8,
}

impl SupportedSpn {
    pub fn new(
        spn: u32,
        data_stream: bool,
        freeze_frame: bool,
        scaled_test_results: bool,
        length: u8,
    ) -> Self {
        Self {
            spn,
            data_stream,
            freeze_frame,
            scaled_test_results,
            length,
        }
    }

    /// Entry supported in the data stream only
    pub fn data_stream(spn: u32, length: u8) -> Self {
        Self::new(spn, true, false, false, length)
    }
}

/// Everything learned about one ECU during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// J1939 source address
    pub address: u8,
    /// Role label from the source address table
    pub label: String,
    /// Whether the module claims OBD compliance (DM5)
    pub obd: bool,
    /// Raw DM5 OBD compliance byte, when received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obd_compliance: Option<u8>,
    /// Received ordinal of the DM24 that produced `supported_spns`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_ordinal: Option<u64>,
    supported_spns: Vec<SupportedSpn>,
}

impl ModuleRecord {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            label: address_label(address).to_string(),
            obd: false,
            obd_compliance: None,
            support_ordinal: None,
            supported_spns: Vec::new(),
        }
    }

    pub fn with_obd(mut self, obd: bool) -> Self {
        self.obd = obd;
        self
    }

    pub fn with_supported_spns(mut self, spns: Vec<SupportedSpn>) -> Self {
        self.set_supported_spns(spns);
        self
    }

    /// Display name, e.g. `"Engine #1 (0)"`
    pub fn name(&self) -> String {
        module_name(self.address)
    }

    /// Engine function modules (Engine #1, Engine #2)
    pub fn is_engine(&self) -> bool {
        self.address <= 1
    }

    /// Supported SPNs, ascending by SPN
    pub fn supported_spns(&self) -> &[SupportedSpn] {
        &self.supported_spns
    }

    /// Replace the supported SPN set. The first record for each SPN wins.
    pub fn set_supported_spns(&mut self, spns: Vec<SupportedSpn>) {
        let mut spns = spns;
        spns.sort_by_key(|s| s.spn);
        spns.dedup_by_key(|s| s.spn);
        self.supported_spns = spns;
    }

    pub fn supported_spn(&self, spn: u32) -> Option<&SupportedSpn> {
        self.supported_spns
            .binary_search_by_key(&spn, |s| s.spn)
            .ok()
            .map(|idx| &self.supported_spns[idx])
    }

    /// Whether the module listed the SPN in its DM24 at all
    pub fn supports_spn(&self, spn: u32) -> bool {
        self.supported_spn(spn).is_some()
    }

    pub fn data_stream_spns(&self) -> Vec<u32> {
        self.supported_spns
            .iter()
            .filter(|s| s.data_stream)
            .map(|s| s.spn)
            .collect()
    }

    pub fn freeze_frame_spns(&self) -> Vec<u32> {
        self.supported_spns
            .iter()
            .filter(|s| s.freeze_frame)
            .map(|s| s.spn)
            .collect()
    }

    /// SPNs to verify on the data stream: data-stream and freeze-frame
    /// eligible SPNs, ascending, without duplicates
    pub fn validation_spns(&self) -> Vec<u32> {
        let mut spns: Vec<u32> = self
            .supported_spns
            .iter()
            .filter(|s| s.data_stream || s.freeze_frame)
            .map(|s| s.spn)
            .collect();
        spns.sort_unstable();
        spns.dedup();
        spns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_supported_spns_sorts_and_dedups() {
        let mut module = ModuleRecord::new(0);
        module.set_supported_spns(vec![
            SupportedSpn::data_stream(190, 2),
            SupportedSpn::data_stream(92, 1),
            SupportedSpn::new(190, false, true, false, 2),
        ]);

        let spns: Vec<u32> = module.supported_spns().iter().map(|s| s.spn).collect();
        assert_eq!(spns, vec![92, 190]);
        assert!(module.supported_spn(190).unwrap().data_stream);
    }

    #[test]
    fn test_validation_spns_union() {
        let module = ModuleRecord::new(0).with_supported_spns(vec![
            SupportedSpn::new(110, true, true, false, 1),
            SupportedSpn::new(27, false, true, false, 2),
            SupportedSpn::new(3226, false, false, true, 2),
            SupportedSpn::new(84, true, false, false, 2),
        ]);

        assert_eq!(module.validation_spns(), vec![27, 84, 110]);
        assert_eq!(module.data_stream_spns(), vec![84, 110]);
        assert_eq!(module.freeze_frame_spns(), vec![27, 110]);
    }

    #[test]
    fn test_module_name_and_engine() {
        let module = ModuleRecord::new(0);
        assert_eq!(module.name(), "Engine #1 (0)");
        assert!(module.is_engine());
        assert!(!ModuleRecord::new(3).is_engine());
    }
}
