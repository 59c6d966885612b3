//! Shared fixtures for the end-to-end tests
//!
//! Builds simulated vehicles on the mock transport and runners over
//! them. Payloads are chosen so a fully populated engine passes every
//! Part 1 step.

use std::sync::Arc;
use std::time::Duration;

use j84_bus::j1939::catalog::GHG_TRACKING_LIFETIME;
use j84_bus::j1939::dm1::{self, LampStatus};
use j84_bus::j1939::{dm24, dm5, pgn};
use j84_bus::transport::mock::MockTransportAdapter;
use j84_core::{FuelType, Outcome, RecordingListener, ResultsListener, Severity, SupportedSpn, VehicleInformation};
use j84_engine::{ComplianceConfig, PartRunner, StopSignal};
use parking_lot::Mutex;

pub const EEC1: u32 = 61444;
pub const EEC2: u32 = 61443;
pub const ET1: u32 = 65262;
pub const CCVS1: u32 = 65265;
pub const AMB: u32 = 65269;
pub const IC1: u32 = 65270;
pub const AT1T1I1: u32 = 65110;

/// SPNs a 2022 diesel engine has to list in DM24
pub const DIESEL_SPNS: [u32; 13] = [
    84, 91, 92, 102, 108, 110, 190, 512, 513, 1761, 12675, 12730, 12783,
];

/// A broadcast PGN with a plausible payload and its nominal period
pub fn engine_broadcasts() -> Vec<(u32, Vec<u8>, u64)> {
    vec![
        (EEC2, vec![0xFF, 0x00, 0x19, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 50),
        (EEC1, vec![0xF0, 0x7D, 0x7D, 0x40, 0x1A, 0x00, 0xF0, 0x7D], 100),
        (CCVS1, vec![0xFF, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 100),
        (IC1, vec![0xFF, 0x32, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 500),
        (AMB, vec![0xC8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 1000),
        (ET1, vec![0x5A, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 1000),
        (AT1T1I1, vec![0x7D, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 1000),
    ]
}

/// GHG tracking array payload
pub fn tracking_array(values: [u32; 6]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// DM24 listing `spns` for data stream and freeze frame
pub fn dm24_for(spns: &[u32]) -> Vec<u8> {
    let records: Vec<SupportedSpn> = spns
        .iter()
        .map(|s| SupportedSpn::new(*s, true, true, false, 2))
        .collect();
    dm24::encode(&records)
}

/// Simulated vehicle on the mock transport
pub struct SimulatedVehicle {
    pub mock: Arc<MockTransportAdapter>,
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVehicle {
    pub fn new() -> Self {
        Self {
            mock: Arc::new(MockTransportAdapter::new(0xF9)),
        }
    }

    /// An OBD module answering DM5 and DM24 and broadcasting a clean DM1
    pub fn obd_module(&self, address: u8, spns: &[u32]) -> &Self {
        self.mock.set_response(pgn::DM5, address, dm5::encode(0x13));
        self.mock.set_response(pgn::DM24, address, dm24_for(spns));
        self.mock.add_broadcast(
            pgn::DM1,
            address,
            dm1::encode(LampStatus::Off, &[], false),
            Duration::from_millis(1000),
        );
        self
    }

    /// Engine that passes every Part 1 step for a 2022 diesel
    pub fn compliant_engine(&self, address: u8) -> &Self {
        self.obd_module(address, &DIESEL_SPNS);
        for (pgn, data, period) in engine_broadcasts() {
            self.mock
                .add_broadcast(pgn, address, data, Duration::from_millis(period));
        }
        self.mock.set_response(
            GHG_TRACKING_LIFETIME,
            address,
            tracking_array([3_600_000, 1_000_000, 50_000, 48_000, 720_000, 400_000]),
        );
        self
    }

    pub fn runner(&self, config: ComplianceConfig) -> PartRunner {
        match PartRunner::new(config, self.mock.clone()) {
            Ok(runner) => runner,
            Err(e) => panic!("runner setup failed: {}", e),
        }
    }
}

/// Default configuration for a vehicle, limited to `steps` (empty: all)
pub fn config(model_year: u16, fuel: FuelType, steps: &[u8]) -> ComplianceConfig {
    let mut config = ComplianceConfig {
        vehicle: VehicleInformation::new(model_year, fuel),
        ..Default::default()
    };
    config.run.steps = steps.to_vec();
    config
}

/// Outcome messages in report order, prefixed with the severity
pub fn report(listener: &RecordingListener) -> Vec<String> {
    listener.outcomes().iter().map(|o| o.to_string()).collect()
}

/// Listener that requests a stop when a matching outcome arrives
pub struct StopOnMatch {
    pub inner: RecordingListener,
    needle: String,
    stop: Mutex<Option<StopSignal>>,
}

impl StopOnMatch {
    pub fn new(needle: &str) -> Self {
        Self {
            inner: RecordingListener::new(),
            needle: needle.to_string(),
            stop: Mutex::new(None),
        }
    }

    pub fn arm(&self, stop: StopSignal) {
        *self.stop.lock() = Some(stop);
    }
}

impl ResultsListener for StopOnMatch {
    fn on_outcome(&self, outcome: Outcome) {
        if outcome.message.contains(&self.needle) {
            if let Some(stop) = self.stop.lock().as_ref() {
                stop.stop();
            }
        }
        self.inner.on_outcome(outcome);
    }

    fn on_urgent_message(&self, message: &str, title: &str, severity: Severity, detail: &str) {
        self.inner.on_urgent_message(message, title, severity, detail);
    }

    fn on_progress(&self, message: &str) {
        self.inner.on_progress(message);
    }

    fn on_result(&self, text: &str) {
        self.inner.on_result(text);
    }
}
