//! Deterministic [`ConsumptionProvider`] for tests.
//!
//! [`StubProvider`] serves a fixed topology and per-meter readings without any
//! network access, and can be told to fail for chosen meters.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{ElectricityMeterPoint, GasMeterPoint, Meter, Property};
use super::{ConsumptionProvider, MeterRef, ProviderError, RawReading, Topology};

pub struct StubProvider {
    topology: Option<Topology>,
    readings: HashMap<String, Vec<RawReading>>,
    failing: HashSet<String>,
    consumption_calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology: Some(topology),
            readings: HashMap::new(),
            failing: HashSet::new(),
            consumption_calls: AtomicUsize::new(0),
        }
    }

    /// Every topology request fails with a 503.
    pub fn unavailable() -> Self {
        Self {
            topology: None,
            readings: HashMap::new(),
            failing: HashSet::new(),
            consumption_calls: AtomicUsize::new(0),
        }
    }

    /// Readings served for the meter with this serial number.
    pub fn with_readings(mut self, serial_number: &str, readings: Vec<RawReading>) -> Self {
        self.readings.insert(serial_number.to_string(), readings);
        self
    }

    /// Consumption requests for this serial number fail.
    pub fn with_failure(mut self, serial_number: &str) -> Self {
        self.failing.insert(serial_number.to_string());
        self
    }

    pub fn consumption_calls(&self) -> usize {
        self.consumption_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsumptionProvider for StubProvider {
    async fn get_account_topology(&self, _account_number: &str) -> Result<Topology, ProviderError> {
        self.topology.clone().ok_or(ProviderError::Status {
            status: 503,
            body: "service unavailable".into(),
        })
    }

    async fn get_consumption(
        &self,
        meter: &MeterRef,
        period_from: DateTime<Utc>,
        period_to: DateTime<Utc>,
    ) -> Result<Vec<RawReading>, ProviderError> {
        self.consumption_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&meter.serial_number) {
            return Err(ProviderError::Status {
                status: 502,
                body: format!("meter {} unavailable", meter.serial_number),
            });
        }

        Ok(self
            .readings
            .get(&meter.serial_number)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| r.interval_start >= period_from && r.interval_start < period_to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// One property with the given electricity `(mpan, serials)` and gas
/// `(mprn, serials)` meter points.
pub fn topology(
    account_number: &str,
    electricity: &[(&str, &[&str])],
    gas: &[(&str, &[&str])],
) -> Topology {
    let meters = |serials: &[&str]| {
        serials
            .iter()
            .map(|s| Meter {
                serial_number: s.to_string(),
            })
            .collect()
    };

    Topology {
        number: account_number.to_string(),
        properties: vec![Property {
            electricity_meter_points: electricity
                .iter()
                .map(|(mpan, serials)| ElectricityMeterPoint {
                    mpan: mpan.to_string(),
                    meters: meters(serials),
                })
                .collect(),
            gas_meter_points: gas
                .iter()
                .map(|(mprn, serials)| GasMeterPoint {
                    mprn: mprn.to_string(),
                    meters: meters(serials),
                })
                .collect(),
        }],
    }
}

/// Consecutive half-hour readings starting at `start`.
pub fn half_hourly(start: DateTime<Utc>, values: &[f64]) -> Vec<RawReading> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let interval_start = start + Duration::minutes(30 * i as i64);
            RawReading {
                interval_start,
                interval_end: interval_start + Duration::minutes(30),
                consumption: *value,
            }
        })
        .collect()
}
