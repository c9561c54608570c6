use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{FuelType, NewReading};

/// Account → property → meter point → meter hierarchy. Fetched fresh for every
/// request; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Property {
    #[serde(default, deserialize_with = "null_as_default")]
    pub electricity_meter_points: Vec<ElectricityMeterPoint>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gas_meter_points: Vec<GasMeterPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricityMeterPoint {
    pub mpan: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meters: Vec<Meter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasMeterPoint {
    pub mprn: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meters: Vec<Meter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub serial_number: String,
}

/// One physical meter that can be asked for consumption.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeterRef {
    pub account_number: String,
    pub fuel_type: FuelType,
    /// MPAN for electricity, MPRN for gas.
    pub meter_point: String,
    pub serial_number: String,
}

impl Topology {
    /// Every meter on the account: electricity first, then gas, in property order.
    pub fn meters(&self) -> Vec<MeterRef> {
        let mut out = Vec::new();
        for property in &self.properties {
            for point in &property.electricity_meter_points {
                out.extend(point.meters.iter().map(|m| MeterRef {
                    account_number: self.number.clone(),
                    fuel_type: FuelType::Electricity,
                    meter_point: point.mpan.clone(),
                    serial_number: m.serial_number.clone(),
                }));
            }
        }
        for property in &self.properties {
            for point in &property.gas_meter_points {
                out.extend(point.meters.iter().map(|m| MeterRef {
                    account_number: self.number.clone(),
                    fuel_type: FuelType::Gas,
                    meter_point: point.mprn.clone(),
                    serial_number: m.serial_number.clone(),
                }));
            }
        }
        out
    }
}

/// A consumption interval as returned by the provider, normalised to UTC.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawReading {
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    #[serde(deserialize_with = "de_decimal")]
    pub consumption: f64,
}

impl RawReading {
    pub fn into_new_reading(self, fuel_type: FuelType) -> NewReading {
        NewReading {
            fuel_type,
            interval_start: self.interval_start,
            interval_end: self.interval_end,
            consumption: self.consumption,
        }
    }
}

/// Provider decimals arrive as JSON numbers (REST) or strings (GraphQL `Decimal`).
pub(crate) fn de_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
