//! Decoding of the light puck's radio advertisements.
//!
//! An advertisement is a run of `(length, type, payload)` elements where
//! `length` counts the type byte plus the payload. The puck publishes its
//! readings as 16-bit service data elements.

use std::collections::HashMap;

use crate::error::TelemetryError;

pub const SERVICE_16_BIT_DATA_TYPE: u8 = 0x16;

pub const BATTERY_SERVICE: u16 = 0x180f;
pub const TEMPERATURE_SERVICE: u16 = 0x1809;
pub const BUTTON_SERVICE: u16 = 0x1815;

/// Service id to raw value bytes.
pub type ServiceData = HashMap<u16, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub kind: u8,
    pub payload: &'a [u8],
}

/// Walks the elements of a raw advertisement. Stops quietly once fewer than
/// two bytes remain or at the first element that does not fit in what is
/// left of the buffer. A zero length byte is a one-byte element with no
/// payload.
pub fn elements(raw: &[u8]) -> impl Iterator<Item = Element<'_>> {
    let mut rest = raw;
    std::iter::from_fn(move || {
        let (&length, tail) = rest.split_first()?;
        let (&kind, _) = tail.split_first()?;
        let element_length = length as usize + 1;
        if element_length > rest.len() {
            rest = &[];
            return None;
        }
        let payload = rest.get(2..element_length).unwrap_or_default();
        rest = &rest[element_length..];
        Some(Element { kind, payload })
    })
}

pub fn parse(raw: &[u8]) -> ServiceData {
    elements(raw)
        .filter(|element| element.kind == SERVICE_16_BIT_DATA_TYPE)
        .filter_map(|element| {
            let (id, value) = element.payload.split_first_chunk::<2>()?;
            Some((u16::from_le_bytes(*id), value.to_vec()))
        })
        .collect()
}

/// Builds service data elements, the inverse of [`parse`].
pub fn encode_service_data<'a>(entries: impl IntoIterator<Item = (u16, &'a [u8])>) -> Vec<u8> {
    let mut raw = Vec::new();
    for (id, value) in entries {
        // type + id + value must fit the one-byte length
        let value = &value[..value.len().min(u8::MAX as usize - 3)];
        raw.push((value.len() + 3) as u8);
        raw.push(SERVICE_16_BIT_DATA_TYPE);
        raw.extend_from_slice(&id.to_le_bytes());
        raw.extend_from_slice(value);
    }
    raw
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    pub pressed: u8,
    pub counter: u8,
    pub checksum: u8,
}

impl ButtonState {
    pub fn expected_checksum(&self) -> u8 {
        self.pressed
            .wrapping_add(self.counter)
            .wrapping_add(0x18)
            .wrapping_add(0x15)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub battery_percent: u8,
    pub temperature_f: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuckTelemetry {
    pub sensor: SensorReading,
    pub button: ButtonState,
}

fn service<'a, const N: usize>(
    data: &'a ServiceData,
    id: u16,
) -> Result<&'a [u8; N], TelemetryError> {
    let value = data.get(&id).ok_or(TelemetryError::MissingService(id))?;
    value
        .as_slice()
        .try_into()
        .map_err(|_| TelemetryError::BadLength {
            service: id,
            expected: N,
            actual: value.len(),
        })
}

impl PuckTelemetry {
    pub fn from_service_data(data: &ServiceData) -> Result<Self, TelemetryError> {
        let battery = data
            .get(&BATTERY_SERVICE)
            .and_then(|value| value.first().copied())
            .ok_or(TelemetryError::MissingService(BATTERY_SERVICE))?;
        let [whole, tenths] = *service::<2>(data, TEMPERATURE_SERVICE)?;
        let [pressed, counter, checksum] = *service::<3>(data, BUTTON_SERVICE)?;

        Ok(PuckTelemetry {
            sensor: SensorReading {
                battery_percent: battery,
                temperature_f: (whole as f32 + tenths as f32 / 10.0) * 1.8 + 32.0,
            },
            button: ButtonState {
                pressed,
                counter,
                checksum,
            },
        })
    }
}
