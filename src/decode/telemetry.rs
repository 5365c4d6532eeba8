//! Telemetry record parsing.
//!
//! Telemetry arrives as a small NUL-padded JSON object. All fields are
//! optional; a missing key means the device did not report that value in
//! this chunk. Unknown keys are ignored.

use serde::Deserialize;
use thiserror::Error;

/// Shutter position reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterState {
    /// Shutter open, sensor exposed.
    Open,
    /// Shutter closed (calibration in progress).
    Closed,
    /// State string not recognized.
    Unknown,
}

/// Flat-field-correction cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfcState {
    /// No correction running.
    Idle,
    /// Correction cycle in progress.
    Running,
    /// Correction finished.
    Complete,
    /// State string not recognized.
    Unknown,
}

/// One parsed telemetry record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    /// Battery voltage in volts.
    pub battery_voltage: Option<f64>,
    /// Battery charge in percent (0-100).
    pub battery_percent: Option<f64>,
    /// Shutter temperature in kelvin.
    pub shutter_temp_k: Option<f64>,
    /// Auxiliary sensor temperature in kelvin.
    pub aux_temp_k: Option<f64>,
    /// Shutter position.
    pub shutter: Option<ShutterState>,
    /// Flat-field-correction state.
    pub ffc: Option<FfcState>,
}

/// A telemetry chunk that could not be parsed.
///
/// Local to the chunk: the frame in progress is unaffected.
#[derive(Debug, Error)]
pub enum TelemetryDesync {
    #[error("telemetry payload is not UTF-8")]
    NotUtf8,
    #[error("telemetry payload is not a valid record: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct RawRecord {
    batt_v: Option<f64>,
    batt_pct: Option<f64>,
    #[serde(rename = "shutter_tempK")]
    shutter_temp_k: Option<f64>,
    #[serde(rename = "aux_tempK")]
    aux_temp_k: Option<f64>,
    shutter: Option<String>,
    ffc: Option<String>,
}

/// Parses one telemetry chunk.
pub fn decode(payload: &[u8]) -> Result<Telemetry, TelemetryDesync> {
    // Device pads the record with NULs; parse up to the last close brace.
    let end = payload
        .iter()
        .rposition(|&b| b == b'}')
        .map(|i| i + 1)
        .unwrap_or(payload.len());
    let text = std::str::from_utf8(&payload[..end]).map_err(|_| TelemetryDesync::NotUtf8)?;

    let raw: RawRecord = serde_json::from_str(text)?;

    Ok(Telemetry {
        battery_voltage: raw.batt_v,
        battery_percent: raw.batt_pct.filter(|p| (0.0..=100.0).contains(p)),
        shutter_temp_k: raw.shutter_temp_k,
        aux_temp_k: raw.aux_temp_k,
        shutter: raw.shutter.as_deref().map(|s| match s {
            "open" => ShutterState::Open,
            "closed" => ShutterState::Closed,
            _ => ShutterState::Unknown,
        }),
        ffc: raw.ffc.as_deref().map(|s| match s {
            "idle" => FfcState::Idle,
            "running" => FfcState::Running,
            "complete" => FfcState::Complete,
            _ => FfcState::Unknown,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_fields_parsed() {
        let payload = br#"{"batt_v":3.91,"batt_pct":73,"shutter_tempK":295.5,"aux_tempK":301.0,"shutter":"open","ffc":"idle"}"#;
        let telemetry = decode(payload).unwrap();

        assert_eq!(telemetry.battery_voltage, Some(3.91));
        assert_eq!(telemetry.battery_percent, Some(73.0));
        assert_eq!(telemetry.shutter_temp_k, Some(295.5));
        assert_eq!(telemetry.aux_temp_k, Some(301.0));
        assert_eq!(telemetry.shutter, Some(ShutterState::Open));
        assert_eq!(telemetry.ffc, Some(FfcState::Idle));
    }

    #[test]
    fn test_missing_fields_are_none() {
        let telemetry = decode(br#"{"batt_pct":50}"#).unwrap();
        assert_eq!(telemetry.battery_percent, Some(50.0));
        assert!(telemetry.battery_voltage.is_none());
        assert!(telemetry.shutter.is_none());
        assert!(telemetry.ffc.is_none());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let telemetry = decode(br#"{"batt_v":3.7,"someFutureKey":[1,2]}"#).unwrap();
        assert_eq!(telemetry.battery_voltage, Some(3.7));
    }

    #[test]
    fn test_nul_padding_trimmed() {
        let mut payload = br#"{"ffc":"running"}"#.to_vec();
        payload.resize(128, 0);
        let telemetry = decode(&payload).unwrap();
        assert_eq!(telemetry.ffc, Some(FfcState::Running));
    }

    #[test]
    fn test_unrecognized_states_map_to_unknown() {
        let telemetry = decode(br#"{"shutter":"jammed","ffc":"recalibrating"}"#).unwrap();
        assert_eq!(telemetry.shutter, Some(ShutterState::Unknown));
        assert_eq!(telemetry.ffc, Some(FfcState::Unknown));
    }

    #[test]
    fn test_out_of_range_percent_discarded() {
        let telemetry = decode(br#"{"batt_pct":140}"#).unwrap();
        assert!(telemetry.battery_percent.is_none());
    }

    #[test]
    fn test_malformed_json_is_desync() {
        assert!(matches!(
            decode(br#"{"batt_pct":}"#),
            Err(TelemetryDesync::Json(_))
        ));
    }
}
