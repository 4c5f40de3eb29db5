//! Decoding battery telemetry payloads from known arbitration identifiers
use byteorder::{BigEndian, ByteOrder};

/// Battery pack summary: voltage, current, state of charge/health
pub const PACK_SUMMARY: u32 = 0x12C2_1020;
/// Contactor, charge, and heater status plus pack temperatures
pub const PACK_STATUS: u32 = 0x12C2_1021;
/// Announced by the BMS, but with an unpublished payload layout
pub const PACK_RESERVED: u32 = 0x12C2_1022;

/// Every identifier the battery pack transmits on
pub const BATTERY_IDS: [u32; 3] = [PACK_SUMMARY, PACK_STATUS, PACK_RESERVED];

/// Whether the identifier belongs to the battery pack
#[must_use]
pub fn is_battery_id(canid: u32) -> bool {
    BATTERY_IDS.contains(&canid)
}

/// Recoverable payload decoding failures; the caller logs and moves on
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("data {0:?} is not valid hex")]
    MalformedHex(String),
    #[error("{canid:#010X} requires {required} data bytes, got {actual}")]
    InsufficientData {
        canid: u32,
        required: usize,
        actual: usize,
    },
}

/// A decoded battery record, keyed by the frame's arbitration identifier.
///
/// There is no shared shape across identifiers; each one carries its own
/// record type.
#[derive(Clone, Debug, PartialEq)]
pub enum Telemetry {
    Summary(PackSummary),
    Status(PackStatus),
    /// The identifier has no decode rule. Expected traffic, not an error.
    Unhandled { canid: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PackSummary {
    /// Pack voltage in the device's native step
    pub voltage: f64,
    /// Pack current in amps, negative while discharging
    pub current: f64,
    /// State of charge in percent
    pub state_of_charge: f64,
    /// State of health in percent
    pub state_of_health: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackStatus {
    pub power_contactor: ContactorState,
    pub end_of_charge: ChargeState,
    pub heater: HeaterState,
    /// BMS board temperature in °C
    pub bms_board_temp: i16,
    /// Bank 1 temperature in °C
    pub battery_bank_1_temp: i16,
    /// Bank 2 temperature in °C
    pub battery_bank_2_temp: i16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactorState {
    Open,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChargeState {
    NotEndOfCharge,
    EndOfCharge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaterState {
    NotActive,
    Active,
}

// The Display strings are the device-native spellings, kept verbatim so the
// logs read like the vendor documentation.

impl std::fmt::Display for ContactorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactorState::Open => write!(f, "open"),
            ContactorState::Closed => write!(f, "closed"),
        }
    }
}

impl std::fmt::Display for ChargeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargeState::NotEndOfCharge => write!(f, "not end of charge"),
            ChargeState::EndOfCharge => write!(f, "end of charge (Battery full)"),
        }
    }
}

impl std::fmt::Display for HeaterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaterState::NotActive => write!(f, "not active"),
            HeaterState::Active => write!(f, "active"),
        }
    }
}

/// Decode the data-byte string of a frame with the given identifier.
///
/// Identifiers without a decode rule (including [PACK_RESERVED], whose layout
/// the vendor never published) come back as [Telemetry::Unhandled].
pub fn decode(canid: u32, data_hex: &str) -> Result<Telemetry, DecodeError> {
    match canid {
        PACK_SUMMARY => decode_summary(data_hex).map(Telemetry::Summary),
        PACK_STATUS => decode_status(data_hex).map(Telemetry::Status),
        _ => Ok(Telemetry::Unhandled { canid }),
    }
}

/// Status byte 0: bit 1 is the power contactor
const CONTACTOR_MASK: u8 = 0b0000_0010;
/// Status byte 1: bit 1 is end-of-charge
const END_OF_CHARGE_MASK: u8 = 0b0000_0010;
/// Status byte 1: bit 2 is the heater
const HEATER_MASK: u8 = 0b0000_0100;

/// Temperatures are offset-encoded: 0x00 is -40 °C
const TEMP_OFFSET: i16 = 40;

fn data_bytes(canid: u32, data_hex: &str, required: usize) -> Result<Vec<u8>, DecodeError> {
    let compact: String = data_hex.split_ascii_whitespace().collect();
    let raw =
        hex::decode(&compact).map_err(|_| DecodeError::MalformedHex(data_hex.to_string()))?;
    if raw.len() < required {
        return Err(DecodeError::InsufficientData {
            canid,
            required,
            actual: raw.len(),
        });
    }
    Ok(raw)
}

fn decode_summary(data_hex: &str) -> Result<PackSummary, DecodeError> {
    let raw = data_bytes(PACK_SUMMARY, data_hex, 8)?;
    Ok(PackSummary {
        voltage: f64::from(BigEndian::read_u16(&raw[0..2])),
        current: f64::from(BigEndian::read_i16(&raw[2..4])) * 0.01,
        state_of_charge: f64::from(BigEndian::read_u16(&raw[4..6])) * 0.01,
        state_of_health: f64::from(BigEndian::read_u16(&raw[6..8])) * 0.01,
    })
}

fn decode_status(data_hex: &str) -> Result<PackStatus, DecodeError> {
    let raw = data_bytes(PACK_STATUS, data_hex, 8)?;

    let power_contactor = if raw[0] & CONTACTOR_MASK != 0 {
        ContactorState::Closed
    } else {
        ContactorState::Open
    };
    let end_of_charge = if raw[1] & END_OF_CHARGE_MASK != 0 {
        ChargeState::EndOfCharge
    } else {
        ChargeState::NotEndOfCharge
    };
    let heater = if raw[1] & HEATER_MASK != 0 {
        HeaterState::Active
    } else {
        HeaterState::NotActive
    };

    Ok(PackStatus {
        power_contactor,
        end_of_charge,
        heater,
        bms_board_temp: i16::from(raw[5]) - TEMP_OFFSET,
        battery_bank_1_temp: i16::from(raw[6]) - TEMP_OFFSET,
        battery_bank_2_temp: i16::from(raw[7]) - TEMP_OFFSET,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_scaling_and_byte_order() {
        let telemetry = decode(PACK_SUMMARY, "01 00 00 32 27 10 23 28").unwrap();
        let Telemetry::Summary(summary) = telemetry else {
            panic!("expected a summary record, got {telemetry:?}");
        };
        assert_eq!(summary.voltage, 256.0);
        assert_eq!(summary.current, 0.5);
        assert_eq!(summary.state_of_charge, 100.0);
        assert_eq!(summary.state_of_health, 90.0);
    }

    #[test]
    fn test_summary_current_is_signed() {
        // 0xFFCE is -50 as an i16, not 65486
        let telemetry = decode(PACK_SUMMARY, "0100 FFCE 2710 2710").unwrap();
        let Telemetry::Summary(summary) = telemetry else {
            panic!("expected a summary record, got {telemetry:?}");
        };
        assert_eq!(summary.current, -0.5);
    }

    #[test]
    fn test_status_bits_set() {
        let telemetry = decode(PACK_STATUS, "02 06 00 00 00 28 28 28").unwrap();
        let Telemetry::Status(status) = telemetry else {
            panic!("expected a status record, got {telemetry:?}");
        };
        assert_eq!(status.power_contactor, ContactorState::Closed);
        assert_eq!(status.end_of_charge, ChargeState::EndOfCharge);
        assert_eq!(status.heater, HeaterState::Active);
        // 0x28 is 40, dead center of the offset encoding
        assert_eq!(status.bms_board_temp, 0);
        assert_eq!(status.battery_bank_1_temp, 0);
        assert_eq!(status.battery_bank_2_temp, 0);
    }

    #[test]
    fn test_status_bits_clear() {
        let telemetry = decode(PACK_STATUS, "00 00 00 00 00 00 1E 46").unwrap();
        let Telemetry::Status(status) = telemetry else {
            panic!("expected a status record, got {telemetry:?}");
        };
        assert_eq!(status.power_contactor, ContactorState::Open);
        assert_eq!(status.end_of_charge, ChargeState::NotEndOfCharge);
        assert_eq!(status.heater, HeaterState::NotActive);
        assert_eq!(status.bms_board_temp, -40);
        assert_eq!(status.battery_bank_1_temp, -10);
        assert_eq!(status.battery_bank_2_temp, 30);
    }

    #[test]
    fn test_unknown_identifier_is_unhandled() {
        let telemetry = decode(0x123, "FF").unwrap();
        assert_eq!(telemetry, Telemetry::Unhandled { canid: 0x123 });
    }

    #[test]
    fn test_reserved_identifier_is_unhandled() {
        // 0x12C21022 is announced by the pack but has no published layout;
        // it must not be decoded as if it shared the summary layout
        let telemetry = decode(PACK_RESERVED, "01 00 00 32 27 10 23 28").unwrap();
        assert_eq!(
            telemetry,
            Telemetry::Unhandled {
                canid: PACK_RESERVED
            }
        );
    }

    #[test]
    fn test_insufficient_data() {
        let err = decode(PACK_SUMMARY, "01 00 00").unwrap_err();
        assert_eq!(
            err,
            DecodeError::InsufficientData {
                canid: PACK_SUMMARY,
                required: 8,
                actual: 3,
            }
        );
    }

    #[test]
    fn test_malformed_hex() {
        let err = decode(PACK_STATUS, "zz").unwrap_err();
        assert_eq!(err, DecodeError::MalformedHex(String::from("zz")));

        // Odd digit counts cannot split into bytes
        let err = decode(PACK_STATUS, "012").unwrap_err();
        assert_eq!(err, DecodeError::MalformedHex(String::from("012")));
    }

    #[test]
    fn test_contiguous_and_spaced_hex_are_equivalent() {
        let spaced = decode(PACK_SUMMARY, "01 00 00 32 27 10 23 28").unwrap();
        let contiguous = decode(PACK_SUMMARY, "0100003227102328").unwrap();
        assert_eq!(spaced, contiguous);
    }

    #[test]
    fn test_device_native_display_strings() {
        assert_eq!(ContactorState::Closed.to_string(), "closed");
        assert_eq!(ContactorState::Open.to_string(), "open");
        assert_eq!(
            ChargeState::EndOfCharge.to_string(),
            "end of charge (Battery full)"
        );
        assert_eq!(ChargeState::NotEndOfCharge.to_string(), "not end of charge");
        assert_eq!(HeaterState::Active.to_string(), "active");
        assert_eq!(HeaterState::NotActive.to_string(), "not active");
    }
}
