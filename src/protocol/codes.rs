//! Error code tables reported after a negative acknowledgement (manual p. 97).
//!
//! The instrument answers `ERR`-style payloads as two decimal bitmasks. Only the
//! single-bit values (and zero) listed here are known.

/// System error bitmask values.
pub static SYSTEM_ERRORS: &[(u32, &str)] = &[
    (0, "No error"),
    (1, "Watchdog has responded"),
    (2, "Task fail error"),
    (4, "IDCX idle error"),
    (8, "Stack overflow error"),
    (16, "EPROM error"),
    (32, "RAM error"),
    (64, "EEPROM error"),
    (128, "Key error"),
    (4096, "Syntax error"),
    (8192, "Inadmissible parameter"),
    (16384, "No hardware"),
    (32768, "Fatal error"),
];

/// Gauge error bitmask values.
pub static GAUGE_ERRORS: &[(u32, &str)] = &[
    (0, "No error"),
    (1, "Sensor 1: Measurement error"),
    (2, "Sensor 2: Measurement error"),
    (4, "Sensor 3: Measurement error"),
    (8, "Sensor 4: Measurement error"),
    (16, "Sensor 5: Measurement error"),
    (32, "Sensor 6: Measurement error"),
    (512, "Sensor 1: Identification error"),
    (1024, "Sensor 2: Identification error"),
    (2048, "Sensor 3: Identification error"),
    (4096, "Sensor 4: Identification error"),
    (8192, "Sensor 5: Identification error"),
    (16384, "Sensor 6: Identification error"),
];

fn lookup(table: &'static [(u32, &'static str)], code: i64) -> Option<&'static str> {
    let code = u32::try_from(code).ok()?;
    table
        .iter()
        .find(|(value, _)| *value == code)
        .map(|(_, name)| *name)
}

/// Name of a system error code. Negative codes are never known.
pub fn system_error_name(code: i64) -> Option<&'static str> {
    lookup(SYSTEM_ERRORS, code)
}

/// Name of a gauge error code.
pub fn gauge_error_name(code: i64) -> Option<&'static str> {
    lookup(GAUGE_ERRORS, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(system_error_name(0), Some("No error"));
        assert_eq!(system_error_name(8192), Some("Inadmissible parameter"));
        assert_eq!(gauge_error_name(1024), Some("Sensor 2: Identification error"));
    }

    #[test]
    fn combined_bitmasks_are_not_in_the_tables() {
        assert_eq!(system_error_name(3), None);
        assert_eq!(gauge_error_name(64), None);
        assert_eq!(system_error_name(-1), None);
        assert_eq!(gauge_error_name(i64::from(u32::MAX) + 1), None);
    }
}
