//! OBD-II PID table and response extraction
//!
//! Defines the service-01 PIDs the client polls, their decode formulas,
//! and the extractor that locates a PID reply inside a tokenized frame.

use serde::{Deserialize, Serialize};

/// Positive-response prefix for service 01 ("request current data").
pub const LIVE_DATA_MODE: &str = "41";

/// Supported-PIDs probe issued after adapter initialization.
pub const SUPPORTED_PIDS_PROBE: &str = "0100";

/// Service-01 parameters the client knows how to request and decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pid {
    /// Calculated engine load (PID 04)
    EngineLoad,

    /// Intake manifold absolute pressure (PID 0B)
    IntakeManifoldPressure,

    /// Engine RPM (PID 0C)
    EngineRpm,

    /// Vehicle speed (PID 0D)
    VehicleSpeed,

    /// Mass air flow rate (PID 10)
    MafFlowRate,

    /// Engine fuel rate (PID 5E)
    FuelRate,
}

impl Pid {
    /// Two-hex-digit PID code as it appears on the wire.
    pub fn hex(&self) -> &'static str {
        match self {
            Pid::EngineLoad => "04",
            Pid::IntakeManifoldPressure => "0B",
            Pid::EngineRpm => "0C",
            Pid::VehicleSpeed => "0D",
            Pid::MafFlowRate => "10",
            Pid::FuelRate => "5E",
        }
    }

    /// Outbound request string (mode 01 + PID).
    pub fn request(&self) -> String {
        format!("01{}", self.hex())
    }

    /// Total expected response tokens: mode + PID + data bytes.
    pub fn response_tokens(&self) -> usize {
        match self {
            Pid::EngineRpm | Pid::MafFlowRate | Pid::FuelRate => 4,
            Pid::EngineLoad | Pid::IntakeManifoldPressure | Pid::VehicleSpeed => 3,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Pid::EngineLoad => "Engine Load",
            Pid::IntakeManifoldPressure => "Intake Manifold Pressure",
            Pid::EngineRpm => "Engine RPM",
            Pid::VehicleSpeed => "Vehicle Speed",
            Pid::MafFlowRate => "MAF Flow Rate",
            Pid::FuelRate => "Fuel Rate",
        }
    }

    /// Measurement unit of the decoded value.
    pub fn unit(&self) -> &'static str {
        match self {
            Pid::EngineLoad => "%",
            Pid::IntakeManifoldPressure => "kPa",
            Pid::EngineRpm => "rpm",
            Pid::VehicleSpeed => "km/h",
            Pid::MafFlowRate => "g/s",
            Pid::FuelRate => "L/h",
        }
    }

    /// Look up a PID from a 4-hex-digit request string such as "010C".
    pub fn from_request(request: &str) -> Option<Pid> {
        let code = request.strip_prefix("01")?;
        [
            Pid::EngineLoad,
            Pid::IntakeManifoldPressure,
            Pid::EngineRpm,
            Pid::VehicleSpeed,
            Pid::MafFlowRate,
            Pid::FuelRate,
        ]
        .into_iter()
        .find(|pid| pid.hex() == code)
    }

    /// Decode the data tokens (mode and PID already stripped) into a
    /// physical value. Returns `None` when a token is not valid hex or
    /// too few data bytes are present.
    pub fn decode(&self, data: &[String]) -> Option<f64> {
        let byte = |idx: usize| -> Option<f64> {
            data.get(idx)
                .and_then(|token| u8::from_str_radix(token, 16).ok())
                .map(f64::from)
        };

        match self {
            // ((A*256)+B)/4
            Pid::EngineRpm => Some((byte(0)? * 256.0 + byte(1)?) / 4.0),
            // A*100/255
            Pid::EngineLoad => Some(byte(0)? * 100.0 / 255.0),
            // A kPa
            Pid::IntakeManifoldPressure => byte(0),
            // A km/h
            Pid::VehicleSpeed => byte(0),
            // ((A*256)+B)/100 g/s
            Pid::MafFlowRate => Some((byte(0)? * 256.0 + byte(1)?) / 100.0),
            // ((A*256)+B)/20 L/h
            Pid::FuelRate => Some((byte(0)? * 256.0 + byte(1)?) / 20.0),
        }
    }
}

/// Locate a PID reply inside a tokenized frame.
///
/// Scans left to right for the first aligned `mode`/`pid` token pair and
/// returns the full expected slice (mode + PID + data). Headers-on frames
/// can embed the joined 4-digit "modepid" inside a longer token instead;
/// a second pass scans token contents for that form and slices the
/// trailing data digits positionally, spilling into following tokens when
/// the data runs past the matched one. First match wins on both paths.
pub fn extract(tokens: &[String], mode: &str, pid: Pid) -> Option<Vec<String>> {
    let want = pid.response_tokens();

    for i in 0..tokens.len() {
        if tokens[i] == mode && tokens.get(i + 1).map(String::as_str) == Some(pid.hex()) {
            if i + want <= tokens.len() {
                return Some(tokens[i..i + want].to_vec());
            }
        }
    }

    // Headers-on concatenated form: "...410C1AF8..." inside one token.
    let joined = format!("{mode}{}", pid.hex());
    for (i, token) in tokens.iter().enumerate() {
        if let Some(pos) = token.find(&joined) {
            let mut digits = token[pos..].to_string();
            for follower in &tokens[i + 1..] {
                if digits.len() >= want * 2 {
                    break;
                }
                digits.push_str(follower);
            }
            if digits.len() >= want * 2 {
                return Some(
                    digits.as_bytes()[..want * 2]
                        .chunks(2)
                        .map(|pair| String::from_utf8_lossy(pair).into_owned())
                        .collect(),
                );
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_extract_aligned_match() {
        let tokens = toks(&["41", "0C", "1A", "F8"]);
        assert_eq!(
            extract(&tokens, LIVE_DATA_MODE, Pid::EngineRpm),
            Some(toks(&["41", "0C", "1A", "F8"]))
        );
    }

    #[test]
    fn test_extract_no_match_or_too_short() {
        let tokens = toks(&["41", "0D"]);
        assert_eq!(extract(&tokens, LIVE_DATA_MODE, Pid::EngineRpm), None);
    }

    #[test]
    fn test_extract_first_of_multiple_matches() {
        let tokens = toks(&["41", "0C", "1A", "F8", "41", "0C", "00", "00"]);
        assert_eq!(
            extract(&tokens, LIVE_DATA_MODE, Pid::EngineRpm),
            Some(toks(&["41", "0C", "1A", "F8"]))
        );
    }

    #[test]
    fn test_extract_skips_leading_noise() {
        let tokens = toks(&["7E", "08", "41", "0D", "28"]);
        assert_eq!(
            extract(&tokens, LIVE_DATA_MODE, Pid::VehicleSpeed),
            Some(toks(&["41", "0D", "28"]))
        );
    }

    #[test]
    fn test_extract_joined_headers_on_form() {
        // CAN header glued to the modepid; the aligned path cannot see
        // this, the contents scan must.
        let tokens = toks(&["7E806410C1AF8AA"]);
        assert_eq!(
            extract(&tokens, LIVE_DATA_MODE, Pid::EngineRpm),
            Some(toks(&["41", "0C", "1A", "F8"]))
        );
    }

    #[test]
    fn test_extract_joined_spills_into_next_token() {
        let tokens = toks(&["7E806410C1A", "F8"]);
        assert_eq!(
            extract(&tokens, LIVE_DATA_MODE, Pid::EngineRpm),
            Some(toks(&["41", "0C", "1A", "F8"]))
        );
    }

    #[test]
    fn test_decode_rpm() {
        let data = toks(&["1A", "F8"]);
        let rpm = Pid::EngineRpm.decode(&data).unwrap();
        assert!((rpm - 1726.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decode_single_byte_pids() {
        assert_eq!(Pid::VehicleSpeed.decode(&toks(&["28"])), Some(40.0));
        assert_eq!(Pid::IntakeManifoldPressure.decode(&toks(&["3C"])), Some(60.0));
        let load = Pid::EngineLoad.decode(&toks(&["5A"])).unwrap();
        assert!((load - 35.294117647058826).abs() < 1e-9);
    }

    #[test]
    fn test_decode_fuel_rate() {
        // 41 5E 02 1C -> 0x021C / 20 = 27.0 L/h
        assert_eq!(Pid::FuelRate.decode(&toks(&["02", "1C"])), Some(27.0));
    }

    #[test]
    fn test_decode_rejects_bad_hex() {
        assert_eq!(Pid::VehicleSpeed.decode(&toks(&["ZZ"])), None);
        assert_eq!(Pid::EngineRpm.decode(&toks(&["1A"])), None);
    }

    #[test]
    fn test_from_request() {
        assert_eq!(Pid::from_request("010C"), Some(Pid::EngineRpm));
        assert_eq!(Pid::from_request("015E"), Some(Pid::FuelRate));
        assert_eq!(Pid::from_request("0100"), None);
        assert_eq!(Pid::from_request("ATZ"), None);
    }
}
