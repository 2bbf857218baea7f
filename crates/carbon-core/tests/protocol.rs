//! Tests for the ELM327 protocol engine public API

#[cfg(test)]
mod tests {
    use carbon_core::protocol::frame::{ecu_not_ready, tokenize, ReceiveBuffer};
    use carbon_core::protocol::pid::extract;
    use carbon_core::protocol::{AdapterProfile, CommandQueue, Pid};
    use carbon_core::telemetry::{AlignedSession, SessionRecorder};
    use carbon_core::uplink::{SampleResponse, SessionPayload};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    /// Route library tracing through the test harness, filtered by
    /// `RUST_LOG`. Safe to call from every test.
    fn init_tracing() {
        use std::sync::Once;
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    /// Drive the poll batch through the queue and parse each reply the
    /// way the session does, end to end over the public API.
    #[test]
    fn test_poll_cycle_decodes_every_pid() {
        init_tracing();
        let profile = AdapterProfile::veepeak();
        let mut queue = CommandQueue::new();
        let mut buffer = ReceiveBuffer::new();
        queue.enqueue(profile.pid_requests());

        // Adapter replies, one prompt-terminated frame per command, with
        // the speed reply split across two notifications.
        let notifications = [
            "41 0C 1A F8\r\r>",
            "41 04 5A\r\r>",
            "41 0B 3C\r\r>",
            "41 0D ",
            "28\r\r>",
        ];

        let mut decoded = Vec::new();
        let mut notifications = notifications.iter();
        while let Some(request) = queue.advance() {
            let pid = Pid::from_request(&request).unwrap();
            loop {
                let chunk = notifications.next().unwrap();
                let frames = buffer.push(chunk);
                if frames.is_empty() {
                    continue;
                }
                assert_eq!(frames.len(), 1);
                queue.complete();
                let tokens = tokenize(&frames[0]);
                let matched = extract(&tokens, "41", pid).unwrap();
                decoded.push((pid, pid.decode(&matched[2..]).unwrap()));
                break;
            }
        }

        assert!(queue.is_idle());
        assert_eq!(
            decoded,
            vec![
                (Pid::EngineRpm, 1726.0),
                (Pid::EngineLoad, 35.294117647058826),
                (Pid::IntakeManifoldPressure, 60.0),
                (Pid::VehicleSpeed, 40.0),
            ]
        );
    }

    #[test]
    fn test_concatenated_headers_on_frame_still_decodes() {
        init_tracing();
        let tokens = tokenize("410C1AF8");
        let matched = extract(&tokens, "41", Pid::EngineRpm).unwrap();
        assert_eq!(matched, vec!["41", "0C", "1A", "F8"]);
        assert_eq!(Pid::EngineRpm.decode(&matched[2..]), Some(1726.0));
    }

    #[test]
    fn test_not_ready_frames_are_flagged_not_decoded() {
        init_tracing();
        let frame = "SEARCHING...\r";
        assert!(ecu_not_ready(frame));
        let tokens = tokenize(frame);
        assert!(extract(&tokens, "41", Pid::EngineRpm).is_none());
    }

    #[test]
    fn test_recorder_alignment_survives_uplink_conversion() {
        init_tracing();
        let mut recorder = SessionRecorder::new();
        recorder.start();
        let at = Utc.with_ymd_and_hms(2025, 10, 25, 17, 30, 0).unwrap();

        // Three full cycles, then a cycle where the speed reply is lost.
        for i in 0..4 {
            let at = at + chrono::Duration::seconds(i);
            recorder.record(Pid::EngineRpm, "41 0C 1A F8", at);
            recorder.record(Pid::EngineLoad, "41 04 5A", at);
            recorder.record(Pid::IntakeManifoldPressure, "41 0B 3C", at);
            if i < 3 {
                recorder.record(Pid::VehicleSpeed, "41 0D 28", at);
            }
        }

        let aligned: AlignedSession = recorder.stop().unwrap();
        assert_eq!(aligned.sample_count(), 3);

        let payload = SessionPayload::from(aligned);
        assert_eq!(payload.session_data.sample_count, 3);
        assert_eq!(payload.session_data.rpm_hex_array.len(), 3);
        assert_eq!(payload.session_data.speed_hex_array.len(), 3);
        assert_eq!(
            payload.session_data.timestamps[0],
            "2025-10-25T17:30:00Z"
        );
    }

    #[test]
    fn test_sample_response_mixed_emission_encodings() {
        init_tracing();
        let body = r#"{
            "parsed": {"rpm": {"value": 1726.0}},
            "emissions": {"fuel_lph": "2.5", "co2_kg_per_hr": 5.87}
        }"#;
        let response: SampleResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.parsed.unwrap().rpm.unwrap().value, 1726.0);
        let emissions = response.emissions.unwrap();
        assert_eq!(emissions.fuel_lph, Some(2.5));
        assert_eq!(emissions.co2_kg_per_hr, Some(5.87));
    }
}
