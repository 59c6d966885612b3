//! Part 1 against a recorded candump session

use std::io::Write;

use j84_core::{RecordingListener, Severity};
use j84_engine::{ComplianceConfig, PartRunner, StepState};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use tokio_test::assert_ok;

const SESSION: &str = "\
(0.000) can0 18EAFFF9#CEFE00
(0.050) can0 18FECE00#0000130000000000
(1.500) can0 18EA00F9#B6FD00
(1.560) can0 18FDB600#6E0018015B001801
";

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn replay_config(log: &NamedTempFile) -> NamedTempFile {
    write_temp(&format!(
        "[vehicle]\n\
         engine_model_year = 2022\n\
         fuel_type = \"diesel\"\n\
         \n\
         [bus]\n\
         type = \"replay\"\n\
         path = \"{}\"\n\
         \n\
         [run]\n\
         steps = [3, 4]\n",
        log.path().display()
    ))
}

#[tokio::test]
async fn test_recorded_session_findings() {
    let log = write_temp(SESSION);
    let config_file = replay_config(&log);
    let config = assert_ok!(ComplianceConfig::load(config_file.path()));
    let mut runner = assert_ok!(PartRunner::connect(config).await);
    let listener = RecordingListener::new();

    let run = runner.run(&listener).await;

    assert!(run.is_complete());
    assert_eq!(runner.registry().obd_addresses(), vec![0x00]);
    assert_eq!(runner.registry().validation_spns(0x00).unwrap(), vec![91, 110]);

    let outcomes = listener.outcomes();
    let module_findings: Vec<String> = outcomes.iter().take(3).map(|o| o.message.clone()).collect();
    assert_eq!(
        module_findings,
        vec![
            "6.1.4.2.d - SP 12675 is not included in DM24 response from Engine #1 (0)",
            "6.1.4.2.e - SP 12730 is not included in DM24 response from Engine #1 (0)",
            "6.1.4.2.h - SP 12783 is not included in DM24 response from Engine #1 (0)",
        ]
    );

    let in_section = |section: &str| {
        outcomes
            .iter()
            .filter(|o| o.section.map(|s| s.to_string()).as_deref() == Some(section))
            .count()
    };
    // 84 92 102 108 190 512 513 1761
    assert_eq!(in_section("6.1.4.2.b"), 8);
    // 92 190 512 513
    assert_eq!(in_section("6.1.4.2.c"), 4);
    assert!(outcomes.iter().all(|o| o.severity == Severity::Fail));
    assert_eq!(outcomes.len(), 15);
}

#[tokio::test]
async fn test_tool_address_traffic_in_log_is_flagged() {
    let log = write_temp(&format!("{}(1.600) can0 18FECAF9#0000FFFFFFFFFFFF\n", SESSION));
    let config_file = replay_config(&log);
    let config = assert_ok!(ComplianceConfig::load(config_file.path()));
    let mut runner = assert_ok!(PartRunner::connect(config).await);
    let listener = RecordingListener::new();

    runner.run(&listener).await;

    let warnings = listener.outcomes_with(Severity::Warn);
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "Unexpected Service Tool Message from SA 0xF9 observed. Test results uncertain."
    );
    assert_eq!(listener.urgent_messages().len(), 1);
}

#[tokio::test]
async fn test_reply_from_unaddressed_module_is_flagged() {
    let log = write_temp(
        "\
(0.000) can0 18EAFFF9#CEFE00
(0.050) can0 18FECE00#0000130000000000
(1.500) can0 18EA00F9#B6FD00
(1.560) can0 18FDB603#6E0018015B001801
",
    );
    let config_file = replay_config(&log);
    let config = assert_ok!(ComplianceConfig::load(config_file.path()));
    let mut runner = assert_ok!(PartRunner::connect(config).await);
    let listener = RecordingListener::new();

    runner.run(&listener).await;

    assert_eq!(
        listener.outcomes().iter().map(|o| o.to_string()).collect::<Vec<_>>(),
        vec![
            "WARN: Unexpected DM24 response from SA 0x03 to a request sent to Engine #1 (0) observed. Test results uncertain.",
            "FAIL: 6.1.4.2.a - No DM24 response from Engine #1 (0)",
        ]
    );
    assert_eq!(listener.urgent_messages().len(), 1);
    assert!(runner.registry().validation_spns(0x00).unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_log_fails_to_connect() {
    let log = write_temp(SESSION);
    let config_file = replay_config(&log);
    let mut config = assert_ok!(ComplianceConfig::load(config_file.path()));
    if let j84_bus::TransportConfig::Replay(replay) = &mut config.bus {
        replay.path = log.path().with_extension("missing");
    }

    assert!(PartRunner::connect(config).await.is_err());
}

#[tokio::test]
async fn test_unknown_step_in_config_is_rejected() {
    let log = write_temp(SESSION);
    let config_file = replay_config(&log);
    let mut config = assert_ok!(ComplianceConfig::load(config_file.path()));
    config.run.steps = vec![3, 99];

    assert!(PartRunner::connect(config).await.is_err());
}

#[tokio::test]
async fn test_dm1_step_on_quiet_log() {
    let log = write_temp(SESSION);
    let config_file = replay_config(&log);
    let mut config = assert_ok!(ComplianceConfig::load(config_file.path()));
    config.run.steps = vec![3, 15];
    let mut runner = assert_ok!(PartRunner::connect(config).await);
    let listener = RecordingListener::new();

    let run = runner.run(&listener).await;

    assert_eq!(run.state_of(15), Some(StepState::Completed));
    assert_eq!(
        listener.outcomes().iter().map(|o| o.message.clone()).collect::<Vec<_>>(),
        vec!["6.1.15.2.a - No DM1 was received from Engine #1 (0)".to_string()]
    );
}
