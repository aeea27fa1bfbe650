use gridsample::{GridArgs, GridError, RunLimit, TxnMix, Verbosity};
use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn parse(args: &[&str]) -> Result<GridArgs, GridError> {
    GridArgs::try_parse_args(std::iter::once("gridsample").chain(args.iter().copied()))
}

fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_defaults_without_options() {
    let config = parse(&[]).unwrap().load_config().unwrap();
    assert_eq!(config.database.dsn, "localhost:4000/sampledb");
    assert_eq!(config.database.uid, "appuser");
    assert_eq!(config.workload.txn_mix, TxnMix::default());
    assert_eq!(config.workload.run_limit(), RunLimit::Unlimited);
    assert!(config.workload.cleanup);
    assert_eq!(config.logging.verbosity, Verbosity::Normal);
}

#[test]
#[serial]
fn test_config_file_then_options() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "grid.toml",
        r#"
[database]
dsn = "grid1:4000/sampledb"
uid = "fileuser"

[workload]
num_transactions = 100

[workload.txn_mix]
authorize = 0
charge = 0
topup = 0
query = 100
purge = 0
"#,
    );

    let path = path.to_str().unwrap();
    let config = parse(&["-config", path, "-uid", "cliuser", "-duration", "30"])
        .unwrap()
        .load_config()
        .unwrap();
    assert_eq!(config.database.dsn, "grid1:4000/sampledb");
    assert_eq!(config.database.uid, "cliuser");
    assert_eq!(config.workload.txn_mix.query, 100);
    assert_eq!(config.workload.run_limit(), RunLimit::Duration(std::time::Duration::from_secs(30)));
}

#[test]
#[serial]
fn test_invalid_config_file_is_a_parameter_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "grid.json",
        r#"{ "workload": { "txn_mix": { "authorize": 90, "charge": 90, "topup": 0, "query": 0, "purge": 0 } } }"#,
    );
    let err = parse(&["-config", path.to_str().unwrap()])
        .unwrap()
        .load_config()
        .unwrap_err();
    assert_eq!(err.exit_status(), gridsample::ExitStatus::ParamError);
}

#[test]
#[serial]
fn test_missing_config_file() {
    let err = parse(&["-config", "/nonexistent/grid.toml"])
        .unwrap()
        .load_config()
        .unwrap_err();
    assert!(matches!(err, GridError::Configuration(_)));
}

#[test]
fn test_help_exit_status() {
    let err = parse(&["-help"]).unwrap_err();
    assert_eq!(err.exit_status().code(), 2);
}
