use std::fs;

use revsel::config::{Config, CONFIG_FILE};
use revsel::select::StrategyKind;

#[test]
fn config_defaults_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::load_from_repo(dir.path()).expect("defaults");

    assert_eq!(config.selection.strategy, StrategyKind::Default);
    assert_eq!(config.selection.branches, vec!["**"]);
    assert_eq!(config.selection.remotes, vec!["origin"]);
    assert_eq!(config.history.job, "default");
}

#[test]
fn config_overrides_from_toml() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let toml = r#"
[selection]
strategy = "queue"
target = "origin/master"

[history]
job = "ci-linux"
"#;
    fs::write(dir.path().join(CONFIG_FILE), toml)?;

    let config = Config::load_from_repo(dir.path())?;
    assert_eq!(config.selection.strategy, StrategyKind::Queue);
    assert_eq!(config.selection.target.as_deref(), Some("origin/master"));
    assert_eq!(config.history.job, "ci-linux");

    let options = config.strategy_options();
    assert_eq!(options.kind, StrategyKind::Queue);
    assert_eq!(options.target.as_deref(), Some("origin/master"));
    Ok(())
}

#[test]
fn malformed_config_is_a_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(CONFIG_FILE), "[selection\nstrategy = ").expect("write");
    let err = Config::load_from_repo(dir.path()).expect_err("parse error");
    assert!(err.is_config_error());
}
