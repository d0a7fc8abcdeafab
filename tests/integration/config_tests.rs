//! Configuration files as users write them

use subflow::config::{AutoMode, Config, HintAction, KeyTag, OutputText, UnresolvedLanguage};
use subflow::error::SubflowError;
use tokio_test::{assert_err, assert_ok};

use crate::common::write_file;

#[test]
fn test_partial_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "subflow.toml",
        r#"
[translate]
dst_language = "ja"
sleep_seconds = 1.5

[join]
auto_modes = ["punct-auto", "ext-auto"]
stop_words_2 = ["but", "and"]
hints = [{ after = 4, action = "merge" }]

[output]
text = "bilingual"
style = "Top"
"#,
    );

    let config = assert_ok!(Config::from_file(&path));
    assert_eq!(config.translate.dst_language.as_deref(), Some("ja"));
    assert_eq!(config.translate.sleep_seconds, 1.5);
    assert_eq!(config.translate.max_trans_size, 4000);
    assert_eq!(config.join.auto_modes, vec![AutoMode::PunctAuto, AutoMode::ExtAuto]);
    assert_eq!(config.join.hints[0].action, HintAction::Merge);
    assert_eq!(config.join.max_join_size, 100);
    assert_eq!(config.output.text, OutputText::Bilingual);
    assert_eq!(config.output.style.as_deref(), Some("Top"));
    assert_eq!(config.regions.energy_threshold, 45);
    assert_eq!(config.language.on_unresolved, UnresolvedLanguage::Fail);
}

#[test]
fn test_incompatible_join_modes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "subflow.toml",
        "[join]\nkey_tag = \"kf\"\nauto_modes = [\"ext-auto\"]\n",
    );

    let err = assert_err!(Config::from_file(&path));
    assert!(matches!(err, SubflowError::Config(_)));
}

#[test]
fn test_saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved.toml");

    let mut config = Config::default();
    config.join.key_tag = Some(KeyTag::Ko);
    config.speech.min_confidence = 0.4;
    config.save_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.join.key_tag, Some(KeyTag::Ko));
    assert!(loaded.output.style.is_none());
    assert_eq!(loaded.speech.min_confidence, 0.4);
}
