use std::fs;

use anyhow::Result;
use attention::{build, Attention, AttentionConfig, AttentionError, AttentionKind, ParameterDType};
use candle_core::Device;

#[test]
fn toml_and_json_files_load_the_same_config() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let toml_path = dir.path().join("attention.toml");
    let json_path = dir.path().join("attention.json");
    fs::write(
        &toml_path,
        "hidden_size = 16\nunits = 16\nkernel_max_norm = 3.0\ndtype = \"f16\"\n",
    )?;
    fs::write(
        &json_path,
        r#"{ "hidden_size": 16, "units": 16, "kernel_max_norm": 3.0, "dtype": "f16" }"#,
    )?;

    let from_toml = AttentionConfig::from_path(&toml_path)?;
    let from_json = AttentionConfig::from_path(&json_path)?;
    assert_eq!(from_toml, from_json);
    assert_eq!(from_toml.dtype, ParameterDType::F16);
    assert!(from_toml.bias);

    let attention = build(AttentionKind::General, from_toml, &Device::Cpu)?;
    assert_eq!(attention.config().kernel_max_norm, 3.0);
    Ok(())
}

#[test]
fn unknown_extensions_and_missing_files_are_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let yaml = dir.path().join("attention.yaml");
    fs::write(&yaml, "hidden_size: 4\n")?;
    assert!(matches!(
        AttentionConfig::from_path(&yaml),
        Err(AttentionError::ConfigFormat(_))
    ));
    assert!(matches!(
        AttentionConfig::from_path(dir.path().join("missing.toml")),
        Err(AttentionError::Io(_))
    ));
    Ok(())
}

#[test]
fn malformed_contents_surface_as_format_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.toml");
    fs::write(&path, "hidden_size = \"eight\"\n")?;
    assert!(matches!(
        AttentionConfig::from_path(&path),
        Err(AttentionError::ConfigFormat(_))
    ));
    Ok(())
}

#[test]
fn loaded_config_is_validated_at_build_time() -> Result<()> {
    let config = AttentionConfig::from_toml_str("hidden_size = 8\nunits = 4\n")?;
    assert!(build(AttentionKind::Additive, config.clone(), &Device::Cpu).is_ok());
    assert!(matches!(
        build(AttentionKind::General, config, &Device::Cpu),
        Err(AttentionError::InvalidConfig { .. })
    ));
    Ok(())
}
