//! Loading repository configuration from disk

use assert_matches::assert_matches;
use std::io::Write;
use vellum_core::{ErrorKind, ProtocolVersion, RepositoryConfig, VellumConfig, VellumError};

#[test]
fn loads_toml_file_and_validates() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
repository_id = "contracts"
protocol_version = "1.1"
admin_principal = "root"
max_content_length = 4096

[default_ace]
principal = "cmis:anyone"
permission = "cmis:read"
"#
    )
    .unwrap();

    let config = RepositoryConfig::load_from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.repository_id, "contracts");
    assert_eq!(config.protocol_version, ProtocolVersion::V1_1);
    assert_eq!(config.admin_principal, "root");
    assert_eq!(config.default_ace.permission, "cmis:read");
    assert!(config.inherit_acl_by_default);
}

#[test]
fn loads_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"repository_id": "json-repo"}}"#).unwrap();

    let config = RepositoryConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.repository_id, "json-repo");
}

#[test]
fn rejects_unknown_extension() {
    let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
    let err = RepositoryConfig::load_from_file(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn zero_content_limit_is_invalid() {
    let config = RepositoryConfig {
        max_content_length: 0,
        ..RepositoryConfig::default()
    };
    assert_matches!(config.validate(), Err(VellumError::InvalidArgument { .. }));
}
