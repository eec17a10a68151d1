#![cfg(feature = "file-backend")]

use futures::executor::block_on;
use rs_mqtt_auth::{
    Access, AclRequest, Credential, FileStore, Options, OrchestratorBuilder, Pbkdf2Hasher,
    SaltEncoding,
};
use std::path::PathBuf;

fn write_fixture(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rs-mqtt-auth-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn orchestrator_over_files_from_options() {
    let hash = Pbkdf2Hasher::new()
        .iterations(100)
        .salt_encoding(SaltEncoding::Utf8)
        .hash(b"testpw");
    let passwords = write_fixture("passwords", &format!("test:{hash}\n"));
    let acl = write_fixture(
        "acl",
        "pattern read devices/%c/status\nuser test\ntopic read test/topic/1\n",
    );

    let opts = Options::new()
        .with("files_password_path", passwords.to_string_lossy())
        .with("files_acl_path", acl.to_string_lossy())
        .with("hasher_salt_encoding", "utf-8");
    let orchestrator = OrchestratorBuilder::new()
        .apply_options(&opts)
        .unwrap()
        .backend(FileStore::backend_from_options(&opts).unwrap())
        .build()
        .unwrap();

    assert!(block_on(orchestrator.authenticate(&Credential::new("test", "testpw"))).is_allowed());
    assert!(
        !block_on(orchestrator.authenticate(&Credential::new("test", "wrong_password")))
            .is_allowed()
    );

    let allowed = AclRequest::new("test", "test/topic/1", "client-1", Access::Read);
    let denied = AclRequest::new("test", "test/topic/1", "client-1", Access::Write);
    let own_status = AclRequest::new("test", "devices/client-1/status", "client-1", Access::Read);
    let other_status = AclRequest::new("test", "devices/client-2/status", "client-1", Access::Read);
    assert!(block_on(orchestrator.check_acl(&allowed)).is_allowed());
    assert!(!block_on(orchestrator.check_acl(&denied)).is_allowed());
    assert!(block_on(orchestrator.check_acl(&own_status)).is_allowed());
    assert!(!block_on(orchestrator.check_acl(&other_status)).is_allowed());
}
