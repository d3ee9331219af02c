#![cfg(all(unix, feature = "process"))]

mod common;

use native_integration::discovery::{paths, Browser, Scope};
use native_integration::transport::{Connector, ProcessConnector};
use native_integration::HostError;
use serde_json::json;
use serial_test::serial;
use std::fs;
use std::path::Path;

const CAT: &str = "/bin/cat";

fn write_manifest(browser: Browser, host: &str, exe: &str) {
    let path = paths::manifest_path(browser, Scope::User, host).unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let manifest = json!({
        "name": host,
        "description": "test host",
        "path": exe,
        "type": "stdio",
        "allowed_origins": ["chrome-extension://aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa/"],
    });
    fs::write(path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
}

#[tokio::test]
async fn program_port_round_trips_frames() {
    if !Path::new(CAT).exists() {
        return;
    }
    // `cat` echoes every frame back, which is all a transport test needs.
    let connector = ProcessConnector::program(CAT);
    let mut port = connector.open("com.example.echo").await.unwrap();

    let first = json!({"id": "ADG_1", "type": "init", "parameters": {"apiVersion": "1"}});
    let second = json!({"id": "ADG_2", "type": "openSettings"});
    port.send(first.clone()).unwrap();
    port.send(second.clone()).unwrap();
    assert_eq!(port.recv().await, Some(first));
    assert_eq!(port.recv().await, Some(second));

    port.close();
}

#[tokio::test]
#[serial]
async fn manifest_lookup_launches_host() {
    if !Path::new(CAT).exists() {
        return;
    }
    let (_td, _env) = common::sandbox_env();
    let host = "com.example.manifest_echo";
    write_manifest(Browser::Chrome, host, CAT);

    let connector = ProcessConnector::from_manifest(Browser::Chrome, Scope::User);
    let mut port = connector.open(host).await.unwrap();
    port.send(json!({"id": "ADG_1", "type": "getCurrentAppState"})).unwrap();
    assert_eq!(
        port.recv().await,
        Some(json!({"id": "ADG_1", "type": "getCurrentAppState"}))
    );
    port.close();
}

#[tokio::test]
#[serial]
async fn missing_manifest_is_reported() {
    let (_td, _env) = common::sandbox_env();
    let connector = ProcessConnector::from_manifest(Browser::Firefox, Scope::User);
    let err = connector.open("com.example.absent").await.unwrap_err();
    assert!(matches!(err, HostError::Manifest { .. }), "unexpected {err:?}");
}

#[tokio::test]
#[serial]
async fn manifest_for_other_host_is_rejected() {
    let (_td, _env) = common::sandbox_env();
    let host = "com.example.expected";
    write_manifest(Browser::Edge, host, CAT);
    // Same file name, different declared name.
    let path = paths::manifest_path(Browser::Edge, Scope::User, host).unwrap();
    let raw = fs::read_to_string(&path).unwrap().replace(host, "com.example.other");
    fs::write(&path, raw).unwrap();

    let connector = ProcessConnector::from_manifest(Browser::Edge, Scope::User);
    let err = connector.open(host).await.unwrap_err();
    assert!(matches!(err, HostError::Manifest { .. }), "unexpected {err:?}");
}

#[tokio::test]
async fn invalid_host_name_is_rejected_before_launch() {
    let connector = ProcessConnector::program(CAT);
    let err = connector.open("Com.Example/../host").await.unwrap_err();
    assert!(matches!(err, HostError::InvalidHostName(_)), "unexpected {err:?}");
}

#[tokio::test]
async fn unstartable_program_is_a_connect_error() {
    let connector = ProcessConnector::program("/nonexistent/native-host");
    let err = connector.open("com.example.host").await.unwrap_err();
    assert!(matches!(err, HostError::Connect { .. }), "unexpected {err:?}");
}

#[test]
#[serial]
fn manifest_path_resolves_for_known_browsers_user_scope() {
    let (_td, _env) = common::sandbox_env();
    let host = "com.example.testhost";
    for browser in Browser::ALL {
        let p = paths::manifest_path(browser, Scope::User, host).unwrap();
        let s = p.to_string_lossy();
        assert!(s.contains(host), "path should include host name: {s}");
        assert!(s.ends_with(".json"), "path should end with .json: {s}");
    }
}
