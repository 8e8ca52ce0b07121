//! Lifecycle tests driving the real hello plugin through the manager
#![cfg(unix)]

use plughost::config::ManagerConfig;
use plughost::plugin::{HandshakeConfig, PluginError, PluginManager, PluginStatus, ProcessLauncher};
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const HELLO: &str = env!("CARGO_BIN_EXE_plughost-plugin-hello");

fn manager() -> PluginManager {
    PluginManager::new(ManagerConfig {
        unload_timeout_ms: 2_000,
        ..ManagerConfig::default()
    })
}

fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// An executable that runs the hello plugin, optionally under another name
fn wrapper(dir: &Path, file: &str, name: Option<&str>) -> PathBuf {
    let path = dir.join(file);
    let body = match name {
        Some(name) => format!("PLUGHOST_HELLO_NAME={name} exec \"{HELLO}\""),
        None => format!("exec \"{HELLO}\""),
    };
    write_script(&path, &body);
    path
}

/// Checks the process table where one is easy to read
fn assert_stopped(pid: u32) {
    #[cfg(target_os = "linux")]
    assert!(
        !Path::new(&format!("/proc/{pid}")).exists(),
        "plugin process {pid} is still alive"
    );
    #[cfg(not(target_os = "linux"))]
    let _ = pid;
}

#[tokio::test]
async fn load_then_execute_says_hello() {
    let manager = manager();

    let plugin = manager.load(Path::new(HELLO)).await.unwrap();
    assert_eq!(plugin.name, "hello");
    assert_eq!(plugin.version, "0.1.0");
    assert_eq!(plugin.capabilities, vec!["greet"]);
    assert_eq!(plugin.binary_path, std::path::absolute(HELLO).unwrap());
    assert_eq!(plugin.status, PluginStatus::Running);
    assert!(plugin.pid.is_some());

    let output = manager
        .execute("hello", args(&[("name", "World")]))
        .await
        .unwrap();
    assert_eq!(output, "Hello World");

    let names: Vec<_> = manager.list().await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["hello"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn application_errors_pass_through() {
    let manager = manager();
    manager.load(Path::new(HELLO)).await.unwrap();

    let err = manager
        .execute("hello", args(&[("fail", "no greeting today")]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PluginError::PluginExecution { ref name, ref message }
            if name == "hello" && message == "no greeting today"
    ));

    // The plugin keeps serving after reporting an error
    let output = manager.execute("hello", HashMap::new()).await.unwrap();
    assert_eq!(output, "Hello World");

    manager.shutdown().await;
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let dir = tempdir().unwrap();
    let first = wrapper(dir.path(), "first", None);
    let second = wrapper(dir.path(), "second", None);
    let manager = manager();

    manager.load(&first).await.unwrap();
    let err = manager.load(&second).await.unwrap_err();
    assert!(matches!(
        err,
        PluginError::DuplicatePlugin { ref name, ref existing } if name == "hello" && existing == &first
    ));

    let plugins = manager.list().await;
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].binary_path, first);

    // The original entry is untouched
    let output = manager.execute("hello", HashMap::new()).await.unwrap();
    assert_eq!(output, "Hello World");

    manager.shutdown().await;
}

#[tokio::test]
async fn unload_removes_and_stops_the_process() {
    let manager = manager();
    let plugin = manager.load(Path::new(HELLO)).await.unwrap();
    let pid = plugin.pid.unwrap();

    manager.unload("hello").await.unwrap();

    assert!(manager.list().await.is_empty());
    assert!(manager.get("hello").await.is_none());
    assert_stopped(pid);

    let err = manager.execute("hello", HashMap::new()).await.unwrap_err();
    assert!(matches!(err, PluginError::NotFound(_)));

    // Unload is not idempotent
    let err = manager.unload("hello").await.unwrap_err();
    assert!(matches!(err, PluginError::NotFound(_)));
}

#[tokio::test]
async fn reload_keeps_binary_and_replaces_process() {
    let manager = manager();
    let before = manager.load(Path::new(HELLO)).await.unwrap();

    let after = manager.reload("hello").await.unwrap();
    assert_eq!(after.name, before.name);
    assert_eq!(after.binary_path, before.binary_path);
    assert_ne!(after.pid, before.pid);

    assert_stopped(before.pid.unwrap());

    let output = manager
        .execute("hello", args(&[("name", "again")]))
        .await
        .unwrap();
    assert_eq!(output, "Hello again");

    manager.shutdown().await;
}

#[tokio::test]
async fn failed_reload_leaves_the_plugin_unloaded() {
    let dir = tempdir().unwrap();
    let path = wrapper(dir.path(), "hello", None);
    let manager = manager();
    manager.load(&path).await.unwrap();

    // The binary turns into something that is not a plugin
    write_script(&path, "exit 0");

    let err = manager.reload("hello").await.unwrap_err();
    assert!(matches!(err, PluginError::HandshakeFailed { .. }));
    assert!(manager.list().await.is_empty());

    let err = manager.reload("hello").await.unwrap_err();
    assert!(matches!(err, PluginError::NotFound(_)));
}

#[tokio::test]
async fn crash_is_isolated_to_one_plugin() {
    let dir = tempdir().unwrap();
    let alpha = wrapper(dir.path(), "alpha", Some("alpha"));
    let beta = wrapper(dir.path(), "beta", Some("beta"));

    let manager = Arc::new(manager());
    manager.load(&alpha).await.unwrap();
    manager.load(&beta).await.unwrap();

    let crashing = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute("alpha", args(&[("sleep_ms", "100"), ("crash", "7")]))
                .await
        })
    };
    let healthy = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute("beta", args(&[("sleep_ms", "300"), ("name", "B")]))
                .await
        })
    };

    let crashed = crashing.await.unwrap().unwrap_err();
    assert!(matches!(crashed, PluginError::PluginCrashed { ref name, .. } if name == "alpha"));
    assert_eq!(healthy.await.unwrap().unwrap(), "Hello B");

    // The crashed plugin stays registered, marked as crashed
    let alpha_now = manager.get("alpha").await.unwrap();
    assert_eq!(alpha_now.status, PluginStatus::Crashed);
    assert_eq!(manager.get("beta").await.unwrap().status, PluginStatus::Running);

    let err = manager.execute("alpha", HashMap::new()).await.unwrap_err();
    assert!(matches!(err, PluginError::PluginCrashed { .. }));

    // Reload brings it back
    let reloaded = manager.reload("alpha").await.unwrap();
    assert_eq!(reloaded.status, PluginStatus::Running);
    let output = manager.execute("alpha", HashMap::new()).await.unwrap();
    assert_eq!(output, "Hello World");

    manager.shutdown().await;
}

#[tokio::test]
async fn concurrent_calls_to_one_plugin_are_serialized() {
    let manager = Arc::new(manager());
    manager.load(Path::new(HELLO)).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            let who = i.to_string();
            let output = manager
                .execute("hello", args(&[("name", who.as_str())]))
                .await
                .unwrap();
            (who, output)
        }));
    }

    for task in tasks {
        let (who, output) = task.await.unwrap();
        assert_eq!(output, format!("Hello {who}"));
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn discover_loads_candidates_and_tolerates_failures() {
    let dir = tempdir().unwrap();
    wrapper(dir.path(), "a-hello", None);
    wrapper(dir.path(), "b-greeter", Some("greeter"));
    write_script(&dir.path().join("c-impostor"), "exit 0");
    std::fs::write(dir.path().join("README"), "not executable").unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();

    let manager = manager();
    let outcomes = manager.discover(dir.path()).await.unwrap();

    let paths: Vec<_> = outcomes.iter().map(|o| o.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            dir.path().join("a-hello"),
            dir.path().join("b-greeter"),
            dir.path().join("c-impostor"),
        ]
    );
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[1].result.is_ok());
    assert!(matches!(
        outcomes[2].result,
        Err(PluginError::HandshakeFailed { .. })
    ));

    let names: Vec<_> = manager.list().await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["greeter", "hello"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_everything_and_is_terminal() {
    let dir = tempdir().unwrap();
    let one = wrapper(dir.path(), "one", Some("one"));
    let two = wrapper(dir.path(), "two", Some("two"));

    let manager = manager();
    let pids: Vec<_> = [
        manager.load(&one).await.unwrap(),
        manager.load(&two).await.unwrap(),
    ]
    .into_iter()
    .filter_map(|p| p.pid)
    .collect();
    assert_eq!(pids.len(), 2);

    manager.shutdown().await;

    assert!(manager.list().await.is_empty());
    for pid in pids {
        assert_stopped(pid);
    }

    assert!(matches!(
        manager.load(&one).await.unwrap_err(),
        PluginError::ShutDown
    ));
    assert!(matches!(
        manager.execute("one", HashMap::new()).await.unwrap_err(),
        PluginError::ShutDown
    ));

    // A second shutdown is a no-op
    manager.shutdown().await;
}

#[tokio::test]
async fn plugin_refuses_a_host_with_the_wrong_cookie() {
    let handshake = HandshakeConfig {
        magic_cookie_value: "not-the-right-secret".to_string(),
        ..HandshakeConfig::default()
    };
    let manager =
        PluginManager::with_launcher(ManagerConfig::default(), handshake, ProcessLauncher);

    let err = manager.load(Path::new(HELLO)).await.unwrap_err();
    assert!(matches!(err, PluginError::HandshakeFailed { .. }));
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn protocol_mismatch_fails_the_load() {
    let handshake = HandshakeConfig {
        protocol_version: 99,
        ..HandshakeConfig::default()
    };
    let manager =
        PluginManager::with_launcher(ManagerConfig::default(), handshake, ProcessLauncher);

    let err = manager.load(Path::new(HELLO)).await.unwrap_err();
    match err {
        PluginError::HandshakeFailed { reason, .. } => {
            assert!(reason.contains("protocol version mismatch"), "{reason}")
        }
        other => panic!("expected HandshakeFailed, got {other:?}"),
    }
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn abandoned_call_does_not_shift_later_answers() {
    let manager = manager();
    manager.load(Path::new(HELLO)).await.unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        manager.execute("hello", args(&[("sleep_ms", "300"), ("name", "A")])),
    )
    .await;
    assert!(abandoned.is_err());

    for who in ["B", "C"] {
        let output = manager
            .execute("hello", args(&[("name", who)]))
            .await
            .unwrap();
        assert_eq!(output, format!("Hello {who}"));
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn oversized_request_is_refused_without_harming_the_plugin() {
    let manager = manager();
    manager.load(Path::new(HELLO)).await.unwrap();

    let huge = "x".repeat(11 * 1024 * 1024);
    let err = manager
        .execute("hello", args(&[("name", huge.as_str())]))
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::RequestTooLarge { ref name, .. } if name == "hello"));

    assert_eq!(manager.get("hello").await.unwrap().status, PluginStatus::Running);
    let output = manager.execute("hello", HashMap::new()).await.unwrap();
    assert_eq!(output, "Hello World");

    manager.shutdown().await;
}

#[tokio::test]
async fn name_stays_taken_until_unload_finishes() {
    let dir = tempdir().unwrap();
    let first = wrapper(dir.path(), "first", None);
    let second = wrapper(dir.path(), "second", None);

    let manager = Arc::new(manager());
    manager.load(&first).await.unwrap();

    // Keeps the plugin busy, so unload has to wait for the call to finish
    let busy = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute("hello", args(&[("sleep_ms", "1500")]))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let unloading = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.unload("hello").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.get("hello").await.is_none());
    let err = manager.load(&second).await.unwrap_err();
    assert!(matches!(
        err,
        PluginError::DuplicatePlugin { ref existing, .. } if existing == &first
    ));

    assert_eq!(busy.await.unwrap().unwrap(), "Hello World");
    unloading.await.unwrap().unwrap();

    let plugin = manager.load(&second).await.unwrap();
    assert_eq!(plugin.binary_path, second);

    manager.shutdown().await;
}
