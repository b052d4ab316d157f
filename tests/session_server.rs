mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Client, spawn_server, test_config};
use session_relay::error::StartupError;
use session_relay::logger::{LogModule, LogPipeline};
use session_relay::server::Server;
use session_relay::server::command::{
    DIAGNOSTIC_MUTED, HELP_TEXT, NO_OTHER_SESSIONS, REJECT_NOTICE, SHUTDOWN_NOTICE,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn welcome_assigns_ids_and_list_excludes_caller() {
    let server = spawn_server(test_config(10)).await;

    let (mut alice, welcome) = Client::join(server.addr, "Alice").await;
    assert!(welcome.contains("Alice"), "welcome: {}", welcome);
    assert!(welcome.contains('1'), "welcome: {}", welcome);

    let (bob, welcome) = Client::join(server.addr, "Bob").await;
    assert!(welcome.contains("Bob"));
    assert!(welcome.contains('2'));

    let listing = alice.request("list").await;
    assert_eq!(listing, format!("Other sessions: [2] {}", bob.local_addr));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_when_alone_says_so() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    assert_eq!(alice.request("list").await, NO_OTHER_SESSIONS);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_server_rejects_without_registering() {
    let server = spawn_server(test_config(1)).await;
    let (_alice, _) = Client::join(server.addr, "Alice").await;

    let mut bob = Client::connect(server.addr).await;
    assert_eq!(bob.recv().await.as_deref(), Some(REJECT_NOTICE));
    assert_eq!(bob.recv().await, None);

    assert_eq!(server.registry.len(), 1);
    let log = server.wait_for_log("server full").await;
    assert!(log.contains("[NOTICE] Rejected connection from"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn echo_repeats_input_byte_for_byte() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    let first = alice.request("  hello,  world ").await;
    let second = alice.request("  hello,  world ").await;
    assert_eq!(first, "Server echo:   hello,  world ");
    assert_eq!(first, second);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn help_is_not_echoed() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    assert_eq!(alice.request("help").await, HELP_TEXT);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_are_case_sensitive() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    assert_eq!(alice.request("QUIT").await, "Server echo: QUIT");
    assert_eq!(server.registry.len(), 1);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_message_is_truncated() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    let long = "x".repeat(3000);
    let reply = alice.request(&long).await;
    assert_eq!(reply, format!("Server echo: {}", "x".repeat(1024)));

    // the rest of the long line was dropped, not treated as new messages
    assert_eq!(alice.request("after").await, "Server echo: after");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_trigger_logs_once_and_session_continues() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    let reply = alice.request("error").await;
    assert_eq!(reply, "Error: Diagnostic error triggered by session 1 (Alice)");

    // still active
    assert_eq!(alice.request("ping").await, "Server echo: ping");
    assert_eq!(server.registry.len(), 1);

    let log = server.log_contents();
    let error_lines: Vec<_> = log.lines().filter(|l| l.contains("] [ERROR] ")).collect();
    assert_eq!(error_lines.len(), 1);
    assert!(error_lines[0].contains("Diagnostic error triggered by session 1 (Alice)"));

    let after = log.split("Stack trace:\n").nth(1).expect("stack trace block");
    assert!(!after.trim().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quit_says_goodbye_and_deregisters() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;
    let (_bob, _) = Client::join(server.addr, "Bob").await;

    assert_eq!(alice.request("exit").await, "Goodbye, Alice!");
    assert_eq!(alice.recv().await, None);

    server.wait_for_sessions(1).await;
    let log = server
        .wait_for_log("Session 1 (Alice) left voluntarily; 1 session(s) remain")
        .await;
    assert!(log.contains("[INFO] Session 1 (Alice) connected from"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_disconnect_deregisters() {
    let server = spawn_server(test_config(10)).await;
    let (alice, _) = Client::join(server.addr, "Alice").await;
    assert_eq!(server.registry.len(), 1);

    drop(alice);

    server.wait_for_sessions(0).await;
    server
        .wait_for_log("Session 1 (Alice) disconnected; 0 session(s) remain")
        .await;

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_name_closes_without_logging() {
    let server = spawn_server(test_config(10)).await;

    let mut nameless = Client::connect(server.addr).await;
    nameless.send("").await;
    assert_eq!(nameless.recv().await, None);

    server.wait_for_sessions(0).await;
    let log = server.stop().await;
    assert!(!log.contains("connected from"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_closes_idle_sessions() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;
    let (mut bob, _) = Client::join(server.addr, "Bob").await;

    let registry = server.registry.clone();
    let log = server.stop().await;

    assert_eq!(alice.recv().await.as_deref(), Some(SHUTDOWN_NOTICE));
    assert_eq!(alice.recv().await, None);
    assert_eq!(bob.recv().await.as_deref(), Some(SHUTDOWN_NOTICE));
    assert_eq!(bob.recv().await, None);

    assert!(registry.is_empty());
    assert!(log.contains("closed by server shutdown"));
    assert!(log.contains("[INFO] Server stopped"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ids_are_not_reused_after_disconnect() {
    let server = spawn_server(test_config(10)).await;

    let (mut alice, _) = Client::join(server.addr, "Alice").await;
    alice.request("quit").await;
    server.wait_for_sessions(0).await;

    let (_carol, welcome) = Client::join(server.addr, "Carol").await;
    assert!(welcome.contains("session 2"), "welcome: {}", welcome);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn diagnostic_trigger_replies_when_error_logging_is_off() {
    let server = spawn_server(test_config(10)).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    server.pipeline.set_module_enabled(LogModule::Network, false);
    assert_eq!(alice.request("error").await, DIAGNOSTIC_MUTED);
    assert_eq!(alice.request("ping").await, "Server echo: ping");

    let log = server.stop().await;
    assert!(!log.contains("[ERROR]"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_reset_is_a_read_failure() {
    let server = spawn_server(test_config(10)).await;
    let (alice, _) = Client::join(server.addr, "Alice").await;

    alice.reset();

    server.wait_for_sessions(0).await;
    let log = server.wait_for_log("Session 1 (Alice) read failed").await;
    let warnings: Vec<_> = log
        .lines()
        .filter(|l| l.contains("] [WARNING] Session 1 (Alice) read failed"))
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].ends_with("0 session(s) remain"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_reaches_session_blocked_on_write() {
    let mut config = test_config(10);
    config.shutdown_grace_ms = 1000;
    let server = spawn_server(config).await;
    let (mut alice, _) = Client::join(server.addr, "Alice").await;

    // never read the echoes, so the server's writes back up
    alice.flood(&"x".repeat(1000), Duration::from_secs(2)).await;
    assert_eq!(server.registry.len(), 1);

    let registry = server.registry.clone();
    let log = server.stop().await;

    assert!(registry.is_empty());
    assert!(log.contains("Session 1 (Alice) closed by server shutdown; 0 session(s) remain"));
}

#[tokio::test]
async fn bind_conflict_is_a_startup_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let dir = tempfile::tempdir().unwrap();
    let pipeline = Arc::new(LogPipeline::open(dir.path().join("bind.log")).unwrap());

    let mut config = test_config(10);
    config.port = port;

    match Server::start(config, pipeline).await {
        Err(StartupError::AddressInUse { addr, .. }) => {
            assert_eq!(addr, format!("127.0.0.1:{}", port));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("bind should have failed"),
    }
}
