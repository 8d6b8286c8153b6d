mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use agentlink_core::config::ToolServerConfig;
use agentlink_core::managers::{Credential, ExecuteOptions, ExecutionOutcome, HttpToolTransport};
use agentlink_core::{Session, SessionSettings};
use agentlink_shared::{AuthType, LinkError};

use common::{dead_url, spawn_mock_server};

fn http_session() -> Session {
    let transport = Arc::new(HttpToolTransport::new(Duration::from_secs(5)).unwrap());
    Session::new(
        transport,
        SessionSettings {
            poll_interval: Duration::from_millis(20),
            default_timeout: Duration::from_secs(5),
        },
    )
}

#[tokio::test]
async fn test_discovery_sends_configured_bearer_token() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["search", "summarize"]);
    server.state.require_token("sk-configured");

    let session = http_session();
    let id = session
        .add_server(ToolServerConfig::new(&server.base_url).with_api_key("sk-configured"))
        .unwrap();

    let tools = session.discovery.discover(&id, None).await.unwrap();
    assert_eq!(tools.len(), 2);
    assert!(tools.iter().all(|t| t.server_id == id));
    assert_eq!(
        server.state.auth_headers(),
        vec![Some("Bearer sk-configured".to_string())]
    );
}

#[tokio::test]
async fn test_explicit_credential_overrides_configured_key() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["search"]);
    server.state.require_token("sk-explicit");

    let session = http_session();
    let id = session
        .add_server(ToolServerConfig::new(&server.base_url).with_api_key("sk-stale"))
        .unwrap();

    let explicit = Credential::bearer("sk-explicit");
    assert_eq!(
        session
            .discovery
            .discover(&id, Some(&explicit))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_non_success_status_is_connection_failure() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["search"]);
    server.state.require_token("sk-right");

    let session = http_session();
    let id = session
        .add_server(ToolServerConfig::new(&server.base_url).with_api_key("sk-wrong"))
        .unwrap();

    match session.discovery.discover(&id, None).await.unwrap_err() {
        LinkError::ConnectionFailure { server_id, cause } => {
            assert_eq!(server_id, id);
            assert!(cause.contains("401"), "cause was: {cause}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(session.tool_servers.get(&id).unwrap().tools.is_empty());
}

#[tokio::test]
async fn test_rediscovery_replaces_catalog() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["a", "b", "c"]);

    let session = http_session();
    let id = session
        .add_server(ToolServerConfig::new(&server.base_url).with_auth(AuthType::None))
        .unwrap();
    assert_eq!(session.discovery.discover(&id, None).await.unwrap().len(), 3);

    server.state.set_tools(&["b", "d"]);
    session.discovery.discover(&id, None).await.unwrap();

    let mut ids: Vec<String> = session
        .tool_servers
        .get(&id)
        .unwrap()
        .tools
        .into_iter()
        .map(|t| t.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["b", "d"]);
    assert!(session.tool_servers.resolve_tool("a").is_none());
}

#[tokio::test]
async fn test_wrapped_listing_is_accepted() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["wrapped"]);
    server.state.wrap_listing.store(true, Ordering::SeqCst);

    let session = http_session();
    let id = session
        .add_server(ToolServerConfig::new(&server.base_url).with_auth(AuthType::None))
        .unwrap();
    let tools = session.discovery.discover(&id, None).await.unwrap();
    assert_eq!(tools[0].id, "wrapped");
    assert_eq!(tools[0].name, "WRAPPED");
}

#[tokio::test]
async fn test_execute_polls_over_http_until_success() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["report"]);
    server
        .state
        .set_execute_reply(json!({ "status": "in_progress", "execution_id": "exec-42" }));
    server
        .state
        .push_poll_reply(json!({ "status": "in_progress", "execution_id": "exec-42" }));
    server
        .state
        .push_poll_reply(json!({ "status": "success", "result": { "pages": 3 } }));

    let session = http_session();
    let id = session
        .add_server(ToolServerConfig::new(&server.base_url).with_auth(AuthType::None))
        .unwrap();
    session.discovery.discover(&id, None).await.unwrap();

    let execution = session
        .executor
        .execute("report", json!({ "topic": "q3" }), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(execution.outcome, ExecutionOutcome::Success(json!({ "pages": 3 })));
    assert_eq!(execution.execution_id.as_deref(), Some("exec-42"));
    assert_eq!(execution.polls, 2);

    let executed = server.state.executed.lock().unwrap().clone();
    assert_eq!(executed, vec![("report".to_string(), json!({ "topic": "q3" }))]);
    let polled = server.state.polled.lock().unwrap().clone();
    assert!(polled
        .iter()
        .all(|(tool, exec)| tool == "report" && exec == "exec-42"));
}

#[tokio::test]
async fn test_remote_error_message_surfaces_verbatim() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["flaky"]);
    server
        .state
        .set_execute_reply(json!({ "status": "error", "error": "quota exceeded" }));

    let session = http_session();
    let id = session
        .add_server(ToolServerConfig::new(&server.base_url).with_auth(AuthType::None))
        .unwrap();
    session.discovery.discover(&id, None).await.unwrap();

    let execution = session
        .executor
        .execute("flaky", json!({}), ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(execution.error_message().as_deref(), Some("quota exceeded"));
}

#[tokio::test]
async fn test_unreachable_server_is_an_execution_error() {
    let server = spawn_mock_server().await;
    server.state.set_tools(&["search"]);

    let session = http_session();
    // Discover from the live server, then point the same id at a dead port.
    let id = session
        .add_server(
            ToolServerConfig::new(&server.base_url)
                .with_id("moving")
                .with_auth(AuthType::None),
        )
        .unwrap();
    session.discovery.discover(&id, None).await.unwrap();
    let tools = session.tool_servers.get(&id).unwrap().tools;
    session
        .add_server(ToolServerConfig::new(dead_url().await).with_id("moving"))
        .unwrap();
    session.tool_servers.replace_tools("moving", tools).unwrap();

    let execution = session
        .executor
        .execute("search", json!({}), ExecuteOptions::default())
        .await
        .unwrap();
    let message = execution.error_message().unwrap();
    assert!(
        message.starts_with("failed to reach tool server"),
        "message was: {message}"
    );
}

#[tokio::test]
async fn test_discover_all_over_http() {
    let up = spawn_mock_server().await;
    up.state.set_tools(&["alive"]);

    let session = http_session();
    let live = session
        .add_server(ToolServerConfig::new(&up.base_url).with_auth(AuthType::None))
        .unwrap();
    let dead = session
        .add_server(ToolServerConfig::new(dead_url().await).with_auth(AuthType::None))
        .unwrap();

    let results = session.discovery.discover_all().await;
    assert_eq!(results.len(), 2);
    for (server_id, result) in results {
        if server_id == live {
            assert_eq!(result.unwrap().len(), 1);
        } else {
            assert_eq!(server_id, dead);
            assert!(matches!(result, Err(LinkError::ConnectionFailure { .. })));
        }
    }
}
