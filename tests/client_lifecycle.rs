mod common;

use chat_realtime_rs::{ConnectionState, RealtimeClientOptions, RealtimeError};
use common::{MockServer, init_tracing, settle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fast_retry(max_reconnect_attempts: u32) -> RealtimeClientOptions {
    RealtimeClientOptions {
        user_id: "alice".to_string(),
        reconnect_interval: 100,
        max_reconnect_attempts,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_and_disconnect() {
    init_tracing();
    let server = MockServer::new();
    let client = server.client(fast_retry(3));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect().await.unwrap();
    assert!(client.is_connected());
    assert!(client.status().last_connected_at.is_some());

    // Already connected: no second socket
    client.connect().await.unwrap();
    assert_eq!(server.opens(), 1);

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_until_budget_is_spent() {
    init_tracing();
    let server = MockServer::new();
    server.set_refuse(true);
    let client = server.client(fast_retry(3));

    let delays = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delays);
    client.on_connection_status(move |status| {
        if status.state == ConnectionState::Reconnecting {
            sink.lock().unwrap().push(status.next_retry_in);
        }
    });
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    client.on_error(move |e| sink.lock().unwrap().push(e.to_string()));

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, RealtimeError::Connection(_)));

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            Some(Duration::from_millis(100)),
            Some(Duration::from_millis(200)),
            Some(Duration::from_millis(400)),
        ]
    );
    // Initial attempt plus three retries
    assert_eq!(server.opens(), 4);

    let opens = server.open_times();
    let gaps: Vec<u128> = opens
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis())
        .collect();
    assert!(gaps[0] >= 100 && gaps[1] >= 200 && gaps[2] >= 400, "{:?}", gaps);

    let status = client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(
        status.last_error.as_deref(),
        Some("max reconnection attempts reached")
    );
    assert_eq!(
        errors.lock().unwrap().last().map(String::as_str),
        Some("max reconnection attempts reached")
    );

    // Terminal: nothing else is attempted
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(server.opens(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_offline_messages_flush_once_on_connect() {
    init_tracing();
    let server = MockServer::new();
    server.set_refuse(true);
    let client = server.client(RealtimeClientOptions {
        user_id: "alice".to_string(),
        ..Default::default()
    });

    client.send_chat_message("first", Some("general")).await.unwrap();
    assert_eq!(client.pending_messages(), 1);
    settle().await;

    // The background attempt failed; the message is still waiting
    assert_eq!(server.opens(), 1);
    assert_eq!(client.pending_messages(), 1);
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    server.set_refuse(false);
    client.connect().await.unwrap();

    assert_eq!(server.received_texts(), vec!["first"]);
    assert_eq!(client.pending_messages(), 0);

    // The backoff driver was cancelled by the manual connect
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.opens(), 2);
    assert_eq!(server.received_texts(), vec!["first"]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_flushes_in_fifo_order() {
    init_tracing();
    let server = MockServer::new();
    server.set_refuse(true);
    let client = server.client(fast_retry(5));

    for text in ["a", "b", "c"] {
        client.send_chat_message(text, None).await.unwrap();
    }
    let queued: Vec<String> = client
        .queued_messages()
        .iter()
        .map(|message| message.payload()["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(queued, vec!["a", "b", "c"]);

    server.set_refuse(false);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(client.is_connected());
    assert_eq!(server.received_texts(), vec!["a", "b", "c"]);
    assert_eq!(client.pending_messages(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_disconnected_connects_in_background() {
    init_tracing();
    let server = MockServer::new();
    let client = server.client(fast_retry(3));

    client.send_chat_message("hi", Some("general")).await.unwrap();
    settle().await;

    assert!(client.is_connected());
    assert_eq!(server.opens(), 1);

    let sent = server.received();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].sender_id(), "alice");
    assert_eq!(sent[0].channel_id(), Some("general"));
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_server_close() {
    init_tracing();
    let server = MockServer::new();
    let client = server.client(fast_retry(3));

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    client.on_connection_status(move |status| sink.lock().unwrap().push(status.state));

    client.connect().await.unwrap();
    server.close_all();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(client.is_connected());
    assert_eq!(server.opens(), 2);
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(client.status().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_stops_reconnection() {
    init_tracing();
    let server = MockServer::new();
    let client = server.client(fast_retry(3));

    client.connect().await.unwrap();
    server.push(r#"{"id":"p1","type":"presence","data":{"status":"online"},"userId":"bob","timestamp":1}"#);
    settle().await;
    assert_eq!(client.online_users().await.len(), 1);

    client.disconnect().await.unwrap();
    server.close_all();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let status = client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.last_error, None);
    assert_eq!(server.opens(), 1);
    assert!(client.online_users().await.is_empty());
    assert_eq!(client.pending_messages(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_backoff() {
    init_tracing();
    let server = MockServer::new();
    server.set_refuse(true);
    let client = server.client(fast_retry(5));

    assert!(client.connect().await.is_err());
    settle().await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    client.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(server.opens(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_missing_pong_triggers_reconnect() {
    init_tracing();
    let server = MockServer::new();
    let client = server.client(RealtimeClientOptions {
        heartbeat_interval: 100,
        pong_timeout: Some(50),
        ..fast_retry(3)
    });

    client.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(260)).await;

    // Ping at 100ms, deadline at 150ms, retry after 100ms
    assert_eq!(server.opens(), 2);
    assert!(server.received().iter().any(|m| m.kind() == chat_realtime_rs::MessageType::Ping));
}

#[tokio::test(start_paused = true)]
async fn test_access_token_is_sent_as_query_parameter() {
    let server = MockServer::new();
    let client = server.client(RealtimeClientOptions {
        access_token: Some("s3cret".to_string()),
        ..Default::default()
    });

    client.connect().await.unwrap();
    assert_eq!(server.urls(), vec!["ws://chat.test/ws?token=s3cret"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_send_keeps_message_queued() {
    init_tracing();
    let server = MockServer::new();
    let client = server.client(fast_retry(3));
    client.connect().await.unwrap();

    server.stall_sends(true);
    let sent = tokio::time::timeout(
        Duration::from_millis(50),
        client.send_chat_message("hi", None),
    )
    .await;
    assert!(sent.is_err());
    assert_eq!(client.pending_messages(), 1);

    server.stall_sends(false);
    client.send_chat_message("later", None).await.unwrap();

    assert_eq!(server.received_texts(), vec!["hi", "later"]);
    assert_eq!(client.pending_messages(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pong_deadline_fires_while_send_is_stalled() {
    init_tracing();
    let server = MockServer::new();
    let client = server.client(RealtimeClientOptions {
        heartbeat_interval: 100,
        pong_timeout: Some(50),
        ..fast_retry(3)
    });

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    client.on_connection_status(move |status| sink.lock().unwrap().push(status.state));
    let timeouts = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&timeouts);
    client.on_error(move |e| {
        if matches!(e, RealtimeError::Timeout) {
            *sink.lock().unwrap() += 1;
        }
    });

    client.connect().await.unwrap();
    server.stall_sends(true);
    let sender = client.clone();
    let send = tokio::spawn(async move { sender.send_chat_message("hi", None).await });

    // Ping at 100ms, deadline at 150ms, retry after 100ms
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(states.lock().unwrap().contains(&ConnectionState::Reconnecting));
    assert_eq!(*timeouts.lock().unwrap(), 1);
    assert_eq!(server.opens(), 2);
    assert!(send.is_finished());
    send.await.unwrap().unwrap();

    server.stall_sends(false);
    settle().await;

    assert!(client.is_connected());
    assert_eq!(server.received_texts(), vec!["hi"]);
}

#[tokio::test(start_paused = true)]
async fn test_backlog_goes_out_before_messages_sent_during_flush() {
    init_tracing();
    let server = MockServer::new();
    server.set_refuse(true);
    let client = server.client(fast_retry(5));

    client.send_chat_message("x", None).await.unwrap();
    client.send_chat_message("y", None).await.unwrap();
    settle().await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);

    server.set_refuse(false);
    server.stall_sends(true);
    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };
    settle().await;
    assert!(client.is_connected());

    let sending = {
        let client = client.clone();
        tokio::spawn(async move { client.send_chat_message("z", None).await })
    };
    settle().await;
    assert!(server.received_texts().is_empty());

    server.stall_sends(false);
    connecting.await.unwrap().unwrap();
    sending.await.unwrap().unwrap();

    assert_eq!(server.received_texts(), vec!["x", "y", "z"]);
    assert_eq!(client.pending_messages(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_after_terminal_failure_starts_fresh_campaign() {
    init_tracing();
    let server = MockServer::new();
    server.set_refuse(true);
    let client = server.client(fast_retry(2));

    let delays = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delays);
    client.on_connection_status(move |status| {
        if let Some(delay) = status.next_retry_in {
            sink.lock().unwrap().push(delay);
        }
    });

    assert!(client.connect().await.is_err());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.opens(), 3);
    assert_eq!(
        client.status().last_error.as_deref(),
        Some("max reconnection attempts reached")
    );

    delays.lock().unwrap().clear();
    assert!(client.connect().await.is_err());
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        *delays.lock().unwrap(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    assert_eq!(server.opens(), 6);

    server.set_refuse(false);
    client.connect().await.unwrap();
    let status = client.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.reconnect_attempts, 0);
    assert_eq!(status.last_error, None);
    assert_eq!(server.opens(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_send_after_terminal_failure_reconnects() {
    init_tracing();
    let server = MockServer::new();
    server.set_refuse(true);
    let client = server.client(fast_retry(1));

    assert!(client.connect().await.is_err());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.opens(), 2);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    server.set_refuse(false);
    client.send_chat_message("back", None).await.unwrap();
    settle().await;

    assert!(client.is_connected());
    assert_eq!(server.opens(), 3);
    assert_eq!(server.received_texts(), vec!["back"]);
}
