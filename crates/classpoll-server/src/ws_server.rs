use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use classpoll_core::types::ConnectionId;
use classpoll_engine::Scope;

use crate::gateway::{Command, Push, QueryKind};
use crate::protocol::{
    CreatePollParams, JoinParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    RemoveStudentParams, SendMessageParams, SubmitParams,
};

// ---------------------------------------------------------------------------
// Origin validation
// ---------------------------------------------------------------------------

/// Validate the `Origin` header on an incoming WebSocket upgrade request.
///
/// Allowed origins:
/// - `http://localhost:*` or `http://127.0.0.1:*` (local dev)
/// - `null` (file:// contexts)
/// - An optional configured origin (deployed frontend)
/// - Absent origin header (non-browser clients like curl, native apps)
///
/// All other origins are rejected with HTTP 403.
fn validate_origin(
    allowed: Option<&str>,
    req: &tokio_tungstenite::tungstenite::handshake::server::Request,
    resp: tokio_tungstenite::tungstenite::handshake::server::Response,
) -> Result<
    tokio_tungstenite::tungstenite::handshake::server::Response,
    tokio_tungstenite::tungstenite::handshake::server::ErrorResponse,
> {
    if let Some(origin) = req.headers().get("origin") {
        let origin_str = origin.to_str().unwrap_or("");
        if origin_str == "null"
            || origin_str.starts_with("http://localhost")
            || origin_str.starts_with("http://127.0.0.1")
            || allowed.is_some_and(|a| a == origin_str)
        {
            return Ok(resp);
        }
        tracing::warn!(origin = %origin_str, "ws: rejected connection from disallowed origin");
        let err_resp = http::Response::builder()
            .status(http::StatusCode::FORBIDDEN)
            .body(Some("Origin not allowed".into()))
            .expect("building error response");
        return Err(err_resp);
    }
    // No origin header = non-browser client (curl, native app), allow.
    Ok(resp)
}

// ---------------------------------------------------------------------------
// WsServer
// ---------------------------------------------------------------------------

/// Default maximum number of concurrent WebSocket connections.
const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// WebSocket server exposing the polling API as JSON-RPC 2.0 over text
/// frames. Each accepted socket gets a process-unique connection id and
/// a dedicated handler task; all state changes go through the gateway.
pub struct WsServer {
    addr: SocketAddr,
    cmd_tx: mpsc::Sender<Command>,
    push_tx: broadcast::Sender<Push>,
    cancel: CancellationToken,
    max_connections: usize,
    allow_origin: Option<String>,
    next_conn_id: Arc<AtomicU64>,
}

impl WsServer {
    pub fn new(
        addr: SocketAddr,
        cmd_tx: mpsc::Sender<Command>,
        push_tx: broadcast::Sender<Push>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            addr,
            cmd_tx,
            push_tx,
            cancel,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            allow_origin: None,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Set the maximum number of concurrent WebSocket connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Additionally allow one exact origin besides the localhost set.
    pub fn with_allowed_origin(mut self, origin: Option<String>) -> Self {
        self.allow_origin = origin;
        self
    }

    /// Run the WebSocket server: bind TCP, accept connections, and spawn
    /// per-client handlers until the cancellation token fires.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, max_connections = self.max_connections, "ws server listening");
        self.serve(listener).await
    }

    /// Bind to the configured address and return the actual local address.
    /// Useful when binding to port 0 to get an OS-assigned ephemeral port.
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, max_connections = self.max_connections, "ws server bound");
        Ok((listener, local_addr))
    }

    /// Run the accept loop on a pre-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let permit = match semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    tracing::warn!(
                                        peer = %peer,
                                        max = self.max_connections,
                                        "ws: connection limit reached, rejecting"
                                    );
                                    drop(stream);
                                    continue;
                                }
                            };
                            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(peer = %peer, conn_id, "ws: TCP connection accepted");
                            let cmd_tx = self.cmd_tx.clone();
                            let push_rx = self.push_tx.subscribe();
                            let cancel = self.cancel.clone();
                            let allow_origin = self.allow_origin.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                let callback =
                                    |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
                                     resp: tokio_tungstenite::tungstenite::handshake::server::Response| {
                                        validate_origin(allow_origin.as_deref(), req, resp)
                                    };
                                match tokio_tungstenite::accept_hdr_async(stream, callback).await {
                                    Ok(ws_stream) => {
                                        if let Err(e) = handle_ws_client(ws_stream, conn_id, cmd_tx, push_rx, cancel).await {
                                            tracing::debug!(peer = %peer, conn_id, error = %e, "ws client handler finished with error");
                                        }
                                    }
                                    Err(e) => {
                                        tracing::debug!(peer = %peer, error = %e, "ws handshake failed");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "ws: TCP accept failed");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("ws server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-client handler
// ---------------------------------------------------------------------------

async fn handle_ws_client(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    conn_id: ConnectionId,
    cmd_tx: mpsc::Sender<Command>,
    mut push_rx: broadcast::Receiver<Push>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    tracing::debug!(conn_id, "ws client connected");

    loop {
        tokio::select! {
            // --- incoming WebSocket message ---
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        tracing::debug!(conn_id, error = %e, "ws read error, dropping client");
                        let _ = cmd_tx.send(Command::Disconnect { conn: conn_id }).await;
                        return Err(e.into());
                    }
                    None => {
                        tracing::debug!(conn_id, "ws client disconnected (stream ended)");
                        let _ = cmd_tx.send(Command::Disconnect { conn: conn_id }).await;
                        return Ok(());
                    }
                };

                let text = match msg {
                    Message::Text(t) => t,
                    Message::Close(_) => {
                        tracing::debug!(conn_id, "ws client sent close frame");
                        let _ = cmd_tx.send(Command::Disconnect { conn: conn_id }).await;
                        return Ok(());
                    }
                    Message::Ping(data) => {
                        ws_tx.send(Message::Pong(data)).await?;
                        continue;
                    }
                    _ => continue,
                };

                let req: JsonRpcRequest = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        let resp = JsonRpcResponse::err(None, JsonRpcError::parse_error(e));
                        ws_tx.send(Message::Text(serde_json::to_string(&resp)?)).await?;
                        continue;
                    }
                };

                tracing::debug!(conn_id, method = %req.method, id = ?req.id, "ws: request received");

                let id = req.id;
                let resp = match dispatch(conn_id, &cmd_tx, req).await {
                    Ok(result) => JsonRpcResponse::ok(id, result),
                    Err(error) => JsonRpcResponse::err(id, error),
                };
                ws_tx.send(Message::Text(serde_json::to_string(&resp)?)).await?;
            }

            // --- push from the gateway ---
            push = push_rx.recv() => {
                let push = match push {
                    Ok(p) => p,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(conn_id, skipped, "ws client lagged, dropped pushes");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!(conn_id, "push channel closed, dropping client");
                        return Ok(());
                    }
                };

                let directed = match push.scope {
                    Scope::All => false,
                    Scope::Conn(target) if target == conn_id => true,
                    Scope::Conn(_) => continue,
                };
                ws_tx.send(Message::Text(push.frame)).await?;

                // A removed student gets the kick notice and then the
                // server closes the socket; the engine has already
                // dropped the registration.
                if directed && push.method == "kicked" {
                    tracing::debug!(conn_id, "closing kicked client");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
            }

            // --- cancellation ---
            _ = cancel.cancelled() => {
                tracing::debug!(conn_id, "ws client handler: cancellation requested");
                let _ = ws_tx.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}

/// Route one request into the gateway and wait for its reply.
async fn dispatch(
    conn: ConnectionId,
    cmd_tx: &mpsc::Sender<Command>,
    req: JsonRpcRequest,
) -> Result<serde_json::Value, JsonRpcError> {
    match req.method.as_str() {
        "join" => {
            let params: JoinParams =
                serde_json::from_value(req.params).map_err(JsonRpcError::invalid_params)?;
            let name = params.name.trim().to_string();
            if name.is_empty() {
                return Err(JsonRpcError::invalid_params("name must not be empty"));
            }
            roundtrip(cmd_tx, |reply| Command::Join {
                conn,
                name,
                role: params.role,
                reply,
            })
            .await
        }
        "create_poll" => {
            let draft: CreatePollParams =
                serde_json::from_value(req.params).map_err(JsonRpcError::invalid_params)?;
            roundtrip(cmd_tx, |reply| Command::CreatePoll { conn, draft, reply }).await
        }
        "submit_answer" => {
            let params: SubmitParams =
                serde_json::from_value(req.params).map_err(JsonRpcError::invalid_params)?;
            roundtrip(cmd_tx, |reply| Command::SubmitAnswer {
                conn,
                value: params.value,
                reply,
            })
            .await
        }
        "ask_new_question" => {
            roundtrip(cmd_tx, |reply| Command::AskNewQuestion { conn, reply }).await
        }
        "remove_student" => {
            let params: RemoveStudentParams =
                serde_json::from_value(req.params).map_err(JsonRpcError::invalid_params)?;
            roundtrip(cmd_tx, |reply| Command::RemoveStudent {
                conn,
                participant_id: params.participant_id,
                reply,
            })
            .await
        }
        "send_message" => {
            let params: SendMessageParams =
                serde_json::from_value(req.params).map_err(JsonRpcError::invalid_params)?;
            let text = params.text.trim().to_string();
            if text.is_empty() {
                return Err(JsonRpcError::invalid_params("text must not be empty"));
            }
            roundtrip(cmd_tx, |reply| Command::SendMessage { conn, text, reply }).await
        }
        "start_session" => {
            roundtrip(cmd_tx, |reply| Command::StartSession { conn, reply }).await
        }
        "end_session" => roundtrip(cmd_tx, |reply| Command::EndSession { conn, reply }).await,
        "current_poll" => query(cmd_tx, conn, QueryKind::CurrentPoll).await,
        "participants" => query(cmd_tx, conn, QueryKind::Participants).await,
        "chat_log" => query(cmd_tx, conn, QueryKind::ChatLog).await,
        "poll_history" => query(cmd_tx, conn, QueryKind::PollHistory).await,
        "session_analytics" => query(cmd_tx, conn, QueryKind::Session).await,
        "student_performance" => query(cmd_tx, conn, QueryKind::StudentPerformance).await,
        "health" => query(cmd_tx, conn, QueryKind::Health).await,
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

fn gateway_unavailable() -> JsonRpcError {
    JsonRpcError {
        code: -32000,
        message: "gateway unavailable".into(),
        data: None,
    }
}

async fn roundtrip(
    cmd_tx: &mpsc::Sender<Command>,
    build: impl FnOnce(oneshot::Sender<Result<serde_json::Value, classpoll_core::CommandError>>) -> Command,
) -> Result<serde_json::Value, JsonRpcError> {
    let (reply, rx) = oneshot::channel();
    cmd_tx
        .send(build(reply))
        .await
        .map_err(|_| gateway_unavailable())?;
    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(gateway_unavailable()),
    }
}

async fn query(
    cmd_tx: &mpsc::Sender<Command>,
    conn: ConnectionId,
    kind: QueryKind,
) -> Result<serde_json::Value, JsonRpcError> {
    roundtrip(cmd_tx, |reply| Command::Query { conn, kind, reply }).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use classpoll_engine::{PollEngine, SystemClock};

    use crate::gateway::Gateway;

    struct TestServer {
        addr: SocketAddr,
        cancel: CancellationToken,
        _handle: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    async fn start_test_server(max_connections: Option<usize>) -> TestServer {
        let engine = PollEngine::new(Arc::new(SystemClock));
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (push_tx, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();

        let mut gateway = Gateway::new(
            engine,
            cmd_rx,
            cmd_tx.clone(),
            push_tx.clone(),
            cancel.clone(),
        );
        tokio::spawn(async move { gateway.run().await });

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut server = WsServer::new(addr, cmd_tx, push_tx, cancel.clone());
        if let Some(max) = max_connections {
            server = server.with_max_connections(max);
        }
        let (listener, local_addr) = server.bind().await.unwrap();
        let handle = tokio::spawn(async move { server.serve(listener).await });
        TestServer {
            addr: local_addr,
            cancel,
            _handle: handle,
        }
    }

    impl TestServer {
        fn ws_url(&self) -> String {
            format!("ws://127.0.0.1:{}", self.addr.port())
        }

        async fn connect(
            &self,
        ) -> tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        > {
            let (ws, _) = tokio_tungstenite::connect_async(&self.ws_url()).await.unwrap();
            ws
        }

        async fn connect_with_origin(
            &self,
            origin: &str,
        ) -> Result<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            tokio_tungstenite::tungstenite::Error,
        > {
            let mut req =
                tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
                    &self.ws_url(),
                )
                .unwrap();
            req.headers_mut().insert("Origin", origin.parse().unwrap());
            let (ws, _) = tokio_tungstenite::connect_async(req).await?;
            Ok(ws)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn recv_json(ws: &mut ClientWs) -> serde_json::Value {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended")
            .expect("read error");
        let Message::Text(text) = msg else {
            panic!("expected text frame, got {:?}", msg);
        };
        serde_json::from_str(&text).unwrap()
    }

    async fn send_rpc(
        ws: &mut ClientWs,
        id: u64,
        method: &str,
        params: serde_json::Value,
    ) -> serde_json::Value {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        ws.send(Message::Text(req.to_string())).await.unwrap();
        // Responses carry an id; interleaved push notifications do not.
        loop {
            let v = recv_json(ws).await;
            if v.get("id").is_some() {
                return v;
            }
        }
    }

    async fn recv_notification(ws: &mut ClientWs, method: &str) -> serde_json::Value {
        loop {
            let v = recv_json(ws).await;
            if v["method"] == method {
                return v;
            }
        }
    }

    async fn join(ws: &mut ClientWs, id: u64, name: &str, role: &str) {
        let resp = send_rpc(
            ws,
            id,
            "join",
            serde_json::json!({"name": name, "role": role}),
        )
        .await;
        assert_eq!(resp["result"]["joined"], true);
    }

    #[tokio::test]
    async fn health_over_ws() {
        let server = start_test_server(None).await;
        let mut ws = server.connect().await;

        let resp = send_rpc(&mut ws, 1, "health", serde_json::json!({})).await;
        assert_eq!(resp["jsonrpc"], "2.0");
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["status"], "ok");
        assert_eq!(resp["result"]["counts"]["total"], 0);
    }

    #[tokio::test]
    async fn unknown_method_returns_error() {
        let server = start_test_server(None).await;
        let mut ws = server.connect().await;

        let resp = send_rpc(&mut ws, 99, "nonexistent", serde_json::json!({})).await;
        assert_eq!(resp["id"], 99);
        assert!(resp["result"].is_null());
        assert_eq!(resp["error"]["code"], -32601);
        assert!(resp["error"]["message"].as_str().unwrap().contains("nonexistent"));
    }

    #[tokio::test]
    async fn invalid_json_returns_parse_error() {
        let server = start_test_server(None).await;
        let mut ws = server.connect().await;

        ws.send(Message::Text("not valid json".into())).await.unwrap();
        let resp = recv_json(&mut ws).await;
        assert_eq!(resp["error"]["code"], -32700);
        assert!(resp["error"]["message"].as_str().unwrap().contains("parse error"));
    }

    #[tokio::test]
    async fn join_with_empty_name_rejected() {
        let server = start_test_server(None).await;
        let mut ws = server.connect().await;

        let resp = send_rpc(
            &mut ws,
            1,
            "join",
            serde_json::json!({"name": "   ", "role": "student"}),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn student_cannot_create_poll_over_ws() {
        let server = start_test_server(None).await;
        let mut ws = server.connect().await;
        join(&mut ws, 1, "alice", "student").await;

        let resp = send_rpc(
            &mut ws,
            2,
            "create_poll",
            serde_json::json!({"question": "2+2?", "poll_type": "single-choice", "options": ["3", "4"]}),
        )
        .await;
        assert_eq!(resp["error"]["code"], -32000);
        assert_eq!(resp["error"]["data"]["kind"], "forbidden");
    }

    #[tokio::test]
    async fn poll_round_trip_between_teacher_and_student() {
        let server = start_test_server(None).await;
        let mut teacher = server.connect().await;
        let mut student = server.connect().await;
        join(&mut teacher, 1, "teach", "teacher").await;
        join(&mut student, 1, "alice", "student").await;

        let resp = send_rpc(
            &mut teacher,
            2,
            "create_poll",
            serde_json::json!({
                "question": "2+2?",
                "poll_type": "single-choice",
                "options": ["3", "4"],
                "correct_answer": "4",
            }),
        )
        .await;
        assert_eq!(resp["result"]["created"], true);

        let created = recv_notification(&mut student, "poll_created").await;
        assert_eq!(created["params"]["poll"]["question"], "2+2?");
        assert_eq!(created["params"]["poll"]["is_active"], true);

        let resp = send_rpc(
            &mut student,
            2,
            "submit_answer",
            serde_json::json!({"value": "4"}),
        )
        .await;
        assert_eq!(resp["result"]["submitted"], true);

        // Directed feedback reaches only the submitting student.
        let feedback = recv_notification(&mut student, "answer_feedback").await;
        assert_eq!(feedback["params"]["is_correct"], true);

        // The lone student answered, so both sides see the poll end.
        let ended = recv_notification(&mut teacher, "poll_ended").await;
        assert_eq!(ended["params"]["result"]["total_answers"], 1);
        recv_notification(&mut student, "poll_ended").await;

        let resp = send_rpc(&mut teacher, 3, "poll_history", serde_json::json!({})).await;
        assert_eq!(resp["result"]["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_answer_rejected_over_ws() {
        let server = start_test_server(None).await;
        let mut teacher = server.connect().await;
        let mut s1 = server.connect().await;
        let mut s2 = server.connect().await;
        join(&mut teacher, 1, "teach", "teacher").await;
        join(&mut s1, 1, "alice", "student").await;
        join(&mut s2, 1, "bob", "student").await;

        send_rpc(
            &mut teacher,
            2,
            "create_poll",
            serde_json::json!({"question": "q", "poll_type": "yes-no"}),
        )
        .await;

        let resp = send_rpc(&mut s1, 2, "submit_answer", serde_json::json!({"value": "Yes"})).await;
        assert_eq!(resp["result"]["submitted"], true);
        let resp = send_rpc(&mut s1, 3, "submit_answer", serde_json::json!({"value": "No"})).await;
        assert_eq!(resp["error"]["data"]["kind"], "already_answered");
    }

    #[tokio::test]
    async fn removed_student_gets_kicked_and_closed() {
        let server = start_test_server(None).await;
        let mut teacher = server.connect().await;
        let mut student = server.connect().await;
        join(&mut teacher, 1, "teach", "teacher").await;
        join(&mut student, 1, "alice", "student").await;

        let resp = send_rpc(&mut teacher, 2, "participants", serde_json::json!({})).await;
        let alice_id = resp["result"]["participants"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["name"] == "alice")
            .unwrap()["id"]
            .clone();

        let resp = send_rpc(
            &mut teacher,
            3,
            "remove_student",
            serde_json::json!({"participant_id": alice_id}),
        )
        .await;
        assert_eq!(resp["result"]["removed"], true);

        // The student sees the kick notice, then the server closes the
        // socket.
        recv_notification(&mut student, "kicked").await;
        let next = tokio::time::timeout(Duration::from_secs(5), student.next())
            .await
            .expect("timeout waiting for close");
        match next {
            None | Some(Ok(Message::Close(_))) => {}
            other => panic!("expected close frame, got {:?}", other),
        }

        // The teacher is unaffected.
        let resp = send_rpc(&mut teacher, 4, "participants", serde_json::json!({})).await;
        assert_eq!(resp["result"]["counts"]["students"], 0);
    }

    #[tokio::test]
    async fn chat_messages_fan_out() {
        let server = start_test_server(None).await;
        let mut teacher = server.connect().await;
        let mut student = server.connect().await;
        join(&mut teacher, 1, "teach", "teacher").await;
        join(&mut student, 1, "alice", "student").await;

        let resp = send_rpc(
            &mut student,
            2,
            "send_message",
            serde_json::json!({"text": "hello"}),
        )
        .await;
        assert_eq!(resp["result"]["sent"], true);

        let msg = recv_notification(&mut teacher, "new_message").await;
        assert_eq!(msg["params"]["message"]["text"], "hello");
        assert_eq!(msg["params"]["message"]["sender_name"], "alice");
    }

    #[tokio::test]
    async fn origin_localhost_accepted() {
        let server = start_test_server(None).await;
        let mut ws = server
            .connect_with_origin("http://localhost:3000")
            .await
            .unwrap();
        let resp = send_rpc(&mut ws, 1, "health", serde_json::json!({})).await;
        assert_eq!(resp["id"], 1);
    }

    #[tokio::test]
    async fn origin_remote_rejected() {
        let server = start_test_server(None).await;
        let result = server.connect_with_origin("https://evil.example.com").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn connection_limit_enforced() {
        let server = start_test_server(Some(2)).await;

        let _ws1 = server.connect().await;
        let _ws2 = server.connect().await;

        // Third connection should be rejected. The server drops the TCP
        // stream, so the WS handshake will fail.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            tokio_tungstenite::connect_async(&server.ws_url()).await
        })
        .await;

        match result {
            Ok(Ok((mut ws, _))) => {
                // Connection may have been accepted at TCP level before
                // the server dropped it. Sending a message should fail.
                let send_result = ws
                    .send(Message::Text(
                        r#"{"jsonrpc":"2.0","id":1,"method":"health","params":{}}"#.into(),
                    ))
                    .await;
                let next = ws.next().await;
                assert!(
                    send_result.is_err() || next.is_none() || next.unwrap().is_err(),
                    "third connection should not be fully functional"
                );
            }
            Ok(Err(_)) => {} // handshake failed, expected
            Err(_) => {}     // timeout, server dropped connection, also fine
        }
    }

    #[test]
    fn validate_origin_allows_localhost() {
        let req = http::Request::builder()
            .header("origin", "http://localhost:3000")
            .body(())
            .unwrap();
        let resp = http::Response::builder()
            .status(http::StatusCode::SWITCHING_PROTOCOLS)
            .body(())
            .unwrap();
        assert!(validate_origin(None, &req, resp).is_ok());
    }

    #[test]
    fn validate_origin_allows_configured_extra() {
        let req = http::Request::builder()
            .header("origin", "https://polls.example.edu")
            .body(())
            .unwrap();
        let resp = http::Response::builder()
            .status(http::StatusCode::SWITCHING_PROTOCOLS)
            .body(())
            .unwrap();
        assert!(validate_origin(Some("https://polls.example.edu"), &req, resp).is_ok());
    }

    #[test]
    fn validate_origin_rejects_remote() {
        let req = http::Request::builder()
            .header("origin", "https://evil.example.com")
            .body(())
            .unwrap();
        let resp = http::Response::builder()
            .status(http::StatusCode::SWITCHING_PROTOCOLS)
            .body(())
            .unwrap();
        let result = validate_origin(None, &req, resp);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().status(), http::StatusCode::FORBIDDEN);
    }
}
