//! `A2aAgentClient`: the `RemoteAgentClient` for agents speaking A2A over
//! JSON-RPC.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use assessor_contracts::{
    capability::AgentCapabilityDescriptor,
    error::{AssessorError, AssessorResult},
    task::{AgentResponse, Instruction},
};
use assessor_core::traits::RemoteAgentClient;
use assessor_verify::ResponseValidator;

use crate::protocol::{
    clean_answer, reply_schema, reply_text, send_message_request, AgentCard, AGENT_CARD_PATH,
};

pub struct A2aAgentClient {
    http: Client,
    discovery_timeout: Duration,
    validator: ResponseValidator,
}

impl A2aAgentClient {
    pub fn new(discovery_timeout: Duration) -> AssessorResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("assessor-a2a/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AssessorError::ConfigError {
                reason: format!("failed to build A2A HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            discovery_timeout,
            validator: ResponseValidator::new("a2a-message-send-reply", &reply_schema())?,
        })
    }

    pub fn card_url(endpoint: &str) -> String {
        format!("{}{}", endpoint.trim_end_matches('/'), AGENT_CARD_PATH)
    }
}

#[async_trait]
impl RemoteAgentClient for A2aAgentClient {
    async fn discover(&self, endpoint: &str) -> AssessorResult<AgentCapabilityDescriptor> {
        let url = Self::card_url(endpoint);
        debug!(%url, "fetching agent card");

        let unreachable = |reason: String| AssessorError::AgentUnreachable {
            endpoint: endpoint.to_string(),
            reason,
        };

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .timeout(self.discovery_timeout)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(unreachable(format!("agent card request returned HTTP {status}")));
        }
        if !status.is_success() {
            warn!(%url, %status, "agent card not served");
            return Err(AssessorError::AgentIncompatible {
                missing: vec![format!("agent card ({AGENT_CARD_PATH}), HTTP {status}")],
            });
        }

        let body = response.bytes().await.map_err(|e| unreachable(e.to_string()))?;
        let card = AgentCard::parse(endpoint, &body)?;
        info!(agent = %card.name, url = %card.url, "agent discovered");
        Ok(card.descriptor())
    }

    async fn dispatch(
        &self,
        endpoint: &str,
        instruction: &Instruction,
        deadline: Duration,
    ) -> AssessorResult<AgentResponse> {
        let request = send_message_request(instruction);
        debug!(task_id = %instruction.task_id, %endpoint, "sending message/send");

        let timed_out = || AssessorError::AgentTimeout {
            endpoint: endpoint.to_string(),
            waited_ms: deadline.as_millis() as u64,
        };

        let response = self
            .http
            .post(endpoint)
            .header(ACCEPT, "application/json")
            .json(&request)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    timed_out()
                } else {
                    AssessorError::AgentUnreachable {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AssessorError::AgentUnreachable {
                endpoint: endpoint.to_string(),
                reason: format!("message/send returned HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(AssessorError::AgentProtocolError {
                reason: format!("message/send returned HTTP {status}"),
            });
        }

        let raw: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                timed_out()
            } else {
                AssessorError::AgentProtocolError {
                    reason: format!("reply is not JSON: {e}"),
                }
            }
        })?;

        self.validator.validate(&raw)?;
        let answer = clean_answer(&reply_text(&raw)?);
        debug!(task_id = %instruction.task_id, %answer, "agent replied");
        Ok(AgentResponse { raw, answer })
    }
}

impl std::fmt::Debug for A2aAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aAgentClient")
            .field("discovery_timeout", &self.discovery_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use serde_json::{json, Value};
    use tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
        net::TcpListener,
    };

    use assessor_contracts::{
        capability::Capability,
        error::FailureKind,
        task::{Instruction, TaskId},
    };
    use assessor_core::traits::RemoteAgentClient;

    use super::A2aAgentClient;

    /// How the canned agent behaves.
    #[derive(Clone)]
    enum Mode {
        /// Serve `card` on discovery and `reply` on POST.
        Serve { card: Option<Value>, reply: String },
        /// Accept connections and never answer.
        Silent,
        /// Answer every request with this status line and an empty body.
        Status(&'static str),
    }

    struct CannedAgent {
        base: String,
        posted: Arc<Mutex<Vec<Value>>>,
    }

    async fn canned_agent(mode: Mode) -> CannedAgent {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let posted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&posted);

        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let (card, reply, fixed_status) = match mode.clone() {
                    Mode::Serve { card, reply } => (card, reply, None),
                    Mode::Status(status) => (None, String::new(), Some(status)),
                    Mode::Silent => {
                        held.push(stream);
                        continue;
                    }
                };
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);

                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).await.unwrap();
                    let mut content_length = 0usize;
                    loop {
                        let mut line = String::new();
                        let n = reader.read_line(&mut line).await.unwrap();
                        if n == 0 || line == "\r\n" {
                            break;
                        }
                        if let Some((name, value)) = line.split_once(':') {
                            if name.eq_ignore_ascii_case("content-length") {
                                content_length = value.trim().parse().unwrap_or(0);
                            }
                        }
                    }

                    let is_get = request_line.starts_with("GET");
                    if !is_get {
                        let mut body = vec![0u8; content_length];
                        reader.read_exact(&mut body).await.unwrap();
                        sink.lock().unwrap().push(serde_json::from_slice(&body).unwrap());
                    }

                    let (status, body) = match (fixed_status, &card) {
                        (Some(status), _) => (status, String::new()),
                        (None, Some(card)) if is_get => ("200 OK", card.to_string()),
                        (None, None) if is_get => ("404 Not Found", "{}".to_string()),
                        (None, _) => ("200 OK", reply.clone()),
                    };

                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = write.write_all(response.as_bytes()).await;
                    let _ = write.shutdown().await;
                });
            }
        });

        CannedAgent { base, posted }
    }

    fn card_for(base: &str) -> Value {
        json!({
            "name": "purple",
            "url": format!("{base}/"),
            "protocolVersion": "0.3.0",
            "defaultInputModes": ["text"],
            "defaultOutputModes": ["text"],
            "skills": []
        })
    }

    fn instruction() -> Instruction {
        Instruction {
            task_id: TaskId::from("t-42"),
            task_family: "task2_1".into(),
            instruction: "What is the age of patient S2874099?".into(),
            system_context: json!([]),
            fhir_base_url: None,
            interaction_limit: 8,
        }
    }

    fn client() -> A2aAgentClient {
        A2aAgentClient::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn discovers_and_dispatches() {
        let reply = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {
                "kind": "message",
                "parts": [{ "kind": "text", "text": "```\nFINISH(60)\n```" }]
            }
        })
        .to_string();
        let agent = canned_agent(Mode::Serve {
            card: Some(card_for("http://placeholder")),
            reply,
        })
        .await;

        let descriptor = client().discover(&agent.base).await.unwrap();
        assert_eq!(descriptor.name, "purple");
        // The card's url is what the orchestrator dispatches to.
        assert_eq!(descriptor.endpoint, "http://placeholder/");
        assert!(descriptor.operations.has(&Capability::new("message/send")));

        let response = client()
            .dispatch(&agent.base, &instruction(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.answer, "60");

        let posted = agent.posted.lock().unwrap().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["method"], "message/send");
        let text = posted[0]["params"]["message"]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("S2874099"));
    }

    #[tokio::test]
    async fn missing_card_is_incompatible() {
        let agent = canned_agent(Mode::Serve {
            card: None,
            reply: String::new(),
        })
        .await;
        let err = client().discover(&agent.base).await.unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::AgentIncompatible));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client().discover(&base).await.unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::AgentUnreachable));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn silent_agent_times_out() {
        let agent = canned_agent(Mode::Silent).await;
        let err = client()
            .dispatch(&agent.base, &instruction(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::AgentTimeout));
    }

    #[tokio::test]
    async fn schema_violation_is_protocol_error() {
        let agent = canned_agent(Mode::Serve {
            card: Some(card_for("http://placeholder")),
            reply: json!({ "jsonrpc": "2.0", "id": "1", "result": { "kind": "message" } })
                .to_string(),
        })
        .await;
        let err = client()
            .dispatch(&agent.base, &instruction(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::AgentProtocolError));
    }

    #[tokio::test]
    async fn overloaded_agent_is_unreachable_on_dispatch() {
        for status in ["503 Service Unavailable", "429 Too Many Requests"] {
            let agent = canned_agent(Mode::Status(status)).await;
            let err = client()
                .dispatch(&agent.base, &instruction(), Duration::from_secs(2))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), Some(FailureKind::AgentUnreachable), "{status}");
            assert!(err.is_transient());
        }
    }

    #[tokio::test]
    async fn client_error_on_dispatch_is_protocol_error() {
        let agent = canned_agent(Mode::Status("400 Bad Request")).await;
        let err = client()
            .dispatch(&agent.base, &instruction(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::AgentProtocolError));
    }

    #[tokio::test]
    async fn non_json_reply_is_protocol_error() {
        let agent = canned_agent(Mode::Serve {
            card: None,
            reply: "FINISH(60)".to_string(),
        })
        .await;
        let err = client()
            .dispatch(&agent.base, &instruction(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::AgentProtocolError));
    }
}
