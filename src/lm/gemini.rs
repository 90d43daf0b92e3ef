//! Gemini REST backend.
//!
//! Calls `models/{model}:generateContent`. Structured calls ask for
//! `application/json` with a `responseSchema`; the API expects OpenAPI-style
//! upper-case type names and rejects `additionalProperties`, so the contract
//! schema is translated first.
use super::{extract_structured_output, CapabilityError, ModelCapability};
use crate::contracts::SchemaDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings for the Gemini backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl GeminiSettings {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Capability backed by the Gemini API.
pub struct GeminiBackend {
    settings: GeminiSettings,
    agent: ureq::Agent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiBackend {
    pub fn new(settings: GeminiSettings) -> Self {
        let agent = build_agent(settings.timeout_secs, ureq::Proxy::try_from_env());
        Self { settings, agent }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    fn request<'a>(&self, prompt: &'a str, schema: Option<&SchemaDescriptor>) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
                response_mime_type: schema.map(|_| "application/json"),
                response_schema: schema.map(|schema| openapi_schema(&schema.schema)),
            },
        }
    }

    fn generate(&self, prompt: &str, schema: Option<&SchemaDescriptor>) -> Result<String, CapabilityError> {
        let request = self.request(prompt, schema);
        let start = Instant::now();
        let mut response = self
            .agent
            .post(self.endpoint())
            .header("x-goog-api-key", self.settings.api_key.as_str())
            .send_json(&request)
            .map_err(|err| CapabilityError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| CapabilityError::Transport(format!("read response body: {err}")))?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            model = %self.settings.model,
            status,
            prompt_bytes = prompt.len(),
            response_bytes = body.len(),
            contract = schema.map_or("freeform", |schema| schema.name),
            "gemini invoke complete"
        );

        if !(200..300).contains(&status) {
            return Err(CapabilityError::Status { status, body });
        }
        candidate_text(&body)
    }
}

impl ModelCapability for GeminiBackend {
    fn invoke_structured(
        &self,
        prompt: &str,
        schema: &SchemaDescriptor,
    ) -> Result<Value, CapabilityError> {
        let text = self.generate(prompt, Some(schema))?;
        extract_structured_output(&text)
    }

    fn invoke_freeform(&self, prompt: &str) -> Result<String, CapabilityError> {
        self.generate(prompt, None)
    }
}

// Non-2xx statuses come back as responses so the body can be reported.
fn build_agent(timeout_secs: u64, proxy: Option<ureq::Proxy>) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(timeout_secs)))
        .http_status_as_error(false)
        .proxy(proxy)
        .build();
    ureq::Agent::new_with_config(config)
}

fn candidate_text(body: &str) -> Result<String, CapabilityError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|err| CapabilityError::Parse(format!("generateContent response: {err}")))?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(CapabilityError::Empty);
    }
    Ok(text)
}

/// Translate a JSON Schema into the subset `responseSchema` accepts.
fn openapi_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                match key.as_str() {
                    "additionalProperties" | "$schema" => {}
                    "type" => {
                        let upper = value
                            .as_str()
                            .map(|name| json!(name.to_ascii_uppercase()))
                            .unwrap_or_else(|| value.clone());
                        out.insert(key.clone(), upper);
                    }
                    "properties" => {
                        let props = value
                            .as_object()
                            .map(|props| {
                                props
                                    .iter()
                                    .map(|(name, prop)| (name.clone(), openapi_schema(prop)))
                                    .collect::<Map<_, _>>()
                            })
                            .unwrap_or_default();
                        out.insert(key.clone(), Value::Object(props));
                    }
                    _ => {
                        out.insert(key.clone(), openapi_schema(value));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(openapi_schema).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ClinicalNote, Contract};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    // Answer one HTTP request with `status` and `body`; the handle yields the
    // raw request text.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            request
        });
        (format!("http://{addr}"), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream.read(&mut chunk).unwrap();
            if read == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(end) = text.find("\r\n\r\n") else {
                continue;
            };
            let head = text[..end].to_ascii_lowercase();
            let body_len = text.len() - end - 4;
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok());
            let complete = match content_length {
                Some(len) => body_len >= len,
                None if head.contains("transfer-encoding: chunked") => text.ends_with("0\r\n\r\n"),
                None => true,
            };
            if complete {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn local_backend(base_url: String) -> GeminiBackend {
        let mut settings = GeminiSettings::with_api_key("test-key");
        settings.base_url = base_url;
        GeminiBackend {
            agent: build_agent(5, None),
            settings,
        }
    }

    #[test]
    fn structured_request_asks_for_json() {
        let backend = GeminiBackend::new(GeminiSettings::with_api_key("k"));
        let descriptor = ClinicalNote::descriptor();
        let body = serde_json::to_value(backend.request("draft", Some(&descriptor))).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "draft");
        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["type"], "OBJECT");
        assert!(config["temperature"].as_f64().is_some());
    }

    #[test]
    fn freeform_request_has_no_schema() {
        let backend = GeminiBackend::new(GeminiSettings::with_api_key("k"));
        let body = serde_json::to_value(backend.request("review", None)).unwrap();

        let config = body["generationConfig"].as_object().unwrap();
        assert!(!config.contains_key("responseMimeType"));
        assert!(!config.contains_key("responseSchema"));
        assert!(config.contains_key("temperature"));
    }

    #[test]
    fn non_success_status_is_reported_with_body() {
        let (base_url, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"quota exhausted"}}"#,
        );
        let backend = local_backend(base_url);

        let err = backend.invoke_freeform("review").unwrap_err();
        match err {
            CapabilityError::Status { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("quota exhausted"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /v1beta/models/gemini-2.5-flash:generatecontent"));
        assert!(request.contains("x-goog-api-key: test-key"));
    }

    #[test]
    fn successful_call_returns_candidate_text() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"age\": \"40\", \"gender\": \"female\"}"}]}}]}"#,
        );
        let backend = local_backend(base_url);
        let descriptor = crate::contracts::Demographics::descriptor();

        let value = backend.invoke_structured("extract", &descriptor).unwrap();
        assert_eq!(value, json!({"age": "40", "gender": "female"}));

        let request = server.join().unwrap();
        assert!(request.contains("\"responseMimeType\":\"application/json\""));
    }

    #[test]
    fn schema_types_are_upper_cased() {
        let schema = openapi_schema(&ClinicalNote::json_schema());
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["plan"]["type"], "ARRAY");
        assert_eq!(schema["properties"]["plan"]["items"]["type"], "STRING");
        assert_eq!(schema["required"][0], "subjective");
    }

    #[test]
    fn schema_drops_unsupported_keys() {
        let schema = openapi_schema(&json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {"type": {"type": "string"}}
        }));
        assert!(schema.get("additionalProperties").is_none());
        assert_eq!(schema["properties"]["type"]["type"], "STRING");
    }

    #[test]
    fn candidate_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"APPRO"},{"text":"VED"}]}}]}"#;
        assert_eq!(candidate_text(body).unwrap(), "APPROVED");
    }

    #[test]
    fn candidate_text_rejects_blocked_responses() {
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        assert!(matches!(candidate_text(body), Err(CapabilityError::Empty)));
        assert!(matches!(candidate_text("{}"), Err(CapabilityError::Empty)));
        assert!(matches!(candidate_text("<html>"), Err(CapabilityError::Parse(_))));
    }

    #[test]
    fn endpoint_uses_model_and_trims_base() {
        let mut settings = GeminiSettings::with_api_key("k");
        settings.base_url = "http://localhost:8080/".to_string();
        let backend = GeminiBackend::new(settings);
        assert_eq!(
            backend.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
