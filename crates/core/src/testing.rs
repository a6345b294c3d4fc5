//! Fixtures shared by unit tests here and by the app crate's tests.

use crate::answer::{LanguageModel, Message, Role};
use crate::error::AnswerError;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::Mutex;

/// Builds an in-memory PDF with one line of text per page.
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().expect("content stream encodes");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf serializes");
    bytes
}

/// Language model that answers with the system prompt it was given, which
/// makes the retrieved context visible in assertions.
#[derive(Default)]
pub struct EchoModel {
    temperatures: Mutex<Vec<f32>>,
}

impl EchoModel {
    pub fn temperatures(&self) -> Vec<f32> {
        self.temperatures
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String, AnswerError> {
        if let Ok(mut seen) = self.temperatures.lock() {
            seen.push(temperature);
        }
        Ok(messages
            .iter()
            .filter(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Language model whose every call fails like an unreachable provider.
#[derive(Default)]
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _temperature: f32,
    ) -> Result<String, AnswerError> {
        Err(AnswerError::Provider {
            status: 503,
            body: "provider unavailable".to_string(),
        })
    }
}

/// Request seen by a [`StubProvider`].
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// Local HTTP endpoint that answers every POST to one path with a canned
/// status and JSON body, recording what it was sent.
#[cfg(test)]
pub(crate) struct StubProvider {
    pub base_url: String,
    requests: std::sync::Arc<Mutex<Vec<RecordedRequest>>>,
}

#[cfg(test)]
impl StubProvider {
    pub async fn start(
        path: &'static str,
        status: u16,
        reply: serde_json::Value,
    ) -> std::io::Result<Self> {
        use axum::http::{header, HeaderMap, StatusCode};
        use axum::routing::post;
        use axum::{Json, Router};
        use std::sync::Arc;

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&requests);
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let app = Router::new().route(
            path,
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let recorder = Arc::clone(&recorder);
                let reply = reply.clone();
                async move {
                    let authorization = headers
                        .get(header::AUTHORIZATION)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    if let Ok(mut seen) = recorder.lock() {
                        seen.push(RecordedRequest {
                            authorization,
                            body,
                        });
                    }
                    (status, Json(reply))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { base_url, requests })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}
