use crate::api::{self, unwrap_list, unwrap_record, ApiClient, ApiResponse};
use crate::booking::parse_date;
use crate::error::ApiError;
use crate::lenient;
use crate::storage::USER_ID_KEY;
use chrono::{DateTime, Local, Utc};
use leptos::{component, view, IntoView};
use pulldown_cmark::{CowStr, Event, Parser, Tag};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sender {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// The sender is either an id or a populated user.
fn sender<'de, D>(deserializer: D) -> Result<Sender, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => Sender {
            id: map
                .get("_id")
                .or_else(|| map.get("id"))
                .and_then(lenient::as_text),
            name: map.get("name").and_then(lenient::as_text),
        },
        Some(value) => Sender {
            id: lenient::as_text(&value),
            name: None,
        },
        None => Sender::default(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default, rename = "_id", deserialize_with = "lenient::text")]
    pub object_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "sender")]
    pub sender: Sender,
    #[serde(default, deserialize_with = "lenient::text")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Msg {
    pub id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub is_me: bool,
    pub text: String,
    pub html: String,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Msg {
    pub fn from_raw(raw: &RawMessage, me: &str) -> Self {
        let text = raw
            .text
            .clone()
            .or_else(|| raw.content.clone())
            .unwrap_or_default();
        let sender_id = raw.sender.id.clone().unwrap_or_default();
        Msg {
            id: raw
                .object_id
                .clone()
                .or_else(|| raw.id.clone())
                .unwrap_or_default(),
            is_me: !sender_id.is_empty() && sender_id == me,
            sender_id,
            sender_name: raw.sender.name.clone(),
            html: render_markdown(&text),
            text,
            sent_at: raw.created_at.as_deref().and_then(parse_date),
        }
    }

    /// Local wall-clock time, e.g. `14:05`.
    pub fn time(&self) -> String {
        self.sent_at
            .map(|sent_at| DateTime::<Local>::from(sent_at).format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

fn is_script_url(url: &str) -> bool {
    let url = url.trim_start().to_ascii_lowercase();
    url.starts_with("javascript:") || url.starts_with("vbscript:") || url.starts_with("data:")
}

/// Markdown to HTML. Raw HTML in the message is shown as text and script
/// links are neutralised.
pub fn render_markdown(text: &str) -> String {
    let events = Parser::new(text).map(|event| match event {
        Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) if is_script_url(&dest_url) => Event::Start(Tag::Link {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if is_script_url(&dest_url) => Event::Start(Tag::Image {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        }),
        event => event,
    });
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, events);
    html
}

pub fn messages_from_response(res: ApiResponse, me: &str) -> Result<Vec<Msg>, ApiError> {
    let body = res.into_result("Failed to fetch messages")?;
    let raws: Vec<RawMessage> = lenient::records(unwrap_list(body, "messages"));
    Ok(raws.iter().map(|raw| Msg::from_raw(raw, me)).collect())
}

/// Messages of a conversation, in the order the server sent them.
pub async fn fetch_messages(api: &ApiClient, conversation_id: &str) -> Result<Vec<Msg>, ApiError> {
    let me = api.store().get(USER_ID_KEY).unwrap_or_default();
    let request = api.authorized(Method::GET, &["chat", "messages", conversation_id])?;
    messages_from_response(api::send(request).await?, &me)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    pub text: String,
}

/// Posts a message and returns the server's copy. Nothing is added to
/// local state until then.
pub async fn send_message(api: &ApiClient, message: &NewMessage) -> Result<Msg, ApiError> {
    if message.text.trim().is_empty() {
        return Err(ApiError::Invalid("Message cannot be empty".into()));
    }
    let request = api.authorized(Method::POST, &["chat", "messages"])?.json(message);
    let body = api::send(request)
        .await?
        .into_result("Failed to send message")?;
    let raw: RawMessage = serde_json::from_value(unwrap_record(body, "message")).unwrap_or_default();
    Ok(Msg::from_raw(&raw, &message.sender_id))
}

#[component]
pub fn Message(message: Msg) -> impl IntoView {
    let time = message.time();
    let author = if message.is_me {
        "You".to_owned()
    } else {
        message.sender_name.clone().unwrap_or_default()
    };
    view! {
        <div class="message" class:mine=message.is_me>
            <span class="author">{author}</span>
            <span class="time">{time}</span>
            <div inner_html=message.html />
        </div>
    }
}
