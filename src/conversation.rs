use crate::api::{self, unwrap_list, unwrap_record, ApiClient, ApiResponse};
use crate::booking::parse_date;
use crate::error::ApiError;
use crate::lenient;
use crate::storage::USER_ID_KEY;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

const FETCH_FAILED: &str = "Failed to fetch conversations";

pub mod defaults {
    pub const NAME: &str = "Unknown";
    pub const EMAIL: &str = "";
    pub const LAST_MESSAGE: &str = "";
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawParticipant {
    #[serde(default, rename = "_id", deserialize_with = "lenient::text")]
    pub object_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub email: Option<String>,
}

impl RawParticipant {
    pub fn id(&self) -> Option<&str> {
        self.object_id.as_deref().or(self.id.as_deref())
    }
}

/// Participants arrive populated (`{ _id, name, email }`) or as bare ids.
fn participants<'de, D>(deserializer: D) -> Result<Vec<RawParticipant>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(values)) = value else {
        return Ok(vec![]);
    };
    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(_) => serde_json::from_value(value).ok(),
            value => lenient::as_text(&value).map(|id| RawParticipant {
                id: Some(id),
                ..Default::default()
            }),
        })
        .collect())
}

/// The last message is either its text or the whole message record.
fn last_message<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => map
            .get("text")
            .or_else(|| map.get("content"))
            .and_then(lenient::as_text),
        Some(value) => lenient::as_text(&value),
        None => None,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConversation {
    #[serde(default, rename = "_id", deserialize_with = "lenient::text")]
    pub object_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "participants")]
    pub participants: Vec<RawParticipant>,
    #[serde(default, deserialize_with = "last_message")]
    pub last_message: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub last_message_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub other_user_id: String,
    pub other_user_name: String,
    pub other_user_email: String,
    pub last_message: String,
    pub last_message_time: Option<DateTime<Utc>>,
}

impl ConversationView {
    pub fn from_raw(raw: &RawConversation, me: &str) -> Self {
        let other = raw
            .participants
            .iter()
            .find(|participant| participant.id().map_or(false, |id| id != me));
        let last_message_time = raw
            .last_message_time
            .as_deref()
            .or(raw.updated_at.as_deref())
            .and_then(parse_date);

        ConversationView {
            id: raw
                .object_id
                .clone()
                .or_else(|| raw.id.clone())
                .unwrap_or_default(),
            other_user_id: other
                .and_then(RawParticipant::id)
                .unwrap_or_default()
                .to_owned(),
            other_user_name: other
                .and_then(|other| other.name.clone())
                .unwrap_or_else(|| defaults::NAME.to_owned()),
            other_user_email: other
                .and_then(|other| other.email.clone())
                .unwrap_or_else(|| defaults::EMAIL.to_owned()),
            last_message: raw
                .last_message
                .clone()
                .unwrap_or_else(|| defaults::LAST_MESSAGE.to_owned()),
            last_message_time,
        }
    }
}

/// Most recent first, one thread per counterpart. Conversations without a
/// timestamp go last, in server order.
pub fn map_conversations(raws: &[RawConversation], me: &str) -> Vec<ConversationView> {
    let mut views: Vec<ConversationView> = raws
        .iter()
        .map(|raw| ConversationView::from_raw(raw, me))
        .collect();
    views.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));

    let mut seen = HashSet::new();
    views.retain(|view| view.other_user_id.is_empty() || seen.insert(view.other_user_id.clone()));
    views
}

pub fn conversations_from_response(
    res: ApiResponse,
    me: &str,
) -> Result<Vec<ConversationView>, ApiError> {
    let body = res.into_result(FETCH_FAILED)?;
    let raws: Vec<RawConversation> = lenient::records(unwrap_list(body, "conversations"));
    Ok(map_conversations(&raws, me))
}

/// Conversations of the signed-in user; empty when nobody is signed in.
pub async fn fetch_conversations(api: &ApiClient) -> Result<Vec<ConversationView>, ApiError> {
    let Some(me) = api.store().get(USER_ID_KEY).filter(|id| !id.is_empty()) else {
        return Ok(vec![]);
    };
    let request = api.authorized(Method::GET, &["chat", "conversations", me.as_str()])?;
    conversations_from_response(api::send(request).await?, &me)
}

/// Opens (or reopens) the thread with another user.
pub async fn start_conversation(
    api: &ApiClient,
    other_user_id: &str,
) -> Result<ConversationView, ApiError> {
    let me = api
        .store()
        .get(USER_ID_KEY)
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::SignedOut)?;
    if other_user_id == me {
        return Err(ApiError::Invalid("You cannot message yourself".into()));
    }
    let request = api
        .authorized(Method::POST, &["chat", "conversations"])?
        .json(&json!({ "participants": [me, other_user_id] }));
    let body = api::send(request)
        .await?
        .into_result("Failed to start conversation")?;
    let raw: RawConversation =
        serde_json::from_value(unwrap_record(body, "conversation")).unwrap_or_default();
    Ok(ConversationView::from_raw(&raw, &me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::{MemoryStore, TOKEN_KEY};
    use futures::executor::block_on;
    use reqwest::StatusCode;
    use std::rc::Rc;

    fn signed_in_without_user_id() -> ApiClient {
        let config = Config::new("https://api.example.com/api", None).unwrap();
        ApiClient::new(&config, Rc::new(MemoryStore::with([(TOKEN_KEY, "abc.def.ghi")])))
    }

    fn raws(value: Value) -> Vec<RawConversation> {
        lenient::records(unwrap_list(value, "conversations"))
    }

    #[test]
    fn other_participant_when_me_first() {
        let raws = raws(json!([{
            "_id": "c1",
            "participants": [
                {"_id": "me", "name": "Asha", "email": "asha@example.com"},
                {"_id": "g1", "name": "Ravi", "email": "ravi@example.com"}
            ],
            "lastMessage": "See you at 7",
            "lastMessageTime": "2025-01-02T07:00:00Z"
        }]));
        let views = map_conversations(&raws, "me");
        assert_eq!(views[0].other_user_id, "g1");
        assert_eq!(views[0].other_user_name, "Ravi");
        assert_eq!(views[0].other_user_email, "ravi@example.com");
        assert_eq!(views[0].last_message, "See you at 7");
    }

    #[test]
    fn other_participant_when_me_second() {
        let raws = raws(json!([{"participants": ["g1", {"_id": "me", "name": "Asha"}]}]));
        let views = map_conversations(&raws, "me");
        assert_eq!(views[0].other_user_id, "g1");
        assert_eq!(views[0].other_user_name, defaults::NAME);
    }

    #[test]
    fn no_other_participant() {
        let raws = raws(json!({"conversations": [
            {"participants": [{"_id": "me", "name": "Asha"}]},
            {"participants": "nope"},
            7
        ]}));
        let views = map_conversations(&raws, "me");
        assert_eq!(views.len(), 3);
        for view in views {
            assert_eq!(view.other_user_name, "Unknown");
            assert_eq!(view.other_user_email, "");
        }
    }

    #[test]
    fn newest_first() {
        let raws = raws(json!([
            {"_id": "old", "participants": ["me", "a"], "lastMessageTime": "2025-01-01T00:00:00Z"},
            {"_id": "none", "participants": ["me", "b"]},
            {"_id": "new", "participants": ["me", "c"], "updatedAt": "2025-03-01T00:00:00Z"},
            {"_id": "mid", "participants": ["me", "d"], "lastMessageTime": "2025-02-01"}
        ]));
        let ids: Vec<_> = map_conversations(&raws, "me")
            .into_iter()
            .map(|view| view.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old", "none"]);
    }

    #[test]
    fn one_thread_per_counterpart() {
        let raws = raws(json!([
            {"_id": "c1", "participants": ["me", "g1"], "lastMessageTime": "2025-01-01T00:00:00Z"},
            {"_id": "c2", "participants": ["g1", "me"], "lastMessageTime": "2025-01-05T00:00:00Z"},
            {"_id": "c3", "participants": ["me"]},
            {"_id": "c4", "participants": ["me"]}
        ]));
        let ids: Vec<_> = map_conversations(&raws, "me")
            .into_iter()
            .map(|view| view.id)
            .collect();
        assert_eq!(ids, vec!["c2", "c3", "c4"]);
    }

    #[test]
    fn last_message_record() {
        let raws = raws(json!([{"lastMessage": {"text": "hello", "sender": "g1"}}]));
        assert_eq!(map_conversations(&raws, "me")[0].last_message, "hello");
    }

    #[test]
    fn server_error() {
        let res = ApiResponse::new(StatusCode::UNAUTHORIZED, json!({"message": "Token expired"}));
        let err = conversations_from_response(res, "me").unwrap_err();
        assert_eq!(err.to_string(), "Token expired");
    }

    #[test]
    fn no_user_id_means_no_conversations() {
        let api = signed_in_without_user_id();
        assert_eq!(block_on(fetch_conversations(&api)).unwrap(), vec![]);
    }

    #[test]
    fn starting_a_conversation_needs_a_user() {
        let api = signed_in_without_user_id();
        let err = block_on(start_conversation(&api, "g1")).unwrap_err();
        assert!(matches!(err, ApiError::SignedOut));
        assert_eq!(err.to_string(), "No user is signed in");
    }
}
