//! REST collaborators.
//!
//! Thin consumers of the independent backend endpoints: conversation list,
//! paged message history, lazy direct-conversation creation, and the user
//! directory. Every failure is logged at the call site and degrades to an
//! empty result so the UI shows a loading-then-empty state instead of
//! crashing (the socket and cache keep the session usable).

use serde::Deserialize;
use tracing::warn;
use url::Url;

use etschat_shared::dto::{RawConversation, RawMessage, RawUser};
use etschat_shared::types::{Conversation, Message, User};

/// One page of a conversation's message history.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub items: Vec<Message>,
    /// Absent when the history is exhausted.
    pub next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawMessagePage {
    items: Vec<RawMessage>,
    next_token: Option<String>,
}

/// Client for the ETS REST endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Option<Url> {
        match self.base_url.join(path) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(path, error = %e, "invalid api path");
                None
            }
        }
    }

    /// `GET /conversations?userId=` — the user's conversation list.
    pub async fn conversations_for_user(&self, user_id: &str) -> Vec<Conversation> {
        let Some(mut url) = self.endpoint("conversations") else {
            return Vec::new();
        };
        url.query_pairs_mut().append_pair("userId", user_id);
        match self.get_json::<Vec<RawConversation>>(url).await {
            Ok(raw) => raw
                .into_iter()
                .filter_map(RawConversation::into_conversation)
                .collect(),
            Err(e) => {
                warn!(user = %user_id, error = %e, "failed to fetch conversations");
                Vec::new()
            }
        }
    }

    /// `GET /conversations/{id}/messages?pageToken=` — one history page.
    pub async fn messages_for_conversation(
        &self,
        conversation_id: &str,
        page_token: Option<&str>,
    ) -> MessagePage {
        let Some(mut url) = self.endpoint(&format!("conversations/{conversation_id}/messages"))
        else {
            return MessagePage::default();
        };
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }
        match self.get_json::<RawMessagePage>(url).await {
            Ok(page) => MessagePage {
                items: page
                    .items
                    .into_iter()
                    .filter_map(|raw| raw.into_message(Some(conversation_id)))
                    .collect(),
                next_token: page.next_token.filter(|t| !t.is_empty()),
            },
            Err(e) => {
                warn!(conversation = %conversation_id, error = %e, "failed to fetch messages");
                MessagePage::default()
            }
        }
    }

    /// Fetch a conversation's entire history by following `nextToken`.
    pub async fn all_messages_for_conversation(&self, conversation_id: &str) -> Vec<Message> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .messages_for_conversation(conversation_id, token.as_deref())
                .await;
            items.extend(page.items);
            match page.next_token {
                // A server echoing the same token forever would loop us.
                Some(next) if Some(&next) != token.as_ref() => token = Some(next),
                _ => break,
            }
        }
        items
    }

    /// `POST /conversations/direct` — get or lazily create the direct
    /// conversation between two users.
    pub async fn get_or_create_direct(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Option<Conversation> {
        let url = self.endpoint("conversations/direct")?;
        let body = serde_json::json!({
            "userId": user_id,
            "otherUserId": other_user_id,
        });
        let result = async {
            let response = self.http.post(url).json(&body).send().await?;
            response
                .error_for_status()?
                .json::<RawConversation>()
                .await
        }
        .await;
        match result {
            Ok(raw) => raw.into_conversation(),
            Err(e) => {
                warn!(user = %user_id, other = %other_user_id, error = %e,
                    "failed to get or create direct conversation");
                None
            }
        }
    }

    /// `GET /users?includeExtended=` — the user directory.
    pub async fn users(&self, include_extended: bool) -> Vec<User> {
        let Some(mut url) = self.endpoint("users") else {
            return Vec::new();
        };
        if include_extended {
            url.query_pairs_mut().append_pair("includeExtended", "true");
        }
        match self.get_json::<Vec<RawUser>>(url).await {
            Ok(raw) => raw.into_iter().filter_map(RawUser::into_user).collect(),
            Err(e) => {
                warn!(error = %e, "failed to fetch user directory");
                Vec::new()
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> reqwest::Result<T> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_page_deserializes_loose_items() {
        let page: RawMessagePage = serde_json::from_str(
            r#"{"items":[{"id":"m1","timestamp":"2024-03-01T12:00:00Z","content":"hi"},
                         {"id":"bad-no-timestamp"}],
                "nextToken":"abc"}"#,
        )
        .unwrap();
        let items: Vec<Message> = page
            .items
            .into_iter()
            .filter_map(|raw| raw.into_message(Some("c1")))
            .collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "hi");
        assert_eq!(page.next_token.as_deref(), Some("abc"));
    }
}
