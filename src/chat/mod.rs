use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::community::CommunityId;
use crate::db::models::member::MemberId;

pub mod discord;

pub type ChatResult<T> = core::result::Result<T, ChatErr>;

#[derive(Debug, Error)]
pub enum ChatErr {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    HeaderError(#[from] http::header::InvalidHeaderValue),

    #[error("chat api returned {code}: {body}")]
    Status { code: u16, body: String },
}

/// Everything the pipeline asks of the chat platform. One community maps to
/// one guild; channels and members are referenced by their platform ids.
#[async_trait]
pub trait ChatPort: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> ChatResult<()>;

    /// Message with an attached board image.
    async fn post_board(
        &self,
        channel: &str,
        text: &str,
        image: Vec<u8>,
        file_name: &str,
    ) -> ChatResult<()>;

    /// Creates the named role when the guild does not have it yet.
    async fn ensure_role(&self, community: &CommunityId, role_name: &str) -> ChatResult<()>;

    /// Revokes the named role from every current holder except `member`,
    /// then grants it to `member`. Idempotent for an already-sole holder.
    async fn rotate_single_holder(
        &self,
        community: &CommunityId,
        role_name: &str,
        member: &MemberId,
    ) -> ChatResult<()>;

    /// Guild display name for a member; `None` when the member cannot be
    /// resolved (callers fall back to the raw external handle).
    async fn resolve_display_name(
        &self,
        community: &CommunityId,
        member: &MemberId,
    ) -> ChatResult<Option<String>>;
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory recording double used across the pipeline tests.
    #[derive(Default)]
    pub struct RecordingChat {
        pub messages: Mutex<Vec<(String, String)>>,
        pub boards: Mutex<Vec<(String, String, Vec<u8>)>>,
        pub rotations: Mutex<Vec<(String, String, String)>>,
        pub names: Mutex<HashMap<String, String>>,
    }

    impl RecordingChat {
        pub fn with_name(self, member: &str, name: &str) -> Self {
            self.names
                .lock()
                .unwrap()
                .insert(member.to_string(), name.to_string());
            self
        }
    }

    /// Double whose outbound calls all fail, for transient-failure paths.
    pub struct ExplodingChat;

    #[async_trait]
    impl ChatPort for ExplodingChat {
        async fn post_message(&self, _channel: &str, _text: &str) -> ChatResult<()> {
            Err(ChatErr::Status { code: 500, body: "boom".to_string() })
        }

        async fn post_board(
            &self,
            _channel: &str,
            _text: &str,
            _image: Vec<u8>,
            _file_name: &str,
        ) -> ChatResult<()> {
            Err(ChatErr::Status { code: 500, body: "boom".to_string() })
        }

        async fn ensure_role(&self, _community: &CommunityId, _role_name: &str) -> ChatResult<()> {
            Err(ChatErr::Status { code: 500, body: "boom".to_string() })
        }

        async fn rotate_single_holder(
            &self,
            _community: &CommunityId,
            _role_name: &str,
            _member: &MemberId,
        ) -> ChatResult<()> {
            Err(ChatErr::Status { code: 500, body: "boom".to_string() })
        }

        async fn resolve_display_name(
            &self,
            _community: &CommunityId,
            _member: &MemberId,
        ) -> ChatResult<Option<String>> {
            Err(ChatErr::Status { code: 500, body: "boom".to_string() })
        }
    }

    #[async_trait]
    impl ChatPort for RecordingChat {
        async fn post_message(&self, channel: &str, text: &str) -> ChatResult<()> {
            self.messages
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string()));
            Ok(())
        }

        async fn post_board(
            &self,
            channel: &str,
            text: &str,
            image: Vec<u8>,
            _file_name: &str,
        ) -> ChatResult<()> {
            self.boards
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string(), image));
            Ok(())
        }

        async fn ensure_role(&self, _community: &CommunityId, _role_name: &str) -> ChatResult<()> {
            Ok(())
        }

        async fn rotate_single_holder(
            &self,
            community: &CommunityId,
            role_name: &str,
            member: &MemberId,
        ) -> ChatResult<()> {
            self.rotations.lock().unwrap().push((
                community.to_string(),
                role_name.to_string(),
                member.to_string(),
            ));
            Ok(())
        }

        async fn resolve_display_name(
            &self,
            _community: &CommunityId,
            member: &MemberId,
        ) -> ChatResult<Option<String>> {
            Ok(self.names.lock().unwrap().get(&member.0).cloned())
        }
    }
}
