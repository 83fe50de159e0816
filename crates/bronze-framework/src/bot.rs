//! Typed actions over a caller.

use std::sync::Arc;

use bronze_core::{ApiCaller, ApiError, ApiRequest, ApiResult, Content, MessageId, downcast_caller};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Generates an action method that sends its arguments as params and
/// ignores the result data.
macro_rules! impl_action {
    ($(#[$meta:meta])* $name:ident => $action:literal, ($($arg:ident: $typ:ty),* $(,)?)) => {
        $(#[$meta])*
        pub async fn $name(&self, $($arg: $typ),*) -> ApiResult<()> {
            self.call_api($action, json!({ $(stringify!($arg): $arg),* })).await?;
            Ok(())
        }
    };
}

/// Account info returned by `get_login_info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInfo {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
}

/// A connected bot account.
#[derive(Clone)]
pub struct Bot {
    caller: Arc<dyn ApiCaller>,
}

impl Bot {
    pub fn new(caller: Arc<dyn ApiCaller>) -> Self {
        Self { caller }
    }

    pub fn self_id(&self) -> i64 {
        self.caller.self_id()
    }

    pub fn caller(&self) -> &Arc<dyn ApiCaller> {
        &self.caller
    }

    /// The concrete transport behind this bot, if it is a `T`.
    pub fn expose_caller<T: ApiCaller>(&self) -> Option<&T> {
        downcast_caller::<T>(self.caller.as_ref())
    }

    /// Calls `action` and returns the response data.
    ///
    /// `params` must be a JSON object or null. A response with status
    /// `failed` becomes [`ApiError::Failed`].
    pub async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
        let params = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ApiError::Serialization(format!(
                    "params for {action} must be an object, got {other}"
                )));
            }
        };
        let request = ApiRequest {
            params,
            ..ApiRequest::new(action)
        };
        let response = self.caller.call_api(request).await?;
        if response.is_failed() {
            return Err(ApiError::Failed {
                response: Box::new(response),
            });
        }
        Ok(response.data)
    }

    async fn send(&self, action: &str, params: Value) -> ApiResult<MessageId> {
        let data = self.call_api(action, params).await?;
        let id = data
            .get("message_id")
            .cloned()
            .ok_or_else(|| ApiError::InvalidResponse(format!("{action} returned no message_id")))?;
        Ok(serde_json::from_value(id)?)
    }

    pub async fn send_group_message(
        &self,
        group_id: i64,
        message: impl Into<Content>,
    ) -> ApiResult<MessageId> {
        let message = message.into();
        self.send("send_group_msg", json!({"group_id": group_id, "message": message}))
            .await
    }

    pub async fn send_private_message(
        &self,
        user_id: i64,
        message: impl Into<Content>,
    ) -> ApiResult<MessageId> {
        let message = message.into();
        self.send("send_private_msg", json!({"user_id": user_id, "message": message}))
            .await
    }

    pub async fn send_guild_channel_message(
        &self,
        guild_id: &str,
        channel_id: &str,
        message: impl Into<Content>,
    ) -> ApiResult<MessageId> {
        let message = message.into();
        self.send(
            "send_guild_channel_msg",
            json!({"guild_id": guild_id, "channel_id": channel_id, "message": message}),
        )
        .await
    }

    pub async fn mark_message_as_read(&self, message_id: &MessageId) -> ApiResult<()> {
        self.call_api("mark_msg_as_read", json!({"message_id": message_id}))
            .await?;
        Ok(())
    }

    pub async fn get_login_info(&self) -> ApiResult<LoginInfo> {
        let data = self.call_api("get_login_info", Value::Null).await?;
        Ok(serde_json::from_value(data)?)
    }

    impl_action!(
        /// Recalls a message.
        delete_message => "delete_msg", (message_id: MessageId)
    );

    impl_action!(
        /// Removes a member from a group.
        set_group_kick => "set_group_kick", (group_id: i64, user_id: i64, reject_add_request: bool)
    );

    impl_action!(
        /// Mutes a member for `duration` seconds; 0 lifts the mute.
        set_group_ban => "set_group_ban", (group_id: i64, user_id: i64, duration: i64)
    );
}
