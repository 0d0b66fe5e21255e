//! Driver for transports with no provider callback semantics
//! (SMTP, log, array, failover).

use async_trait::async_trait;

use crate::error::TrackError;
use crate::message::SentMessage;

use super::{CallbackDisposition, CallbackRequest, TrackerDriver};

/// Local driver: message-id resolution returns the transport-native id,
/// and callbacks are acknowledged without producing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDriver;

#[async_trait]
impl TrackerDriver for LocalDriver {
    fn resolve_message_id(&self, message: &SentMessage) -> Option<String> {
        Some(message.message_id.clone())
    }

    async fn callback(&self, _request: CallbackRequest) -> Result<CallbackDisposition, TrackError> {
        Ok(CallbackDisposition::Ignored)
    }
}
