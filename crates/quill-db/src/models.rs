//! Store row types. These map directly to the columns `extract_messages`
//! selects; optional columns that the store lacks read as `None`.

use quill_types::models::Sender;

use crate::classify::{self, RowFlags, RowKind};

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub rowid: i64,
    /// Raw store date: seconds or nanoseconds since 2001-01-01 UTC.
    pub date: i64,
    pub text: Option<String>,
    pub attributed_body: Option<Vec<u8>>,
    pub handle: Option<String>,
    pub is_from_me: Option<i64>,
    pub item_type: Option<i64>,
    pub associated_message_type: Option<i64>,
    pub group_action_type: Option<i64>,
    pub is_system_message: Option<i64>,
    pub chat_identifier: String,
}

impl MessageRow {
    pub fn flags(&self) -> RowFlags {
        RowFlags {
            item_type: self.item_type,
            associated_message_type: self.associated_message_type,
            group_action_type: self.group_action_type,
            is_system_message: self.is_system_message,
            has_text: self.text.as_deref().is_some_and(|t| !t.is_empty()),
            has_body: self.attributed_body.as_deref().is_some_and(|b| !b.is_empty()),
        }
    }

    pub fn kind(&self) -> RowKind {
        classify::classify(&self.flags())
    }

    /// `is_from_me = 1` is the local user. Otherwise the joined handle; with
    /// no handle the row is ours unless `is_from_me` is explicitly 0, in which
    /// case the conversation identifier stands in.
    pub fn sender(&self) -> Sender {
        match (self.is_from_me, self.handle.as_deref()) {
            (Some(1), _) => Sender::Me,
            (_, Some(handle)) if !handle.is_empty() => Sender::Handle(handle.to_string()),
            (Some(0), _) => Sender::Handle(self.chat_identifier.clone()),
            _ => Sender::Me,
        }
    }
}
