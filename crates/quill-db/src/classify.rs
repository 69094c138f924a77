//! Row classification.
//!
//! A message row either carries conversation text or records an event in the
//! conversation (a tapback, a rename, a read receipt). Classification looks only
//! at the row's flags, never at its body.
//!
//! Flag mapping, first match wins:
//!
//! ```text
//! associated_message_type 2000..=2999      Reaction
//! associated_message_type 3000..=3999      ReactionRemoval
//! associated_message_type 1000             StickerPlacement
//! item_type 1, group_action_type 1         MemberRemoved
//! item_type 1, any other group_action_type MemberAdded
//! item_type 2                              GroupRename
//! item_type 3                              GroupPhotoOrLeave
//! item_type 5                              ReceiptMarker
//! any other nonzero item_type              SystemNotice
//! is_system_message 1                      SystemNotice
//! no text and no archived body             Empty
//! otherwise                                Text
//! ```

use std::fmt;

/// What a message row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Text,
    Reaction,
    ReactionRemoval,
    StickerPlacement,
    ReceiptMarker,
    MemberAdded,
    MemberRemoved,
    GroupRename,
    GroupPhotoOrLeave,
    SystemNotice,
    Empty,
}

/// The flag columns classification reads. Absent columns are `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowFlags {
    pub item_type: Option<i64>,
    pub associated_message_type: Option<i64>,
    pub group_action_type: Option<i64>,
    pub is_system_message: Option<i64>,
    pub has_text: bool,
    pub has_body: bool,
}

pub fn classify(flags: &RowFlags) -> RowKind {
    match flags.associated_message_type.unwrap_or(0) {
        2000..=2999 => return RowKind::Reaction,
        3000..=3999 => return RowKind::ReactionRemoval,
        1000 => return RowKind::StickerPlacement,
        _ => {}
    }
    match flags.item_type.unwrap_or(0) {
        0 => {}
        1 if flags.group_action_type == Some(1) => return RowKind::MemberRemoved,
        1 => return RowKind::MemberAdded,
        2 => return RowKind::GroupRename,
        3 => return RowKind::GroupPhotoOrLeave,
        5 => return RowKind::ReceiptMarker,
        _ => return RowKind::SystemNotice,
    }
    if flags.is_system_message.unwrap_or(0) != 0 {
        return RowKind::SystemNotice;
    }
    if !flags.has_text && !flags.has_body {
        return RowKind::Empty;
    }
    RowKind::Text
}

impl RowKind {
    /// The single filter applied to extracted rows.
    pub fn is_text_message(self) -> bool {
        self == RowKind::Text
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RowKind::Text => "text",
            RowKind::Reaction => "reaction",
            RowKind::ReactionRemoval => "reaction removal",
            RowKind::StickerPlacement => "sticker placement",
            RowKind::ReceiptMarker => "receipt marker",
            RowKind::MemberAdded => "member added",
            RowKind::MemberRemoved => "member removed",
            RowKind::GroupRename => "group rename",
            RowKind::GroupPhotoOrLeave => "group photo or leave",
            RowKind::SystemNotice => "system notice",
            RowKind::Empty => "empty",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row() -> RowFlags {
        RowFlags {
            has_text: true,
            ..Default::default()
        }
    }

    #[test]
    fn plain_row_is_text() {
        assert_eq!(classify(&text_row()), RowKind::Text);
        assert!(classify(&text_row()).is_text_message());
    }

    #[test]
    fn body_only_row_is_text() {
        let flags = RowFlags {
            has_body: true,
            item_type: Some(0),
            associated_message_type: Some(0),
            is_system_message: Some(0),
            ..Default::default()
        };
        assert_eq!(classify(&flags), RowKind::Text);
    }

    #[test]
    fn tapbacks_and_removals() {
        for (amt, kind) in [
            (2000, RowKind::Reaction),
            (2005, RowKind::Reaction),
            (3001, RowKind::ReactionRemoval),
            (1000, RowKind::StickerPlacement),
        ] {
            let flags = RowFlags {
                associated_message_type: Some(amt),
                ..text_row()
            };
            assert_eq!(classify(&flags), kind, "associated_message_type {amt}");
            assert!(!kind.is_text_message());
        }
    }

    #[test]
    fn item_types() {
        for (item_type, kind) in [
            (2, RowKind::GroupRename),
            (3, RowKind::GroupPhotoOrLeave),
            (5, RowKind::ReceiptMarker),
            (4, RowKind::SystemNotice),
            (6, RowKind::SystemNotice),
        ] {
            let flags = RowFlags {
                item_type: Some(item_type),
                group_action_type: Some(1),
                ..text_row()
            };
            assert_eq!(classify(&flags), kind, "item_type {item_type}");
        }
    }

    #[test]
    fn membership_direction_follows_group_action() {
        for (action, kind) in [
            (Some(0), RowKind::MemberAdded),
            (None, RowKind::MemberAdded),
            (Some(1), RowKind::MemberRemoved),
        ] {
            let flags = RowFlags {
                item_type: Some(1),
                group_action_type: action,
                ..text_row()
            };
            assert_eq!(classify(&flags), kind, "group_action_type {action:?}");
            assert!(!kind.is_text_message());
        }
    }

    #[test]
    fn system_flag_and_empty_rows() {
        let system = RowFlags {
            is_system_message: Some(1),
            ..text_row()
        };
        assert_eq!(classify(&system), RowKind::SystemNotice);
        assert_eq!(classify(&RowFlags::default()), RowKind::Empty);
    }

    #[test]
    fn unknown_associated_types_fall_through() {
        let flags = RowFlags {
            associated_message_type: Some(4000),
            ..text_row()
        };
        assert_eq!(classify(&flags), RowKind::Text);
    }
}
