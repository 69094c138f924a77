use quill_db::StoreError;

/// Exit codes for the CLI.
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_NOT_FOUND: u8 = 2;
pub const EXIT_ACCESS_DENIED: u8 = 3;
pub const EXIT_NO_CONVERSATION: u8 = 4;

/// Store failures get their own codes; everything else is 1.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.chain().find_map(|cause| cause.downcast_ref::<StoreError>()) {
        Some(StoreError::NotFound(_)) => EXIT_NOT_FOUND,
        Some(StoreError::AccessDenied(_)) => EXIT_ACCESS_DENIED,
        Some(StoreError::NoSuchConversation(_)) => EXIT_NO_CONVERSATION,
        _ => EXIT_ERROR,
    }
}
