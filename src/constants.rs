//! Shared constants used across the application.

/// Browser user agent sent with every forum request.
pub const FORUM_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Footer shown on every webhook embed.
pub const EMBED_FOOTER: &str = "Forum Monitor";

/// Embed colour for new threads (Discord green).
pub const NEW_THREAD_COLOR: u32 = 0x57_F2_87;

/// Embed colour for new replies (Discord blurple).
pub const NEW_REPLY_COLOR: u32 = 0x58_65_F2;

/// Maximum characters kept from a scraped post body.
pub const POST_PREVIEW_CHARS: usize = 500;

/// Maximum characters of a post body shown in a reply embed.
pub const EMBED_PREVIEW_CHARS: usize = 200;

/// Fallback wait when a 429 response carries no usable `retry_after`.
pub const DEFAULT_RETRY_AFTER_SECS: f64 = 5.0;

/// Truncate `text` to at most `max_chars` characters, appending `...` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
