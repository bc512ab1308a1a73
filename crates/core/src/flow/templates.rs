//! Names of the outbound reply templates. One per branch of the flow; the
//! final reply additionally supports per-intent overrides.

pub const FAQ_REPLY: &str = "faq_reply";
pub const REQUEST_INFO: &str = "request_info";
pub const UNKNOWN_INTENT: &str = "unknown_intent";
pub const INVALID_DATA: &str = "invalid_data";
pub const SYSTEM_ERROR: &str = "system_error";
pub const FINAL_REPLY: &str = "final_reply";

/// Intent-specific final reply template name, e.g. `final_order_status`.
pub fn final_reply_for(intent: &str) -> String {
    format!("final_{intent}")
}
