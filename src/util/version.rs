pub const APP_BIN: &str = "freight-offer-scanner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_TAG: Option<&str> = option_env!("GIT_TAG");
pub const GIT_SHA: Option<&str> = option_env!("GIT_SHA");

/// The release tag when built from one, otherwise `v<crate version>`.
pub fn version_label() -> String {
    if let Some(tag) = GIT_TAG {
        tag.to_string()
    } else {
        format!("v{}", APP_VERSION)
    }
}

/// Sent with every exchange request.
pub fn user_agent() -> String {
    match GIT_SHA {
        Some(sha) => format!("{}/{} ({})", APP_BIN, version_label(), sha),
        None => format!("{}/{}", APP_BIN, version_label()),
    }
}
