//! Browser-side instrumentation handed to the host for embedding.

use std::borrow::Cow;

use crate::config::ServerMode;

/// Path the browser POSTs completion callbacks to.
pub const COMPLETION_PATH: &str = "/__vite_timing_hmr_complete";

/// Marker attribute on the injected tag; makes injection idempotent.
pub const SCRIPT_MARKER: &str = "data-vite-timing";

/// Module script that reports finished updates.
pub const CLIENT_SCRIPT: &str = include_str!("../assets/timing-client.js");

/// The `<script>` tag wrapping [`CLIENT_SCRIPT`].
pub fn script_tag() -> String {
    format!(
        "<script type=\"module\" {}>\n{}</script>",
        SCRIPT_MARKER, CLIENT_SCRIPT
    )
}

/// Adds the client script to a served HTML page.
///
/// Only development servers get the script; production output and pages
/// that already carry it are returned untouched.
pub fn inject_client_script(html: &str, mode: ServerMode) -> Cow<'_, str> {
    if !mode.is_development() || html.contains(SCRIPT_MARKER) {
        return Cow::Borrowed(html);
    }

    let tag = script_tag();
    let lower = html.to_ascii_lowercase();
    let at = lower.find("</head>").or_else(|| lower.find("<body"));
    match at {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + tag.len() + 1);
            out.push_str(&html[..at]);
            out.push_str(&tag);
            out.push('\n');
            out.push_str(&html[at..]);
            Cow::Owned(out)
        }
        None => Cow::Owned(format!("{}\n{}", tag, html)),
    }
}
