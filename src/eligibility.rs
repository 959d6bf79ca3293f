//! Which pages a session may be started on.

/// Whether the listener may be injected into a page at `uri`.
///
/// Web pages are always eligible. Local files are eligible only if the user granted the extension file-scheme access.
/// Everything else (including other extensions' pages and browser-internal pages) is not.
#[must_use]
pub fn can_inject(uri: &str, file_scheme_access: bool) -> bool {
	has_scheme(uri, "http://") || has_scheme(uri, "https://") || (file_scheme_access && has_scheme(uri, "file://"))
}

fn has_scheme(uri: &str, scheme: &str) -> bool {
	uri.get(..scheme.len()).map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme))
}
