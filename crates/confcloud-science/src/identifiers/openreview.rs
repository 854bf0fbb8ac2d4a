use reqwest::Url;

/// Forum id from an OpenReview forum/pdf URL (`?id=...`).
///
/// Listing pages (`/group?id=ICLR.cc/2020/Conference`) carry an `id` too, but
/// it names a venue rather than a submission, so only `/forum` and `/pdf`
/// paths count. Missing scheme is tolerated.
pub fn extract_openreview_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let parsed = Url::parse(url)
        .or_else(|_| Url::parse(&format!("https://{url}")))
        .ok()?;

    let path = parsed.path().trim_end_matches('/');
    if !(path.ends_with("/forum") || path.ends_with("/pdf")) {
        return None;
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| is_forum_id(id))
}

fn is_forum_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
