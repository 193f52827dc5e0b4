use url::Url;

const MASKED_QUERY_KEYS: [&str; 3] = ["sig", "token", "signature"];

/// mask_url hides signed query values before a URL reaches the logs.
///
/// Unparseable URLs are returned untouched; they still have to show up in the
/// log line that reports the failed fetch.
pub fn mask_url(raw_url: &str) -> String {
    let Ok(mut url) = Url::parse(raw_url) else {
        return raw_url.to_string();
    };
    if url.query().is_none() {
        return raw_url.to_string();
    }
    let has_masked_key = url
        .query_pairs()
        .any(|(key, _)| MASKED_QUERY_KEYS.contains(&key.to_lowercase().as_str()));
    if !has_masked_key {
        // Nothing to hide; re-serializing would shuffle percent-encoding.
        return raw_url.to_string();
    }

    let masked: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            if MASKED_QUERY_KEYS.contains(&key.to_lowercase().as_str()) {
                (key.into_owned(), "***".to_string())
            } else {
                (key.into_owned(), value.into_owned())
            }
        })
        .collect();

    url.query_pairs_mut().clear().extend_pairs(masked);
    url.to_string()
}
