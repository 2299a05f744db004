use url::Url;

/// Clean user-supplied text using the ammonia library.
///
/// Whitelist-based: safe formatting tags survive, scripts and event-handler
/// attributes are stripped. Applied to listing descriptions and review/report
/// text before they are stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Validates that a string is an absolute http(s) URL.
pub fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_url")
            .with_message("Enter a valid http(s) URL.".into())),
    }
}

/// Validates a listing's image set: at most 10 URLs, each well formed.
pub fn validate_image_urls(urls: &[String]) -> Result<(), validator::ValidationError> {
    if urls.len() > 10 {
        return Err(validator::ValidationError::new("too_many_images")
            .with_message("A listing can have at most 10 images.".into()));
    }
    for url in urls {
        if url.len() > 500 {
            return Err(validator::ValidationError::new("url_too_long"));
        }
        validate_url_string(url)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_stripped() {
        let cleaned = clean_html("<b>Mint</b> condition<script>alert(1)</script>");
        assert_eq!(cleaned, "<b>Mint</b> condition");
    }

    #[test]
    fn image_urls_must_be_http() {
        assert!(validate_image_urls(&["https://cdn.example.com/a.jpg".to_string()]).is_ok());
        assert!(validate_image_urls(&["ftp://example.com/a.jpg".to_string()]).is_err());
        assert!(validate_image_urls(&["not a url".to_string()]).is_err());

        let eleven: Vec<String> = (0..11)
            .map(|i| format!("https://cdn.example.com/{i}.jpg"))
            .collect();
        assert!(validate_image_urls(&eleven).is_err());
    }
}
