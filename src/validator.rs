use crate::media::VideoReference;

const CONTENT_ID_LENGTH: usize = 11;

const MARKERS: [&str; 5] = ["youtu.be/", "watch?v=", "&v=", "embed/", "v/"];

/// Recognizes the supported host's URL shapes (watch pages, short links,
/// embeds) and extracts the canonical content identifier. Pure string
/// scan, no network.
pub fn validate(raw: &str) -> Option<VideoReference> {
    let trimmed = raw.trim();
    let content_id = extract_content_id(trimmed)?;

    Some(VideoReference {
        source_url: trimmed.to_string(),
        content_id: content_id.to_string(),
    })
}

/// The identifier follows the last recognized marker and runs until a
/// `#`, `&` or `?`. Anything other than exactly 11 characters is invalid.
pub fn extract_content_id(input: &str) -> Option<&str> {
    let start = candidate_start(input)?;
    let tail = &input[start..];
    let end = tail.find(['#', '&', '?']).unwrap_or(tail.len());
    let candidate = &tail[..end];

    (candidate.len() == CONTENT_ID_LENGTH).then_some(candidate)
}

fn candidate_start(input: &str) -> Option<usize> {
    let mut best: Option<usize> = None;

    for marker in MARKERS {
        if let Some(position) = input.rfind(marker) {
            let candidate = position + marker.len();
            if best.is_none_or(|current| candidate > current) {
                best = Some(candidate);
            }
        }
    }

    // "u/<char>/" channel-page shape
    for (position, _) in input.match_indices("u/") {
        let mut rest = input[position + 2..].chars();
        if let (Some(first), Some('/')) = (rest.next(), rest.next())
            && (first.is_ascii_alphanumeric() || first == '_')
        {
            let candidate = position + 2 + first.len_utf8() + 1;
            if best.is_none_or(|current| candidate > current) {
                best = Some(candidate);
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_url_shapes() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/u/w/dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=123",
            "https://youtu.be/dQw4w9WgXcQ?si=abcdef",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ#detalle",
        ];

        for case in cases {
            assert_eq!(extract_content_id(case), Some("dQw4w9WgXcQ"), "{case}");
        }
    }

    #[test]
    fn last_marker_wins() {
        assert_eq!(
            extract_content_id("https://www.youtube.com/watch?v=corto&v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn rejects_urls_without_markers() {
        assert_eq!(extract_content_id("https://example.com/dQw4w9WgXcQ"), None);
        assert_eq!(extract_content_id("https://vimeo.com/123456"), None);
        assert_eq!(extract_content_id("texto sin enlace"), None);
        assert_eq!(extract_content_id(""), None);
    }

    #[test]
    fn rejects_wrong_length_identifiers() {
        assert_eq!(extract_content_id("https://youtu.be/corto"), None);
        assert_eq!(
            extract_content_id("https://www.youtube.com/watch?v=dQw4w9WgXcQextra"),
            None
        );
        assert_eq!(extract_content_id("https://youtu.be/"), None);
        assert_eq!(
            extract_content_id("https://www.youtube.com/embed/dQw4w9WgXcQ/extra"),
            None
        );
    }

    #[test]
    fn marker_alone_is_enough() {
        // La extraccion solo mira los marcadores, no el dominio.
        assert_eq!(
            extract_content_id("https://example.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn validate_builds_reference() {
        let reference = validate("  https://youtu.be/dQw4w9WgXcQ  ").unwrap();
        assert_eq!(reference.source_url, "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(reference.content_id, "dQw4w9WgXcQ");

        assert!(validate("https://example.com/dQw4w9WgXcQ").is_none());
    }
}
