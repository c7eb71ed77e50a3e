//! URL and content-id composition helpers
//!
//! Pure functions shared by the attachment service and its callers.

use crate::config::ComposeConfig;
use crate::types::SavedAttachment;

/// Content id for an inline upload, derived from its upload id
pub fn compose_content_id(upload_id: &str, domain: &str) -> String {
    format!("{upload_id}@{domain}")
}

/// Content-reference URL resolving an inline attachment in a message body
pub fn compose_cid_url(content_id: &str) -> String {
    format!("cid:{content_id}")
}

/// Extract the content id from a `cid:` URL, if it is one
pub fn content_id_from_cid_url(url: &str) -> Option<&str> {
    url.strip_prefix("cid:").filter(|id| !id.is_empty())
}

/// Download URL for a saved attachment part
pub fn compose_attachment_download_url(
    config: &ComposeConfig,
    attachment: &SavedAttachment,
) -> String {
    format!(
        "{}?auth=co&id={}&part={}",
        config.download_service_path, attachment.message_id, attachment.part_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_url_round_trip() {
        let cid = compose_content_id("u1", "compose");
        assert_eq!(cid, "u1@compose");
        let url = compose_cid_url(&cid);
        assert_eq!(url, "cid:u1@compose");
        assert_eq!(content_id_from_cid_url(&url), Some("u1@compose"));
    }

    #[test]
    fn test_non_cid_urls_are_rejected() {
        assert_eq!(content_id_from_cid_url("https://example.com"), None);
        assert_eq!(content_id_from_cid_url("cid:"), None);
    }

    #[test]
    fn test_download_url_includes_message_and_part() {
        let config = ComposeConfig::default();
        let attachment = SavedAttachment {
            message_id: "1234".into(),
            part_name: "2".into(),
            filename: "a.png".into(),
            content_type: "image/png".into(),
            size: 10,
            is_inline: true,
            content_id: Some("u1@compose".into()),
            requires_smart_link: false,
        };
        assert_eq!(
            compose_attachment_download_url(&config, &attachment),
            "/service/home/~/?auth=co&id=1234&part=2"
        );
    }
}
