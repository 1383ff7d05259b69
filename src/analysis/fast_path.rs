//! Immediate classification of a request, without any network call.
//!
//! Only obvious cases are handled here: archives and PDF documents are offered as downloads,
//! simple raster images are shown directly, browser-friendly text formats are handed to the
//! browser. Everything else goes through the remote inspect operation.

use crate::{candidate::DisplayCandidate, request::ProductRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuickKind {
    Tar,
    Pdf,
    Raster,
    Browser,
}

fn kind_from_extension(ext: &str) -> Option<QuickKind> {
    match ext {
        "tar" | "tgz" => Some(QuickKind::Tar),
        "pdf" => Some(QuickKind::Pdf),
        "png" | "jpg" | "jpeg" | "gif" => Some(QuickKind::Raster),
        "html" | "htm" | "json" | "yaml" | "yml" | "txt" => Some(QuickKind::Browser),
        _ => None,
    }
}

fn kind_from_content_type(ct: &str) -> Option<QuickKind> {
    let ct = ct.to_lowercase();
    if ct.contains("x-tar") || ct == "application/tar" {
        Some(QuickKind::Tar)
    } else if ct.contains("pdf") {
        Some(QuickKind::Pdf)
    } else if ["image/png", "image/jpeg", "image/jpg", "image/gif"]
        .iter()
        .any(|t| ct.starts_with(t))
    {
        Some(QuickKind::Raster)
    } else if ct.starts_with("text/html")
        || ct.starts_with("text/plain")
        || ct.contains("json")
        || ct.contains("yaml")
    {
        Some(QuickKind::Browser)
    } else {
        None
    }
}

/// Classify a request from its URL extension or declared content type.
///
/// Arguments
/// -----------------
/// * `request`: The product request; only URL requests qualify.
/// * `content_type`: Content type declared by the source table, if any.
/// * `idx`: Index used to build the menu key of the candidate.
///
/// Return
/// ----------
/// * `Some(candidate)` for TAR, PDF, simple raster images and browser text formats.
/// * `None` when the request needs a deep analysis.
pub fn quick_classify(
    request: &ProductRequest,
    content_type: Option<&str>,
    idx: usize,
) -> Option<DisplayCandidate> {
    let url = request.url()?;
    let kind = request
        .url_extension()
        .as_deref()
        .and_then(kind_from_extension)
        .or_else(|| content_type.and_then(kind_from_content_type))?;

    let candidate = match kind {
        QuickKind::Tar => DisplayCandidate::message_with_download(
            "Cannot display TAR file, you may only download it",
            Some("Download TAR File".into()),
            Some(url.to_string()),
        ),
        QuickKind::Pdf => DisplayCandidate::message_with_download(
            "Cannot display PDF file, you may only download it",
            Some("Download PDF File".into()),
            Some(url.to_string()),
        ),
        QuickKind::Raster => DisplayCandidate::png("Show PNG image", url, format!("dlt-{idx}")),
        QuickKind::Browser => DisplayCandidate::send_to_browser(url),
    };
    Some(candidate)
}

#[cfg(test)]
mod fast_path_test {
    use super::*;
    use crate::candidate::{CandidateKind, DisplayType};

    #[test]
    fn test_extensions() {
        let tar = quick_classify(&ProductRequest::from_url("https://x.org/a.tar"), None, 0).unwrap();
        let m = tar.as_message().unwrap();
        assert_eq!(m.message, "Cannot display TAR file, you may only download it");
        assert_eq!(m.download.as_ref().unwrap().label, "Download TAR File");

        let png = quick_classify(&ProductRequest::from_url("https://x.org/a.JPG"), None, 3).unwrap();
        assert_eq!(png.display_type(), DisplayType::Png);
        assert_eq!(png.menu_key, "dlt-3");

        let html = quick_classify(&ProductRequest::from_url("https://x.org/index.html"), None, 0).unwrap();
        assert!(matches!(html.kind, CandidateKind::SendToBrowser { .. }));
    }

    #[test]
    fn test_content_type_and_misses() {
        let r = ProductRequest::from_url("https://x.org/getData?id=4");
        assert!(quick_classify(&r, None, 0).is_none());
        assert_eq!(
            quick_classify(&r, Some("application/pdf"), 0).map(|c| c.display_type()),
            Some(DisplayType::Message)
        );
        assert!(quick_classify(&ProductRequest::from_url("https://x.org/a.fits"), None, 0).is_none());
        assert!(quick_classify(&ProductRequest::from_file("/tmp/a.png"), None, 0).is_none());
    }
}
