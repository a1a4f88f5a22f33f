// src/artifacts/content_type.rs

use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("eot", "application/vnd.ms-fontobject"),
];

/// MIME type for a file, by (case-insensitive) extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return OCTET_STREAM;
    };
    let ext = ext.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|&&(known, _)| known == ext)
        .map_or(OCTET_STREAM, |&(_, mime)| mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_to_mime_types() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("assets/app.JS")), "application/javascript");
        assert_eq!(content_type_for(Path::new("img/logo.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("fonts/a.woff2")), "font/woff2");
    }

    #[test]
    fn unknown_or_missing_extension_is_octet_stream() {
        assert_eq!(content_type_for(Path::new("data.bin")), OCTET_STREAM);
        assert_eq!(content_type_for(Path::new("LICENSE")), OCTET_STREAM);
        assert_eq!(content_type_for(Path::new(".htaccess")), OCTET_STREAM);
    }
}
