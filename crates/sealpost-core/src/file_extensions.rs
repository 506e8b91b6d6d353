//! Extension and MIME normalization.
//!
//! Allow-lists are written by people ("jpg", "JPEG", "tif") while detected types
//! come back from the sniffer; both sides go through the same canonical table
//! before they are compared.

/// MIME type for a known extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.trim().trim_start_matches('.').to_lowercase().as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/vnd.microsoft.icon",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "avif" => "image/avif",
        "psd" => "image/vnd.adobe.photoshop",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        "tar" => "application/x-tar",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" | "text" => "text/plain",
        "htm" | "html" => "text/html",
        "csv" => "text/csv",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "flac" => "audio/x-flac",
        "ogg" | "oga" => "audio/ogg",
        "m4a" => "audio/m4a",
        "mp4" | "m4v" => "video/mp4",
        "mov" | "qt" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(mime)
}

/// Canonical extension for a MIME type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime.trim().to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpeg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/vnd.microsoft.icon" | "image/x-icon" => "ico",
        "image/svg+xml" => "svg",
        "image/heic" | "image/heif" => "heic",
        "image/avif" => "avif",
        "image/vnd.adobe.photoshop" => "psd",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/gzip" => "gz",
        "application/x-tar" => "tar",
        "application/vnd.rar" | "application/x-rar-compressed" => "rar",
        "application/x-7z-compressed" => "7z",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        "audio/mpeg" => "mp3",
        "audio/x-wav" | "audio/wav" => "wav",
        "audio/x-flac" | "audio/flac" => "flac",
        "audio/ogg" => "ogg",
        "audio/m4a" | "audio/mp4" => "m4a",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-msvideo" => "avi",
        "video/x-matroska" => "mkv",
        _ => return None,
    };
    Some(ext)
}

/// Normalize an extension to its canonical form ("jpg" becomes "jpeg").
/// Unknown extensions are returned lowercased.
pub fn normalize_extension(ext: &str) -> String {
    let cleaned = ext.trim().trim_start_matches('.').to_lowercase();
    mime_for_extension(&cleaned)
        .and_then(extension_for_mime)
        .map(str::to_string)
        .unwrap_or(cleaned)
}

/// Normalize a whole allow-list, dropping blanks and duplicates.
pub fn normalize_allowed(allowed: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(allowed.len());
    for ext in allowed {
        if ext.trim().is_empty() {
            continue;
        }
        let normalized = normalize_extension(ext);
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}
