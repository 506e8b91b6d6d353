use super::BOUNDARY;

pub const PNG_HEADER: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

pub const JPEG_HEADER: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01,
];

/// A payload with a PNG signature, padded to `size` bytes
pub fn png(size: usize) -> Vec<u8> {
    with_header(PNG_HEADER, size)
}

/// A payload with a JPEG signature, padded to `size` bytes
pub fn jpeg(size: usize) -> Vec<u8> {
    with_header(JPEG_HEADER, size)
}

fn with_header(header: &[u8], size: usize) -> Vec<u8> {
    let mut data = header.to_vec();
    data.extend((0..size.saturating_sub(header.len())).map(|i| (i % 251) as u8));
    data.truncate(size.max(header.len()));
    data
}

pub enum Part {
    Field(&'static str, String),
    File {
        field: &'static str,
        filename: String,
        data: Vec<u8>,
        transfer_encoding: Option<&'static str>,
    },
}

impl Part {
    pub fn field(name: &'static str, value: impl Into<String>) -> Self {
        Part::Field(name, value.into())
    }

    pub fn file(field: &'static str, filename: impl Into<String>, data: Vec<u8>) -> Self {
        Part::File {
            field,
            filename: filename.into(),
            data,
            transfer_encoding: None,
        }
    }

    pub fn base64_file(field: &'static str, filename: impl Into<String>, encoded: String) -> Self {
        Part::File {
            field,
            filename: filename.into(),
            data: encoded.into_bytes(),
            transfer_encoding: Some("base64"),
        }
    }
}

/// Encode parts as a `multipart/form-data` body using [`BOUNDARY`].
pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Field(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                field,
                filename,
                data,
                transfer_encoding,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        field, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
                if let Some(encoding) = transfer_encoding {
                    body.extend_from_slice(
                        format!("Content-Transfer-Encoding: {}\r\n", encoding).as_bytes(),
                    );
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Body cut off in the middle of a file part, without the closing boundary.
pub fn truncated_body(parts: &[Part], trailing: &[u8]) -> Vec<u8> {
    let mut body = multipart_body(parts);
    let closing = format!("--{}--\r\n", BOUNDARY);
    body.truncate(body.len() - closing.len());
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"late\"; filename=\"late.bin\"\r\n\r\n",
    );
    body.extend_from_slice(trailing);
    body
}
