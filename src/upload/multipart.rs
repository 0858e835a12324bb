//! Multipart/form-data framing
//!
//! The upload body is framed by hand so the total length can be computed
//! before a single byte goes out: the server requires an exact
//! `Content-Length`, and the file part is streamed rather than buffered.
//! Two parts are always sent, in fixed order: a text field carrying the
//! agent name, then the audio file.

use uuid::Uuid;

const CRLF: &str = "\r\n";

/// Boundary token delimiting form parts. Probabilistically unique per
/// client instance; its appearance inside field values or the payload is
/// not guarded against.
#[derive(Debug, Clone)]
pub struct Boundary(String);

impl Boundary {
    pub fn generate() -> Self {
        Boundary(format!(
            "----VoxlinkFormBoundary{}",
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of the `Content-Type` request header for this boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.0)
    }
}

/// Header block opening one form part: leading boundary line,
/// `Content-Disposition`, optional `Content-Type`, blank line.
pub fn part_header(
    boundary: &Boundary,
    field_name: &str,
    filename: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let mut header = format!("--{}{}", boundary.as_str(), CRLF);
    header.push_str(&format!(
        "Content-Disposition: form-data; name=\"{}\"",
        field_name
    ));
    if let Some(filename) = filename {
        header.push_str(&format!("; filename=\"{}\"", filename));
    }
    header.push_str(CRLF);
    if let Some(content_type) = content_type {
        header.push_str(&format!("Content-Type: {}{}", content_type, CRLF));
    }
    header.push_str(CRLF);
    header
}

/// Closing boundary line terminating the body.
pub fn footer(boundary: &Boundary) -> String {
    format!("{}--{}--{}", CRLF, boundary.as_str(), CRLF)
}

/// Precomputed layout of one upload body.
///
/// The prologue covers everything before the file bytes (text part plus the
/// file part's header), the epilogue everything after. `total_len()` is the
/// exact byte count of prologue + file + epilogue and is what goes into the
/// `Content-Length` header; it must match the streamed bytes exactly.
#[derive(Debug, Clone)]
pub struct UploadPlan {
    prologue: Vec<u8>,
    file_len: u64,
    epilogue: Vec<u8>,
}

impl UploadPlan {
    pub fn new(
        boundary: &Boundary,
        agent_field: &str,
        agent_name: &str,
        file_field: &str,
        filename: &str,
        file_content_type: &str,
        file_len: u64,
    ) -> Self {
        let mut prologue = Vec::new();
        prologue.extend_from_slice(part_header(boundary, agent_field, None, None).as_bytes());
        prologue.extend_from_slice(agent_name.as_bytes());
        prologue.extend_from_slice(CRLF.as_bytes());
        prologue.extend_from_slice(
            part_header(boundary, file_field, Some(filename), Some(file_content_type)).as_bytes(),
        );

        UploadPlan {
            prologue,
            file_len,
            epilogue: footer(boundary).into_bytes(),
        }
    }

    pub fn prologue(&self) -> &[u8] {
        &self.prologue
    }

    pub fn epilogue(&self) -> &[u8] {
        &self.epilogue
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Exact body length for the `Content-Length` header.
    pub fn total_len(&self) -> u64 {
        self.prologue.len() as u64 + self.file_len + self.epilogue.len() as u64
    }
}
