//! Form bodies for POST requests (§4.12), grounded in `form.hpp`'s public
//! interface. `form.cpp` in the retrieved pack is a stub (includes and an
//! empty namespace block, no method bodies survived filtering), so the
//! encoding logic below is implemented directly from RFC 1866
//! (`application/x-www-form-urlencoded`) and RFC 2046 (multipart) rather
//! than ported line-for-line; the field/file builder surface still
//! matches `form.hpp` exactly. The filesystem-path overloads
//! (`file(name, path)`, auto content-type detection from an extension
//! table) are not carried over: they're a thin convenience for reading a
//! file off disk, not protocol logic, and this port's `file()` always
//! takes an in-memory buffer instead.

struct FileEntry {
    name: String,
    filename: String,
    content_type: String,
    content: Vec<u8>,
}

/// Chainable form builder; auto-selects URL-encoded or multipart
/// encoding depending on whether any files were attached.
#[derive(Default)]
pub struct Form {
    fields: Vec<(String, String)>,
    files: Vec<FileEntry>,
    boundary: Option<String>,
}

impl Form {
    pub fn new() -> Self {
        Form::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn fields(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.fields.extend(pairs);
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        self.files.push(FileEntry {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        });
        self
    }

    pub fn is_multipart(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    pub fn content_type(&mut self) -> String {
        if self.is_multipart() {
            format!("multipart/form-data; boundary={}", self.boundary())
        } else {
            "application/x-www-form-urlencoded".to_string()
        }
    }

    pub fn body(&mut self) -> Vec<u8> {
        if self.is_multipart() {
            self.build_multipart()
        } else {
            self.build_urlencoded()
        }
    }

    fn build_urlencoded(&self) -> Vec<u8> {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", crate::url::url_encode(k), crate::url::url_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
            .into_bytes()
    }

    fn build_multipart(&mut self) -> Vec<u8> {
        let boundary = self.boundary().to_string();
        let mut out = Vec::new();
        for (name, value) in &self.fields {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            out.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        for file in &self.files {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            out.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    file.name, file.filename
                )
                .as_bytes(),
            );
            out.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
            out.extend_from_slice(&file.content);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        out
    }

    fn boundary(&mut self) -> &str {
        self.boundary.get_or_insert_with(generate_boundary)
    }
}

fn generate_boundary() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(32 + 12);
    out.push_str("----htxFormBoundary");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoded_form_joins_fields_with_ampersand() {
        let mut form = Form::new().field("a", "1").field("b", "hello world");
        assert!(!form.is_multipart());
        assert_eq!(form.content_type(), "application/x-www-form-urlencoded");
        assert_eq!(String::from_utf8(form.body()).unwrap(), "a=1&b=hello+world");
    }

    #[test]
    fn multipart_form_includes_boundary_and_file_headers() {
        let mut form = Form::new()
            .field("name", "John")
            .file("avatar", b"binarydata".to_vec(), "a.bin", "application/octet-stream");
        assert!(form.is_multipart());
        let content_type = form.content_type();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let boundary = content_type.strip_prefix("multipart/form-data; boundary=").unwrap().to_string();
        let body = String::from_utf8(form.body()).unwrap();
        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains("name=\"name\""));
        assert!(body.contains("filename=\"a.bin\""));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn empty_form_has_no_fields_or_files() {
        assert!(Form::new().is_empty());
        assert!(!Form::new().field("a", "1").is_empty());
    }
}
