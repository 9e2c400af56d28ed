//! Form bodies: `application/x-www-form-urlencoded` and `multipart/form-data`.

use crate::http::query::parse_query;

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    /// Content type declared by the part, `application/octet-stream` if absent.
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Parsed form fields and files, in body order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, String)>,
    files: Vec<(String, UploadedFile)>,
}

impl FormData {
    /// Parses `body` according to `content_type`.
    ///
    /// Unknown content types and malformed bodies yield whatever parts could
    /// be read before the problem, possibly nothing.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Self {
        let Some(content_type) = content_type else {
            return Self::default();
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/x-www-form-urlencoded" => Self {
                fields: parse_query(&String::from_utf8_lossy(body)),
                files: Vec::new(),
            },
            "multipart/form-data" => match boundary(content_type) {
                Some(b) => parse_multipart(body, &b),
                None => Self::default(),
            },
            _ => Self::default(),
        }
    }

    /// First field with this name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First file with this field name.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, f)| f)
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn files(&self) -> &[(String, UploadedFile)] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}

/// Extracts the `boundary=` parameter from a `Content-Type` value.
pub fn boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// Parses a multipart body delimited by `--boundary` lines.
///
/// A delimiter only counts at the start of a line and when followed by a
/// line break, `--` or padding, so content that merely contains the
/// boundary text is kept intact.
pub fn parse_multipart(body: &[u8], boundary: &str) -> FormData {
    let delimiter = format!("\r\n--{boundary}").into_bytes();
    let mut form = FormData::default();

    // The opening delimiter may start the body without a line break.
    let mut pos = if is_delimiter_at(body, &delimiter[2..], 0) {
        delimiter.len() - 2
    } else {
        match find_delimiter(body, &delimiter, 0) {
            Some(i) => i + delimiter.len(),
            None => return form,
        }
    };

    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        let line_end = match find(body, b"\r\n", pos) {
            Some(i) => i + 2,
            None => break,
        };
        pos = line_end;

        let Some(next) = find_delimiter(body, &delimiter, pos) else {
            break;
        };
        read_part(&body[pos..next], &mut form);

        pos = next + delimiter.len();
    }

    form
}

fn is_delimiter_at(body: &[u8], delimiter: &[u8], at: usize) -> bool {
    if !body[at..].starts_with(delimiter) {
        return false;
    }
    let after = &body[at + delimiter.len()..];
    after.is_empty()
        || after.starts_with(b"--")
        || after.starts_with(b"\r\n")
        || after.starts_with(b" ")
        || after.starts_with(b"\t")
}

fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let mut from = from;
    while let Some(i) = find(body, delimiter, from) {
        if is_delimiter_at(body, delimiter, i) {
            return Some(i);
        }
        from = i + 1;
    }
    None
}

fn read_part(part: &[u8], form: &mut FormData) {
    let Some(split) = find(part, b"\r\n\r\n", 0) else {
        return;
    };
    let head = String::from_utf8_lossy(&part[..split]);
    let content = &part[split + 4..];

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("Content-Disposition") {
            for param in value.split(';').skip(1) {
                let Some((k, v)) = param.split_once('=') else {
                    continue;
                };
                let v = v.trim().trim_matches('"').to_string();
                match k.trim().to_ascii_lowercase().as_str() {
                    "name" => name = Some(v),
                    "filename" => filename = Some(v),
                    _ => {}
                }
            }
        } else if key.eq_ignore_ascii_case("Content-Type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let Some(name) = name else {
        return;
    };

    match filename {
        Some(filename) => form.files.push((
            name,
            UploadedFile {
                filename,
                content_type: content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data: content.to_vec(),
            },
        )),
        None => form
            .fields
            .push((name, String::from_utf8_lossy(content).into_owned())),
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_quoted_boundary() {
        assert_eq!(
            boundary("multipart/form-data; boundary=\"abc123\"").as_deref(),
            Some("abc123")
        );
        assert_eq!(boundary("multipart/form-data"), None);
    }

    #[test]
    fn urlencoded_body_becomes_fields() {
        let form = FormData::parse(
            Some("application/x-www-form-urlencoded"),
            b"name=john+doe&age=30",
        );
        assert_eq!(form.field("name"), Some("john doe"));
        assert_eq!(form.field("age"), Some("30"));
        assert!(form.files().is_empty());
    }

    #[test]
    fn unterminated_multipart_keeps_complete_parts() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n2";
        let form = parse_multipart(body, "B");
        assert_eq!(form.field("a"), Some("1"));
        assert_eq!(form.field("b"), None);
    }

    #[test]
    fn binary_file_content_is_untouched() {
        let mut body = b"--X\r\nContent-Disposition: form-data; name=\"f\"; filename=\"b.bin\"\r\n\r\n".to_vec();
        body.extend_from_slice(&[0, 159, 146, 150, b'\r', b'\n', 1]);
        body.extend_from_slice(b"\r\n--X--\r\n");

        let form = parse_multipart(&body, "X");
        let file = form.file("f").unwrap();
        assert_eq!(file.data, vec![0, 159, 146, 150, b'\r', b'\n', 1]);
        assert_eq!(file.content_type, "application/octet-stream");
    }

    #[test]
    fn boundary_text_inside_content_is_not_a_delimiter() {
        let body = b"--B\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\n\
x--By\r\n\
--B\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\r\n\
--Bnot a delimiter\r\n\
--B--\r\n";
        let form = parse_multipart(body, "B");
        assert_eq!(form.file("f").unwrap().data, b"x--By".to_vec());
        assert_eq!(form.field("note"), Some("--Bnot a delimiter"));
    }
}
