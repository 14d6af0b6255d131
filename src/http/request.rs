// ABOUTME: Parses a reassembled text blob into an HTTP request record
// ABOUTME: Validates method and version; leaves confinement/handler concerns to the file handler

use thiserror::Error;

/// An ordered header list: insertion order is preserved, as the wire format requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }
}

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub protocol: String,
    pub version: String,
    pub headers: Headers,
    pub body: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
}

impl ParseError {
    pub fn status_code(&self) -> u16 {
        match self {
            ParseError::BadRequest(_) => 400,
            ParseError::UnsupportedMethod(_) => 405,
            ParseError::UnsupportedVersion(_) => 505,
        }
    }
}

const SUPPORTED_METHODS: [&str; 2] = ["GET", "POST"];
const SUPPORTED_VERSIONS: [&str; 2] = ["1.0", "1.1"];

/// Parse a CRLF-delimited text blob into a `Request`.
///
/// The blob is the result of reassembling DATA frames in sequence order; it
/// may carry embedded NUL bytes as a datagram-padding artefact, which are
/// stripped from the version token and the body before further processing.
pub fn parse(raw: &str) -> Result<Request, ParseError> {
    if raw.is_empty() {
        return Err(ParseError::BadRequest("empty request".to_string()));
    }

    let lines: Vec<&str> = raw.split("\r\n").collect();

    let request_line: Vec<&str> = lines[0].split(' ').collect();
    if request_line.len() < 3 {
        return Err(ParseError::BadRequest(format!(
            "malformed request line: {:?}",
            lines[0]
        )));
    }
    let method = request_line[0].to_string();
    let url = request_line[1].to_string();

    let proto_version: Vec<&str> = request_line[2].split('/').collect();
    if proto_version.len() != 2 {
        return Err(ParseError::BadRequest(format!(
            "malformed protocol/version token: {:?}",
            request_line[2]
        )));
    }
    let protocol = proto_version[0].to_string();
    let version = strip_nuls(proto_version[1]);

    if protocol != "HTTP" {
        return Err(ParseError::BadRequest(format!(
            "unsupported protocol: {protocol}"
        )));
    }

    let mut headers = Headers::new();
    let mut line_idx = 1;
    while line_idx < lines.len() {
        let line = lines[line_idx];
        line_idx += 1;
        if line.is_empty() {
            break;
        }
        match line.find(':') {
            Some(colon) => {
                let key = line[..colon].to_string();
                let value = line[colon + 1..].trim_start().to_string();
                headers.push(key, value);
            }
            None => {
                return Err(ParseError::BadRequest(format!(
                    "malformed header line: {line:?}"
                )));
            }
        }
    }

    let body = strip_nuls(&lines[line_idx..].join("\n"));

    if method.is_empty() {
        return Err(ParseError::BadRequest("missing method".to_string()));
    }
    if !SUPPORTED_METHODS.contains(&method.as_str()) {
        return Err(ParseError::UnsupportedMethod(method));
    }
    if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
        return Err(ParseError::UnsupportedVersion(version));
    }

    Ok(Request {
        method,
        url,
        protocol,
        version,
        headers,
        body,
    })
}

fn strip_nuls(s: &str) -> String {
    s.chars().filter(|&c| c != '\0').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_request() {
        let raw = "GET /readme.txt HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n";
        let req = parse(raw).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "/readme.txt");
        assert_eq!(req.protocol, "HTTP");
        assert_eq!(req.version, "1.1");
        assert_eq!(req.headers.get("Host"), Some("localhost"));
        assert_eq!(req.headers.get("Content-Length"), Some("0"));
        assert_eq!(req.body, "");
    }

    #[test]
    fn parses_post_body_with_colon_in_value() {
        let raw =
            "POST / HTTP/1.0\r\nContent-Length: 10\r\n\r\n{\"time\":\"12:30\"}";
        let req = parse(raw).unwrap();
        assert_eq!(req.body, "{\"time\":\"12:30\"}");
    }

    #[test]
    fn strips_embedded_nuls_from_version_and_body() {
        let raw = "GET / HTTP/1.1\0\r\n\r\nbo\0dy";
        let req = parse(raw).unwrap();
        assert_eq!(req.version, "1.1");
        assert_eq!(req.body, "body");
    }

    #[test]
    fn rejects_unsupported_method() {
        let raw = "DELETE / HTTP/1.1\r\n\r\n";
        assert_eq!(
            parse(raw).unwrap_err(),
            ParseError::UnsupportedMethod("DELETE".to_string())
        );
    }

    #[test]
    fn rejects_unsupported_version() {
        let raw = "GET / HTTP/2.0\r\n\r\n";
        assert_eq!(
            parse(raw).unwrap_err(),
            ParseError::UnsupportedVersion("2.0".to_string())
        );
    }

    #[test]
    fn rejects_malformed_request_line() {
        let raw = "GET /only-two-tokens\r\n\r\n";
        assert!(matches!(parse(raw), Err(ParseError::BadRequest(_))));
    }
}
