// ABOUTME: Serializes a status line, headers, and body into the text blob the HTTP peer expects

/// A response to be serialized and handed to the connection engine's chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub protocol: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    /// Build a response, filling in the mandatory `Server` and `Connection`
    /// headers. This server always closes the connection after one
    /// request/response, so `Connection: close` is sent regardless of
    /// version.
    pub fn new(status_code: u16, version: &str, body: String) -> Self {
        Response {
            status_code,
            protocol: "HTTP".to_string(),
            version: version.to_string(),
            headers: vec![
                ("Server".to_string(), "httpfs".to_string()),
                ("Connection".to_string(), connection_header(version).to_string()),
            ],
            body,
        }
    }

    /// Serialize to `{protocol}/{version} {status} {text}\r\n{headers}\r\n\r\n{body}`.
    pub fn serialize(&self) -> String {
        let mut out = format!(
            "{}/{} {} {}\r\n",
            self.protocol,
            self.version,
            self.status_code,
            status_text(self.status_code)
        );
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

/// `Connection: keep-alive | close`. This server always ends the connection
/// after one exchange, so `close` is the only value ever sent.
fn connection_header(_version: &str) -> &'static str {
    "close"
}

fn status_text(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_status_line_and_headers() {
        let resp = Response::new(200, "1.1", "hello\n".to_string());
        let serialized = resp.serialize();
        assert!(serialized.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(serialized.contains("Server: httpfs\r\n"));
        assert!(serialized.contains("Connection: close\r\n"));
        assert!(serialized.ends_with("\r\n\r\nhello\n"));
    }

    #[test]
    fn maps_known_status_codes() {
        assert_eq!(status_text(403), "Forbidden");
        assert_eq!(status_text(404), "Not Found");
        assert_eq!(status_text(401), "Unauthorized");
        assert_eq!(status_text(505), "HTTP Version Not Supported");
    }
}
