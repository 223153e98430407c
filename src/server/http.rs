//! Minimal HTTP/1.1 request parsing and response writing.
//!
//! Webhook senders make one short request per connection, so this handles a
//! single request per stream and always closes afterwards.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ServerError;
use crate::relay::QueryParams;

/// Longest accepted request line or header line.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Most header lines accepted in one request.
const MAX_HEADERS: usize = 100;

/// Largest body that will be read and discarded.
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// A parsed request head. Bodies are not used by the webhook and are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Target as sent, including any query string.
    pub target: String,
    pub path: String,
    pub query: QueryParams,
    /// Query parameters in arrival order, for logging.
    pub query_pairs: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one request from `reader`. Returns `Ok(None)` if the peer closed the
/// connection before sending anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(request_line) = read_line(reader).await? else {
        return Ok(None);
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed(format!("bad request line: {request_line:?}")));
    };
    if parts.next().is_some() || !version.starts_with("HTTP/1.") {
        return Err(malformed(format!("bad request line: {request_line:?}")));
    }

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| malformed("connection closed inside headers"))?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(malformed("too many headers"));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("bad header line: {line:?}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let (path, query_pairs) = parse_target(target);
    let request = Request {
        method: method.to_string(),
        target: target.to_string(),
        path,
        query: join_repeated(&query_pairs),
        query_pairs,
        headers,
    };

    discard_body(reader, &request).await?;
    Ok(Some(request))
}

async fn read_line<R>(reader: &mut R) -> Result<Option<String>, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if buf.len() > MAX_LINE_BYTES {
        return Err(malformed("line too long"));
    }
    if buf.last() != Some(&b'\n') {
        return Err(malformed("connection closed mid-line"));
    }

    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| malformed("request is not valid UTF-8"))
}

async fn discard_body<R>(reader: &mut R, request: &Request) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(raw) = request.header("Content-Length") else {
        return Ok(());
    };
    let len: u64 = raw
        .parse()
        .map_err(|_| malformed(format!("bad Content-Length: {raw:?}")))?;
    if len > MAX_BODY_BYTES {
        return Err(malformed("body too large"));
    }

    let copied = tokio::io::copy(&mut (&mut *reader).take(len), &mut tokio::io::sink()).await?;
    if copied < len {
        return Err(malformed("connection closed inside body"));
    }
    Ok(())
}

/// Split a request target into its path and decoded query parameters.
pub fn parse_target(target: &str) -> (String, Vec<(String, String)>) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let pairs = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    (path.to_string(), pairs)
}

/// Collapse repeated parameters into one comma-separated value.
pub fn join_repeated(pairs: &[(String, String)]) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in pairs {
        params
            .entry(key.clone())
            .and_modify(|existing: &mut String| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    params
}

fn malformed(reason: impl Into<String>) -> ServerError {
    ServerError::MalformedRequest(reason.into())
}

/// A plain-text response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub allow: Option<&'static str>,
}

impl Response {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            allow: None,
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::text(200, body)
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::text(400, body)
    }

    pub fn not_found(body: impl Into<String>) -> Self {
        Self::text(404, body)
    }

    pub fn method_not_allowed(allow: &'static str) -> Self {
        Self {
            allow: Some(allow),
            ..Self::text(405, "Method Not Allowed")
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "",
        }
    }

    /// Serialize as an HTTP/1.1 message that closes the connection.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.reason(),
            self.body.len()
        );
        if let Some(allow) = self.allow {
            head.push_str(&format!("Allow: {allow}\r\n"));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn parse(raw: &str) -> Result<Option<Request>, ServerError> {
        let mock = tokio_test::io::Builder::new().read(raw.as_bytes()).build();
        read_request(&mut BufReader::new(mock)).await
    }

    #[tokio::test]
    async fn test_parses_post_with_query_and_body() {
        let req = parse(
            "POST /rainmeter?text=hello%20world&color=red HTTP/1.1\r\n\
             Host: localhost:9999\r\n\
             Content-Length: 5\r\n\
             \r\n\
             {...}",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/rainmeter");
        assert_eq!(req.query["text"], "hello world");
        assert_eq!(req.query["color"], "red");
        assert_eq!(req.header("host"), Some("localhost:9999"));
    }

    #[tokio::test]
    async fn test_closed_connection_yields_none() {
        let mock = tokio_test::io::Builder::new().build();
        let req = read_request(&mut BufReader::new(mock)).await.unwrap();
        assert!(req.is_none());
    }

    #[tokio::test]
    async fn test_garbage_request_line_is_malformed() {
        let err = parse("HELLO\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ServerError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_truncated_body_is_malformed() {
        let err = parse("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_oversized_line_is_malformed() {
        let raw = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(MAX_LINE_BYTES));
        let mut reader = raw.as_bytes();
        let err = read_request(&mut reader).await.unwrap_err();
        assert!(matches!(err, ServerError::MalformedRequest(_)));
    }

    #[test]
    fn test_repeated_parameters_are_comma_joined() {
        let (path, pairs) = parse_target("/hook?tag=a&tag=b&plus=1+2&empty=");
        let query = join_repeated(&pairs);
        assert_eq!(path, "/hook");
        assert_eq!(query["tag"], "a,b");
        assert_eq!(query["plus"], "1 2");
        assert_eq!(query["empty"], "");
    }

    #[test]
    fn test_response_framing() {
        let bytes = Response::method_not_allowed("POST").to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(text.contains("Allow: POST\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nMethod Not Allowed"));
    }
}
