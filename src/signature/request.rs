use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};

/// The parts of an inbound request a signature can cover.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    method: Method,
    scheme: String,
    authority: String,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl SignedRequest {
    /// Captures a request as seen by the relay.
    ///
    /// The target URI scheme comes from `x-forwarded-proto` (set by the
    /// fronting proxy), then from the URI itself, and defaults to `http`.
    /// The authority comes from the URI or the `host` header.
    #[must_use]
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .or_else(|| uri.scheme_str().map(str::to_ascii_lowercase))
            .unwrap_or_else(|| "http".to_string());
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                headers
                    .get(axum::http::header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default()
            .to_ascii_lowercase();
        let path = match uri.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        Self {
            method,
            scheme,
            authority,
            path,
            query: uri.query().map(str::to_string),
            headers,
            body,
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Lowercased URI scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Lowercased `host[:port]`.
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Absolute path, never empty.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Path plus `?query` when present.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }

    /// Full target URI.
    #[must_use]
    pub fn target_uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority, self.path_and_query())
    }

    /// Raw request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the combined, trimmed value of a header field.
    ///
    /// Repeated fields are joined with `", "`. Fields whose value is not
    /// visible ASCII are treated as absent.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().map(str::trim))
            .collect::<Result<_, _>>()
            .ok()?;
        if values.is_empty() {
            return None;
        }
        Some(values.join(", "))
    }
}
