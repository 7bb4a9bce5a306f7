use bytes::Bytes;

/// A ranged fetch request.
///
/// The range is inclusive on both ends, matching the HTTP `Range` header
/// (`bytes=0-4095` requests the first 4 KiB). A job is immutable once
/// submitted and is moved, never shared, between the submitter, the master
/// and the worker that serves it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Job {
    pub url: String,
    pub start: u64,
    pub end: u64,
}

impl Job {
    pub fn new(url: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            url: url.into(),
            start,
            end,
        }
    }

    /// Returns the inclusive `start-end` form of the range.
    pub fn range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// Returns the value for an HTTP `Range` header.
    pub fn range_header(&self) -> String {
        format!("bytes={}", self.range())
    }
}

/// A completed transport exchange: the status code and the buffered body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx family (200 OK, 206 Partial Content,
    /// ...).
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}
