//! Body emission: modifiers, ETag validation, cache policy and gzip.
//!
//! Every body written through a [`Context`](crate::Context) goes through
//! [`ResponseEncoder::emit`]. Small bodies are written untouched. Larger
//! ones get a content-hash ETag (answering `304 Not Modified` when the
//! client already holds it), a `Cache-Control` policy, and gzip when both
//! the client and the content type allow it.
//!
//! Compressors are expensive to build, so they are pooled and reset between
//! uses like request contexts are.

use http::header::{self, HeaderValue};
use http::StatusCode;
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use tracing::trace;

use crate::context::{Modifier, Pool, Poolable};
use crate::error::{Result, RouterError};
use crate::runtime_config::RuntimeConfig;
use crate::server::{Request, Response};

/// Bodies shorter than this are never hashed or compressed (roughly one
/// Ethernet frame of payload)
pub const GZIP_THRESHOLD: usize = 1450;

const CACHE_CONTROL_MEDIA: &str = "public, max-age=864000, immutable";
const CACHE_CONTROL_ALWAYS_VALIDATE: &str = "must-revalidate";

// Stable hashing (FNV-1a 64-bit)
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

// ID1 ID2 CM=deflate FLG MTIME(4) XFL OS=unknown
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];

/// Content hash used as the ETag, as lower-case hex
#[must_use]
pub fn etag(body: &[u8]) -> String {
    let hash = body
        .iter()
        .fold(FNV_OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
    format!("{hash:x}")
}

/// Whether `If-None-Match` names `tag`
fn etag_matches(if_none_match: &str, tag: &str) -> bool {
    if_none_match.split(',').any(|candidate| {
        let candidate = candidate.trim();
        if candidate == "*" {
            return true;
        }
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate.trim_matches('"') == tag
    })
}

/// Images, audio and video get the long-lived cache policy
#[must_use]
pub fn is_media(content_type: &str) -> bool {
    content_type.starts_with("image/")
        || content_type.starts_with("video/")
        || content_type.starts_with("audio/")
}

/// Whether gzip is worth trying for this content type
#[must_use]
pub fn can_compress(content_type: &str) -> bool {
    if content_type.starts_with("image/") {
        return content_type.starts_with("image/svg+xml");
    }
    !(content_type.starts_with("video/") || content_type.starts_with("audio/"))
}

fn accepts_gzip(request: &Request) -> bool {
    request
        .headers()
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("gzip"))
}

/// Reusable gzip compressor
pub struct GzipWriter {
    compress: Compress,
    crc: Crc,
}

impl GzipWriter {
    #[must_use]
    pub fn new(level: Compression) -> Self {
        Self {
            // Raw deflate; the gzip framing is written by hand
            compress: Compress::new(level, false),
            crc: Crc::new(),
        }
    }

    /// Append the gzip encoding of `input` to `out`
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Compression`] if deflate fails.
    pub fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.reserve(GZIP_HEADER.len() + input.len() / 2 + 64);
        out.extend_from_slice(&GZIP_HEADER);
        self.crc.update(input);

        let mut consumed = 0;
        loop {
            if out.capacity() - out.len() < 64 {
                out.reserve(input.len() / 4 + 64);
            }
            let before = self.compress.total_in();
            let status = self
                .compress
                .compress_vec(&input[consumed..], out, FlushCompress::Finish)?;
            consumed += (self.compress.total_in() - before) as usize;
            if status == Status::StreamEnd {
                break;
            }
        }

        out.extend_from_slice(&self.crc.sum().to_le_bytes());
        out.extend_from_slice(&self.crc.amount().to_le_bytes());
        Ok(())
    }
}

impl Poolable for GzipWriter {
    fn reset(&mut self) {
        self.compress.reset();
        self.crc.reset();
    }
}

/// Writes response bodies; shared by every context of a service
pub struct ResponseEncoder {
    gzip: bool,
    writers: Pool<GzipWriter>,
}

impl ResponseEncoder {
    #[must_use]
    pub fn new(config: &RuntimeConfig) -> Self {
        let level = Compression::new(config.gzip_level);
        Self {
            gzip: config.gzip,
            writers: Pool::new(config.gzip_pool_size, move || GzipWriter::new(level)),
        }
    }

    /// Emit `body` into `response`.
    ///
    /// # Errors
    ///
    /// Fails with [`RouterError::RequestCancelled`] if the client is gone,
    /// or with a compression error.
    pub fn emit(
        &self,
        request: &Request,
        response: &mut Response,
        status: StatusCode,
        modifiers: &[Modifier],
        body: Vec<u8>,
    ) -> Result<()> {
        if request.is_cancelled() {
            return Err(RouterError::RequestCancelled);
        }

        let body = modifiers.iter().fold(body, |body, modify| modify(body));

        if response.is_written() {
            return self.append(response, status, body);
        }

        if body.len() < GZIP_THRESHOLD {
            response.write(status, body);
            return Ok(());
        }

        let tag = etag(&body);
        if request
            .header(header::IF_NONE_MATCH)
            .is_some_and(|client| etag_matches(client, &tag))
        {
            trace!(etag = %tag, "ETag matched, answering 304");
            response.write(StatusCode::NOT_MODIFIED, Vec::new());
            return Ok(());
        }

        let (media, compressible) = {
            let content_type = response.header(header::CONTENT_TYPE).unwrap_or("");
            (is_media(content_type), can_compress(content_type))
        };

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::try_from(format!("\"{tag}\"")) {
            headers.insert(header::ETAG, value);
        }
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(if media {
                CACHE_CONTROL_MEDIA
            } else {
                CACHE_CONTROL_ALWAYS_VALIDATE
            }),
        );

        if !self.gzip || !compressible || !accepts_gzip(request) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
            response.write(status, body);
            return Ok(());
        }

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let mut compressed = Vec::new();
        {
            let mut writer = self.writers.acquire();
            writer.encode(&body, &mut compressed)?;
        }
        trace!(
            original = body.len(),
            compressed = compressed.len(),
            "Response body gzipped"
        );
        response.write(status, compressed);
        Ok(())
    }

    /// Later writes keep the encoding chosen by the first one.
    ///
    /// A gzipped body grows by another gzip member, a raw body by raw bytes.
    /// The ETag no longer describes the body and is dropped; an explicit
    /// `Content-Length` is brought up to date.
    fn append(&self, response: &mut Response, status: StatusCode, body: Vec<u8>) -> Result<()> {
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }

        let gzipped = response.header(header::CONTENT_ENCODING) == Some("gzip");
        let chunk = if gzipped {
            let mut compressed = Vec::new();
            let mut writer = self.writers.acquire();
            writer.encode(&body, &mut compressed)?;
            compressed
        } else {
            body
        };
        response.write(status, chunk);

        let total = response.body().len();
        let headers = response.headers_mut();
        headers.remove(header::ETAG);
        if headers.contains_key(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(total));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResponseEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEncoder")
            .field("gzip", &self.gzip)
            .field("writers", &self.writers)
            .finish()
    }
}
