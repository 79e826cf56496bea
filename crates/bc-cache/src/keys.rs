//! Cache key composition.
//!
//! Every key has the form `{prefix}:{namespace}:{part}[:{part}...]`. Parts
//! made only of `[A-Za-z0-9._@+=/-]` are used verbatim; any other part is
//! written as `~` followed by its unpadded base64url encoding, so a part
//! can never introduce a separator, a glob metacharacter or a control
//! character. Structured identifiers (filter objects, search queries) go
//! through [`KeyBuilder::encode_identifier`] first.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Encoded identifiers longer than this are replaced by a digest.
pub const MAX_IDENTIFIER_LEN: usize = 200;

/// Marks a part that was base64url-escaped.
const ESCAPE_MARKER: char = '~';

/// Marks an identifier that was replaced by its SHA-256 digest.
const DIGEST_MARKER: &str = "h.";

/// Data class of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Session,
    User,
    Stylist,
    Stylists,
    Services,
    Availability,
    Search,
    VerifyEmail,
    VerifySms,
    Stats,
    RateLimit,
    Route,
}

impl Namespace {
    /// Every namespace, in declaration order.
    pub const ALL: [Namespace; 12] = [
        Namespace::Session,
        Namespace::User,
        Namespace::Stylist,
        Namespace::Stylists,
        Namespace::Services,
        Namespace::Availability,
        Namespace::Search,
        Namespace::VerifyEmail,
        Namespace::VerifySms,
        Namespace::Stats,
        Namespace::RateLimit,
        Namespace::Route,
    ];

    /// The namespace segment as written into keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::User => "user",
            Self::Stylist => "stylist",
            Self::Stylists => "stylists",
            Self::Services => "services",
            Self::Availability => "availability",
            Self::Search => "search",
            Self::VerifyEmail => "verify:email",
            Self::VerifySms => "verify:sms",
            Self::Stats => "stats",
            Self::RateLimit => "ratelimit",
            Self::Route => "route",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds keys and invalidation patterns under one application prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    /// Creates a builder for `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The application prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Composes `{prefix}:{namespace}:{parts...}`, escaping each part.
    pub fn key<I, P>(&self, namespace: Namespace, parts: I) -> String
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut key = format!("{}:{}", self.prefix, namespace.as_str());
        for part in parts {
            key.push(':');
            push_escaped(&mut key, part.as_ref());
        }
        key
    }

    /// Pattern matching every key of `namespace`.
    #[must_use]
    pub fn namespace_pattern(&self, namespace: Namespace) -> String {
        format!("{}:{}:*", self.prefix, namespace.as_str())
    }

    /// Pattern matching keys of `namespace` whose leading parts equal
    /// `parts`, followed by anything.
    pub fn prefix_pattern<I, P>(&self, namespace: Namespace, parts: I) -> String
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut pattern = self.key(namespace, parts);
        pattern.push_str(":*");
        pattern
    }

    /// Scopes a caller-supplied glob under the application prefix.
    ///
    /// A pattern that already starts with `{prefix}:` is returned as is.
    #[must_use]
    pub fn scoped_pattern(&self, pattern: &str) -> String {
        let own = format!("{}:", self.prefix);
        if pattern.starts_with(&own) {
            pattern.to_string()
        } else {
            format!("{}{}", own, pattern)
        }
    }

    /// Scopes an externally supplied invalidation glob, refusing patterns
    /// that could reach rate-limit counters.
    ///
    /// The namespace segment must be literal: a glob there (`*`, `r*`,
    /// `[r]atelimit`) could match `ratelimit`, so it is refused along with
    /// `ratelimit` itself.
    #[must_use]
    pub fn invalidation_pattern(&self, pattern: &str) -> Option<String> {
        let scoped = self.scoped_pattern(pattern);
        let rest = &scoped[self.prefix.len() + 1..];
        let namespace = rest.split(':').next().unwrap_or_default();

        let literal = !namespace.is_empty()
            && !namespace.contains(|c: char| matches!(c, '*' | '?' | '[' | ']' | '\\'));
        if literal && namespace != Namespace::RateLimit.as_str() {
            Some(scoped)
        } else {
            None
        }
    }

    /// Encodes a structured identifier into a single key-safe part.
    ///
    /// The value is serialized to JSON and base64url-encoded. Encodings
    /// longer than [`MAX_IDENTIFIER_LEN`] are replaced by `h.` and the hex
    /// SHA-256 of the JSON, keeping keys bounded in length.
    pub fn encode_identifier<T: Serialize + ?Sized>(
        value: &T,
    ) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(value)?;
        let encoded = URL_SAFE_NO_PAD.encode(&json);
        if encoded.len() <= MAX_IDENTIFIER_LEN {
            Ok(encoded)
        } else {
            Ok(format!("{}{}", DIGEST_MARKER, hex::encode(Sha256::digest(&json))))
        }
    }
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '+' | '=' | '/' | '-')
}

fn push_escaped(key: &mut String, part: &str) {
    if !part.is_empty() && part.chars().all(is_safe) {
        key.push_str(part);
    } else {
        key.push(ESCAPE_MARKER);
        key.push_str(&URL_SAFE_NO_PAD.encode(part.as_bytes()));
    }
}
