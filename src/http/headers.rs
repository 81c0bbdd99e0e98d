//! Header storage with a closed set of standard names.
//!
//! Standard names live in their own map keyed by [`StandardHeader`], custom
//! names in an insertion-ordered list. Both sides match names
//! ASCII-case-insensitively, so `content-length`, `Content-Length`, and
//! `CONTENT-LENGTH` all land in the same slot. Iteration yields standard
//! entries first (in enum order, which fixes the serialization order on the
//! wire), then custom entries in insertion order.

use std::collections::BTreeMap;

/// The standard header names this framework recognizes.
///
/// The variant order is load-bearing: headers serialize in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StandardHeader {
    Accept,
    AcceptCharset,
    AcceptEncoding,
    AcceptLanguage,
    Authorization,
    CacheControl,
    Connection,
    ContentLength,
    ContentType,
    Cookie,
    Date,
    Host,
    IfMatch,
    IfModifiedSince,
    IfNoneMatch,
    IfRange,
    IfUnmodifiedSince,
    Location,
    MaxForwards,
    Pragma,
    ProxyAuthorization,
    Range,
    Referer,
    Server,
    Te,
    TransferEncoding,
    Upgrade,
    UserAgent,
    Via,
    Warning,
    AccessControlAllowOrigin,
    AccessControlAllowMethods,
    AccessControlAllowHeaders,
}

impl StandardHeader {
    pub const COUNT: usize = 33;

    const NAMES: [&'static str; Self::COUNT] = [
        "Accept",
        "Accept-Charset",
        "Accept-Encoding",
        "Accept-Language",
        "Authorization",
        "Cache-Control",
        "Connection",
        "Content-Length",
        "Content-Type",
        "Cookie",
        "Date",
        "Host",
        "If-Match",
        "If-Modified-Since",
        "If-None-Match",
        "If-Range",
        "If-Unmodified-Since",
        "Location",
        "Max-Forwards",
        "Pragma",
        "Proxy-Authorization",
        "Range",
        "Referer",
        "Server",
        "TE",
        "Transfer-Encoding",
        "Upgrade",
        "User-Agent",
        "Via",
        "Warning",
        "Access-Control-Allow-Origin",
        "Access-Control-Allow-Methods",
        "Access-Control-Allow-Headers",
    ];

    /// Canonical wire spelling.
    pub fn as_str(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    /// Case-insensitive lookup from a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        use StandardHeader::*;
        let folded = name.to_ascii_lowercase();
        let header = match folded.as_str() {
            "accept" => Accept,
            "accept-charset" => AcceptCharset,
            "accept-encoding" => AcceptEncoding,
            "accept-language" => AcceptLanguage,
            "authorization" => Authorization,
            "cache-control" => CacheControl,
            "connection" => Connection,
            "content-length" => ContentLength,
            "content-type" => ContentType,
            "cookie" => Cookie,
            "date" => Date,
            "host" => Host,
            "if-match" => IfMatch,
            "if-modified-since" => IfModifiedSince,
            "if-none-match" => IfNoneMatch,
            "if-range" => IfRange,
            "if-unmodified-since" => IfUnmodifiedSince,
            "location" => Location,
            "max-forwards" => MaxForwards,
            "pragma" => Pragma,
            "proxy-authorization" => ProxyAuthorization,
            "range" => Range,
            "referer" => Referer,
            "server" => Server,
            "te" => Te,
            "transfer-encoding" => TransferEncoding,
            "upgrade" => Upgrade,
            "user-agent" => UserAgent,
            "via" => Via,
            "warning" => Warning,
            "access-control-allow-origin" => AccessControlAllowOrigin,
            "access-control-allow-methods" => AccessControlAllowMethods,
            "access-control-allow-headers" => AccessControlAllowHeaders,
            _ => return None,
        };
        Some(header)
    }
}

/// Two-part header collection: standard slots plus custom entries.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    standard: BTreeMap<StandardHeader, String>,
    custom: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a standard header slot directly.
    pub fn set_std(&mut self, header: StandardHeader, value: impl Into<String>) {
        self.standard.insert(header, value.into());
    }

    /// Set a header by wire name. Names recognized as standard (any casing)
    /// route to the standard slot; everything else is stored custom,
    /// replacing an existing case-insensitive match in place.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        if let Some(header) = StandardHeader::from_name(name) {
            self.standard.insert(header, value.into());
        } else if let Some(entry) = self
            .custom
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            entry.1 = value.into();
        } else {
            self.custom.push((name.to_string(), value.into()));
        }
    }

    pub fn get_std(&self, header: StandardHeader) -> Option<&str> {
        self.standard.get(&header).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some(header) = StandardHeader::from_name(name) {
            self.get_std(header)
        } else {
            self.custom
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    pub fn has_std(&self, header: StandardHeader) -> bool {
        self.standard.contains_key(&header)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove_std(&mut self, header: StandardHeader) {
        self.standard.remove(&header);
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(header) = StandardHeader::from_name(name) {
            self.standard.remove(&header);
        } else {
            self.custom.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        }
    }

    /// Iterate standard entries in enum order, then custom entries in
    /// insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.standard
            .iter()
            .map(|(h, v)| (h.as_str(), v.as_str()))
            .chain(self.custom.iter().map(|(n, v)| (n.as_str(), v.as_str())))
    }

    /// All header names in iteration order.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|(name, _)| name).collect()
    }

    pub fn len(&self) -> usize {
        self.standard.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.standard.is_empty() && self.custom.is_empty()
    }

    pub fn clear(&mut self) {
        self.standard.clear();
        self.custom.clear();
    }
}
