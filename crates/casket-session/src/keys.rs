//! Cache key derivation.

/// Prefixes that namespace a session's two cache entries.
///
/// Derived once per deployment from the site name and application path so
/// that applications sharing one cache never collide:
/// `{site}-{app_path}info-{id}` for the header and `{site}-{app_path}data-{id}`
/// for the body. Spaces in the site name become hyphens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefixes {
    header: String,
    data: String,
}

impl KeyPrefixes {
    /// Derive prefixes from deployment identity.
    pub fn new(site_name: &str, app_path: &str) -> Self {
        let base = format!("{}-{}", site_name.replace(' ', "-"), app_path);
        Self {
            header: format!("{base}info-"),
            data: format!("{base}data-"),
        }
    }

    /// Key of the header entry for `id`.
    pub fn header_key(&self, id: &str) -> String {
        format!("{}{}", self.header, id)
    }

    /// Key of the body entry for `id`.
    pub fn data_key(&self, id: &str) -> String {
        format!("{}{}", self.data, id)
    }

    pub fn header_prefix(&self) -> &str {
        &self.header
    }

    pub fn data_prefix(&self) -> &str {
        &self.data
    }
}

impl Default for KeyPrefixes {
    fn default() -> Self {
        Self::new("", "/")
    }
}
