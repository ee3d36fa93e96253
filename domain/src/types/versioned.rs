use derive_more::{Display, From, Into};

/// Opaque revision identifier handed out by the snapshot store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Into)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A value together with the store revision it was read at.
///
/// `version` is `None` when the value does not exist in the store yet;
/// writing it back then creates the document instead of replacing it.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub data: T,
    pub version: Option<VersionToken>,
}

impl<T> Versioned<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            data: f(self.data),
            version: self.version,
        }
    }
}
