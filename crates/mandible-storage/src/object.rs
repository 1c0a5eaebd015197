//! The value identifying one artifact within a store.

/// Identity of one persisted artifact.
///
/// `id` is the upload hash for originals and `"{hash}/{thumbName}"` for
/// thumbnails. `size_class` is a free-form tag ("original" / "thumbnail")
/// consumed only by the [`NamePathMapper`](crate::NamePathMapper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreObject {
    pub id: String,
    pub mime: String,
    pub size_class: String,
    pub url: String,
}

impl StoreObject {
    pub fn new(
        id: impl Into<String>,
        mime: impl Into<String>,
        size_class: impl Into<String>,
    ) -> StoreObject {
        StoreObject {
            id: id.into(),
            mime: mime.into(),
            size_class: size_class.into(),
            url: String::new(),
        }
    }

    pub fn original(id: impl Into<String>, mime: impl Into<String>) -> StoreObject {
        StoreObject::new(id, mime, "original")
    }

    pub fn thumbnail(id: impl Into<String>, mime: impl Into<String>) -> StoreObject {
        StoreObject::new(id, mime, "thumbnail")
    }
}
