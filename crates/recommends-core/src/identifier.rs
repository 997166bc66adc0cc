//! Storage identifiers for rated items.
//!
//! An identifier has the shape `{domain}:{site}:{id}`. The domain and site
//! never contain the separator, so the id may contain anything and the
//! identifier still parses unambiguously.

use crate::types::{Domain, ItemRef, SiteId};

/// Separator between identifier components.
pub const SEPARATOR: char = ':';

/// Build the identifier for `item` on `site`.
pub fn compose(item: &ItemRef, site: &SiteId) -> String {
    format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}",
        item.domain.as_str(),
        site.as_str(),
        item.id
    )
}

/// Split an identifier back into its item and site.
///
/// Returns `None` for strings that were not produced by [`compose`].
pub fn parse(identifier: &str) -> Option<(ItemRef, SiteId)> {
    let mut parts = identifier.splitn(3, SEPARATOR);
    let domain = Domain::new(parts.next()?).ok()?;
    let site = parts.next()?;
    let id = parts.next()?;
    if site.is_empty() {
        return None;
    }
    Some((ItemRef::new(domain, id), SiteId::new(site)))
}

/// Whether `identifier` refers to `item` on any site.
pub fn references(identifier: &str, item: &ItemRef) -> bool {
    parse(identifier).is_some_and(|(parsed, _)| &parsed == item)
}
