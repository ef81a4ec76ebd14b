//! Per-page table of site extractors.
//!
//! Owned by the page agent and rebuilt whenever the page navigates, so
//! registrations never outlive the document they were loaded into.

use crate::content::Site;
use crate::extract::{ExtractorFn, HighlighterFn};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

#[derive(Clone, Copy)]
pub struct Registration {
    pub extract: ExtractorFn,
    pub highlight: Option<HighlighterFn>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("highlight", &self.highlight.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ExtractionRegistry {
    entries: HashMap<Site, Registration>,
    site_script_loaded: bool,
}

impl ExtractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a site's extractor. A second registration for the same site
    /// replaces the first.
    pub fn register(
        &mut self,
        site: Site,
        extract: ExtractorFn,
        highlight: Option<HighlighterFn>,
    ) {
        if self
            .entries
            .insert(site, Registration { extract, highlight })
            .is_some()
        {
            warn!(%site, "extractor registered twice, keeping the latest");
        } else {
            debug!(%site, "extractor registered");
        }
        self.site_script_loaded = true;
    }

    pub fn get(&self, site: Site) -> Option<&Registration> {
        self.entries.get(&site)
    }

    pub fn has(&self, site: Site) -> bool {
        self.entries.contains_key(&site)
    }

    /// Whether any site-specific script has run on this page.
    pub fn site_script_loaded(&self) -> bool {
        self.site_script_loaded
    }

    pub fn extractor_available(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Registered sites, in no particular order.
    pub fn sites(&self) -> impl Iterator<Item = Site> + '_ {
        self.entries.keys().copied()
    }

    /// Forget every registration (navigation or reload).
    pub fn reset(&mut self) {
        self.entries.clear();
        self.site_script_loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::site_functions;

    #[test]
    fn test_register_get_and_reset() {
        let mut registry = ExtractionRegistry::new();
        assert!(!registry.extractor_available());
        assert!(!registry.site_script_loaded());

        let (extract, highlight) = site_functions(Site::Reddit);
        registry.register(Site::Reddit, extract, highlight);
        assert!(registry.has(Site::Reddit));
        assert!(!registry.has(Site::YouTube));
        assert!(registry.get(Site::Reddit).is_some_and(|r| r.highlight.is_some()));
        assert!(registry.extractor_available());
        assert!(registry.site_script_loaded());

        registry.reset();
        assert!(!registry.has(Site::Reddit));
        assert!(!registry.extractor_available());
        assert!(!registry.site_script_loaded());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = ExtractionRegistry::new();
        let (extract, _) = site_functions(Site::YouTube);
        registry.register(Site::YouTube, extract, None);
        let (extract, highlight) = site_functions(Site::YouTube);
        registry.register(Site::YouTube, extract, highlight);
        assert_eq!(registry.sites().count(), 1);
        assert!(registry.get(Site::YouTube).is_some_and(|r| r.highlight.is_some()));
    }
}
