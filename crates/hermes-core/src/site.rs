//! Site profiles: where to search, how to paginate, which selectors to use.
//!
//! The crawler never hard-codes storefront behaviour; it only asks a profile for
//! page URLs and hands the profile to the extraction adapter.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::util::encode_search_term;

/// Placeholder replaced by the encoded search term in `search_url`.
pub const TERM_PLACEHOLDER: &str = "{term}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    /// One match per listing card.
    pub item: String,
    /// Tried in order when `item` matches nothing (layout variants).
    #[serde(default)]
    pub fallback_items: Vec<String>,
    pub name: String,
    pub price: String,
    /// Element carrying the product `href`.
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationRule {
    /// Appends `{prefix}{offset}` to the path, offset = `(page - 1) * page_size + 1`.
    PathOffset { prefix: String, page_size: u32 },
    /// Sets `{param}={page}` in the query string.
    QueryParam { param: String },
}

impl PaginationRule {
    /// URL of `page` (1-based) given the first-page URL. Page 1 is returned unchanged.
    pub fn apply(&self, first_page: &str, page: u32) -> Result<String, AppError> {
        if page <= 1 {
            return Ok(first_page.to_string());
        }
        match self {
            PaginationRule::PathOffset { prefix, page_size } => {
                let offset = (page - 1)
                    .checked_mul(*page_size)
                    .and_then(|o| o.checked_add(1))
                    .ok_or_else(|| {
                        AppError::ConfigError(format!(
                            "Offset of page {page} overflows with page_size {page_size}"
                        ))
                    })?;
                Ok(format!("{first_page}{prefix}{offset}"))
            }
            PaginationRule::QueryParam { param } => {
                let mut url = Url::parse(first_page)
                    .map_err(|e| AppError::InvalidRequest(format!("Invalid URL '{first_page}': {e}")))?;
                let retained: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| k.as_ref() != param.as_str())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(retained)
                    .append_pair(param, &page.to_string());
                Ok(url.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Stable identifier used in job requests, e.g. `mercado_livre`.
    pub key: String,
    /// Display name stored on every extracted item.
    pub name: String,
    /// Search URL template containing `{term}`.
    pub search_url: String,
    /// Origin used to absolutize relative product links.
    #[serde(default)]
    pub link_base: Option<String>,
    pub selectors: Selectors,
    pub pagination: PaginationRule,
    /// Fetched once at the start of each job so the session picks up the
    /// site's cookies before the first search page.
    #[serde(default)]
    pub warmup_url: Option<String>,
}

impl SiteProfile {
    pub fn search_url(&self, term: &str) -> Result<String, AppError> {
        if !self.search_url.contains(TERM_PLACEHOLDER) {
            return Err(AppError::ConfigError(format!(
                "Site '{}' search_url has no {TERM_PLACEHOLDER} placeholder",
                self.key
            )));
        }
        Ok(self
            .search_url
            .replace(TERM_PLACEHOLDER, &encode_search_term(term)))
    }

    pub fn page_url(&self, term: &str, page: u32) -> Result<String, AppError> {
        let first = self.search_url(term)?;
        self.pagination.apply(&first, page)
    }

    /// Resolve a possibly relative `href` against `link_base`.
    pub fn absolutize(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        if let Ok(abs) = Url::parse(href) {
            return Some(abs.to_string());
        }
        let base = self.link_base.as_deref()?;
        Url::parse(base)
            .and_then(|b| b.join(href))
            .ok()
            .map(|u| u.to_string())
    }
}

/// Ordered set of known site profiles.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<SiteProfile>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<SiteProfile>) -> Self {
        let mut registry = Self::default();
        for site in sites {
            registry.insert(site);
        }
        registry
    }

    /// The storefronts supported out of the box.
    pub fn builtin() -> Self {
        Self::new(vec![mercado_livre(), amazon_br(), ebay()])
    }

    /// Parse a JSON array of profiles.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let sites: Vec<SiteProfile> = serde_json::from_str(raw)?;
        for site in &sites {
            site.search_url("probe")?;
        }
        Ok(Self::new(sites))
    }

    /// Built-in profiles extended (or overridden by key) with those in a JSON file.
    pub fn builtin_with_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read sites file {}: {e}", path.display()))
        })?;
        let mut registry = Self::builtin();
        for site in Self::from_json(&raw)?.sites {
            registry.insert(site);
        }
        Ok(registry)
    }

    /// Add a profile, replacing any existing one with the same key.
    pub fn insert(&mut self, site: SiteProfile) {
        match self.sites.iter_mut().find(|s| s.key == site.key) {
            Some(existing) => *existing = site,
            None => self.sites.push(site),
        }
    }

    pub fn get(&self, key: &str) -> Result<&SiteProfile, AppError> {
        self.sites.iter().find(|s| s.key == key).ok_or_else(|| {
            AppError::UnknownSite(format!(
                "'{key}'. Available sites: {}",
                self.keys().join(", ")
            ))
        })
    }

    pub fn list(&self) -> &[SiteProfile] {
        &self.sites
    }

    pub fn keys(&self) -> Vec<&str> {
        self.sites.iter().map(|s| s.key.as_str()).collect()
    }
}

fn mercado_livre() -> SiteProfile {
    SiteProfile {
        key: "mercado_livre".into(),
        name: "Mercado Livre".into(),
        search_url: "https://lista.mercadolivre.com.br/{term}".into(),
        link_base: Some("https://www.mercadolivre.com.br".into()),
        selectors: Selectors {
            item: "li.ui-search-layout__item".into(),
            fallback_items: vec![
                "div.ui-search-result__wrapper".into(),
                "div.ui-search-result".into(),
                "div.poly-card".into(),
            ],
            name: ".poly-component__title".into(),
            price: ".andes-money-amount__fraction".into(),
            link: ".poly-component__title".into(),
        },
        pagination: PaginationRule::PathOffset {
            prefix: "_Desde_".into(),
            page_size: 50,
        },
        warmup_url: Some("https://www.mercadolivre.com.br".into()),
    }
}

fn amazon_br() -> SiteProfile {
    SiteProfile {
        key: "amazon".into(),
        name: "Amazon".into(),
        search_url: "https://www.amazon.com.br/s?k={term}".into(),
        link_base: Some("https://www.amazon.com.br".into()),
        selectors: Selectors {
            item: "[data-component-type='s-search-result']".into(),
            fallback_items: Vec::new(),
            name: "h2 a span".into(),
            price: ".a-price-whole".into(),
            link: "h2 a".into(),
        },
        pagination: PaginationRule::QueryParam {
            param: "page".into(),
        },
        warmup_url: None,
    }
}

fn ebay() -> SiteProfile {
    SiteProfile {
        key: "ebay".into(),
        name: "eBay".into(),
        search_url: "https://www.ebay.com/sch/i.html?_nkw={term}".into(),
        link_base: Some("https://www.ebay.com".into()),
        selectors: Selectors {
            item: "li.s-item".into(),
            fallback_items: Vec::new(),
            name: ".s-item__title".into(),
            price: ".s-item__price".into(),
            link: ".s-item__link".into(),
        },
        pagination: PaginationRule::QueryParam {
            param: "_pgn".into(),
        },
        warmup_url: None,
    }
}
