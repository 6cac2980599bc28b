use hermes_core::error::AppError;
use hermes_core::models::RawRecord;
use hermes_core::site::SiteProfile;
use hermes_core::traits::{Extraction, ExtractionAdapter};
use scraper::{ElementRef, Html, Selector};

/// Extracts listing records with the CSS selectors of a site profile.
///
/// When the primary item selector matches nothing, the profile's fallback
/// item selectors are tried in order and the first one with matches wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorExtractor;

impl SelectorExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn parse_selector(raw: &str) -> Result<Selector, AppError> {
    Selector::parse(raw)
        .map_err(|e| AppError::ExtractionError(format!("Invalid selector '{raw}': {e}")))
}

/// Text content with whitespace collapsed; `None` when missing or blank.
fn select_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    let found = element.select(selector).next()?;
    let text = found
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

impl ExtractionAdapter for SelectorExtractor {
    fn extract(&self, document: &str, profile: &SiteProfile) -> Result<Extraction, AppError> {
        let selectors = &profile.selectors;
        let item = parse_selector(&selectors.item)?;
        let name = parse_selector(&selectors.name)?;
        let price = parse_selector(&selectors.price)?;
        let link = parse_selector(&selectors.link)?;

        let html = Html::parse_document(document);
        let mut elements: Vec<ElementRef<'_>> = html.select(&item).collect();
        let primary_hits = elements.len();
        let mut fallback_selector = None;

        if elements.is_empty() {
            for candidate in &selectors.fallback_items {
                let selector = parse_selector(candidate)?;
                let matched: Vec<ElementRef<'_>> = html.select(&selector).collect();
                if !matched.is_empty() {
                    tracing::debug!(site = %profile.key, selector = %candidate, hits = matched.len(), "Fallback item selector matched");
                    elements = matched;
                    fallback_selector = Some(candidate.clone());
                    break;
                }
            }
        }

        let records = elements
            .iter()
            .map(|element| {
                let href = element
                    .select(&link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|h| profile.absolutize(h));
                RawRecord::new(
                    select_text(element, &name),
                    select_text(element, &price),
                    href,
                )
            })
            .collect();

        Ok(Extraction {
            records,
            primary_hits,
            fallback_selector,
        })
    }
}
