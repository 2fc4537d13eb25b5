// src/facets/scrape.rs
// =============================================================================
// Reads the filter facets off the catalog page.
//
// The catalog renders its filters as a form:
//
//   <form name="arrFilter_form">
//     <div class="zcatalogDetail__filter_panel">
//       <span class="zcatalogDetail__filter_name">По цвету</span>
//       <label class="label-text">Красный</label>
//       <label class="label-text">Серый</label>
//     </div>
//     ...
//   </form>
//
// Each panel becomes one facet. The panel title is mapped to a short Latin
// facet name, each label is transliterated into a path segment.
//
// We use the `scraper` crate: parse the HTML into a DOM, then query it with
// CSS selectors.
// =============================================================================

use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

use super::translit::Transliterator;
use crate::checker::{BROWSER_ACCEPT, BROWSER_ACCEPT_LANGUAGE, USER_AGENTS};
use crate::urls::{should_skip, FacetMap};

// Panel title (lower-cased) -> facet name
const FACET_NAMES: [(&str, &str); 5] = [
    ("по материалу", "material"),
    ("по форме", "type"),
    ("по цвету", "color"),
    ("кому", "for"),
    ("гравировка  (оформление)", "engraving"),
];

// The selectors are constants, so parsing them can only fail on a typo here
fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("facet selector is valid CSS")
}

static FORM: LazyLock<Selector> = LazyLock::new(|| selector(r#"form[name="arrFilter_form"]"#));
static PANEL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class*="zcatalogDetail__filter_panel"]"#));
static PANEL_NAME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"span[class*="zcatalogDetail__filter_name"]"#));
static VALUE: LazyLock<Selector> = LazyLock::new(|| selector(r#"label[class*="label-text"]"#));

/// Why the facets could not be read from the site.
#[derive(Debug, thiserror::Error)]
pub enum FacetError {
    #[error("failed to fetch catalog page: {0}")]
    Request(#[from] reqwest::Error),

    #[error("catalog page answered with HTTP {0}")]
    Status(u16),

    #[error("filter form not found on the catalog page")]
    MissingForm,
}

/// Builds the client used to download the catalog page.
///
/// Unlike the prober's client this one follows redirects: the catalog may
/// move, and we only care about the page we end up on.
pub fn page_client(timeout: Duration, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10)); // follow up to 10 hops

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    builder.build()
}

/// Downloads the catalog page and reads its facets.
pub async fn fetch_facets(
    client: &Client,
    base_url: &str,
    translit: &Transliterator,
) -> Result<FacetMap, FacetError> {
    info!(url = base_url, "fetching filter facets");

    let response = client
        .get(base_url)
        .header(USER_AGENT, USER_AGENTS[0])
        .header(ACCEPT, BROWSER_ACCEPT)
        .header(ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE)
        .header(ACCEPT_ENCODING, "gzip, deflate")
        .header(CONNECTION, "keep-alive")
        .header(UPGRADE_INSECURE_REQUESTS, "1")
        .send()
        .await?;

    if response.status() != StatusCode::OK {
        return Err(FacetError::Status(response.status().as_u16()));
    }

    let html = response.text().await?;
    parse_facets(&html, translit)
}

/// Extracts the facets from the catalog page HTML.
///
/// Panels with an unknown title or without values are ignored.
pub fn parse_facets(html: &str, translit: &Transliterator) -> Result<FacetMap, FacetError> {
    let document = Html::parse_document(html);
    let form = document.select(&FORM).next().ok_or(FacetError::MissingForm)?;

    let mut facets = FacetMap::new();
    for panel in form.select(&PANEL) {
        let Some(name) = panel_name(panel) else {
            continue;
        };

        let values: Vec<String> = panel
            .select(&VALUE)
            .map(|label| text_of(label).trim().to_string())
            .filter(|text| !text.is_empty())
            .map(|text| translit.translit(&text))
            .collect();

        if values.is_empty() {
            continue;
        }
        debug!(facet = name, count = values.len(), "facet found");
        facets.insert(name.to_string(), values);
    }

    Ok(facets)
}

/// Cleans facet values before URL generation: drops empty values,
/// transliterates the rest, drops values matching a skip pattern and
/// finally drops facets left without values.
pub fn normalize_facets(facets: FacetMap, translit: &Transliterator) -> FacetMap {
    facets
        .into_iter()
        .filter_map(|(name, values)| {
            let clean: Vec<String> = values
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| translit.translit(v))
                .filter(|v| !should_skip(v))
                .collect();
            (!clean.is_empty()).then_some((name, clean))
        })
        .collect()
}

/// Facets used when the site cannot be read, so a run can still go ahead.
pub fn fallback_facets() -> FacetMap {
    let facet = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
    FacetMap::from([
        (
            "material".to_string(),
            facet(&["kapustinskiy", "granit", "mramor"]),
        ),
        ("type".to_string(), facet(&["derevo", "krest", "plita"])),
        ("color".to_string(), facet(&["chernyy", "krasnyy", "seryy"])),
    ])
}

fn panel_name(panel: ElementRef<'_>) -> Option<&'static str> {
    let title = text_of(panel.select(&PANEL_NAME).next()?);
    let title = title.trim().to_lowercase();
    FACET_NAMES
        .iter()
        .find(|(label, _)| *label == title)
        .map(|(_, name)| *name)
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}
