//! id.loc.gov search URL construction and result-table scraping.

use scraper::{ElementRef, Html, Selector};
use url::form_urlencoded;

use reconcile_shared::Category;

/// One result from the search table: the heading row and the variant row
/// that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRow {
    pub href: String,
    pub heading: Option<String>,
    pub variants: Vec<String>,
}

impl SearchRow {
    /// Absolute authority URI for the row, resolving paths against `uri_base`.
    pub fn uri(&self, uri_base: &str) -> String {
        if self.href.starts_with("http://") || self.href.starts_with("https://") {
            self.href.clone()
        } else {
            format!("{}{}", uri_base.trim_end_matches('/'), self.href)
        }
    }
}

/// Search page URL: the text, one `rdftype:` term per type URI, and the
/// collection filter for `category`.
pub fn search_url(base_url: &str, text: &str, types: &[String], category: Category) -> String {
    let rdftypes: String = types
        .iter()
        .filter_map(|t| t.rsplit('/').next())
        .filter(|t| !t.is_empty())
        .map(|t| format!("+rdftype:{t}"))
        .collect();

    format!(
        "{}/search/?q={}{}&q=cs:{}",
        base_url.trim_end_matches('/'),
        quote_plus(text),
        rdftypes,
        quote_plus(category.resource_uri()),
    )
}

fn quote_plus(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Parse the `id-std` results table. Rows come in pairs; a heading row
/// without a link is skipped along with its variant row.
pub fn parse_results(html: &str) -> Vec<SearchRow> {
    let doc = Html::parse_document(html);
    let rows: Vec<ElementRef<'_>> = doc.select(&sel("table.id-std > tbody > tr")).collect();

    let link = sel("td > a[href]");
    let variant_cell = sel(r#"td[colspan="5"]"#);

    let mut results = Vec::new();
    for pair in rows.chunks(2) {
        let Some(anchor) = pair[0].select(&link).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let heading = normalize_ws(&anchor.text().collect::<String>());
        let variants = pair
            .get(1)
            .and_then(|row| row.select(&variant_cell).next())
            .map(|cell| {
                cell.text()
                    .collect::<String>()
                    .split(';')
                    .map(normalize_ws)
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        results.push(SearchRow {
            href: href.trim().to_string(),
            heading: (!heading.is_empty()).then_some(heading),
            variants,
        });
    }
    results
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a CSS selector that is known to be valid at compile time.
fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid CSS selector: {css}"))
}
