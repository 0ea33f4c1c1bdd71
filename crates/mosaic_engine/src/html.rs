use scraper::{Html, Selector};

use crate::provider::ProviderError;

fn selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css).map_err(|err| ProviderError::Parse {
        what: format!("selector {css}"),
        message: err.to_string(),
    })
}

/// Trimmed text of every element matching `css`, empty matches skipped.
pub fn select_text(html: &str, css: &str) -> Result<Vec<String>, ProviderError> {
    let selector = selector(css)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect())
}

/// Value of `attr` on every element matching `css`.
pub fn select_attr(html: &str, css: &str, attr: &str) -> Result<Vec<String>, ProviderError> {
    let selector = selector(css)?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::to_string)
        .collect())
}

pub fn page_title(html: &str) -> Option<String> {
    select_text(html, "title").ok()?.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title> Chapter List </title></head><body>
        <ul><li><a href="/c/1">Chapter 1</a></li><li><a href="/c/2">Chapter 2</a></li><li><a href="/c/3"> </a></li></ul>
        </body></html>"#;

    #[test]
    fn extracts_text_and_attributes() {
        assert_eq!(page_title(PAGE).as_deref(), Some("Chapter List"));
        assert_eq!(select_text(PAGE, "li a").unwrap(), vec!["Chapter 1", "Chapter 2"]);
        assert_eq!(select_attr(PAGE, "li a", "href").unwrap(), vec!["/c/1", "/c/2", "/c/3"]);
    }

    #[test]
    fn bad_selector_is_a_parse_error() {
        assert!(matches!(select_text(PAGE, "li[[").unwrap_err(), ProviderError::Parse { .. }));
    }
}
