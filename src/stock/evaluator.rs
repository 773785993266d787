//! Stock evaluation strategies over a parsed HTML document.

use scraper::{ElementRef, Html, Selector};

use crate::models::{
    CheckStrategy, Condition, DEFAULT_NEGATIVE_KEYWORDS, DEFAULT_POSITIVE_KEYWORDS,
};

/// Errors raised while evaluating a page.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// Stock decision plus a human-readable explanation for the check log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub in_stock: bool,
    pub message: String,
}

impl Evaluation {
    fn new(in_stock: bool, message: String) -> Self {
        Self { in_stock, message }
    }
}

/// Decide whether `document` shows the product in stock.
///
/// A selector strategy with a blank selector behaves like the default
/// keyword-missing strategy.
pub fn evaluate(document: &Html, strategy: &CheckStrategy) -> Result<Evaluation, EvaluationError> {
    match strategy {
        CheckStrategy::Selector {
            selector,
            condition,
            expected_value,
        } if !selector.trim().is_empty() => {
            evaluate_selector(document, selector, *condition, expected_value.as_deref())
        }
        CheckStrategy::Selector { .. } => Ok(evaluate_keywords_missing(document, None)),
        CheckStrategy::KeywordPresent { keywords } => {
            Ok(evaluate_keywords_present(document, keywords.as_deref()))
        }
        CheckStrategy::KeywordMissing { keywords } => {
            Ok(evaluate_keywords_missing(document, keywords.as_deref()))
        }
    }
}

fn evaluate_selector(
    document: &Html,
    selector: &str,
    condition: Condition,
    expected: Option<&str>,
) -> Result<Evaluation, EvaluationError> {
    let parsed = Selector::parse(selector).map_err(|e| EvaluationError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })?;

    let elements: Vec<ElementRef> = document.select(&parsed).collect();
    let content = selection_content(&elements);
    let expected = expected.unwrap_or("");

    let evaluation = match condition {
        Condition::Equals => Evaluation::new(
            content == expected,
            format!(
                "Selector '{}' content '{}' equals '{}'",
                selector, content, expected
            ),
        ),
        Condition::NotEquals => Evaluation::new(
            content != expected,
            format!(
                "Selector '{}' content '{}' does NOT equal '{}'",
                selector, content, expected
            ),
        ),
        Condition::Contains => Evaluation::new(
            content.contains(expected),
            format!(
                "Selector '{}' content '{}' contains '{}'",
                selector, content, expected
            ),
        ),
        Condition::Exists => Evaluation::new(
            !elements.is_empty(),
            format!("Selector '{}' exists", selector),
        ),
    };
    Ok(evaluation)
}

/// Trimmed text of all matched elements, or the first element's form value
/// when there is no text.
fn selection_content(elements: &[ElementRef]) -> String {
    let text: String = elements.iter().flat_map(|e| e.text()).collect();
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    elements.first().and_then(form_value).unwrap_or_default()
}

fn form_value(element: &ElementRef) -> Option<String> {
    match element.value().name() {
        "select" => {
            let options = Selector::parse("option").ok()?;
            let mut all = element.select(&options);
            let chosen = element
                .select(&options)
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| all.next())?;
            Some(
                chosen
                    .value()
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| chosen.text().collect::<String>()),
            )
        }
        "textarea" => Some(element.text().collect()),
        _ => element.value().attr("value").map(str::to_string),
    }
}

/// Lowercased text of the document body.
fn body_text(document: &Html) -> String {
    let text: String = match Selector::parse("body") {
        Ok(body) => document
            .select(&body)
            .flat_map(|b| b.text())
            .collect(),
        Err(_) => document.root_element().text().collect(),
    };
    text.to_lowercase()
}

/// Split a comma-separated keyword list; blank entries are dropped.
fn parse_keywords(configured: Option<&str>, default: &str) -> Vec<String> {
    let raw = configured
        .filter(|k| !k.trim().is_empty())
        .unwrap_or(default);
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn evaluate_keywords_present(document: &Html, keywords: Option<&str>) -> Evaluation {
    let keywords = parse_keywords(keywords, DEFAULT_POSITIVE_KEYWORDS);
    let body = body_text(document);

    match keywords.iter().find(|k| body.contains(k.as_str())) {
        Some(found) => Evaluation::new(true, format!("Found keyword: '{}'", found)),
        None => Evaluation::new(false, "No positive keywords found".to_string()),
    }
}

fn evaluate_keywords_missing(document: &Html, keywords: Option<&str>) -> Evaluation {
    let keywords = parse_keywords(keywords, DEFAULT_NEGATIVE_KEYWORDS);
    let body = body_text(document);

    match keywords.iter().find(|k| body.contains(k.as_str())) {
        Some(found) => Evaluation::new(false, format!("Found negative keyword: '{}'", found)),
        None => Evaluation::new(
            true,
            "No negative keywords found (Assumed In Stock)".to_string(),
        ),
    }
}
