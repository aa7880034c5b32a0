//! Locator abstraction for element selection.
//!
//! A [`Selector`] is a validated CSS selector. Locators are strict: an
//! observation only counts when exactly one element matches, so a page that
//! grows a second `h1` fails instead of silently picking the first one.

use serde::{Deserialize, Serialize};

use crate::result::{PageCheckError, PageCheckResult};

/// A validated CSS selector (e.g. `"h1"`, `"main > h1.title"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector(String);

impl Selector {
    /// Parse and validate a CSS selector
    ///
    /// Only structural problems are caught here (empty, dangling combinator,
    /// unbalanced brackets or quotes). Anything the page itself rejects is
    /// reported as a configuration error when the selector is first queried.
    pub fn parse(css: impl Into<String>) -> PageCheckResult<Self> {
        let css = css.into();
        let trimmed = css.trim();

        if trimmed.is_empty() {
            return Err(PageCheckError::configuration("selector must not be empty"));
        }

        if let Some(c) = trimmed.chars().next().filter(|c| is_combinator(*c)) {
            return Err(PageCheckError::configuration(format!(
                "selector {css:?} starts with combinator '{c}'"
            )));
        }
        if let Some(c) = trimmed.chars().last().filter(|c| is_combinator(*c)) {
            return Err(PageCheckError::configuration(format!(
                "selector {css:?} ends with combinator '{c}'"
            )));
        }

        check_balanced(&css)?;

        Ok(Self(trimmed.to_string()))
    }

    /// Wrap a selector literal known to be valid
    pub(crate) fn trusted(css: &str) -> Self {
        Self(css.to_string())
    }

    /// The CSS source text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// In-page expression returning `{ texts: [...] }` with the text content
    /// of every matching element, or `{ error }` if the page rejects the
    /// selector.
    #[must_use]
    pub fn to_text_contents_query(&self) -> String {
        // A JSON string literal is also a valid JS string literal.
        let literal = serde_json::Value::String(self.0.clone()).to_string();
        format!(
            "(() => {{ try {{ return {{ texts: Array.from(document.querySelectorAll({literal})).map(el => el.textContent ?? \"\") }}; }} catch (e) {{ return {{ error: String(e) }}; }} }})()"
        )
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Selector {
    type Error = PageCheckError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.0
    }
}

/// Raw result of [`Selector::to_text_contents_query`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextContentsQueryResult {
    /// Text content of each matching element, in document order
    #[serde(default)]
    pub texts: Option<Vec<String>>,
    /// Exception raised by `querySelectorAll`
    #[serde(default)]
    pub error: Option<String>,
}

impl TextContentsQueryResult {
    /// Convert into element texts, mapping a page-side selector rejection to
    /// a configuration error
    pub fn into_texts(self, selector: &Selector) -> PageCheckResult<Vec<String>> {
        if let Some(error) = self.error {
            return Err(PageCheckError::configuration(format!(
                "page rejected selector {:?}: {error}",
                selector.as_str()
            )));
        }
        Ok(self.texts.unwrap_or_default())
    }
}

const fn is_combinator(c: char) -> bool {
    matches!(c, '>' | '+' | '~' | ',')
}

fn check_balanced(css: &str) -> PageCheckResult<()> {
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in css.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '(' => stack.push(c),
            ']' | ')' => {
                let open = if c == ']' { '[' } else { '(' };
                if stack.pop() != Some(open) {
                    return Err(PageCheckError::configuration(format!(
                        "selector {css:?} has unbalanced '{c}'"
                    )));
                }
            }
            _ => {}
        }
    }

    if let Some(q) = quote {
        return Err(PageCheckError::configuration(format!(
            "selector {css:?} has an unterminated {q} quote"
        )));
    }
    if let Some(open) = stack.pop() {
        return Err(PageCheckError::configuration(format!(
            "selector {css:?} has unclosed '{open}'"
        )));
    }
    Ok(())
}
