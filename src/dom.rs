use std::collections::BTreeMap;

use crate::error::DriverError;
use crate::locator::{css_ident, css_string, xpath_literal};
use crate::types::{ElementDescriptor, ElementKind, Strategy};

/// Upper bound on elements reported per page.
pub const MAX_ELEMENTS: usize = 150;

/// JavaScript evaluated in the page to list the elements a model can act on.
/// NON-DESTRUCTIVE: reads attributes only.
///
/// Emits a JSON string: an array of `{type, tag, text, id, name, class,
/// input_type, href, placeholder}` objects for visible clickables, text
/// inputs and links, in document order.
pub const ELEMENTS_JS: &str = r#"
(() => {
  const MAX = 150;
  const CLICKABLE = 'button, [role="button"], input[type="submit"], input[type="button"]';
  const INPUTS = 'input:not([type]), input[type="text"], input[type="email"], input[type="password"], input[type="search"], textarea';
  const out = [];
  const seen = new Set();

  function isVisible(el) {
    if (el.offsetParent === null && el.tagName !== 'BODY') return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }

  function push(kind, el) {
    if (out.length >= MAX || seen.has(el) || !isVisible(el)) return;
    seen.add(el);
    out.push({
      type: kind,
      tag: el.tagName.toLowerCase(),
      text: (el.innerText || el.value || '').trim().slice(0, 100),
      id: el.id || '',
      name: el.getAttribute('name') || '',
      class: (el.getAttribute('class') || '').trim(),
      input_type: el.getAttribute('type') || '',
      href: kind === 'link' ? el.href || null : null,
      placeholder: kind === 'input' ? el.getAttribute('placeholder') : null,
    });
  }

  document.querySelectorAll(INPUTS).forEach(el => push('input', el));
  document.querySelectorAll(CLICKABLE).forEach(el => push('clickable', el));
  document.querySelectorAll('a[href]').forEach(el => push('link', el));
  return JSON.stringify(out);
})()
"#;

/// Decodes the output of [`ELEMENTS_JS`] and fills in each element's
/// locators.
pub fn parse_elements(raw: &str) -> Result<Vec<ElementDescriptor>, DriverError> {
    let mut elements: Vec<ElementDescriptor> = serde_json::from_str(raw)
        .map_err(|e| DriverError::operation("list elements", e))?;
    elements.truncate(MAX_ELEMENTS);
    for element in &mut elements {
        element.locators = derive_locators(element);
    }
    Ok(elements)
}

/// Every strategy that can address `element`, best-first per strategy.
pub fn derive_locators(element: &ElementDescriptor) -> BTreeMap<Strategy, String> {
    let mut locators = BTreeMap::new();

    if !element.id.is_empty() {
        locators.insert(Strategy::Id, element.id.clone());
    }
    if !element.name.is_empty() {
        locators.insert(Strategy::Name, element.name.clone());
    }
    locators.insert(Strategy::Css, css_selector(element));
    locators.insert(Strategy::Xpath, xpath_selector(element));
    if element.tag == "a" && !element.text.is_empty() {
        locators.insert(Strategy::LinkText, element.text.clone());
    }
    if !element.class.is_empty() {
        locators.insert(Strategy::ClassName, element.class.clone());
    }

    locators
}

fn css_selector(element: &ElementDescriptor) -> String {
    if !element.id.is_empty() {
        format!("#{}", css_ident(&element.id))
    } else if !element.name.is_empty() {
        format!("[name={}]", css_string(&element.name))
    } else if !element.class.is_empty() {
        element
            .class
            .split_whitespace()
            .map(|class| format!(".{}", css_ident(class)))
            .collect()
    } else {
        element.tag.clone()
    }
}

fn xpath_selector(element: &ElementDescriptor) -> String {
    if !element.id.is_empty() {
        format!("//*[@id={}]", xpath_literal(&element.id))
    } else if !element.name.is_empty() {
        format!("//*[@name={}]", xpath_literal(&element.name))
    } else if matches!(element.tag.as_str(), "a" | "button") && !element.text.is_empty() {
        format!(
            "//{}[contains(text(), {})]",
            element.tag,
            xpath_literal(&element.text)
        )
    } else {
        format!("//{}", element.tag)
    }
}

impl ElementDescriptor {
    /// Short human label used in prompts.
    pub fn label(&self) -> &str {
        match self.kind {
            ElementKind::Input => self
                .placeholder
                .as_deref()
                .filter(|p| !p.is_empty())
                .unwrap_or("No placeholder"),
            _ if self.text.is_empty() => "No text",
            _ => &self.text,
        }
    }
}
