//! The browser seam. The navigator only ever talks to a browser through
//! this trait; [`crate::hands::BrowserSession`] is the Chrome implementation.

use std::fmt;

use crate::error::DriverError;
use crate::types::ElementDescriptor;

/// A lookup the driver can evaluate directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    Css(String),
    XPath(String),
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementQuery::Css(selector) => write!(f, "css={selector}"),
            ElementQuery::XPath(xpath) => write!(f, "xpath={xpath}"),
        }
    }
}

/// An element the driver found, plus whether it can currently be clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub query: ElementQuery,
    pub interactable: bool,
}

pub trait BrowserDriver {
    /// Navigates and returns once the page has loaded.
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Single, non-blocking probe. `Ok(None)` means "not present yet".
    fn find_element(&mut self, query: &ElementQuery) -> Result<Option<ElementHandle>, DriverError>;

    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Clears the field, then types `text` into it.
    fn type_into(&mut self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    fn current_url(&mut self) -> Result<String, DriverError>;

    fn current_title(&mut self) -> Result<String, DriverError>;

    fn list_elements(&mut self) -> Result<Vec<ElementDescriptor>, DriverError>;
}

impl<D: BrowserDriver + ?Sized> BrowserDriver for &mut D {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        (**self).navigate(url)
    }

    fn find_element(&mut self, query: &ElementQuery) -> Result<Option<ElementHandle>, DriverError> {
        (**self).find_element(query)
    }

    fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        (**self).click(element)
    }

    fn type_into(&mut self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        (**self).type_into(element, text)
    }

    fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        (**self).read_text(element)
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        (**self).current_url()
    }

    fn current_title(&mut self) -> Result<String, DriverError> {
        (**self).current_title()
    }

    fn list_elements(&mut self) -> Result<Vec<ElementDescriptor>, DriverError> {
        (**self).list_elements()
    }
}
