//! Structured output of the local partitioning step.
//!
//! Partitioners hand back loosely-typed element objects. They are converted
//! into [`ExtractionElement`] right at the collaborator boundary so nothing
//! downstream depends on a particular service's JSON shape.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category tag of a partitioned element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ElementCategory {
    Table,
    Title,
    NarrativeText,
    ListItem,
    Header,
    Footer,
    FigureCaption,
    Image,
    Formula,
    UncategorizedText,
    Text,
    /// Any tag this crate does not know about, kept verbatim.
    Other(String),
}

impl ElementCategory {
    /// Parse a category tag as emitted by the partitioner.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Table" => Self::Table,
            "Title" => Self::Title,
            "NarrativeText" => Self::NarrativeText,
            "ListItem" => Self::ListItem,
            "Header" => Self::Header,
            "Footer" => Self::Footer,
            "FigureCaption" => Self::FigureCaption,
            "Image" => Self::Image,
            "Formula" => Self::Formula,
            "UncategorizedText" => Self::UncategorizedText,
            "Text" => Self::Text,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Table => "Table",
            Self::Title => "Title",
            Self::NarrativeText => "NarrativeText",
            Self::ListItem => "ListItem",
            Self::Header => "Header",
            Self::Footer => "Footer",
            Self::FigureCaption => "FigureCaption",
            Self::Image => "Image",
            Self::Formula => "Formula",
            Self::UncategorizedText => "UncategorizedText",
            Self::Text => "Text",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ElementCategory {
    fn from(s: String) -> Self {
        Self::from_tag(&s)
    }
}

impl From<ElementCategory> for String {
    fn from(c: ElementCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for ElementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of local extraction output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionElement {
    pub category: ElementCategory,
    /// HTML table markup; only tables carry it, and not always.
    pub table_html: Option<String>,
    /// Plain-text rendering.
    pub text: String,
}

impl ExtractionElement {
    /// A non-table element.
    pub fn text(category: ElementCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            table_html: None,
            text: text.into(),
        }
    }

    /// A table element with optional markup.
    pub fn table(html: Option<String>, text: impl Into<String>) -> Self {
        Self {
            category: ElementCategory::Table,
            table_html: html,
            text: text.into(),
        }
    }

    pub fn is_table(&self) -> bool {
        self.category == ElementCategory::Table
    }
}

impl fmt::Display for ExtractionElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Join the plain-text renderings of all elements with blank lines, in order.
pub fn join_text(elements: &[ExtractionElement]) -> String {
    elements
        .iter()
        .map(|el| el.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
