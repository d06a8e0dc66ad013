// Depth-first traversal helpers over a parsed HTML tree.

use scraper::{ElementRef, Html};
use crate::error::ExtractionError;

// What an element must look like to be yielded by `visit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePredicate<'p> {
    Tag(&'p str),
    Class(&'p str),
}

impl NodePredicate<'_> {
    pub fn matches(&self, element: &ElementRef<'_>) -> bool {
        match self {
            NodePredicate::Tag(name) => element.value().name().eq_ignore_ascii_case(name),
            NodePredicate::Class(class) => element.value().classes().any(|c| c == *class),
        }
    }
}

// Parses raw bytes into a document. html5ever recovers from broken markup, so
// only input that is not markup at all is rejected.
pub fn parse_document(bytes: &[u8]) -> Result<Html, ExtractionError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractionError::MalformedDocument(format!("not valid UTF-8: {}", e)))?;

    if !text.contains('<') {
        return Err(ExtractionError::MalformedDocument("no markup found".to_string()));
    }

    Ok(Html::parse_document(text))
}

// Yields every element of `document` matching `predicate`, in document order.
pub fn visit<'a, 'p: 'a>(document: &'a Html, predicate: NodePredicate<'p>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    visit_within(document.root_element(), predicate)
}

// Same as `visit` but restricted to `root` and its descendants.
pub fn visit_within<'a, 'p: 'a>(root: ElementRef<'a>, predicate: NodePredicate<'p>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    root.descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |element| predicate.matches(element))
}

// Element children only, skipping text and comment nodes.
pub fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element.children().filter_map(ElementRef::wrap)
}

// Text of the node and all of its descendants, in document order.
pub fn text_content(element: ElementRef<'_>) -> String {
    element.text().collect()
}
