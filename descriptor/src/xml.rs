use roxmltree::{Document, Node, ParsingOptions};

use crate::Error;

pub(crate) fn parse_document<'a>(location: &str, text: &'a str) -> Result<Document<'a>, Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options).map_err(|err| Error::Xml {
        location: location.to_string(),
        message: err.to_string(),
    })
}

/// First element child named `name`, ignoring namespaces.
pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

pub(crate) fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Trimmed text of the child element `name`; empty text counts as absent.
pub(crate) fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    let text = child(node, name)?.text()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Elements found at `section/item` under `node`, e.g. `repositories/repository`.
pub(crate) fn section<'a, 'input>(
    node: Node<'a, 'input>,
    section: &str,
    item: &'static str,
) -> Vec<Node<'a, 'input>> {
    child(node, section)
        .map(|s| children(s, item).collect())
        .unwrap_or_default()
}
