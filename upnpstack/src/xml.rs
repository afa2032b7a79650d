//! Petits utilitaires autour de `xmltree`.

use std::io::BufReader;

use xmltree::{Element, EmitterConfig, XMLNode};

/// Sérialise un élément, avec déclaration XML et indentation
pub fn element_to_string(element: &Element) -> Result<String, xmltree::Error> {
    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    element.write_with_config(&mut buf, config)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn parse_element(xml: &[u8]) -> Result<Element, xmltree::ParseError> {
    Element::parse(BufReader::new(xml))
}

/// Élément `<name>text</name>`
pub fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

pub fn push_text_child(parent: &mut Element, name: &str, text: &str) {
    parent
        .children
        .push(XMLNode::Element(text_element(name, text)));
}

/// Texte d'un enfant direct, sans espaces de bord
pub fn child_text(parent: &Element, name: &str) -> Option<String> {
    parent
        .get_child(name)
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string())
}

/// Enfants directs de type élément
pub fn child_elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|n| n.as_element())
}
