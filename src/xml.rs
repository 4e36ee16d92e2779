use anyhow::{bail, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// One element of the extrakt payload, with its text content and children.
///
/// Text is kept verbatim (no trimming): titles carry significant embedded
/// newlines that the mapper inspects.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// First direct child with the given tag name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given tag name, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        self.children.iter().filter(|c| c.name == name).collect()
    }

    /// Text of the first direct child with the given tag name.
    pub fn find_text(&self, name: &str) -> Option<String> {
        self.find(name).map(|c| c.text.clone())
    }

    /// All elements with the given tag name at any depth, in document order.
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, name, &mut out);
        out
    }
}

fn collect_descendants<'a>(elem: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in &elem.children {
        if child.name == name {
            out.push(child);
        }
        collect_descendants(child, name, out);
    }
}

/// Parse a document into an [`Element`] tree.
///
/// Mismatched or unclosed tags surface as errors so the extractor can move
/// on to the next embedded candidate.
pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Element::default()
                });
            }
            Event::Empty(e) => {
                let elem = Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Element::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(elem),
                    // A lone self-closing root
                    None => return Ok(elem),
                }
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(elem) = stack.pop() else {
                    bail!("end tag without matching start");
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(elem),
                    None => return Ok(elem),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    bail!("document has no root element")
}

// ── Tests ──
