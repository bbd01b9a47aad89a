//! In-process document model.
//!
//! The dashboard is a flat arena of elements addressed by [`ElementRef`]. Elements may carry an
//! id, a class list, text, inline style and `data-*` attributes, mirroring the subset of the DOM
//! the renderers need. Every mutating call is counted so callers can assert that a code path left
//! the document untouched.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Write;

use strum::IntoEnumIterator;

use crate::device::FanSpeed;
use crate::device::Mode;

/// Handle to an element inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(usize);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub id: Option<String>,
    pub parent: Option<ElementRef>,
    pub classes: BTreeSet<String>,
    pub text: String,
    pub style: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

impl Element {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Add one or more whitespace-separated classes.
    pub fn with_class(mut self, classes: &str) -> Self {
        self.classes
            .extend(classes.split_whitespace().map(str::to_string));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.style.insert(property.to_string(), value.to_string());
        self
    }
}

/// Error returned when a render target is missing from the document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("element #{0} not found")]
    MissingElement(String),
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<Element>,

    /// Total number of mutating calls since construction
    writes: usize,

    /// Mutating calls per element id (anonymous elements are not tracked)
    writes_by_id: BTreeMap<String, usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element during construction. Construction is not counted as a write.
    pub fn append(&mut self, parent: Option<ElementRef>, mut element: Element) -> ElementRef {
        element.parent = parent;
        self.elements.push(element);
        ElementRef(self.elements.len() - 1)
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<ElementRef> {
        self.elements
            .iter()
            .position(|e| e.id.as_deref() == Some(id))
            .map(ElementRef)
    }

    /// Like [`Document::get_element_by_id`], but a missing element is an error.
    pub fn require(&self, id: &str) -> Result<ElementRef, RenderError> {
        self.get_element_by_id(id)
            .ok_or_else(|| RenderError::MissingElement(id.to_string()))
    }

    /// All descendants of `root` carrying `class`, in document order.
    pub fn query_within(&self, root: ElementRef, class: &str) -> Vec<ElementRef> {
        (0..self.elements.len())
            .map(ElementRef)
            .filter(|&r| self.is_descendant(r, root) && self.has_class(r, class))
            .collect()
    }

    fn is_descendant(&self, el: ElementRef, root: ElementRef) -> bool {
        let mut cur = self.elements[el.0].parent;
        while let Some(p) = cur {
            if p == root {
                return true;
            }
            cur = self.elements[p.0].parent;
        }
        false
    }

    pub fn element(&self, el: ElementRef) -> &Element {
        &self.elements[el.0]
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn has_class(&self, el: ElementRef, class: &str) -> bool {
        self.elements[el.0].classes.contains(class)
    }

    pub fn add_class(&mut self, el: ElementRef, class: &str) {
        self.touch(el).classes.insert(class.to_string());
    }

    pub fn remove_class(&mut self, el: ElementRef, class: &str) {
        self.touch(el).classes.remove(class);
    }

    pub fn toggle_class(&mut self, el: ElementRef, class: &str, on: bool) {
        if on {
            self.add_class(el, class);
        } else {
            self.remove_class(el, class);
        }
    }

    /// Replace the whole class list, like assigning `className`.
    pub fn set_class_name(&mut self, el: ElementRef, classes: &str) {
        let element = self.touch(el);
        element.classes = classes.split_whitespace().map(str::to_string).collect();
    }

    pub fn set_text(&mut self, el: ElementRef, text: &str) {
        self.touch(el).text = text.to_string();
    }

    pub fn set_style(&mut self, el: ElementRef, property: &str, value: &str) {
        self.touch(el)
            .style
            .insert(property.to_string(), value.to_string());
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn writes_to(&self, id: &str) -> usize {
        self.writes_by_id.get(id).copied().unwrap_or(0)
    }

    fn touch(&mut self, el: ElementRef) -> &mut Element {
        self.writes += 1;
        let element = &mut self.elements[el.0];
        if let Some(id) = &element.id {
            *self.writes_by_id.entry(id.clone()).or_default() += 1;
        }
        element
    }

    /// Build the dashboard with the fixed element ids the renderers expect.
    pub fn dashboard() -> Self {
        let mut doc = Self::new();

        doc.append(
            None,
            Element::new()
                .with_id("connection-status")
                .with_class("status-badge")
                .with_text("○ Connecting"),
        );
        doc.append(
            None,
            Element::new()
                .with_id("last-update")
                .with_text("Last updated: --"),
        );

        let ac = doc.append(
            None,
            Element::new()
                .with_id("air_conditioner")
                .with_class("device-card"),
        );
        doc.append(
            Some(ac),
            Element::new()
                .with_id("ac-power-indicator")
                .with_class("power-indicator"),
        );
        doc.append(
            Some(ac),
            Element::new()
                .with_id("ac-status")
                .with_class("device-status")
                .with_text("Off"),
        );
        doc.append(
            Some(ac),
            Element::new()
                .with_id("ac-temp")
                .with_class("temperature")
                .with_text("26"),
        );
        let controls = doc.append(
            Some(ac),
            Element::new().with_id("ac-controls").with_class("controls"),
        );
        for mode in Mode::iter() {
            doc.append(
                Some(controls),
                Element::new()
                    .with_class("mode-btn")
                    .with_data("mode", mode.as_ref())
                    .with_text(mode.button_label()),
            );
        }
        for speed in FanSpeed::iter() {
            doc.append(
                Some(controls),
                Element::new()
                    .with_class("fan-btn")
                    .with_data("speed", speed.as_ref())
                    .with_text(speed.label()),
            );
        }

        let light = doc.append(
            None,
            Element::new()
                .with_id("light_living")
                .with_class("device-card"),
        );
        doc.append(
            Some(light),
            Element::new()
                .with_id("light-living-power-indicator")
                .with_class("power-indicator"),
        );
        doc.append(
            Some(light),
            Element::new()
                .with_id("light-living-status")
                .with_class("device-status")
                .with_text("Off"),
        );
        doc.append(
            Some(light),
            Element::new()
                .with_id("light-living-indicator")
                .with_class("status-bar"),
        );
        doc.append(
            Some(light),
            Element::new()
                .with_id("light-living-bar")
                .with_class("status-bar-inner off")
                .with_style("width", "0%"),
        );

        doc
    }

    /// Plain-text rendering of the document for the terminal.
    ///
    /// One header line (connection badge and last-update text), then one line per device card:
    /// the card id, its status text, the temperature if the card has one, the labels of active
    /// buttons in brackets, and a trailing `*` while the card is highlighted.
    pub fn render_text(&self) -> String {
        let text_of = |id: &str| {
            self.get_element_by_id(id)
                .map(|el| self.element(el).text.as_str())
                .unwrap_or("")
        };

        let mut out = format!("{} | {}\n", text_of("connection-status"), text_of("last-update"));

        for (idx, card) in self.elements.iter().enumerate() {
            if !card.classes.contains("device-card") {
                continue;
            }
            let card_ref = ElementRef(idx);
            let id = card.id.as_deref().unwrap_or("?");

            let status = self
                .query_within(card_ref, "device-status")
                .first()
                .map(|&el| self.element(el).text.clone())
                .unwrap_or_default();
            let _ = write!(out, "{}: {}", id, status);

            if let Some(&temp) = self.query_within(card_ref, "temperature").first() {
                let _ = write!(out, " {}°C", self.element(temp).text);
            }

            for class in ["mode-btn", "fan-btn"] {
                for btn in self.query_within(card_ref, class) {
                    if self.has_class(btn, "active") {
                        let _ = write!(out, " [{}]", self.element(btn).text);
                    }
                }
            }

            if card.classes.contains("highlight") {
                out.push_str(" *");
            }
            out.push('\n');
        }

        out
    }
}
