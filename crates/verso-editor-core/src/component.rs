//! Component registry: the authority on atomic, non-text-editable units.
//!
//! The core never looks inside a component. It asks the registry whether a node is
//! one, where its container is, and whether it may be selected as a whole.

use smol_str::SmolStr;
use verso_editor_dom::query::{self, parent_element};
use verso_editor_dom::{Document, NodeId};

use crate::editor::Editor;
use crate::error::EditorResult;

/// What [`ComponentRegistry::get`] reports for a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// The media element (or the table/hr itself).
    pub target: NodeId,
    /// Outermost node the registry treats as the component.
    pub container: NodeId,
    pub plugin_name: SmolStr,
}

pub trait ComponentRegistry {
    /// True if `node` is a component wrapper.
    fn is(&self, doc: &Document, node: NodeId) -> bool;

    /// Resolve the component around `node`.
    fn get(&self, doc: &Document, node: NodeId) -> Option<ComponentInfo>;

    /// Called when the core enters component-selected mode. Returning false refuses.
    fn select(&self, doc: &Document, info: &ComponentInfo) -> bool;
}

/// Registry for `figure`/`.se-component` wrapped media plus bare tables and rules.
#[derive(Debug, Clone, Default)]
pub struct FigureRegistry;

const FILE_TAGS: &[&str] = &["img", "iframe", "video", "audio", "canvas"];

impl FigureRegistry {
    fn plugin_for(tag: &str) -> &'static str {
        match tag {
            "img" => "image",
            "iframe" | "video" => "video",
            "audio" => "audio",
            "table" => "table",
            "hr" => "hr",
            _ => "",
        }
    }
}

impl ComponentRegistry for FigureRegistry {
    fn is(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_element(node)
            && (doc.has_class(node, "se-component")
                || doc.has_class(node, "se-flex-component")
                || doc.tag_is(node, "table")
                || doc.tag_is(node, "hr"))
    }

    fn get(&self, doc: &Document, node: NodeId) -> Option<ComponentInfo> {
        if !doc.is_element(node) {
            return None;
        }
        let mut target = None;
        if query::is_figure(doc, node) || doc.has_class(node, "se-component") {
            target = doc
                .descendants(node)
                .into_iter()
                .find(|d| doc.tag(*d).is_some_and(|t| FILE_TAGS.contains(&t)));
        }
        if target.is_none()
            && doc
                .tag(node)
                .is_some_and(|t| FILE_TAGS.contains(&t) || t == "table" || t == "hr")
        {
            target = Some(node);
        }
        let target = target?;
        let container = parent_element(doc, target, |n| self.is(doc, n), None).unwrap_or(target);
        Some(ComponentInfo {
            target,
            container,
            plugin_name: SmolStr::new_static(Self::plugin_for(doc.tag(target).unwrap_or_default())),
        })
    }

    fn select(&self, doc: &Document, info: &ComponentInfo) -> bool {
        !query::is_uneditable(doc, info.container) && !query::is_uneditable(doc, info.target)
    }
}

impl Editor {
    /// Enter component-selected mode for the component around `node`.
    pub fn select_component(&mut self, node: NodeId) -> bool {
        let registry = self.caps.registry.clone();
        let Some(info) = registry.get(&self.doc, node) else {
            return false;
        };
        if !registry.select(&self.doc, &info) {
            tracing::trace!(target: "verso::component", "component refused selection");
            return false;
        }
        tracing::debug!(target: "verso::component", plugin = %info.plugin_name, "component selected");
        self.status.selected_component = Some(info);
        true
    }

    pub fn deselect_component(&mut self) {
        self.status.selected_component = None;
    }

    pub fn selected_component(&self) -> Option<&ComponentInfo> {
        self.status
            .selected_component
            .as_ref()
            .filter(|info| self.doc.is_attached(info.container))
    }

    /// Insert a component element at the caret, splitting the current line around it.
    pub fn insert_component(&mut self, element: NodeId, select: bool) -> EditorResult<Option<NodeId>> {
        if self.options.read_only {
            return Ok(None);
        }
        let html = self.doc.outer_html(element);
        if !self.char_check(&html) {
            return Ok(None);
        }

        let removed = self.remove()?;
        let range = self.get_range();
        self.get_range_and_add_line(range, Some(removed.container))?;
        let selection_node = self.get_node();
        let mut line = self.format.get_line(&self.doc, selection_node, None);
        let mut split = None;

        if line.is_some_and(|l| query::is_list_cell(&self.doc, l)) {
            let after = if Some(selection_node) == line {
                None
            } else {
                self.doc.next_sibling(removed.container)
            };
            self.insert_node(element, after, true)?;
            if self.doc.next_sibling(element).is_none()
                && let Some(parent) = self.doc.parent(element)
            {
                let br = self.doc.create_element("br");
                self.doc.append_child(parent, br)?;
            }
        } else {
            let container = removed.container;
            if self.get_range().is_collapsed()
                && (self.doc.is_text(container) || query::is_break(&self.doc, container))
            {
                let depth_block =
                    parent_element(&self.doc, container, |n| self.format.is_block(&self.doc, n), None);
                let depth = depth_block
                    .map(|b| query::node_depth(&self.doc, b) + 1)
                    .unwrap_or(0);
                let node = crate::transform::split(
                    &mut self.doc,
                    &self.format,
                    container,
                    Some(removed.offset),
                    depth,
                )?;
                split = Some(node);
                line = self.doc.prev_sibling(node);
            }
            let after = line.filter(|l| !self.format.is_block(&self.doc, *l));
            self.insert_node(element, after, true)?;
            if let Some(l) = line
                && query::is_zero_width_node(&self.doc, l)
                && self.doc.first_element_child(l).is_none()
            {
                self.doc.detach(l);
            }
        }

        if select {
            self.set_range(element, 0, element, 0);
            if !self.select_component(element)
                && let Some(node) = split
            {
                let (sc, _) = query::edge_child_nodes(&self.doc, node, None);
                self.set_range(sc, 0, sc, 0);
            }
        }
        self.push_history(false);
        self.finish();
        Ok(Some(split.unwrap_or(element)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn figure_resolves_to_its_media() {
        let doc = Document::from_html(
            r#"<figure class="se-component"><img src="a.png"><figcaption>c</figcaption></figure>"#,
        )
        .unwrap();
        let figure = doc.first_child(doc.root()).unwrap();
        let img = doc.first_child(figure).unwrap();
        let registry = FigureRegistry;
        assert!(registry.is(&doc, figure));
        assert!(!registry.is(&doc, img));

        let info = registry.get(&doc, figure).unwrap();
        assert_eq!(info.target, img);
        assert_eq!(info.container, figure);
        assert_eq!(info.plugin_name, "image");
        assert_eq!(registry.get(&doc, img), Some(info));
    }

    #[test]
    fn tables_and_rules_are_their_own_targets() {
        let doc = Document::from_html("<table><tr><td>x</td></tr></table><hr>").unwrap();
        let kids = doc.child_nodes(doc.root());
        let registry = FigureRegistry;
        for (node, plugin) in kids.iter().zip(["table", "hr"]) {
            let info = registry.get(&doc, *node).unwrap();
            assert_eq!(info.container, *node);
            assert_eq!(info.plugin_name, plugin);
        }
    }

    #[test]
    fn uneditable_components_refuse_selection() {
        let doc = Document::from_html(
            r#"<figure class="se-component __se__uneditable"><img src="a.png"></figure>"#,
        )
        .unwrap();
        let figure = doc.first_child(doc.root()).unwrap();
        let registry = FigureRegistry;
        let info = registry.get(&doc, figure).unwrap();
        assert!(!registry.select(&doc, &info));
    }
}
