//! Low-level node predicates and tree helpers.
//!
//! Everything here is side-effect free except the path helper that merges text
//! nodes, and none of it fails: freed or unexpected nodes answer `false` or `None`.

use std::cmp::Ordering;

use crate::document::{Document, NodeId};
use crate::unicode::{ZERO_WIDTH_SPACE, is_zero_width};

fn tag_in(doc: &Document, id: NodeId, tags: &[&str]) -> bool {
    doc.tag(id).is_some_and(|t| tags.contains(&t))
}

pub fn is_break(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["br"])
}

pub fn is_list(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["ol", "ul"])
}

pub fn is_list_cell(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["li"])
}

pub fn is_table(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["table"])
}

pub fn is_table_elements(doc: &Document, id: NodeId) -> bool {
    tag_in(
        doc,
        id,
        &["table", "thead", "tbody", "tr", "th", "td", "col"],
    )
}

pub fn is_table_cell(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["td", "th"])
}

pub fn is_table_row(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["tr"])
}

pub fn is_anchor(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["a"])
}

pub fn is_media(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["img", "iframe", "audio", "video", "canvas"])
}

pub fn is_figure(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["figure"])
}

pub fn is_input_element(doc: &Document, id: NodeId) -> bool {
    tag_in(doc, id, &["input", "textarea", "select", "option"])
}

/// `contenteditable="false"`.
pub fn is_non_editable(doc: &Document, id: NodeId) -> bool {
    doc.attr(id, "contenteditable") == Some("false")
}

/// Components marked `__se__uneditable` cannot be modified.
pub fn is_uneditable(doc: &Document, id: NodeId) -> bool {
    doc.has_class(id, "__se__uneditable")
}

/// Nodes whose formatting is never touched (math renderers, explicit opt-out).
pub fn is_exclude_format(doc: &Document, id: NodeId) -> bool {
    doc.classes(id)
        .iter()
        .any(|c| matches!(*c, "katex" | "MathJax" | "se-exclude-format"))
}

/// A `span` with neither class nor style.
pub fn is_span_without_attr(doc: &Document, id: NodeId) -> bool {
    doc.tag_is(id, "span")
        && doc.attr(id, "class").is_none_or(str::is_empty)
        && doc.attr(id, "style").is_none_or(str::is_empty)
}

/// A detached line, or one without element children, media or meaningful text.
pub fn is_empty_line(doc: &Document, id: NodeId) -> bool {
    if doc.parent(id).is_none() {
        return true;
    }
    let has_media = doc.descendants(id).into_iter().any(|d| {
        tag_in(
            doc,
            d,
            &["img", "iframe", "audio", "video", "canvas", "table"],
        )
    });
    !has_media && doc.first_element_child(id).is_none() && is_zero_width(&doc.text_content(id))
}

/// True if the text content of `id` is empty or only zero-width spaces.
pub fn is_zero_width_node(doc: &Document, id: NodeId) -> bool {
    is_zero_width(&doc.text_content(id))
}

/// Which edge [`is_edge_point`] checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Front,
    End,
}

/// Is `offset` at an edge of `container`. `None` checks both edges.
pub fn is_edge_point(doc: &Document, container: NodeId, offset: usize, dir: Option<Edge>) -> bool {
    let value = doc.text(container).filter(|t| !t.is_empty());
    (dir != Some(Edge::End) && offset == 0)
        || (dir != Some(Edge::Front) && value.is_none() && offset == 1)
        || (dir != Some(Edge::Front)
            && value.is_some_and(|v| offset >= v.chars().count()))
}

/// Chars folded into a node by [`node_path_merging`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergedOffsets {
    /// Length of the text merged in front of the node.
    pub s: usize,
    /// Length of the text merged after it.
    pub e: usize,
}

fn path_nodes(doc: &Document, node: NodeId, parent: Option<NodeId>) -> Vec<NodeId> {
    let mut nodes = Vec::new();
    let mut cur = Some(node);
    while let Some(n) = cur {
        if Some(n) == parent || doc.is_root(n) {
            break;
        }
        nodes.push(n);
        cur = doc.parent(n);
    }
    nodes
}

/// Child-index breadcrumbs from `parent` (the root when `None`) down to `node`.
///
/// `<p><span>aa</span><span>bb</span></p>`: the path of `bb` from the `p` is `[1, 0]`.
pub fn node_path(doc: &Document, node: NodeId, parent: Option<NodeId>) -> Vec<usize> {
    let mut path: Vec<usize> = path_nodes(doc, node, parent)
        .into_iter()
        .map(|n| doc.index_in_parent(n))
        .collect();
    path.reverse();
    path
}

/// Like [`node_path`], but first folds adjacent text siblings of a text `node` into it
/// (dropping their zero-width spaces) so the path stays valid after a later normalize.
pub fn node_path_merging(
    doc: &mut Document,
    node: NodeId,
    parent: Option<NodeId>,
) -> (Vec<usize>, MergedOffsets) {
    let mut offsets = MergedOffsets::default();
    if doc.is_text(node) {
        while let Some(prev) = doc.prev_sibling(node).filter(|p| doc.is_text(*p)) {
            let t = doc.text(prev).unwrap_or_default().replace(ZERO_WIDTH_SPACE, "");
            offsets.s += t.chars().count();
            let joined = format!("{}{}", t, doc.text(node).unwrap_or_default());
            doc.set_text(node, joined);
            doc.detach(prev);
        }
        while let Some(next) = doc.next_sibling(node).filter(|n| doc.is_text(*n)) {
            let t = doc.text(next).unwrap_or_default().replace(ZERO_WIDTH_SPACE, "");
            offsets.e += t.chars().count();
            let joined = format!("{}{}", doc.text(node).unwrap_or_default(), t);
            doc.set_text(node, joined);
            doc.detach(next);
        }
    }
    (node_path(doc, node, parent), offsets)
}

/// Resolve a path from [`node_path`]. Out-of-range indexes clamp to the last child.
pub fn node_from_path(doc: &Document, path: &[usize], parent: NodeId) -> NodeId {
    let mut current = parent;
    for &i in path {
        let count = doc.child_count(current);
        if count == 0 {
            break;
        }
        current = doc
            .child_at(current, i.min(count - 1))
            .unwrap_or(current);
    }
    current
}

/// Element descendants of `el` (excluding `el`) accepted by `validation`, in document order.
pub fn list_children(
    doc: &Document,
    el: NodeId,
    mut validation: impl FnMut(NodeId) -> bool,
) -> Vec<NodeId> {
    doc.descendants(el)
        .into_iter()
        .filter(|n| doc.is_element(*n) && validation(*n))
        .collect()
}

/// All descendants of `el` (excluding `el`) accepted by `validation`, in document order.
pub fn list_child_nodes(
    doc: &Document,
    el: NodeId,
    mut validation: impl FnMut(NodeId) -> bool,
) -> Vec<NodeId> {
    doc.descendants(el)
        .into_iter()
        .filter(|n| validation(*n))
        .collect()
}

/// `-1` for the root, `0` for its children, and so on. Detached subtrees count to their top.
pub fn node_depth(doc: &Document, node: NodeId) -> i32 {
    if doc.is_root(node) || !doc.exists(node) {
        return -1;
    }
    let mut depth = 0;
    let mut cur = doc.parent(node);
    while let Some(p) = cur {
        if doc.is_root(p) {
            break;
        }
        depth += 1;
        cur = doc.parent(p);
    }
    depth
}

/// Stable sort of the list cells in `nodes` by depth. Other nodes keep their slots.
pub fn sort_by_depth(doc: &Document, nodes: &mut [NodeId], descending: bool) {
    let slots: Vec<usize> = (0..nodes.len())
        .filter(|i| is_list_cell(doc, nodes[*i]))
        .collect();
    let mut cells: Vec<NodeId> = slots.iter().map(|i| nodes[*i]).collect();
    cells.sort_by_key(|n| node_depth(doc, *n));
    if descending {
        cells.reverse();
    }
    for (slot, cell) in slots.into_iter().zip(cells) {
        nodes[slot] = cell;
    }
}

/// Result of [`compare_nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOrder {
    /// Common parent of `a` and `b` after lifting, if any.
    pub ancestor: Option<NodeId>,
    /// `a` lifted to the common level.
    pub a: NodeId,
    pub b: NodeId,
    pub result: Ordering,
}

/// Lift `a` and `b` in lockstep until they share a parent, then order them.
pub fn compare_nodes(doc: &Document, a: NodeId, b: NodeId) -> NodeOrder {
    let (mut an, mut bn) = (Some(a), Some(b));
    while let (Some(x), Some(y)) = (an, bn) {
        if doc.parent(x) == doc.parent(y) {
            break;
        }
        an = doc.parent(x);
        bn = doc.parent(y);
    }
    let (Some(x), Some(y)) = (an, bn) else {
        return NodeOrder {
            ancestor: None,
            a,
            b,
            result: Ordering::Equal,
        };
    };
    NodeOrder {
        ancestor: doc.parent(x),
        a: x,
        b: y,
        result: doc.index_in_parent(x).cmp(&doc.index_in_parent(y)),
    }
}

/// Nearest inclusive ancestor accepted by `check`, looking at most `depth` levels up.
///
/// The walk stops (returning `None`) at the editable root unless the root itself matches.
pub fn parent_element(
    doc: &Document,
    node: NodeId,
    mut check: impl FnMut(NodeId) -> bool,
    depth: Option<usize>,
) -> Option<NodeId> {
    let depth = depth.unwrap_or(usize::MAX);
    let mut cur = Some(node);
    let mut index = 0;
    while let Some(n) = cur {
        if check(n) {
            return Some(n);
        }
        if index >= depth || doc.is_root(n) {
            return None;
        }
        cur = doc.parent(n);
        index += 1;
    }
    None
}

/// Every inclusive ancestor below the root accepted by `check`, nearest first.
pub fn parent_elements(
    doc: &Document,
    node: NodeId,
    mut check: impl FnMut(NodeId) -> bool,
    depth: Option<usize>,
) -> Vec<NodeId> {
    let depth = depth.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    let mut cur = Some(node);
    let mut index = 0;
    while let Some(n) = cur {
        if index > depth || doc.is_root(n) {
            break;
        }
        if check(n) {
            out.push(n);
        }
        cur = doc.parent(n);
        index += 1;
    }
    out
}

/// First (or last) descendant accepted by `check`.
pub fn edge_child(
    doc: &Document,
    node: NodeId,
    check: impl FnMut(NodeId) -> bool,
    last: bool,
) -> Option<NodeId> {
    let list = list_child_nodes(doc, node, check);
    if last {
        list.last().copied()
    } else {
        list.first().copied()
    }
}

/// Deepest first node under `first` and deepest last node under `last` (or `first`).
/// A `<br>` is never descended into.
pub fn edge_child_nodes(doc: &Document, first: NodeId, last: Option<NodeId>) -> (NodeId, NodeId) {
    let mut sc = first;
    let mut ec = last.unwrap_or(first);
    while doc.is_element(sc) && !is_break(doc, sc) {
        match doc.first_child(sc) {
            Some(c) => sc = c,
            None => break,
        }
    }
    while doc.is_element(ec) && !is_break(doc, ec) {
        match doc.last_child(ec) {
            Some(c) => ec = c,
            None => break,
        }
    }
    (sc, ec)
}

/// The deepest last descendant of the previous sibling, climbing ancestors (below
/// `ceiling`) when there is none. A non-editable node is returned as is.
pub fn previous_deepest_node(
    doc: &Document,
    node: NodeId,
    ceiling: Option<NodeId>,
) -> Option<NodeId> {
    let mut prev = doc.prev_sibling(node);
    if prev.is_none() {
        for p in doc.ancestors(node) {
            if Some(p) == ceiling {
                return None;
            }
            if let Some(s) = doc.prev_sibling(p) {
                prev = Some(s);
                break;
            }
        }
    }
    let mut prev = prev?;
    if is_non_editable(doc, prev) {
        return Some(prev);
    }
    while let Some(c) = doc.last_child(prev) {
        prev = c;
    }
    Some(prev)
}

/// Mirror of [`previous_deepest_node`] in the forward direction.
pub fn next_deepest_node(doc: &Document, node: NodeId, ceiling: Option<NodeId>) -> Option<NodeId> {
    let mut next = doc.next_sibling(node);
    if next.is_none() {
        for p in doc.ancestors(node) {
            if Some(p) == ceiling {
                return None;
            }
            if let Some(s) = doc.next_sibling(p) {
                next = Some(s);
                break;
            }
        }
    }
    let mut next = next?;
    if is_non_editable(doc, next) {
        return Some(next);
    }
    while let Some(c) = doc.first_child(next) {
        next = c;
    }
    Some(next)
}

/// Copy style declarations and attributes of `copy` onto `origin`.
///
/// Blacklisted (lowercase) and empty-valued attributes of `copy` are removed from `origin`.
pub fn copy_tag_attributes(doc: &mut Document, origin: NodeId, copy: NodeId, blacklist: &[&str]) {
    let attrs = doc.attrs(copy).to_vec();
    apply_copied_attributes(doc, origin, &attrs, blacklist);
}

fn apply_copied_attributes(
    doc: &mut Document,
    origin: NodeId,
    attrs: &[(smol_str::SmolStr, String)],
    blacklist: &[&str],
) {
    if let Some((_, style)) = attrs.iter().find(|(k, _)| k == "style") {
        for decl in style.split(';') {
            if let Some((k, v)) = decl.split_once(':')
                && !k.trim().is_empty()
            {
                doc.set_style(origin, k.trim(), v.trim());
            }
        }
    }
    for (name, value) in attrs {
        if blacklist.contains(&name.as_str()) || value.is_empty() {
            doc.remove_attr(origin, name);
        } else if name != "style" {
            doc.set_attr(origin, name, value);
        }
    }
}

/// [`copy_tag_attributes`] ignoring the `__se__format__*` marker classes of `copy`.
pub fn copy_format_attributes(doc: &mut Document, origin: NodeId, copy: NodeId) {
    let attrs: Vec<_> = doc
        .attrs(copy)
        .iter()
        .map(|(k, v)| {
            if k == "class" {
                let kept: Vec<&str> = v
                    .split_ascii_whitespace()
                    .filter(|c| !c.starts_with("__se__format__"))
                    .collect();
                (k.clone(), kept.join(" "))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect();
    apply_copied_attributes(doc, origin, &attrs, &[]);
}

/// Same style declarations and the same class set. Two text nodes are always equal.
pub fn is_same_attributes(doc: &Document, a: NodeId, b: NodeId) -> bool {
    match (doc.is_text(a), doc.is_text(b)) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }
    let (sa, sb) = (doc.style_declarations(a), doc.style_declarations(b));
    let same_style = sa.len() == sb.len() && sa.iter().all(|d| sb.contains(d));
    let (ca, cb) = (doc.classes(a), doc.classes(b));
    let same_class = ca.len() == cb.len() && ca.iter().all(|c| cb.contains(c));
    same_style && same_class
}

/// Char index of (`container`, `offset`) within the text of `line`, skipping subtrees
/// rejected by `skip`.
pub fn text_index_on_line(
    doc: &Document,
    line: NodeId,
    container: NodeId,
    offset: usize,
    mut skip: impl FnMut(NodeId) -> bool,
) -> usize {
    fn walk(
        doc: &Document,
        node: NodeId,
        container: NodeId,
        offset: usize,
        skip: &mut dyn FnMut(NodeId) -> bool,
        index: &mut usize,
    ) -> bool {
        if skip(node) {
            return false;
        }
        if let Some(t) = doc.text(node) {
            if node == container {
                *index += offset;
                return true;
            }
            *index += t.chars().count();
            return false;
        }
        doc.children(node)
            .any(|c| walk(doc, c, container, offset, skip, index))
    }
    let mut index = 0;
    walk(doc, line, container, offset, &mut skip, &mut index);
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Document {
        Document::from_html(html).unwrap()
    }

    #[test]
    fn paths_resolve_back() {
        let d = doc("<p><span>aa</span><span>bb</span></p>");
        let p = d.first_child(d.root()).unwrap();
        let bb = d.first_child(d.last_child(p).unwrap()).unwrap();
        assert_eq!(node_path(&d, bb, Some(p)), vec![1, 0]);
        assert_eq!(node_path(&d, bb, None), vec![0, 1, 0]);
        assert_eq!(node_from_path(&d, &[0, 1, 0], d.root()), bb);
        // clamped
        assert_eq!(node_from_path(&d, &[0, 7, 0], d.root()), bb);
    }

    #[test]
    fn path_merging_folds_text_siblings() {
        let mut d = Document::new();
        let root = d.root();
        let p = d.create_element("p");
        d.append_child(root, p).unwrap();
        let mut texts = Vec::new();
        for t in ["a\u{200B}b", "cd", "ef"] {
            let n = d.create_text(t);
            d.append_child(p, n).unwrap();
            texts.push(n);
        }
        let (path, offs) = node_path_merging(&mut d, texts[1], None);
        assert_eq!(path, vec![0, 0]);
        assert_eq!(offs, MergedOffsets { s: 2, e: 2 });
        assert_eq!(d.text(texts[1]), Some("abcdef"));
    }

    #[test]
    fn depth_and_ordering() {
        let d = doc("<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul>");
        let ul = d.first_child(d.root()).unwrap();
        let li_a = d.first_child(ul).unwrap();
        let li_b = d.first_child(d.last_child(li_a).unwrap()).unwrap();
        let li_c = d.last_child(ul).unwrap();
        assert_eq!(node_depth(&d, d.root()), -1);
        assert_eq!(node_depth(&d, ul), 0);
        assert_eq!(node_depth(&d, li_b), 3);

        let mut cells = vec![li_b, li_c, li_a];
        sort_by_depth(&d, &mut cells, false);
        assert_eq!(cells, vec![li_c, li_a, li_b]);

        let a_text = d.first_child(li_a).unwrap();
        let c_text = d.first_child(li_c).unwrap();
        let order = compare_nodes(&d, c_text, a_text);
        assert_eq!(order.result, Ordering::Greater);
        assert_eq!(order.ancestor, Some(ul));
        assert_eq!((order.a, order.b), (li_c, li_a));
    }

    #[test]
    fn edge_points() {
        let d = doc("<p>abc<br></p>");
        let p = d.first_child(d.root()).unwrap();
        let t = d.first_child(p).unwrap();
        assert!(is_edge_point(&d, t, 0, Some(Edge::Front)));
        assert!(is_edge_point(&d, t, 3, Some(Edge::End)));
        assert!(!is_edge_point(&d, t, 3, Some(Edge::Front)));
        assert!(!is_edge_point(&d, t, 1, None));
        assert!(is_edge_point(&d, p, 1, None));
    }

    #[test]
    fn deepest_neighbours_stop_at_non_editable() {
        let d = doc(
            r#"<p>a<b>bold</b></p><div contenteditable="false"><span>x</span></div><p>c</p>"#,
        );
        let root = d.root();
        let kids = d.child_nodes(root);
        let c_text = d.first_child(kids[2]).unwrap();
        assert_eq!(previous_deepest_node(&d, c_text, None), Some(kids[1]));
        let div_text = d.first_child(d.first_child(kids[1]).unwrap()).unwrap();
        let bold = d.last_child(kids[0]).unwrap();
        assert_eq!(
            previous_deepest_node(&d, div_text, None),
            d.first_child(bold)
        );
        assert_eq!(next_deepest_node(&d, c_text, Some(kids[2])), None);
    }

    #[test]
    fn attributes_copy_and_compare() {
        let mut d = doc(concat!(
            r#"<span class="x __se__format__line_a" style="color: red;" id="k">a</span>"#,
            r#"<span style="font-size: 2px;" title="">b</span>"#,
        ));
        let kids = d.child_nodes(d.root());
        let (a, b) = (kids[0], kids[1]);
        d.set_attr(b, "title", "t");
        copy_format_attributes(&mut d, b, a);
        assert_eq!(d.attr(b, "class"), Some("x"));
        assert_eq!(d.attr(b, "id"), Some("k"));
        assert_eq!(d.style(b, "color").as_deref(), Some("red"));
        assert_eq!(d.style(b, "font-size").as_deref(), Some("2px"));

        let same = d.create_element_with("b", &[("class", "p q")], None).unwrap();
        let other = d.create_element_with("b", &[("class", "q p")], None).unwrap();
        assert!(is_same_attributes(&d, same, other));
        assert!(!is_same_attributes(&d, same, a));
    }

    #[test]
    fn empty_lines() {
        let d = doc("<p>\u{200B}</p><p><br></p><p><img></p><p>x</p>");
        let kids = d.child_nodes(d.root());
        assert!(is_empty_line(&d, kids[0]));
        assert!(!is_empty_line(&d, kids[1]));
        assert!(!is_empty_line(&d, kids[2]));
        assert!(!is_empty_line(&d, kids[3]));
    }

    #[test]
    fn text_index_skips_rejected_subtrees() {
        let d = doc("<p>ab<span>cd</span><em>ef</em></p>");
        let p = d.first_child(d.root()).unwrap();
        let em_text = d.first_child(d.last_child(p).unwrap()).unwrap();
        assert_eq!(text_index_on_line(&d, p, em_text, 1, |_| false), 5);
        assert_eq!(
            text_index_on_line(&d, p, em_text, 1, |n| d.tag_is(n, "span")),
            3
        );
    }
}
