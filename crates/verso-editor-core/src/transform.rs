//! Structural transforms: splitting, merging and pruning subtrees.
//!
//! These work on a [`Document`] directly and do not touch the selection, so the
//! line and list commands can compose them while keeping their own bookkeeping.

use verso_editor_dom::query::{self, copy_tag_attributes, is_break, node_depth};
use verso_editor_dom::unicode::is_zero_width;
use verso_editor_dom::{Document, DomError, DomResult, NodeId, ZERO_WIDTH_STR};

use crate::format::Format;

/// Tags and classes that keep an otherwise empty ancestor alive in [`remove_empty_node`].
const ALLOWED_EMPTY: &[&str] = &[
    "pre", "blockquote", "hr", "li", "table", "img", "iframe", "video", "audio", "canvas", "details",
];

fn is_allowed_empty(doc: &Document, node: NodeId) -> bool {
    doc.has_class(node, "se-component") || doc.tag(node).is_some_and(|t| ALLOWED_EMPTY.contains(&t))
}

/// Split every ancestor of `base` below `depth` at the given point and return the
/// first node of the second half.
///
/// For a text node the split point is `offset` chars in (the tail keeps at least a
/// zero-width space). For an element it is just before the element; `Some(0)` first
/// descends to its deepest first node. A half left empty gets a `<br>`.
pub fn split(
    doc: &mut Document,
    format: &Format,
    base: NodeId,
    offset: Option<usize>,
    depth: i32,
) -> DomResult<NodeId> {
    if doc.is_root(base) {
        return Ok(base);
    }
    let bp = doc.parent(base).ok_or(DomError::MissingParent(base))?;
    let depth = depth.max(0);
    let mut base = base;
    let mut next = true;
    // children from `pos(node) + first_suffix` move on the first level
    let mut first_suffix = 1;

    if doc.is_text(base) {
        if let Some(offset) = offset
            && offset != doc.node_len(base)
        {
            let after = doc.split_text(base, offset)?;
            if doc.text(after).is_some_and(is_zero_width) {
                doc.set_text(after, ZERO_WIDTH_STR);
            }
        }
    } else {
        if offset == Some(0) {
            while let Some(first) = doc.first_child(base) {
                base = first;
            }
            if doc.is_text(base) {
                let parent = doc.parent(base).ok_or(DomError::MissingParent(base))?;
                let sentinel = doc.create_text(ZERO_WIDTH_STR);
                doc.insert_before(parent, sentinel, Some(base))?;
                base = sentinel;
            }
        }
        match doc.prev_sibling(base) {
            Some(prev) => base = prev,
            None => {
                first_suffix = 0;
                if node_depth(doc, base) == depth {
                    next = false;
                }
            }
        }
    }

    let mut depth_el = base;
    let mut new_el: Option<NodeId> = None;
    let mut suffix = first_suffix;
    while node_depth(doc, depth_el) > depth {
        let index = doc.index_in_parent(depth_el) + suffix;
        suffix = 1;
        depth_el = doc.parent(depth_el).ok_or(DomError::MissingParent(depth_el))?;

        let temp = new_el;
        let clone = doc.clone_shallow(depth_el)?;
        if let Some(temp) = temp {
            match doc.first_element_child(temp) {
                Some(first) if query::is_list_cell(doc, clone) && query::is_list(doc, temp) => {
                    doc.move_children(first, clone)?;
                    doc.detach(first);
                    if doc.first_element_child(temp).is_some() {
                        doc.append_child(clone, temp)?;
                    }
                }
                _ => doc.append_child(clone, temp)?,
            }
        }
        while let Some(child) = doc.child_at(depth_el, index) {
            doc.append_child(clone, child)?;
        }
        new_el = Some(clone);
    }

    let first = doc.first_child(depth_el);
    let empty = match first {
        None => true,
        Some(f) => {
            doc.child_count(depth_el) <= 1
                && doc.text_content(f).is_empty()
                && (is_break(doc, f) || !format.not_text_node(doc, f))
        }
    };
    if empty && doc.is_element(depth_el) && !format.not_text_node(doc, depth_el) {
        doc.set_inner_html(depth_el, "<br>")?;
    }

    let p_element = doc.parent(depth_el).ok_or(DomError::MissingParent(depth_el))?;
    let reference = if next {
        doc.next_sibling(depth_el)
    } else {
        Some(depth_el)
    };
    let Some(new_el) = new_el else {
        return Ok(reference.unwrap_or(depth_el));
    };

    merge_same_tags(doc, format, new_el, &mut [], false);
    merge_nested_tags(doc, new_el, |d, n| query::is_list(d, n));

    let result = if doc.child_count(new_el) > 0 {
        doc.insert_before(p_element, new_el, reference)?;
        new_el
    } else {
        reference.unwrap_or(depth_el)
    };

    if query::is_list_cell(doc, result)
        && let Some(first) = doc.first_element_child(result)
        && doc.first_child(result) == Some(first)
        && query::is_list(doc, first)
    {
        let br = doc.create_element("br");
        doc.insert_before(result, br, Some(first))?;
    }

    if doc.first_child(bp).is_none() {
        doc.detach(bp);
    }
    tracing::trace!(target: "verso::transform", depth, "split subtree");
    Ok(result)
}

fn same_tag(doc: &Document, a: NodeId, b: NodeId) -> bool {
    doc.node_name(a) == doc.node_name(b)
}

fn path_in(path: &[usize], prefix: &[usize]) -> bool {
    path.len() > prefix.len() && path.starts_with(prefix)
}

struct MergeCtx<'a, 'p> {
    format: &'a Format,
    element: NodeId,
    paths: &'p mut [Vec<usize>],
    offsets: Vec<usize>,
    only_text: bool,
}

/// Merge adjacent siblings with the same tag and attributes below `element`, and
/// collapse a wrapper whose only child has its own tag.
///
/// `paths` are node paths relative to `element`; they are rewritten to keep pointing
/// at the same content. The returned vector holds, per path, how many chars were
/// merged in front of the node it points at. With `only_text`, nodes whose change
/// must be ignored are left alone. Otherwise lines other than br-lines are skipped
/// whole, and list cells and table parts are walked into but never merged.
pub fn merge_same_tags(
    doc: &mut Document,
    format: &Format,
    element: NodeId,
    paths: &mut [Vec<usize>],
    only_text: bool,
) -> Vec<usize> {
    let offsets = vec![0; paths.len()];
    let mut ctx = MergeCtx {
        format,
        element,
        paths,
        offsets,
        only_text,
    };
    merge_rec(doc, &mut ctx, element, &mut Vec::new());
    ctx.offsets
}

fn merge_rec(doc: &mut Document, ctx: &mut MergeCtx<'_, '_>, current: NodeId, prefix: &mut Vec<usize>) {
    let depth = prefix.len();
    let mut i = 0;
    while let Some(child) = doc.child_at(current, i) {
        let is_structural = query::is_table_elements(doc, child) || query::is_list_cell(doc, child);
        let skip = if ctx.only_text {
            ctx.format.is_ignore_node_change(doc, child)
        } else {
            is_structural || (ctx.format.is_line(doc, child) && !ctx.format.is_br_line(doc, child))
        };
        if skip {
            if is_structural {
                prefix.push(i);
                merge_rec(doc, ctx, child, prefix);
                prefix.pop();
            }
            i += 1;
            continue;
        }

        if current != ctx.element
            && doc.child_count(current) == 1
            && same_tag(doc, current, child)
            && let Some(parent) = doc.parent(current)
        {
            copy_tag_attributes(doc, child, current, &[]);
            if doc.insert_before(parent, child, Some(current)).is_err() {
                return;
            }
            doc.detach(current);
            for path in ctx.paths.iter_mut() {
                if path_in(path, prefix) {
                    path.remove(depth);
                }
            }
            // the child took the wrapper's slot, so it is walked with the wrapper's prefix
            if doc.is_element(child) {
                merge_rec(doc, ctx, child, prefix);
            }
            return;
        }

        let Some(next) = doc.next_sibling(child) else {
            if doc.is_element(child) {
                prefix.push(i);
                merge_rec(doc, ctx, child, prefix);
                prefix.pop();
            }
            break;
        };

        let mergeable = same_tag(doc, child, next)
            && query::is_same_attributes(doc, child, next)
            && doc.attr(child, "href") == doc.attr(next, "href");
        if mergeable {
            merge_pair(doc, ctx, child, next, prefix, i);
            // look at the grown child again with its new neighbour
            continue;
        }
        if doc.is_element(child) {
            prefix.push(i);
            merge_rec(doc, ctx, child, prefix);
            prefix.pop();
        }
        i += 1;
    }
}

fn merge_pair(
    doc: &mut Document,
    ctx: &mut MergeCtx<'_, '_>,
    child: NodeId,
    next: NodeId,
    prefix: &[usize],
    i: usize,
) {
    let depth = prefix.len();
    if doc.is_text(child) {
        let head = doc.text(child).unwrap_or_default().to_owned();
        let add = head.chars().count();
        let joined = head + doc.text(next).unwrap_or_default();
        doc.set_text(child, joined);
        doc.detach(next);
        for (n, path) in ctx.paths.iter_mut().enumerate() {
            if path_in(path, prefix) && path[depth] > i {
                path[depth] -= 1;
                if path[depth] == i {
                    ctx.offsets[n] += add;
                }
            }
        }
        return;
    }

    let before = doc.child_count(child);
    let last = doc.last_child(child);
    let first = doc.first_child(next);
    let joined_text = match (last, first) {
        (Some(l), Some(r)) if doc.is_text(l) && doc.is_text(r) => Some(doc.node_len(l)),
        _ => None,
    };
    for c in doc.child_nodes(next) {
        // both are live elements, moving cannot fail
        let _ = doc.append_child(child, c);
    }
    if let (Some(l), Some(r), Some(_)) = (last, first, joined_text) {
        let joined = format!("{}{}", doc.text(l).unwrap_or_default(), doc.text(r).unwrap_or_default());
        doc.set_text(l, joined);
        doc.detach(r);
    }
    doc.detach(next);

    let shift = before - usize::from(joined_text.is_some());
    for (n, path) in ctx.paths.iter_mut().enumerate() {
        if !(path_in(path, prefix) && path[depth] > i) {
            continue;
        }
        path[depth] -= 1;
        if path[depth] == i && path.len() > depth + 1 {
            if let Some(len) = joined_text
                && path[depth + 1] == 0
            {
                ctx.offsets[n] += len;
            }
            path[depth + 1] += shift;
        }
    }
}

/// Collapse `A > A` chains where the inner element is the only element child and
/// `validation` accepts the outer one.
pub fn merge_nested_tags(doc: &mut Document, element: NodeId, validation: impl Fn(&Document, NodeId) -> bool) {
    fn rec(doc: &mut Document, current: NodeId, validation: &dyn Fn(&Document, NodeId) -> bool) {
        let children = doc.element_children(current);
        if let [only] = children[..]
            && same_tag(doc, only, current)
            && validation(doc, current)
        {
            for c in doc.child_nodes(only) {
                let _ = doc.insert_before(current, c, Some(only));
            }
            doc.detach(only);
        }
        for child in doc.element_children(current) {
            rec(doc, child, validation);
        }
    }
    rec(doc, element, &validation);
}

/// Neighbours of the topmost node removed by [`remove_all_parents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedEdges {
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
}

fn is_blank_text(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed.chars().all(|c| c == '\n' || c == '\u{200B}')
}

/// Remove `item`, then each ancestor left accepted by `validation`, stopping at the
/// root or `stop_parent`. The default validation accepts blank nodes that hold no
/// media and are not components.
pub fn remove_all_parents(
    doc: &mut Document,
    format: &Format,
    item: NodeId,
    validation: Option<&dyn Fn(&Document, NodeId) -> bool>,
    stop_parent: Option<NodeId>,
) -> Option<RemovedEdges> {
    let default = |doc: &Document, current: NodeId| {
        if Some(current) == stop_parent || format.is_component(doc, current) {
            return false;
        }
        let holds_media = std::iter::once(current)
            .chain(doc.descendants(current))
            .any(|n| format.not_text_node(doc, n) && !is_break(doc, n));
        !holds_media && is_blank_text(&doc.text_content(current))
    };
    let validation: &dyn Fn(&Document, NodeId) -> bool = validation.unwrap_or(&default);

    let mut removed = None;
    let mut current = item;
    while !doc.is_root(current) {
        let Some(parent) = doc.parent(current) else {
            break;
        };
        if !validation(doc, current) {
            break;
        }
        removed = Some(RemovedEdges {
            prev: doc.prev_element_sibling(current),
            next: doc.next_element_sibling(current),
        });
        doc.detach(current);
        current = parent;
    }
    removed
}

/// Remove empty descendants of `element`. `keep` (or its ancestor directly under
/// `element`) survives. When `element` ends up with no children it is removed if
/// `force_delete`, otherwise it gets a `<br>`.
pub fn remove_empty_node(
    doc: &mut Document,
    format: &Format,
    element: NodeId,
    keep: Option<NodeId>,
    force_delete: bool,
) {
    let keep = keep.and_then(|k| query::parent_element(doc, k, |c| doc.parent(c) == Some(element), None));

    fn rec(doc: &mut Document, format: &Format, element: NodeId, keep: Option<NodeId>, current: NodeId) {
        if format.not_text_node(doc, current) || Some(current) == keep || query::is_non_editable(doc, current) {
            return;
        }
        let removable = current != element
            && is_zero_width(&doc.text_content(current))
            && !doc.first_child(current).is_some_and(|f| is_break(doc, f))
            && !doc.descendants(current).into_iter().any(|d| is_allowed_empty(doc, d));
        if removable {
            if doc.parent(current).is_some() {
                doc.detach(current);
            }
            return;
        }
        for child in doc.element_children(current) {
            if !format.is_component(doc, child) {
                rec(doc, format, element, keep, child);
            }
        }
    }
    rec(doc, format, element, keep, element);

    if doc.first_child(element).is_none() {
        if force_delete {
            doc.detach(element);
        } else {
            // element children only reach here, so this cannot fail
            let _ = doc.set_inner_html(element, "<br>");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FigureRegistry;
    use std::rc::Rc;
    use verso_common::FormatPatterns;

    fn format() -> Format {
        Format::new(&FormatPatterns::default(), Rc::new(FigureRegistry)).unwrap()
    }

    fn text_of(doc: &Document, path: &[usize]) -> NodeId {
        query::node_from_path(doc, path, doc.root())
    }

    #[test]
    fn split_text_at_line_depth() {
        let f = format();
        let mut doc = Document::from_html("<p>ab<b>cd</b>ef</p>").unwrap();
        let cd = text_of(&doc, &[0, 1, 0]);
        let second = split(&mut doc, &f, cd, Some(1), 0).unwrap();
        assert_eq!(doc.inner_html(doc.root()), "<p>ab<b>c</b></p><p><b>d</b>ef</p>");
        assert_eq!(doc.outer_html(second), "<p><b>d</b>ef</p>");
    }

    #[test]
    fn split_at_the_end_leaves_a_break_line() {
        let f = format();
        let mut doc = Document::from_html("<p>ab</p>").unwrap();
        let ab = text_of(&doc, &[0, 0]);
        let second = split(&mut doc, &f, ab, Some(0), 0).unwrap();
        assert_eq!(doc.inner_html(doc.root()), "<p><br></p><p>ab</p>");
        assert_eq!(doc.outer_html(second), "<p>ab</p>");
    }

    #[test]
    fn split_before_an_element() {
        let f = format();
        let mut doc = Document::from_html("<p><br></p>").unwrap();
        let br = text_of(&doc, &[0, 0]);
        split(&mut doc, &f, br, Some(0), 0).unwrap();
        assert_eq!(doc.inner_html(doc.root()), "<p><br></p><p><br></p>");
    }

    #[test]
    fn merges_same_siblings_and_tracks_paths() {
        let f = format();
        let mut doc = Document::from_html("<p><b>ab</b><b>cd</b></p>").unwrap();
        let p = doc.first_child(doc.root()).unwrap();
        let mut paths = vec![vec![1, 0]];
        let offsets = merge_same_tags(&mut doc, &f, p, &mut paths, false);
        assert_eq!(doc.outer_html(p), "<p><b>abcd</b></p>");
        assert_eq!(paths, vec![vec![0, 0]]);
        assert_eq!(offsets, vec![2]);
    }

    #[derive(Debug, serde::Serialize)]
    struct Merged {
        html: String,
        paths: Vec<Vec<usize>>,
        offsets: Vec<usize>,
    }

    fn merge_line(html: &str, mut paths: Vec<Vec<usize>>) -> Merged {
        let f = format();
        let mut doc = Document::from_html(html).unwrap();
        let p = doc.first_child(doc.root()).unwrap();
        let offsets = merge_same_tags(&mut doc, &f, p, &mut paths, false);
        Merged {
            html: doc.outer_html(p),
            paths,
            offsets,
        }
    }

    #[test]
    fn merges_below_a_merged_pair() {
        let merged = merge_line(
            "<p><b>ab</b><b><i>c</i><i>d</i></b></p>",
            vec![vec![0, 0], vec![1, 0, 0], vec![1, 1, 0]],
        );
        insta::assert_yaml_snapshot!(merged, @r#"
        html: "<p><b>ab<i>cd</i></b></p>"
        paths:
          - - 0
            - 0
          - - 0
            - 1
            - 0
          - - 0
            - 1
            - 0
        offsets:
          - 0
          - 0
          - 1
        "#);
    }

    #[test]
    fn merges_a_run_of_nested_wrappers() {
        let merged = merge_line(
            "<p><b><i>a</i></b><b><i>b</i></b><b><i>c</i></b></p>",
            vec![vec![0, 0, 0], vec![1, 0, 0], vec![2, 0, 0]],
        );
        insta::assert_yaml_snapshot!(merged, @r#"
        html: "<p><b><i>abc</i></b></p>"
        paths:
          - - 0
            - 0
            - 0
          - - 0
            - 0
            - 0
          - - 0
            - 0
            - 0
        offsets:
          - 0
          - 1
          - 2
        "#);
    }

    #[test]
    fn different_attributes_are_not_merged() {
        let f = format();
        let mut doc =
            Document::from_html(r#"<p><span style="color: red;">a</span><span>b</span></p>"#).unwrap();
        let p = doc.first_child(doc.root()).unwrap();
        merge_same_tags(&mut doc, &f, p, &mut [], false);
        assert_eq!(doc.child_count(p), 2);
    }

    #[test]
    fn nested_lists_collapse() {
        let mut doc = Document::from_html("<ul><ul><li>a</li></ul></ul>").unwrap();
        let ul = doc.first_child(doc.root()).unwrap();
        merge_nested_tags(&mut doc, ul, |d, n| query::is_list(d, n));
        assert_eq!(doc.inner_html(doc.root()), "<ul><li>a</li></ul>");
    }

    #[test]
    fn blank_parents_are_removed_up_to_content() {
        let f = format();
        let mut doc = Document::from_html("<p>x</p><p><b><i>\u{200B}</i></b></p><p>y</p>").unwrap();
        let i = text_of(&doc, &[1, 0, 0]);
        let edges = remove_all_parents(&mut doc, &f, i, None, None).unwrap();
        assert_eq!(doc.inner_html(doc.root()), "<p>x</p><p>y</p>");
        assert_eq!(doc.text_content(edges.prev.unwrap()), "x");
        assert_eq!(doc.text_content(edges.next.unwrap()), "y");
    }

    #[test]
    fn empty_inline_nodes_are_pruned() {
        let f = format();
        let mut doc = Document::from_html("<p><b></b>a<i><br></i><span></span></p><p><u></u></p>").unwrap();
        let p = doc.first_child(doc.root()).unwrap();
        remove_empty_node(&mut doc, &f, p, None, false);
        assert_eq!(doc.outer_html(p), "<p>a<i><br></i></p>");

        let p2 = doc.last_child(doc.root()).unwrap();
        remove_empty_node(&mut doc, &f, p2, None, false);
        assert_eq!(doc.outer_html(p2), "<p><br></p>");
    }
}
