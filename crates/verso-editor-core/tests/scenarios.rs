use serde::Serialize;
use verso_editor_core::events::{EditorEvent, Outcome};
use verso_editor_core::keys::code;
use verso_editor_core::{ClipboardData, Editor, EditorOptions, KeyEvent, KeyOutcome, NodeId};
use verso_editor_dom::query;

#[derive(Debug, Serialize)]
struct Snapshot {
    html: String,
    caret: Option<(String, usize)>,
}

fn editor(html: &str) -> Editor {
    Editor::new(EditorOptions::default()).unwrap().with_content(html).unwrap()
}

fn node_at(ed: &Editor, path: &[usize]) -> NodeId {
    query::node_from_path(&ed.doc, path, ed.doc.root())
}

fn snapshot(ed: &mut Editor) -> Snapshot {
    let range = ed.get_range();
    let caret = range
        .is_collapsed()
        .then(|| (ed.doc.text_content(range.start_container), range.start_offset));
    Snapshot {
        html: ed.get_contents(),
        caret,
    }
}

#[test]
fn backspace_merges_into_the_previous_line() {
    let mut ed = editor("<p>AB</p><p>CD</p>");
    let cd = node_at(&ed, &[1, 0]);
    ed.set_caret(cd, 0);

    assert_eq!(ed.press(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Handled);
    insta::assert_yaml_snapshot!(snapshot(&mut ed), @r#"
    html: "<p>ABCD</p>"
    caret:
      - ABCD
      - 2
    "#);
}

#[test]
fn enter_splits_at_the_caret() {
    let mut ed = editor("<p>ABCD</p>");
    let text = node_at(&ed, &[0, 0]);
    ed.set_caret(text, 2);

    assert_eq!(ed.press(&KeyEvent::new(code::ENTER)), KeyOutcome::Handled);
    insta::assert_yaml_snapshot!(snapshot(&mut ed), @r#"
    html: "<p>AB</p><p>CD</p>"
    caret:
      - CD
      - 0
    "#);
}

#[test]
fn split_then_merge_restores_the_line() {
    let mut ed = editor("<p>ABCD</p>");
    let text = node_at(&ed, &[0, 0]);
    ed.set_caret(text, 1);

    ed.press(&KeyEvent::new(code::ENTER));
    ed.press(&KeyEvent::new(code::BACKSPACE));
    assert_eq!(ed.get_contents(), "<p>ABCD</p>");
    assert_eq!(ed.get_text(), "ABCD");
}

#[test]
fn tab_walks_list_cells_in_and_out() {
    let original = "<ol><li>a</li><li>b</li><li>c</li></ol>";
    let mut ed = editor(original);
    let b = node_at(&ed, &[0, 1, 0]);
    let c = node_at(&ed, &[0, 2, 0]);
    ed.set_range(b, 0, c, 1);

    assert_eq!(ed.press(&KeyEvent::new(code::TAB)), KeyOutcome::Handled);
    assert_eq!(ed.get_contents(), "<ol><li>a<ol><li>b</li><li>c</li></ol></li></ol>");

    assert_eq!(ed.press(&KeyEvent::new(code::TAB).with_shift()), KeyOutcome::Handled);
    assert_eq!(ed.get_contents(), original);
}

#[test]
fn indent_commands_round_trip() {
    let original = "<ul><li>one</li><li>two</li><li>three</li></ul>";
    let mut ed = editor(original);
    let two = node_at(&ed, &[0, 1, 0]);
    let three = node_at(&ed, &[0, 2, 0]);
    ed.set_range(two, 1, three, 2);

    ed.indent().unwrap();
    assert_ne!(ed.get_contents(), original);
    ed.outdent().unwrap();
    assert_eq!(ed.get_contents(), original);
}

#[test]
fn component_is_selected_before_it_is_deleted() {
    let original = r#"<p>A</p><figure class="se-component"><img src="x"></figure><p>B</p>"#;
    let mut ed = editor(original);
    let b = node_at(&ed, &[2, 0]);
    ed.set_caret(b, 0);

    ed.press(&KeyEvent::new(code::BACKSPACE));
    assert!(ed.selected_component().is_some());
    assert_eq!(ed.get_contents(), original);

    ed.press(&KeyEvent::new(code::BACKSPACE));
    assert!(ed.selected_component().is_none());
    insta::assert_yaml_snapshot!(snapshot(&mut ed), @r#"
    html: "<p>A</p><p>B</p>"
    caret:
      - A
      - 1
    "#);
}

#[tokio::test]
async fn vetoed_paste_leaves_no_trace() {
    let mut ed = editor("<p>ab</p>");
    ed.events.set_user_hooks(|event: &EditorEvent| match event {
        EditorEvent::Paste { .. } => Outcome::Cancel,
        _ => Outcome::Continue,
    });
    let text = node_at(&ed, &[0, 0]);
    ed.set_caret(text, 1);

    assert!(!ed.paste(ClipboardData::html("<p>pasted</p>")).await);
    assert_eq!(ed.get_contents(), "<p>ab</p>");
    assert!(!ed.undo());
}

#[tokio::test]
async fn replaced_paste_inserts_the_replacement() {
    let mut ed = editor("<p>ab</p>");
    ed.events.set_user_hooks(|event: &EditorEvent| match event {
        EditorEvent::Paste { .. } => Outcome::Replace("Z".to_owned()),
        _ => Outcome::Continue,
    });
    let text = node_at(&ed, &[0, 0]);
    ed.set_caret(text, 1);

    assert!(ed.paste(ClipboardData::text("ignored")).await);
    assert_eq!(ed.get_contents(), "<p>aZb</p>");
}

#[test]
fn tab_inserts_a_run_of_spaces() {
    let options = EditorOptions {
        tab_size: 2,
        ..Default::default()
    };
    let mut ed = Editor::new(options).unwrap().with_content("<p>abcd</p>").unwrap();
    let text = node_at(&ed, &[0, 0]);
    ed.set_caret(text, 2);

    assert_eq!(ed.press(&KeyEvent::new(code::TAB)), KeyOutcome::Handled);
    assert_eq!(ed.get_contents(), "<p>ab&nbsp;&nbsp;cd</p>");
    let range = ed.get_range();
    assert!(range.is_collapsed());
    assert_eq!(ed.doc.text_content(range.start_container), "ab\u{a0}\u{a0}cd");
    assert_eq!(range.start_offset, 4);
}

#[test]
fn typing_builds_lines() {
    let mut ed = editor("");
    ed.type_text("one\ntwo");
    assert_eq!(ed.get_contents(), "<p>one</p><p>two</p>");

    ed.press(&KeyEvent::new(code::BACKSPACE));
    ed.press(&KeyEvent::new(code::BACKSPACE));
    ed.press(&KeyEvent::new(code::BACKSPACE));
    ed.press(&KeyEvent::new(code::BACKSPACE));
    assert_eq!(ed.get_contents(), "<p>one</p>");
}

#[test]
fn typing_into_fresh_list_content_lands_in_the_first_cell() {
    let mut ed = editor("<ul><li>one</li><li>two</li></ul>");

    ed.press(&KeyEvent::character('a'));
    insta::assert_yaml_snapshot!(snapshot(&mut ed), @r#"
    html: "<ul><li>aone</li><li>two</li></ul>"
    caret:
      - aone
      - 1
    "#);
}

#[test]
fn typing_after_a_styled_heading_keeps_the_style() {
    let mut ed = editor("<h2>T<strong><em>x</em></strong></h2>");
    let x = node_at(&ed, &[0, 1, 0, 0]);
    ed.set_caret(x, 1);

    ed.type_text("\nz");
    insta::assert_yaml_snapshot!(snapshot(&mut ed), @r#"
    html: "<h2>T<strong><em>x</em></strong></h2><p><strong><em>z</em></strong></p>"
    caret:
      - z
      - 1
    "#);
}

#[test]
fn backspace_does_not_leave_a_table_cell() {
    let original = "<table><tbody><tr><td>a</td><td>b</td></tr></tbody></table>";
    let mut ed = editor(original);
    let b = node_at(&ed, &[0, 0, 0, 1, 0]);
    ed.set_caret(b, 0);

    assert_ne!(ed.press(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::PassThrough);
    ed.type_text("z");
    assert_eq!(ed.get_contents(), "<table><tbody><tr><td>a</td><td>zb</td></tr></tbody></table>");
}
