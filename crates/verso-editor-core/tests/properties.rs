use proptest::prelude::*;
use verso_editor_core::keys::code;
use verso_editor_core::transform::merge_same_tags;
use verso_editor_core::{Editor, EditorOptions, KeyEvent};
use verso_editor_dom::{ZERO_WIDTH_SPACE, query};

fn editor(html: &str) -> Editor {
    Editor::new(EditorOptions::default()).unwrap().with_content(html).unwrap()
}

fn key() -> impl Strategy<Value = KeyEvent> {
    prop_oneof![
        4 => prop::char::range('a', 'e').prop_map(KeyEvent::character),
        1 => Just(KeyEvent::new(code::SPACE)),
        2 => Just(KeyEvent::new(code::ENTER)),
        1 => Just(KeyEvent::new(code::ENTER).with_shift()),
        3 => Just(KeyEvent::new(code::BACKSPACE)),
        2 => Just(KeyEvent::new(code::DELETE)),
        1 => Just(KeyEvent::new(code::LEFT)),
        1 => Just(KeyEvent::new(code::RIGHT)),
        1 => Just(KeyEvent::new(code::TAB)),
    ]
}

fn start() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(""),
        Just("<p>ab</p>"),
        Just("<p>AB</p><p>CD</p>"),
        Just("<h2>Title</h2><p>body</p>"),
        Just("<ul><li>one</li><li>two</li></ul>"),
        Just("<blockquote><p>q</p></blockquote>"),
        Just("<p>a<strong>bc</strong>d</p>"),
    ]
}

fn inline_run() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (prop_oneof![Just(""), Just("b"), Just("i")], "[a-z]{1,3}"),
        1..6,
    )
    .prop_map(|parts| {
        parts
            .into_iter()
            .map(|(tag, text)| match tag {
                "" => text,
                tag => format!("<{tag}>{text}</{tag}>"),
            })
            .collect()
    })
}

/// Every structural invariant a keystroke must leave behind.
fn check_document(ed: &mut Editor) -> Result<(), TestCaseError> {
    let root = ed.doc.root();
    prop_assert!(ed.doc.first_child(root).is_some(), "root emptied: {}", ed.get_contents());
    for node in ed.doc.descendants(root) {
        if ed.format.is_line(&ed.doc, node) {
            prop_assert!(
                ed.doc.first_child(node).is_some(),
                "empty line in {}",
                ed.get_contents()
            );
        }
        if ed.format.is_block(&ed.doc, node) && !ed.format.is_line(&ed.doc, node) {
            for child in ed.doc.child_nodes(node) {
                prop_assert!(
                    !ed.doc.is_text(child) || ed.doc.text_content(child).trim().is_empty(),
                    "bare text in a block: {}",
                    ed.get_contents()
                );
            }
        }
    }
    prop_assert!(!ed.get_contents().contains(ZERO_WIDTH_SPACE));
    let range = ed.get_range();
    prop_assert!(range.is_live(&ed.doc), "caret detached: {:?}", range);
    Ok(())
}

proptest! {
    #[test]
    fn keystrokes_keep_the_document_well_formed(
        html in start(),
        keys in prop::collection::vec(key(), 0..40),
    ) {
        let mut ed = editor(html);
        for key in &keys {
            ed.press(key);
            check_document(&mut ed)?;
        }
    }

    #[test]
    fn merging_twice_changes_nothing(run in inline_run()) {
        let mut ed = editor(&format!("<p>{run}</p>"));
        let line = query::node_from_path(&ed.doc, &[0], ed.doc.root());

        merge_same_tags(&mut ed.doc, &ed.format, line, &mut [], false);
        let once = ed.get_contents();
        merge_same_tags(&mut ed.doc, &ed.format, line, &mut [], false);
        prop_assert_eq!(ed.get_contents(), once);
    }

    #[test]
    fn enter_then_backspace_restores_the_text(text in "[a-z]{1,8}", at in 0usize..9) {
        let at = at.min(text.len());
        let mut ed = editor(&format!("<p>{text}</p>"));
        let node = query::node_from_path(&ed.doc, &[0, 0], ed.doc.root());
        ed.set_caret(node, at);

        ed.press(&KeyEvent::new(code::ENTER));
        ed.press(&KeyEvent::new(code::BACKSPACE));
        prop_assert_eq!(ed.get_text(), text);
    }

    #[test]
    fn inserts_never_pass_the_limit(
        limit in 1usize..12,
        chunks in prop::collection::vec("[a-z]{0,5}", 1..8),
    ) {
        let options = EditorOptions {
            max_char_count: Some(limit),
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("").unwrap();
        for chunk in &chunks {
            let _ = ed.insert_html(chunk, false, false, false);
            prop_assert!(ed.char_count() <= limit, "{} > {limit}", ed.char_count());
        }
    }
}
