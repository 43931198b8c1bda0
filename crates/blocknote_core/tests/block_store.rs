use blocknote_core::{
    blocks_to_markup, blocks_to_text, parse_input, BlockPatch, BlockType, Collection,
    FlatMapBackend, IndexedBackend, NewBlock, NewNote, Notebook, StorageBackend, StoreError,
    ValidationError,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn notebooks() -> Vec<Notebook> {
    let backends: Vec<Arc<dyn StorageBackend>> = vec![
        Arc::new(FlatMapBackend::in_memory()),
        Arc::new(IndexedBackend::in_memory().unwrap()),
    ];
    backends.into_iter().map(Notebook::with_backend).collect()
}

fn contents(book: &Notebook, note_id: Uuid) -> Vec<String> {
    book.blocks
        .get_blocks_for_note(note_id)
        .unwrap()
        .into_iter()
        .map(|block| block.content)
        .collect()
}

#[test]
fn create_block_stamps_identity_and_timestamps() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let block = book
            .blocks
            .create_block(note.id, NewBlock::new(BlockType::Heading2, "Agenda"))
            .unwrap();

        assert_eq!(block.note_id, note.id);
        assert_eq!(block.kind, BlockType::Heading2);
        assert_eq!(block.order, 0);
        assert_eq!(block.created, block.last_modified);
        assert_eq!(book.blocks.get_block(block.id).unwrap(), Some(block));
    }
}

#[test]
fn create_block_does_not_require_an_existing_note() {
    for book in notebooks() {
        let dangling = Uuid::new_v4();
        let block = book
            .blocks
            .create_block(dangling, NewBlock::new(BlockType::Paragraph, "orphan"))
            .unwrap();
        assert_eq!(book.blocks.get_blocks_for_note(dangling).unwrap(), vec![block]);
    }
}

#[test]
fn blocks_come_back_sorted_by_order_with_ties_in_insertion_order() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        for (content, order) in [("c", 2), ("a", 0), ("b1", 1), ("b2", 1)] {
            book.blocks
                .create_block(
                    note.id,
                    NewBlock::new(BlockType::Paragraph, content).with_order(order),
                )
                .unwrap();
        }
        assert_eq!(contents(&book, note.id), vec!["a", "b1", "b2", "c"]);
    }
}

#[test]
fn blocks_of_other_notes_are_not_returned() {
    for book in notebooks() {
        let first = book.notes.create_note(NewNote::default()).unwrap();
        let second = book.notes.create_note(NewNote::default()).unwrap();
        book.blocks
            .create_block(first.id, NewBlock::new(BlockType::Paragraph, "mine"))
            .unwrap();
        book.blocks
            .create_block(second.id, NewBlock::new(BlockType::Paragraph, "theirs"))
            .unwrap();

        assert_eq!(contents(&book, first.id), vec!["mine"]);
        assert!(book
            .blocks
            .get_blocks_for_note(Uuid::new_v4())
            .unwrap()
            .is_empty());
    }
}

#[test]
fn blocks_round_trip_unchanged() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let mut created = Vec::new();
        for (order, kind) in BlockType::ALL.iter().enumerate() {
            let input = NewBlock::new(*kind, format!("content {order}"))
                .with_order(order as i64)
                .with_property("extra", json!({ "nested": [order] }));
            created.push(book.blocks.create_block(note.id, input).unwrap());
        }

        assert_eq!(book.blocks.get_blocks_for_note(note.id).unwrap(), created);
    }
}

#[test]
fn update_block_merges_patch_and_keeps_identity() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let block = book
            .blocks
            .create_block(
                note.id,
                NewBlock::new(BlockType::ToDo, "ship it").with_property("checked", false),
            )
            .unwrap();

        let patch: BlockPatch = parse_input(json!({ "properties": { "checked": true } })).unwrap();
        let updated = book.blocks.update_block(block.id, patch).unwrap();

        assert_eq!(updated.id, block.id);
        assert_eq!(updated.note_id, note.id);
        assert_eq!(updated.content, "ship it");
        assert!(updated.checked());
        assert_eq!(updated.created, block.created);
        assert_eq!(book.blocks.get_block(block.id).unwrap(), Some(updated));
    }
}

#[test]
fn update_missing_block_is_not_found_and_writes_nothing() {
    for book in notebooks() {
        let missing = Uuid::new_v4();
        let err = book
            .blocks
            .update_block(missing, BlockPatch::content("ghost"))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound { collection: Collection::Blocks, id } if id == missing
        ));
        assert!(book.blocks.get_block(missing).unwrap().is_none());
    }
}

#[test]
fn invalid_properties_are_rejected() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let err = book
            .blocks
            .create_block(
                note.id,
                NewBlock::new(BlockType::ToDo, "x").with_property("checked", "yes"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::InvalidProperty { key: "checked", .. })
        ));

        let block = book
            .blocks
            .create_block(note.id, NewBlock::new(BlockType::Image, "logo"))
            .unwrap();
        let patch: BlockPatch = parse_input(json!({ "properties": { "url": 7 } })).unwrap();
        let err = book.blocks.update_block(block.id, patch).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::InvalidProperty { key: "url", .. })
        ));
        assert_eq!(book.blocks.get_block(block.id).unwrap(), Some(block));
    }
}

#[test]
fn delete_block_is_idempotent() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let block = book
            .blocks
            .create_block(note.id, NewBlock::default())
            .unwrap();

        book.blocks.delete_block(block.id).unwrap();
        book.blocks.delete_block(block.id).unwrap();
        book.blocks.delete_block(Uuid::new_v4()).unwrap();

        assert!(book.blocks.get_block(block.id).unwrap().is_none());
        assert!(book.blocks.get_blocks_for_note(note.id).unwrap().is_empty());
    }
}

#[test]
fn reorder_assigns_positions_from_the_id_list() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let ids: Vec<Uuid> = ["one", "two", "three"]
            .iter()
            .enumerate()
            .map(|(order, content)| {
                book.blocks
                    .create_block(
                        note.id,
                        NewBlock::new(BlockType::Paragraph, *content).with_order(order as i64),
                    )
                    .unwrap()
                    .id
            })
            .collect();

        book.blocks
            .reorder_blocks(note.id, &[ids[2], ids[0], ids[1]])
            .unwrap();

        let blocks = book.blocks.get_blocks_for_note(note.id).unwrap();
        let orders: Vec<i64> = blocks.iter().map(|block| block.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(contents(&book, note.id), vec!["three", "one", "two"]);
    }
}

#[test]
fn reorder_with_empty_list_changes_nothing() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let block = book
            .blocks
            .create_block(note.id, NewBlock::default().with_order(5))
            .unwrap();
        book.blocks.reorder_blocks(note.id, &[]).unwrap();
        assert_eq!(book.blocks.get_block(block.id).unwrap(), Some(block));
    }
}

#[test]
fn reorder_rejects_bad_id_lists_without_writing() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let other = book.notes.create_note(NewNote::default()).unwrap();
        let first = book
            .blocks
            .create_block(note.id, NewBlock::default().with_order(10))
            .unwrap();
        let second = book
            .blocks
            .create_block(note.id, NewBlock::default().with_order(20))
            .unwrap();
        let foreign = book
            .blocks
            .create_block(other.id, NewBlock::default())
            .unwrap();

        let err = book
            .blocks
            .reorder_blocks(note.id, &[second.id, foreign.id])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::BlockOutsideNote { .. })
        ));

        let err = book
            .blocks
            .reorder_blocks(note.id, &[second.id, second.id])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::DuplicateBlock(id)) if id == second.id
        ));

        let err = book
            .blocks
            .reorder_blocks(note.id, &[second.id, Uuid::new_v4()])
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let blocks = book.blocks.get_blocks_for_note(note.id).unwrap();
        assert_eq!(blocks, vec![first, second]);
        assert_eq!(book.blocks.get_block(foreign.id).unwrap(), Some(foreign));
    }
}

#[test]
fn import_text_appends_after_existing_blocks() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        book.blocks
            .create_block(
                note.id,
                NewBlock::new(BlockType::Paragraph, "already here").with_order(3),
            )
            .unwrap();

        let imported = book
            .blocks
            .import_text(note.id, "# Title\n\n- [x] done\n1. first")
            .unwrap();

        let orders: Vec<i64> = imported.iter().map(|block| block.order).collect();
        assert_eq!(orders, vec![4, 5, 6]);
        assert_eq!(
            contents(&book, note.id),
            vec!["already here", "Title", "done", "first"]
        );
        assert!(imported[1].checked());
    }
}

#[test]
fn imported_text_renders_back_to_text_and_markup() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let text = "# Plan\n- [ ] write <tests>\n1. a\n2. b\n---";
        book.blocks.import_text(note.id, text).unwrap();

        let blocks = book.blocks.get_blocks_for_note(note.id).unwrap();
        assert_eq!(blocks_to_text(&blocks), text);

        let markup = blocks_to_markup(&blocks);
        assert!(markup.starts_with(r#"<h1 class="notion-heading-1">Plan</h1>"#));
        assert!(markup.contains("write &lt;tests&gt;"));
        assert!(markup.ends_with(r#"<hr class="notion-divider">"#));
    }
}

#[test]
fn import_text_after_max_order_is_rejected_without_writing() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let last = book
            .blocks
            .create_block(note.id, NewBlock::default().with_order(i64::MAX))
            .unwrap();

        let err = book.blocks.import_text(note.id, "x").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::OrderOverflow { note_id }) if note_id == note.id
        ));
        assert_eq!(book.blocks.get_blocks_for_note(note.id).unwrap(), vec![last]);
    }
}

#[test]
fn import_text_overflowing_on_a_later_line_writes_nothing() {
    for book in notebooks() {
        let note = book.notes.create_note(NewNote::default()).unwrap();
        let last = book
            .blocks
            .create_block(note.id, NewBlock::default().with_order(i64::MAX - 1))
            .unwrap();

        let err = book.blocks.import_text(note.id, "fits\nspills").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::OrderOverflow { .. })
        ));
        assert_eq!(book.blocks.get_blocks_for_note(note.id).unwrap(), vec![last]);
    }
}
