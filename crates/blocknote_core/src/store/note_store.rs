//! Note collection: metadata CRUD and cascade delete.
//!
//! # Invariants
//! - Listings are sorted by `lastModified DESC, id ASC`.
//! - `delete_note` removes the note and all of its blocks in one batch.

use super::{decode, decode_all, encode, StoreError, StoreResult};
use crate::model::block::Block;
use crate::model::note::{NewNote, Note, NoteId, NotePatch, NoteStats};
use crate::model::now_epoch_ms;
use crate::storage::{Collection, StorageBackend, WriteOp};
use log::{error, info};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Note metadata store.
#[derive(Clone)]
pub struct NoteStore {
    backend: Arc<dyn StorageBackend>,
}

impl NoteStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Creates an empty note. Missing fields take their defaults.
    pub fn create_note(&self, input: NewNote) -> StoreResult<Note> {
        let note = Note::create(input, now_epoch_ms())?;
        self.backend.put(Collection::Notes, encode(&note)?)?;
        info!(
            "event=note_create module=store status=ok backend={} note_id={}",
            self.backend.name(),
            note.id
        );
        Ok(note)
    }

    pub fn get_note(&self, id: NoteId) -> StoreResult<Option<Note>> {
        self.backend
            .get(Collection::Notes, &id.to_string())?
            .map(|value| decode(Collection::Notes, value))
            .transpose()
    }

    /// All notes, most recently modified first. Empty store yields an empty list.
    pub fn list_notes(&self) -> StoreResult<Vec<Note>> {
        let notes = decode_all(Collection::Notes, self.backend.get_all(Collection::Notes)?)?;
        Ok(sort_recent_first(notes))
    }

    /// Notes of one category through the `category` index.
    pub fn list_notes_by_category(&self, category: &str) -> StoreResult<Vec<Note>> {
        let values = self.backend.get_by_index(
            Collection::Notes,
            "category",
            &Value::String(category.to_string()),
        )?;
        Ok(sort_recent_first(decode_all(Collection::Notes, values)?))
    }

    /// Distinct tags across all notes, sorted.
    pub fn list_tags(&self) -> StoreResult<Vec<String>> {
        let notes: Vec<Note> =
            decode_all(Collection::Notes, self.backend.get_all(Collection::Notes)?)?;
        let tags = notes
            .into_iter()
            .flat_map(|note| note.tags)
            .collect::<BTreeSet<_>>();
        Ok(tags.into_iter().collect())
    }

    /// Merges `patch` into the stored note and refreshes `lastModified`.
    pub fn update_note(&self, id: NoteId, patch: NotePatch) -> StoreResult<Note> {
        let mut note = self.require(id)?;
        note.apply_patch(patch, now_epoch_ms())?;
        self.backend.put(Collection::Notes, encode(&note)?)?;
        info!(
            "event=note_update module=store status=ok backend={} note_id={}",
            self.backend.name(),
            id
        );
        Ok(note)
    }

    /// Caches word/char counts and preview computed from `blocks`.
    ///
    /// Callers pass the note's blocks in display order, typically straight
    /// from `BlockStore::get_blocks_for_note`.
    pub fn save_stats(&self, id: NoteId, blocks: &[Block]) -> StoreResult<Note> {
        let mut note = self.require(id)?;
        note.apply_stats(NoteStats::from_blocks(blocks), now_epoch_ms());
        self.backend.put(Collection::Notes, encode(&note)?)?;
        info!(
            "event=note_stats_save module=store status=ok note_id={} blocks={} words={}",
            id,
            blocks.len(),
            note.word_count
        );
        Ok(note)
    }

    /// Deletes the note and every block pointing at it.
    ///
    /// Deleting an unknown id is a no-op. Blocks go first, so a partial
    /// flat-map write never leaves blocks behind a deleted note.
    pub fn delete_note(&self, id: NoteId) -> StoreResult<()> {
        let id_text = id.to_string();
        let ops = [
            WriteOp::DeleteWhere {
                collection: Collection::Blocks,
                index: "noteId".to_string(),
                value: Value::String(id_text.clone()),
            },
            WriteOp::Delete {
                collection: Collection::Notes,
                id: id_text,
            },
        ];

        match self.backend.apply(&ops) {
            Ok(()) => {
                info!(
                    "event=note_delete module=store status=ok backend={} note_id={}",
                    self.backend.name(),
                    id
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=note_delete module=store status=error backend={} note_id={} error={}",
                    self.backend.name(),
                    id,
                    err
                );
                Err(err.into())
            }
        }
    }

    fn require(&self, id: NoteId) -> StoreResult<Note> {
        self.get_note(id)?.ok_or(StoreError::NotFound {
            collection: Collection::Notes,
            id,
        })
    }
}

fn sort_recent_first(mut notes: Vec<Note>) -> Vec<Note> {
    notes.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.id.cmp(&b.id))
    });
    notes
}
