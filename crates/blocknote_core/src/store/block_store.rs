//! Block collection scoped by note.
//!
//! # Invariants
//! - `get_blocks_for_note` sorts by `order` with a stable sort, so equal
//!   orders keep insertion order.
//! - `create_block` trusts the caller's `note_id`; it is not looked up.
//! - `reorder_blocks` validates every id before writing and writes all new
//!   orders in one batch.

use super::{decode, decode_all, encode, StoreError, StoreResult};
use crate::markup::parse_text_to_blocks;
use crate::model::block::{Block, BlockId, BlockPatch, NewBlock};
use crate::model::note::NoteId;
use crate::model::{now_epoch_ms, ValidationError};
use crate::storage::{Collection, StorageBackend, WriteOp};
use log::{error, info};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Block content store.
#[derive(Clone)]
pub struct BlockStore {
    backend: Arc<dyn StorageBackend>,
}

impl BlockStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Stores a new block under `note_id` at the caller-supplied `order`.
    pub fn create_block(&self, note_id: NoteId, input: NewBlock) -> StoreResult<Block> {
        let block = Block::create(note_id, input, now_epoch_ms())?;
        self.backend.put(Collection::Blocks, encode(&block)?)?;
        info!(
            "event=block_create module=store status=ok note_id={} block_id={} type={}",
            note_id,
            block.id,
            block.kind.as_str()
        );
        Ok(block)
    }

    pub fn get_block(&self, id: BlockId) -> StoreResult<Option<Block>> {
        self.backend
            .get(Collection::Blocks, &id.to_string())?
            .map(|value| decode(Collection::Blocks, value))
            .transpose()
    }

    /// Blocks of one note in ascending `order`.
    pub fn get_blocks_for_note(&self, note_id: NoteId) -> StoreResult<Vec<Block>> {
        let values = self.backend.get_by_index(
            Collection::Blocks,
            "noteId",
            &Value::String(note_id.to_string()),
        )?;
        let mut blocks: Vec<Block> = decode_all(Collection::Blocks, values)?;
        blocks.sort_by_key(|block| block.order);
        Ok(blocks)
    }

    /// Merges `patch` into the stored block. Missing ids are `NotFound` and
    /// nothing is written.
    pub fn update_block(&self, id: BlockId, patch: BlockPatch) -> StoreResult<Block> {
        let mut block = self.require(id)?;
        block.apply_patch(patch, now_epoch_ms())?;
        self.backend.put(Collection::Blocks, encode(&block)?)?;
        info!("event=block_update module=store status=ok block_id={}", id);
        Ok(block)
    }

    /// Removes one block; unknown ids are a no-op.
    pub fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        self.backend.delete(Collection::Blocks, &id.to_string())?;
        info!("event=block_delete module=store status=ok block_id={}", id);
        Ok(())
    }

    /// Sets each listed block's `order` to its position in `ordered_ids`.
    ///
    /// Every id must exist and belong to `note_id`, and may appear once.
    /// Blocks of the note that are not listed keep their order.
    pub fn reorder_blocks(&self, note_id: NoteId, ordered_ids: &[BlockId]) -> StoreResult<()> {
        let mut seen = HashSet::with_capacity(ordered_ids.len());
        let now = now_epoch_ms();
        let mut ops = Vec::with_capacity(ordered_ids.len());

        for (position, id) in ordered_ids.iter().enumerate() {
            if !seen.insert(*id) {
                return Err(ValidationError::DuplicateBlock(*id).into());
            }
            let mut block = self.require(*id)?;
            if block.note_id != note_id {
                return Err(ValidationError::BlockOutsideNote {
                    block_id: *id,
                    note_id,
                }
                .into());
            }
            block.apply_patch(BlockPatch::order(position as i64), now)?;
            ops.push(WriteOp::Put {
                collection: Collection::Blocks,
                record: encode(&block)?,
            });
        }

        if let Err(err) = self.backend.apply(&ops) {
            error!(
                "event=block_reorder module=store status=error backend={} note_id={} blocks={} error={}",
                self.backend.name(),
                note_id,
                ops.len(),
                err
            );
            return Err(err.into());
        }

        info!(
            "event=block_reorder module=store status=ok backend={} note_id={} blocks={}",
            self.backend.name(),
            note_id,
            ops.len()
        );
        Ok(())
    }

    /// Parses `text` and appends the resulting blocks after the note's
    /// current last block, in one batch.
    ///
    /// Fails with `OrderOverflow` and writes nothing when the new orders
    /// would not fit in `i64`.
    pub fn import_text(&self, note_id: NoteId, text: &str) -> StoreResult<Vec<Block>> {
        let overflow = || ValidationError::OrderOverflow { note_id };
        let base = match self.get_blocks_for_note(note_id)?.last() {
            Some(block) => block.order.checked_add(1).ok_or_else(overflow)?,
            None => 0,
        };
        let now = now_epoch_ms();

        let blocks = parse_text_to_blocks(text)
            .into_iter()
            .map(|parsed| {
                let order = base.checked_add(parsed.order).ok_or_else(overflow)?;
                Block::create(note_id, parsed.with_order(order), now)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ops = blocks
            .iter()
            .map(|block| {
                Ok(WriteOp::Put {
                    collection: Collection::Blocks,
                    record: encode(block)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        self.backend.apply(&ops)?;

        info!(
            "event=block_import module=store status=ok note_id={} blocks={}",
            note_id,
            blocks.len()
        );
        Ok(blocks)
    }

    fn require(&self, id: BlockId) -> StoreResult<Block> {
        self.get_block(id)?.ok_or(StoreError::NotFound {
            collection: Collection::Blocks,
            id,
        })
    }
}
