//! Block-based notes store.
//!
//! Notes hold metadata; their content is an ordered list of typed blocks.
//! Both live behind one [`StorageBackend`] chosen at start-up from
//! [`StoreConfig`].

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod logging;
pub mod markup;
pub mod model;
pub mod storage;
pub mod store;

pub use config::{BackendKind, ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use markup::{
    block_to_markup, blocks_to_markup, blocks_to_text, escape_markup, parse_text_to_blocks,
};
pub use model::block::{Block, BlockId, BlockPatch, BlockProperties, BlockType, NewBlock};
pub use model::note::{NewNote, Note, NoteId, NotePatch, NoteStats};
pub use model::{parse_input, ValidationError};
pub use storage::{
    open_backend, Collection, FlatMapBackend, IndexedBackend, StorageBackend, StorageError,
    StorageResult, WriteOp,
};
pub use store::{BlockStore, NoteStore, StoreError, StoreResult};

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Note and block stores sharing one backend.
#[derive(Clone)]
pub struct Notebook {
    pub notes: NoteStore,
    pub blocks: BlockStore,
}

impl Notebook {
    /// Opens the configured backend and wires both stores to it.
    pub fn open(config: &StoreConfig) -> StorageResult<Self> {
        Ok(Self::with_backend(open_backend(config)?))
    }

    /// Wires both stores to an already opened backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            notes: NoteStore::new(backend.clone()),
            blocks: BlockStore::new(backend),
        }
    }
}
