pub mod db;
pub mod run_store;

pub use db::RunDb;
pub use run_store::{
    MemoryRunStore, RunRecord, RunStatus, RunStatusUpdate, RunStore, SqliteRunStore,
};
