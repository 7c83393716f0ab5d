pub mod export;
pub mod sqlite;
pub mod store;

pub use export::{
    domain_key, export_session_jsonl, export_session_to_file, group_by_domain, UNKNOWN_DOMAIN,
};
pub use sqlite::SqliteStore;
pub use store::Store;
