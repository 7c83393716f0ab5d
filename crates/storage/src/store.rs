use skillsmith_core::{GeneratedPrompt, PersistedRecord, PersistedSession, Result};

/// Durable store for sessions, records and generated prompts.
///
/// Every method is a single unit of work; `add_record_and_increment` bumps
/// the count in place so concurrent finalizations never lose an increment.
pub trait Store: Send + Sync {
    fn add_session(&self, session: &PersistedSession) -> Result<()>;

    fn get_session(&self, id: &str) -> Result<Option<PersistedSession>>;

    /// All sessions, newest first.
    fn list_sessions(&self) -> Result<Vec<PersistedSession>>;

    /// Returns false when the session does not exist.
    fn set_end_time(&self, id: &str, end_time: i64) -> Result<bool>;

    /// Deletes the session and every record it owns. Returns the number of
    /// records removed.
    fn delete_session(&self, id: &str) -> Result<usize>;

    /// Inserts the record and bumps its session's `record_count` in one
    /// transaction. Returns the new count, or `None` (and stores nothing)
    /// when the session no longer exists.
    fn add_record_and_increment(&self, record: &PersistedRecord) -> Result<Option<i64>>;

    fn get_record(&self, id: &str) -> Result<Option<PersistedRecord>>;

    /// Records of one session in capture order.
    fn records_for_session(&self, session_id: &str) -> Result<Vec<PersistedRecord>>;

    fn records_for_sessions(&self, session_ids: &[String]) -> Result<Vec<PersistedRecord>>;

    fn count_records(&self, session_id: &str) -> Result<i64>;

    /// Deletes the given records of a session and lowers its `record_count`
    /// by the number actually removed, never below zero.
    fn delete_records(&self, session_id: &str, record_ids: &[String]) -> Result<usize>;

    /// Returns the assigned id.
    fn add_generated_prompt(&self, prompt: &GeneratedPrompt) -> Result<i64>;

    /// Newest first.
    fn list_generated_prompts(&self) -> Result<Vec<GeneratedPrompt>>;

    fn delete_generated_prompt(&self, id: i64) -> Result<bool>;
}
