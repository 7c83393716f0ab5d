use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".skillsmith"))
            .unwrap_or_else(|| PathBuf::from(".skillsmith"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn database(&self) -> PathBuf {
        self.base.join("skillsmith.db")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.base.join("exports")
    }

    /// Default JSONL export location for a session.
    pub fn session_export(&self, session_id: &str) -> PathBuf {
        let safe_id = session_id.replace([':', '/', '\\'], "_");
        self.exports_dir().join(format!("session-{}.jsonl", safe_id))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.exports_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_export_sanitizes_id() {
        let paths = Paths::with_base(PathBuf::from("/tmp/ss"));
        let path = paths.session_export("a/b:c");
        assert_eq!(path, PathBuf::from("/tmp/ss/exports/session-a_b_c.jsonl"));
    }
}
