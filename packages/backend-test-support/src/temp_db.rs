use std::path::PathBuf;

use tempfile::TempDir;

/// A SQLite database file in a private temporary directory, removed on drop.
pub struct TempSqlite {
    dir: TempDir,
    name: String,
}

impl TempSqlite {
    pub fn new() -> std::io::Result<Self> {
        Self::named("saucebottle-test.db")
    }

    pub fn named(name: &str) -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            name: name.to_owned(),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join(&self.name)
    }

    /// sqlx connection URL; the file is created on first connect.
    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_points_into_private_dir() {
        let db = TempSqlite::named("x.db").unwrap();
        // Temp dirs are absolute, so the URL carries three slashes.
        assert!(db.path().is_absolute());
        assert!(db.url().starts_with("sqlite:///"));
        assert!(db.url().ends_with("x.db?mode=rwc"));
        assert!(db.path().starts_with(db.dir.path()));
    }
}
