use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    CreateTable,
    CreateIndex,
    AlterTable,
    Insert,
    Update,
    Delete,
    Select,
    Unknown,
}

impl StatementType {
    /// Classifies a statement by its leading keywords. A `CREATE TABLE`
    /// anywhere in the text wins, so scripts that mix DDL with data loads
    /// are treated as DDL.
    pub fn detect(sql: &str) -> Self {
        let normalized = WHITESPACE.replace_all(sql.trim(), " ").to_uppercase();

        if normalized.contains("CREATE TABLE") {
            StatementType::CreateTable
        } else if normalized.starts_with("CREATE INDEX")
            || normalized.starts_with("CREATE UNIQUE INDEX")
        {
            StatementType::CreateIndex
        } else if normalized.starts_with("ALTER TABLE") {
            StatementType::AlterTable
        } else if normalized.starts_with("INSERT") {
            StatementType::Insert
        } else if normalized.starts_with("UPDATE") {
            StatementType::Update
        } else if normalized.starts_with("DELETE") {
            StatementType::Delete
        } else if normalized.starts_with("SELECT") || normalized.starts_with("WITH") {
            StatementType::Select
        } else {
            StatementType::Unknown
        }
    }

    /// Completion budget for the optimizer; DDL and SELECT rewrites come with
    /// longer explanations.
    pub fn optimizer_max_tokens(self) -> u32 {
        match self {
            StatementType::CreateTable
            | StatementType::AlterTable
            | StatementType::CreateIndex
            | StatementType::Select => 1500,
            _ => 1000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatementType::CreateTable => "CREATE TABLE",
            StatementType::CreateIndex => "CREATE INDEX",
            StatementType::AlterTable => "ALTER TABLE",
            StatementType::Insert => "INSERT",
            StatementType::Update => "UPDATE",
            StatementType::Delete => "DELETE",
            StatementType::Select => "SELECT",
            StatementType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
