//! Keyword tables for statement and clause boundaries.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Create,
    Alter,
    Drop,
    Truncate,
    Declare,
    Set,
    Execute,
    Use,
    Print,
    Transaction,
    ControlFlow,
    Security,
    /// `WITH` prelude; resolves to the statement that follows the CTEs
    Cte,
    /// A lone `;`
    Empty,
    Unknown,
}

impl StatementKind {
    pub(super) fn rule_name(self) -> &'static str {
        match self {
            StatementKind::Select | StatementKind::Cte => "select_statement",
            StatementKind::Insert => "insert_statement",
            StatementKind::Update => "update_statement",
            StatementKind::Delete => "delete_statement",
            StatementKind::Merge => "merge_statement",
            StatementKind::Create => "create_statement",
            StatementKind::Alter => "alter_statement",
            StatementKind::Drop => "drop_statement",
            StatementKind::Truncate => "truncate_statement",
            StatementKind::Declare => "declare_statement",
            StatementKind::Set => "set_statement",
            StatementKind::Execute => "execute_statement",
            StatementKind::Use => "use_statement",
            StatementKind::Print => "print_statement",
            StatementKind::Transaction => "transaction_statement",
            StatementKind::ControlFlow => "control_flow_statement",
            StatementKind::Security => "security_statement",
            StatementKind::Empty => "empty_statement",
            StatementKind::Unknown => "unknown_statement",
        }
    }

    /// DML statements are split into clauses
    pub(super) fn has_clauses(self) -> bool {
        matches!(
            self,
            StatementKind::Select
                | StatementKind::Insert
                | StatementKind::Update
                | StatementKind::Delete
                | StatementKind::Merge
        )
    }

    /// Statements a CTE list may introduce
    pub(super) fn follows_cte(self) -> bool {
        self.has_clauses()
    }

    /// Whether a statement-starting `word` belongs to the current statement.
    pub(super) fn continues_with(self, word: &str, prev_word: Option<&str>) -> bool {
        let after_set_operator = matches!(prev_word, Some("UNION" | "ALL" | "EXCEPT" | "INTERSECT"));
        match self {
            // bodies run until `;` or GO
            StatementKind::Create
            | StatementKind::Alter
            | StatementKind::Merge
            | StatementKind::Security => true,
            StatementKind::Select => word == "SELECT" && after_set_operator,
            StatementKind::Insert => matches!(word, "SELECT" | "EXEC" | "EXECUTE"),
            StatementKind::Update => word == "SET",
            StatementKind::Declare => word == "SELECT" && prev_word == Some("FOR"),
            _ => false,
        }
    }
}

/// Kind of statement `word` opens, if any.
///
/// `ELSE` and `END` only start statements outside a `CASE` expression, and
/// `WITH` only when a CTE name follows it (not a table hint list).
pub(super) fn statement_starter(
    word: &str,
    next_word: Option<&str>,
    next_is_word: bool,
    case_depth: usize,
) -> Option<StatementKind> {
    let kind = match word {
        "SELECT" => StatementKind::Select,
        "INSERT" => StatementKind::Insert,
        "UPDATE" => StatementKind::Update,
        "DELETE" => StatementKind::Delete,
        "MERGE" => StatementKind::Merge,
        "CREATE" => StatementKind::Create,
        "ALTER" => StatementKind::Alter,
        "DROP" => StatementKind::Drop,
        "TRUNCATE" => StatementKind::Truncate,
        "DECLARE" => StatementKind::Declare,
        "SET" => StatementKind::Set,
        "EXEC" | "EXECUTE" => StatementKind::Execute,
        "USE" => StatementKind::Use,
        "PRINT" => StatementKind::Print,
        "COMMIT" | "ROLLBACK" | "SAVE" => StatementKind::Transaction,
        "BEGIN" => match next_word {
            Some("TRAN" | "TRANSACTION" | "DISTRIBUTED") => StatementKind::Transaction,
            _ => StatementKind::ControlFlow,
        },
        "ELSE" | "END" if case_depth > 0 => return None,
        "IF" | "WHILE" | "ELSE" | "END" | "RETURN" | "BREAK" | "CONTINUE" | "GOTO" | "RAISERROR"
        | "THROW" | "WAITFOR" => StatementKind::ControlFlow,
        "GRANT" | "REVOKE" | "DENY" => StatementKind::Security,
        "WITH" if next_is_word => StatementKind::Cte,
        _ => return None,
    };
    Some(kind)
}

/// Clause opened by `word` inside a statement of `kind`, with the number of
/// items its keyword spans.
pub(super) fn clause_starter(
    kind: StatementKind,
    word: &str,
    next_word: Option<&str>,
    at_start: bool,
) -> Option<(String, usize)> {
    if matches!(word, "GROUP" | "ORDER") && next_word == Some("BY") {
        let allowed = matches!(kind, StatementKind::Select | StatementKind::Insert);
        return allowed.then(|| (format!("{}_by_clause", word.to_ascii_lowercase()), 2));
    }
    if word == "WITH" {
        return (at_start && kind.has_clauses()).then(|| ("with_clause".to_string(), 1));
    }

    let keywords: &[&str] = match kind {
        StatementKind::Select => &[
            "SELECT", "INTO", "FROM", "WHERE", "HAVING", "UNION", "EXCEPT", "INTERSECT", "OPTION",
        ],
        StatementKind::Insert => &[
            "INSERT", "VALUES", "SELECT", "FROM", "WHERE", "HAVING", "OUTPUT", "EXEC", "EXECUTE",
            "UNION", "EXCEPT", "INTERSECT", "OPTION",
        ],
        StatementKind::Update => &["UPDATE", "SET", "FROM", "WHERE", "OUTPUT", "OPTION"],
        StatementKind::Delete => &["DELETE", "FROM", "WHERE", "OUTPUT", "OPTION"],
        StatementKind::Merge => &["MERGE", "USING", "ON", "WHEN", "OUTPUT", "OPTION"],
        _ => &[],
    };
    keywords
        .contains(&word)
        .then(|| (format!("{}_clause", word.to_ascii_lowercase()), 1))
}
