//! Triple store table definitions
//!
//! All tables share the `{table_prefix}` of the store. Terms get one id
//! in `id2val`; subjects and objects are mirrored into `s2val`/`o2val`
//! under the same id so the probe joins stay one hop each.

/// Table suffixes, in creation order
pub const TABLES: &[&str] = &["triple", "id2val", "s2val", "o2val", "g2t"];

/// Term type codes stored in `triple.s_type` / `triple.o_type`
pub const TYPE_URI: i64 = 0;
pub const TYPE_BNODE: i64 = 1;
pub const TYPE_LITERAL: i64 = 2;

pub fn create_triple_table(prefix: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}triple (
    t INTEGER PRIMARY KEY AUTOINCREMENT,
    s INTEGER NOT NULL,
    p INTEGER NOT NULL,
    o INTEGER NOT NULL,
    o_lang_dt INTEGER NOT NULL DEFAULT 0,
    s_type INTEGER NOT NULL DEFAULT 0,
    o_type INTEGER NOT NULL DEFAULT 0
)
"#
    )
}

pub fn create_id2val_table(prefix: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}id2val (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    val TEXT NOT NULL UNIQUE
)
"#
    )
}

pub fn create_s2val_table(prefix: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}s2val (
    id INTEGER PRIMARY KEY,
    val TEXT NOT NULL
)
"#
    )
}

pub fn create_o2val_table(prefix: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}o2val (
    id INTEGER PRIMARY KEY,
    val TEXT NOT NULL
)
"#
    )
}

pub fn create_g2t_table(prefix: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}g2t (
    g INTEGER NOT NULL,
    t INTEGER NOT NULL,
    UNIQUE(g, t)
)
"#
    )
}

/// Indexes backing the value lookups and the probe joins
pub fn create_indexes(prefix: &str) -> Vec<String> {
    vec![
        format!("CREATE INDEX IF NOT EXISTS {prefix}idx_triple_spo ON {prefix}triple(s, p, o)"),
        format!("CREATE INDEX IF NOT EXISTS {prefix}idx_s2val_val ON {prefix}s2val(val)"),
        format!("CREATE INDEX IF NOT EXISTS {prefix}idx_o2val_val ON {prefix}o2val(val)"),
        format!("CREATE INDEX IF NOT EXISTS {prefix}idx_g2t_t ON {prefix}g2t(t)"),
    ]
}

/// All schema creation statements
pub fn all_schema_statements(prefix: &str) -> Vec<String> {
    let mut stmts = vec![
        create_triple_table(prefix),
        create_id2val_table(prefix),
        create_s2val_table(prefix),
        create_o2val_table(prefix),
        create_g2t_table(prefix),
    ];
    stmts.extend(create_indexes(prefix));
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_use_prefix() {
        let stmts = all_schema_statements("app_arc_");
        for table in TABLES {
            let name = format!("app_arc_{}", table);
            assert!(stmts.iter().any(|s| s.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", name))));
        }
        assert!(stmts.iter().all(|s| s.contains("app_arc_")));
    }
}
