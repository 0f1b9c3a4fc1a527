use anyhow::{Context, Result};
use duckdb::Connection;

use crate::database::Database;
use crate::ui;
use crate::utils;

/// CNPJ completo, CPF e CNPJ básico, formatados ou só dígitos. Os mais longos
/// vêm antes para que 14 dígitos não sejam lidos como CPF.
const DOCUMENTO: &str = concat!(
    r"\d{2}[.\s]?\d{3}[.\s]?\d{3}[\/\s]?\d{4}[-\s]?\d{2}|\d{14}|",
    r"\d{3}[.\s]?\d{3}[.\s]?\d{3}[-\s]?\d{2}|\d{11}|",
    r"\d{2}[.\s]?\d{3}[.\s]?\d{3}|\d{8}"
);

/// Colunas de nome tratadas por `clean-names`.
pub const NAME_COLUMNS: [(&str, &str); 4] = [
    ("empresas", "razao_social"),
    ("estabelecimentos", "nome_fantasia"),
    ("socios", "nome_socio_ou_razao_social"),
    ("socios", "nome_representante"),
];

fn macro_sql() -> String {
    format!(
        r#"
        CREATE OR REPLACE TEMP MACRO clean_name(x) AS
        trim(
          regexp_replace(
            regexp_replace(
              regexp_replace(
                regexp_replace(
                  regexp_replace(
                    coalesce(x, ''),
                    '^(?:\s*[\(\[\-]*\s*(?:{doc})\s*[\)\]\-,:|]*\s*)+', ''
                  ),
                  '(?:\s*[\(\[\-,:|]*\s*(?:{doc})\s*[\)\]\-]*\s*)+$', ''
                ),
                '^\s*[\-\(\)\[\]\.,:|]+\s*', ''
              ),
              '\s*[\-\(\)\[\]\.,:|]+\s*$', ''
            ),
            '\s+', ' ', 'g'
          )
        )
        "#,
        doc = DOCUMENTO
    )
}

/// Registra a macro `clean_name(x)` na conexão.
pub fn install_macro(conn: &Connection) -> Result<()> {
    conn.execute_batch(&macro_sql())
        .context("Falha ao criar macro clean_name")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub changed: u64,
}

/// Remove CPF/CNPJ no início e no fim dos nomes. Nomes que ficam vazios viram NULL.
pub fn clean_names(db: &Database) -> Result<Vec<CleanedColumn>> {
    let conn = db.get_connection();
    install_macro(conn)?;

    let mut result = Vec::with_capacity(NAME_COLUMNS.len());
    for (table, column) in NAME_COLUMNS {
        let sql = format!(
            "UPDATE {t} SET {c} = NULLIF(clean_name({c}), '') \
             WHERE {c} IS NOT NULL AND clean_name({c}) <> {c}",
            t = table,
            c = column
        );
        let changed = conn
            .execute(&sql, [])
            .with_context(|| format!("Falha ao limpar {}.{}", table, column))?;
        tracing::debug!(table, column, changed, "nomes limpos");
        result.push(CleanedColumn {
            table,
            column,
            changed: changed as u64,
        });
    }
    Ok(result)
}

pub fn run(db: &Database, auto_yes: bool) -> Result<()> {
    ui::print_header("🧹 Limpeza de CPF/CNPJ nos nomes");
    ui::print_warning("Os nomes serão alterados no próprio banco.");
    if !auto_yes && !ui::ask_confirmation_yes("Deseja continuar?")? {
        ui::print_info("Operação cancelada pelo usuário.");
        return Ok(());
    }

    let cleaned = clean_names(db)?;
    for item in &cleaned {
        ui::print_field(
            &format!("{}.{}", item.table, item.column),
            &format!("{} alterado(s)", utils::format_thousands(item.changed)),
        );
    }
    ui::print_success("Limpeza concluída!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::params;

    fn clean(conn: &Connection, value: &str) -> Result<Option<String>> {
        Ok(conn.query_row("SELECT NULLIF(clean_name(?), '')", params![value], |row| {
            row.get(0)
        })?)
    }

    #[test]
    fn strips_documents_at_edges() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.get_connection();
        install_macro(conn)?;

        let cases = [
            ("12.345.678/0001-90 PADARIA DO ZE", "PADARIA DO ZE"),
            ("12345678000190 PADARIA DO ZE", "PADARIA DO ZE"),
            ("PADARIA DO ZE 12345678901", "PADARIA DO ZE"),
            ("MARIA DA SILVA - 123.456.789-01", "MARIA DA SILVA"),
            ("12.345.678 MARIA DA SILVA", "MARIA DA SILVA"),
            ("  ALFA   BETA  ", "ALFA BETA"),
            ("CONDOMINIO 12345678 EDIFICIO", "CONDOMINIO 12345678 EDIFICIO"),
        ];
        for (input, expected) in cases {
            assert_eq!(clean(conn, input)?.as_deref(), Some(expected), "{input}");
        }
        assert_eq!(clean(conn, "12345678901")?, None);
        Ok(())
    }

    #[test]
    fn updates_only_changed_names() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.get_connection().execute_batch(
            r#"
            INSERT INTO empresas (cnpj_basico, razao_social) VALUES
                ('12345678', '12.345.678 JOAO DA SILVA'),
                ('87654321', 'ALFA LTDA'),
                ('11111111', NULL);
            INSERT INTO socios (cnpj_basico, nome_socio_ou_razao_social, nome_representante) VALUES
                ('12345678', 'JOAO DA SILVA 12345678901', NULL);
            "#,
        )?;

        let cleaned = clean_names(&db)?;
        let changed: Vec<u64> = cleaned.iter().map(|c| c.changed).collect();
        assert_eq!(changed, vec![1, 0, 1, 0]);

        let nome: String = db.get_connection().query_row(
            "SELECT razao_social FROM empresas WHERE cnpj_basico = '12345678'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(nome, "JOAO DA SILVA");
        let nulls: i64 = db.get_connection().query_row(
            "SELECT COUNT(*) FROM empresas WHERE razao_social IS NULL",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(nulls, 1);
        Ok(())
    }
}
