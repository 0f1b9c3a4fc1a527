use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::database::{ColumnInfo, Database};
use crate::error::CnpjError;
use crate::models::TableKind;
use crate::ui;
use crate::utils;

const CNAE_SECUNDARIA: &str = "cnae_secundaria";

/// Tabelas pedidas pelo usuário, ou todas as da Receita (mais `cnae_secundaria`
/// quando existir) se a lista vier vazia.
pub fn resolve_tables(db: &Database, names: &[String]) -> Result<Vec<String>> {
    if names.is_empty() {
        let mut tables: Vec<String> = TableKind::ALL
            .iter()
            .map(|k| k.table_name().to_string())
            .collect();
        if db.table_exists(CNAE_SECUNDARIA)? {
            tables.push(CNAE_SECUNDARIA.to_string());
        }
        return Ok(tables);
    }

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let table = match TableKind::from_table_name(name) {
            Some(kind) => kind.table_name().to_string(),
            None => {
                let wanted = name.trim().to_lowercase();
                if wanted != CNAE_SECUNDARIA || !db.table_exists(CNAE_SECUNDARIA)? {
                    return Err(
                        CnpjError::InvalidFilter(format!("tabela desconhecida: {}", wanted)).into(),
                    );
                }
                wanted
            }
        };
        tables.push(table);
    }
    Ok(tables)
}

pub fn list_columns(db: &Database, names: &[String]) -> Result<Vec<(String, Vec<ColumnInfo>)>> {
    resolve_tables(db, names)?
        .into_iter()
        .map(|table| -> Result<(String, Vec<ColumnInfo>)> {
            let columns = db.describe_table(&table)?;
            Ok((table, columns))
        })
        .collect()
}

pub fn print_columns(db: &Database, names: &[String]) -> Result<()> {
    for (table, columns) in list_columns(db, names)? {
        ui::print_header(&format!("{} ({} colunas)", table, columns.len()));
        if ui::is_quiet() {
            continue;
        }
        for col in columns {
            println!("  {:<36} {}", col.name, col.data_type.dimmed());
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetFile {
    pub table: &'static str,
    pub path: PathBuf,
    pub rows: u64,
}

/// Um Parquet ZSTD por tabela com dados (`Empresas.parquet`, ...).
pub fn export_parquet(db: &Database, dir: &Path) -> Result<Vec<ParquetFile>> {
    utils::ensure_dir(dir)?;
    let conn = db.get_connection();

    let mut written = Vec::new();
    for kind in TableKind::ALL {
        let table = kind.table_name();
        let rows = db.count(table)?;
        if rows == 0 {
            ui::print_verbose(&format!("{} vazia, pulando", table));
            continue;
        }

        let path = dir.join(format!("{}.parquet", kind.dataset_name()));
        let sql = format!(
            "COPY {} TO {} (FORMAT PARQUET, COMPRESSION ZSTD)",
            table,
            utils::sql_literal(&path.to_string_lossy())
        );
        conn.execute_batch(&sql)
            .with_context(|| format!("Falha ao exportar {} para Parquet", table))?;

        ui::print_success(&format!(
            "{} → {} ({} linhas)",
            table,
            path.display(),
            utils::format_thousands(rows)
        ));
        written.push(ParquetFile {
            table,
            path,
            rows,
        });
    }

    if written.is_empty() {
        ui::print_warning("Nenhuma tabela com dados para exportar.");
    }
    Ok(written)
}
