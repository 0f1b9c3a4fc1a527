use anyhow::{Context, Result};
use duckdb::{params, Connection, OptionalExt};
use std::path::Path;

use crate::models::TableKind;

pub struct Database {
    conn: Connection,
}

/// Linha de `_arquivos`: um arquivo da Receita já carregado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub arquivo: String,
    pub tabela: String,
    pub linhas: u64,
    pub linhas_invalidas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        crate::utils::ensure_parent_dir(path)?;
        let conn = Connection::open(path)
            .with_context(|| format!("Falha ao criar/abrir banco: {}", path.display()))?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Falha ao abrir banco em memória")?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn set_threads(&self, threads: usize) -> Result<()> {
        self.conn
            .execute_batch(&format!("SET threads TO {}", threads.max(1)))?;
        Ok(())
    }

    pub fn create_tables(&self) -> Result<()> {
        for kind in TableKind::ALL {
            let columns: Vec<String> = kind
                .columns()
                .iter()
                .map(|c| format!("{} VARCHAR", c))
                .collect();
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                kind.table_name(),
                columns.join(", ")
            );
            self.conn
                .execute_batch(&sql)
                .with_context(|| format!("Falha ao criar tabela {}", kind.table_name()))?;
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS _arquivos (
                arquivo VARCHAR PRIMARY KEY,
                tabela VARCHAR,
                linhas BIGINT,
                linhas_invalidas BIGINT,
                carregado_em VARCHAR
            );
            CREATE TABLE IF NOT EXISTS _referencia (
                referencia VARCHAR,
                valor VARCHAR
            );
            "#,
        )?;

        Ok(())
    }

    /// Arquivos já registrados em `_arquivos`, em ordem de nome.
    pub fn loaded_files(&self) -> Result<Vec<LoadedFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT arquivo, tabela, linhas, linhas_invalidas FROM _arquivos ORDER BY arquivo",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LoadedFile {
                arquivo: row.get(0)?,
                tabela: row.get(1)?,
                linhas: row.get::<_, i64>(2)? as u64,
                linhas_invalidas: row.get::<_, i64>(3)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn create_index(&self, table: &str, column: &str) -> Result<()> {
        let index_name = format!("idx_{}_{}", table, column);
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            index_name, table, column
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    pub fn count(&self, table: &str) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("Falha ao contar registros de {}", table))?;
        Ok(n as u64)
    }

    pub fn has_rows(&self, table: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(&format!("SELECT 1 FROM {} LIMIT 1", table), [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            params![table],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT column_name, data_type
            FROM information_schema.columns
            WHERE table_name = ?
            ORDER BY ordinal_position
            "#,
        )?;
        let rows = stmt.query_map(params![table], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                data_type: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Índices, tabela `_referencia` e contagens ao fim da carga.
    pub fn finalize_processing(&self, data_referencia: &str) -> Result<()> {
        self.create_index("empresas", "cnpj_basico")?;
        self.create_index("estabelecimentos", "cnpj_basico")?;
        self.create_index("socios", "cnpj_basico")?;
        self.create_index("simples", "cnpj_basico")?;

        let qtde_cnpjs = self.count("estabelecimentos")?;

        self.conn.execute_batch("DELETE FROM _referencia")?;
        self.conn.execute(
            "INSERT INTO _referencia (referencia, valor) VALUES ('CNPJ', ?)",
            params![data_referencia],
        )?;
        self.conn.execute(
            "INSERT INTO _referencia (referencia, valor) VALUES ('cnpj_qtde', ?)",
            params![qtde_cnpjs.to_string()],
        )?;

        Ok(())
    }

    pub fn reference(&self, referencia: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT valor FROM _referencia WHERE referencia = ?",
                params![referencia],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn get_connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}
