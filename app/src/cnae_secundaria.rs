use anyhow::{Context, Result};
use chrono::Local;

use crate::database::Database;
use crate::error::CnpjError;
use crate::ui;
use crate::utils;

/// Recria `cnae_secundaria(cnpj, cnae_fiscal_secundaria)`: uma linha por CNAE
/// secundário de cada estabelecimento.
pub fn create_cnae_secundaria_table(db: &Database) -> Result<u64> {
    if !db.has_rows("estabelecimentos")? {
        return Err(CnpjError::MissingTables(vec!["estabelecimentos".to_string()]).into());
    }

    let conn = db.get_connection();
    conn.execute_batch(
        r#"
        CREATE OR REPLACE TABLE cnae_secundaria AS
        SELECT cnpj, trim(cnae) AS cnae_fiscal_secundaria
        FROM (
            SELECT
                est.cnpj_basico || est.cnpj_ordem || est.cnpj_dv AS cnpj,
                unnest(string_split(est.cnae_fiscal_secundaria, ',')) AS cnae
            FROM estabelecimentos est
            WHERE est.cnae_fiscal_secundaria IS NOT NULL
              AND est.cnae_fiscal_secundaria <> ''
        )
        WHERE trim(cnae) <> ''
        "#,
    )
    .context("Falha ao criar tabela cnae_secundaria")?;

    db.create_index("cnae_secundaria", "cnpj")?;
    db.create_index("cnae_secundaria", "cnae_fiscal_secundaria")?;

    db.count("cnae_secundaria")
}

pub fn run(db: &Database) -> Result<()> {
    ui::print_header("📋 Tabela de CNAEs secundários");
    ui::print_info(&format!(
        "Hora de início: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    let total = create_cnae_secundaria_table(db)?;

    ui::print_info(&format!(
        "Hora de término: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    ui::print_success(&format!(
        "Tabela cnae_secundaria criada com {} registro(s)",
        utils::format_thousands(total)
    ));
    Ok(())
}
