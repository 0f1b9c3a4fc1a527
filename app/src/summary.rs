use anyhow::{Context, Result};
use duckdb::params_from_iter;
use serde::Serialize;
use std::time::Instant;

use crate::database::Database;
use crate::error::CnpjError;
use crate::models;
use crate::query::{self, ExportFilter};
use crate::ui;
use crate::utils;

#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    pub uf: Option<String>,
    pub mei: bool,
    pub situacao: Vec<u8>,
    pub incluir_filiais: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SituacaoCount {
    pub codigo: Option<i32>,
    pub descricao: String,
    pub registros: u64,
    pub cnpjs_distintos: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_cnpjs: u64,
    pub por_situacao: Vec<SituacaoCount>,
}

fn where_clause(filter: &SummaryFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    if let Some(uf) = filter.uf.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        clauses.push("UPPER(est.uf) = ?".to_string());
        params.push(uf.to_uppercase());
    }
    if filter.mei {
        clauses.push("UPPER(COALESCE(sim.opcao_mei, 'N')) = 'S'".to_string());
    }
    if !filter.situacao.is_empty() {
        clauses.push(query::in_list("est.situacao_cadastral", &filter.situacao));
    }
    if !filter.incluir_filiais {
        clauses.push("TRY_CAST(est.identificador_matriz_filial AS INTEGER) = 1".to_string());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

pub fn situacao_summary(db: &Database, filter: &SummaryFilter) -> Result<Summary> {
    // mesmas regras de UF e situação da exportação
    ExportFilter {
        uf: filter.uf.clone(),
        situacao: filter.situacao.clone(),
        ..ExportFilter::default()
    }
    .validate()?;

    let mut missing = Vec::new();
    if !db.has_rows("estabelecimentos")? {
        missing.push("estabelecimentos".to_string());
    }
    if filter.mei && !db.has_rows("simples")? {
        missing.push("simples".to_string());
    }
    if !missing.is_empty() {
        return Err(CnpjError::MissingTables(missing).into());
    }

    let (where_sql, params) = where_clause(filter);
    let from_where = format!(
        "FROM estabelecimentos est LEFT JOIN simples sim ON sim.cnpj_basico = est.cnpj_basico {}",
        where_sql
    );
    let conn = db.get_connection();

    let total: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(DISTINCT (est.cnpj_basico || est.cnpj_ordem || est.cnpj_dv)) {}",
                from_where
            ),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )
        .context("Falha ao contar CNPJs")?;

    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT
            TRY_CAST(est.situacao_cadastral AS INTEGER) AS codigo,
            COUNT(*) AS registros,
            COUNT(DISTINCT (est.cnpj_basico || est.cnpj_ordem || est.cnpj_dv)) AS cnpjs_distintos
        {}
        GROUP BY 1
        ORDER BY registros DESC, codigo
        "#,
        from_where
    ))?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        let codigo: Option<i32> = row.get(0)?;
        Ok(SituacaoCount {
            codigo,
            descricao: match codigo {
                Some(c) => models::situacao_label(&c.to_string()).to_string(),
                None => "(DESCONHECIDA)".to_string(),
            },
            registros: row.get::<_, i64>(1)? as u64,
            cnpjs_distintos: row.get::<_, i64>(2)? as u64,
        })
    })?;

    Ok(Summary {
        total_cnpjs: total as u64,
        por_situacao: rows.collect::<Result<Vec<_>, _>>()?,
    })
}

pub fn run(db: &Database, filter: &SummaryFilter) -> Result<Summary> {
    let start = Instant::now();
    ui::print_header("📊 Situação cadastral");

    let situacoes = if filter.situacao.is_empty() {
        "(todas)".to_string()
    } else {
        filter
            .situacao
            .iter()
            .map(|c| format!("{}={}", c, models::situacao_label(&c.to_string())))
            .collect::<Vec<_>>()
            .join(", ")
    };
    ui::print_field("UF", filter.uf.as_deref().unwrap_or("(todas)"));
    ui::print_field("Situações", &situacoes);
    ui::print_field("Somente MEI", if filter.mei { "sim" } else { "não" });
    ui::print_field(
        "Estabelecimentos",
        if filter.incluir_filiais {
            "matriz + filiais"
        } else {
            "somente matriz"
        },
    );

    let summary = situacao_summary(db, filter)?;

    ui::print_success(&format!(
        "CNPJs distintos: {}",
        utils::format_thousands(summary.total_cnpjs)
    ));
    for item in &summary.por_situacao {
        let codigo = item
            .codigo
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        ui::print_field(
            &format!("{:>2} - {}", codigo, item.descricao),
            &format!(
                "registros={}  cnpjs={}",
                utils::format_thousands(item.registros),
                utils::format_thousands(item.cnpjs_distintos)
            ),
        );
    }
    ui::print_info(&format!(
        "Tempo decorrido: {} (mm:ss)",
        utils::format_elapsed(start.elapsed())
    ));
    Ok(summary)
}
