use anyhow::{Context, Result};
use duckdb::params_from_iter;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{CSV_DELIMITER, UTF8_BOM};
use crate::database::Database;
use crate::error::CnpjError;
use crate::ui;
use crate::utils;

pub const DEFAULT_OUTPUT: &str = "exports/cnpjs_filtrados.csv";

const VALID_PORTE: [u8; 4] = [0, 1, 3, 5];
const VALID_SITUACAO: [u8; 5] = [1, 2, 3, 4, 8];

/// Colunas do CSV exportado, na ordem de saída.
pub const EXPORT_COLUMNS: [&str; 23] = [
    "cnpj",
    "razao_social",
    "nome_fantasia",
    "porte",
    "situacao_cadastral",
    "cnae_principal",
    "cnae_principal_nome",
    "data_inicio_atividade",
    "uf",
    "municipio_codigo",
    "municipio_nome",
    "tipo_logradouro",
    "logradouro",
    "numero",
    "complemento",
    "bairro",
    "cep",
    "telefone1",
    "telefone2",
    "fax",
    "email",
    "opcao_simples",
    "opcao_mei",
];

const SELECT_COLUMNS: &str = r#"
    (est.cnpj_basico || est.cnpj_ordem || est.cnpj_dv) AS cnpj,
    emp.razao_social AS razao_social,
    COALESCE(est.nome_fantasia, emp.razao_social) AS nome_fantasia,
    emp.porte_empresa AS porte,
    est.situacao_cadastral AS situacao_cadastral,
    est.cnae_fiscal_principal AS cnae_principal,
    cnae.descricao AS cnae_principal_nome,
    est.data_inicio_atividade AS data_inicio_atividade,
    est.uf AS uf,
    est.municipio AS municipio_codigo,
    mun.descricao AS municipio_nome,
    est.tipo_logradouro, est.logradouro, est.numero, est.complemento, est.bairro, est.cep,
    (COALESCE(est.ddd_1, '') || COALESCE(est.telefone_1, '')) AS telefone1,
    (COALESCE(est.ddd_2, '') || COALESCE(est.telefone_2, '')) AS telefone2,
    (COALESCE(est.ddd_fax, '') || COALESCE(est.fax, '')) AS fax,
    est.correio_eletronico AS email,
    COALESCE(sim.opcao_simples, '') AS opcao_simples,
    COALESCE(sim.opcao_mei, '') AS opcao_mei
"#;

const FROM_JOINS: &str = r#"
    FROM estabelecimentos est
    JOIN empresas emp ON emp.cnpj_basico = est.cnpj_basico
    LEFT JOIN simples sim ON sim.cnpj_basico = est.cnpj_basico
    LEFT JOIN municipios mun ON TRY_CAST(mun.codigo AS INTEGER) = TRY_CAST(est.municipio AS INTEGER)
    LEFT JOIN cnaes cnae ON TRY_CAST(cnae.codigo AS INTEGER) = TRY_CAST(est.cnae_fiscal_principal AS INTEGER)
"#;

/// Filtros da exportação; todos opcionais e combinados com AND.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub uf: Option<String>,
    /// Código (numérico) ou nome do município.
    pub municipio: Option<String>,
    /// Prefixo do CNAE, de 1 a 7 dígitos.
    pub cnae: Option<String>,
    pub incluir_secundaria: bool,
    pub porte: Vec<u8>,
    pub situacao: Vec<u8>,
    pub ativos: bool,
    pub mei: bool,
    pub sem_mei: bool,
    pub simples: bool,
    pub somente_matriz: bool,
    pub limit: Option<u64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn in_list(column: &str, codes: &[u8]) -> String {
    let mut codes = codes.to_vec();
    codes.sort_unstable();
    codes.dedup();
    let list: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    format!("TRY_CAST({} AS INTEGER) IN ({})", column, list.join(", "))
}

impl ExportFilter {
    pub fn validate(&self) -> Result<(), CnpjError> {
        if let Some(uf) = non_empty(&self.uf) {
            if uf.len() != 2 || !uf.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CnpjError::InvalidFilter(format!(
                    "UF deve ter duas letras (recebido: {})",
                    uf
                )));
            }
        }
        if let Some(cnae) = non_empty(&self.cnae) {
            if cnae.len() > 7 || !utils::is_intlike(cnae) {
                return Err(CnpjError::InvalidFilter(format!(
                    "CNAE deve ter de 1 a 7 dígitos (recebido: {})",
                    cnae
                )));
            }
        }
        if let Some(p) = self.porte.iter().find(|p| !VALID_PORTE.contains(p)) {
            return Err(CnpjError::InvalidFilter(format!(
                "porte {} inválido; válidos: 0, 1, 3, 5",
                p
            )));
        }
        if let Some(s) = self.situacao.iter().find(|s| !VALID_SITUACAO.contains(s)) {
            return Err(CnpjError::InvalidFilter(format!(
                "situação {} inválida; válidas: 1, 2, 3, 4, 8",
                s
            )));
        }
        if self.mei && self.sem_mei {
            return Err(CnpjError::InvalidFilter(
                "--mei e --sem-mei são excludentes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tabelas opcionais com dados; sem elas alguns filtros são ignorados.
#[derive(Debug, Clone, Copy)]
pub struct Available {
    pub municipios: bool,
    pub simples: bool,
    pub cnaes: bool,
}

impl Available {
    pub fn detect(db: &Database) -> Result<Self> {
        Ok(Self {
            municipios: db.has_rows("municipios")?,
            simples: db.has_rows("simples")?,
            cnaes: db.has_rows("cnaes")?,
        })
    }
}

/// `FROM ... WHERE ...` com os parâmetros posicionais correspondentes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub from_where: String,
    pub params: Vec<String>,
    pub ignored: Vec<&'static str>,
}

pub fn build_query(filter: &ExportFilter, available: Available) -> QueryPlan {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    let mut ignored = Vec::new();

    if let Some(uf) = non_empty(&filter.uf) {
        clauses.push("UPPER(est.uf) = ?".to_string());
        params.push(uf.to_uppercase());
    }

    if let Some(municipio) = non_empty(&filter.municipio) {
        if utils::is_intlike(municipio) {
            clauses.push("TRY_CAST(est.municipio AS INTEGER) = TRY_CAST(? AS INTEGER)".to_string());
            params.push(municipio.to_string());
        } else if available.municipios {
            clauses.push(
                "strip_accents(UPPER(mun.descricao)) = strip_accents(UPPER(CAST(? AS VARCHAR)))"
                    .to_string(),
            );
            params.push(municipio.to_string());
        } else {
            ignored.push("municipio");
        }
    }

    if let Some(cnae) = non_empty(&filter.cnae) {
        let principal = "starts_with(COALESCE(est.cnae_fiscal_principal, ''), CAST(? AS VARCHAR))";
        if filter.incluir_secundaria {
            clauses.push(format!(
                "({} OR contains(',' || COALESCE(est.cnae_fiscal_secundaria, ''), ',' || CAST(? AS VARCHAR)))",
                principal
            ));
            params.push(cnae.to_string());
            params.push(cnae.to_string());
        } else {
            clauses.push(principal.to_string());
            params.push(cnae.to_string());
        }
    }

    if !filter.porte.is_empty() {
        clauses.push(in_list("emp.porte_empresa", &filter.porte));
    }

    if !filter.situacao.is_empty() {
        clauses.push(in_list("est.situacao_cadastral", &filter.situacao));
    } else if filter.ativos {
        clauses.push("TRY_CAST(est.situacao_cadastral AS INTEGER) = 2".to_string());
    }

    let wants_simples = filter.mei || filter.sem_mei || filter.simples;
    if wants_simples && !available.simples {
        ignored.push("simples/mei");
    } else {
        if filter.mei {
            clauses.push("UPPER(COALESCE(sim.opcao_mei, 'N')) = 'S'".to_string());
        }
        if filter.sem_mei {
            clauses.push("UPPER(COALESCE(sim.opcao_mei, 'N')) <> 'S'".to_string());
        }
        if filter.simples {
            clauses.push("UPPER(COALESCE(sim.opcao_simples, 'N')) = 'S'".to_string());
        }
    }

    if filter.somente_matriz {
        clauses.push("TRY_CAST(est.identificador_matriz_filial AS INTEGER) = 1".to_string());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join("\n      AND "))
    };

    QueryPlan {
        from_where: format!("{}{}", FROM_JOINS, where_sql),
        params,
        ignored,
    }
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub output: PathBuf,
    pub total: u64,
    pub exported: u64,
    pub elapsed: Duration,
}

pub fn ensure_required_tables(db: &Database) -> Result<()> {
    let mut missing = Vec::new();
    for table in ["empresas", "estabelecimentos"] {
        if !db.has_rows(table)? {
            missing.push(table.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(CnpjError::MissingTables(missing).into());
    }
    Ok(())
}

fn print_filters(filter: &ExportFilter) {
    let or_none = |v: Option<&str>| v.unwrap_or("(sem)").to_string();
    let codes = |c: &[u8]| {
        if c.is_empty() {
            "(sem)".to_string()
        } else {
            c.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ")
        }
    };

    ui::print_info("Filtros aplicados:");
    ui::print_field("UF", &or_none(non_empty(&filter.uf)));
    ui::print_field("Município", &or_none(non_empty(&filter.municipio)));
    ui::print_field(
        "CNAE",
        &match non_empty(&filter.cnae) {
            Some(c) if filter.incluir_secundaria => format!("{} (principal ou secundário)", c),
            other => or_none(other),
        },
    );
    ui::print_field("Porte", &codes(&filter.porte));
    ui::print_field(
        "Situação",
        &if filter.situacao.is_empty() && filter.ativos {
            "2 (ativos)".to_string()
        } else {
            codes(&filter.situacao)
        },
    );
    if filter.mei || filter.sem_mei || filter.simples {
        let mut flags = Vec::new();
        if filter.mei {
            flags.push("MEI");
        }
        if filter.sem_mei {
            flags.push("sem MEI");
        }
        if filter.simples {
            flags.push("Simples");
        }
        ui::print_field("Simples/MEI", &flags.join(", "));
    }
    if filter.somente_matriz {
        ui::print_field("Estabelecimentos", "somente matriz");
    }
    ui::print_field(
        "Limite",
        &filter
            .limit
            .filter(|l| *l > 0)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "(sem)".to_string()),
    );
}

/// Exporta o resultado dos filtros para CSV (`;`, BOM UTF-8, cabeçalho).
///
/// O arquivo é gravado em `<out>.tmp` e renomeado ao final, de modo que uma
/// falha no meio não deixa um CSV truncado no destino.
pub fn export_csv(db: &Database, filter: &ExportFilter, out: &Path) -> Result<ExportReport> {
    let start = Instant::now();
    filter.validate()?;
    ensure_required_tables(db)?;

    ui::print_header("🔎 Consulta filtrada de CNPJs");
    ui::print_info(&format!("Saída CSV: {}", out.display()));

    let available = Available::detect(db)?;
    if !available.simples {
        ui::print_info("Tabela simples vazia: opcao_simples/opcao_mei virão vazias.");
    }
    if !available.cnaes {
        ui::print_info("Tabela cnaes vazia: descrição do CNAE principal virá vazia.");
    }

    let plan = build_query(filter, available);
    for name in &plan.ignored {
        ui::print_warning(&format!(
            "Filtro de {} ignorado: tabela de apoio sem dados",
            name
        ));
    }
    print_filters(filter);

    let conn = db.get_connection();
    let count_sql = format!("SELECT COUNT(*) {}", plan.from_where);
    tracing::debug!(sql = %count_sql, params = ?plan.params, "contagem");
    let total: i64 = conn
        .query_row(&count_sql, params_from_iter(plan.params.iter()), |row| row.get(0))
        .context("Falha ao contar registros do filtro")?;
    let total = total as u64;
    ui::print_info(&format!(
        "Total no filtro: {}",
        utils::format_thousands(total)
    ));

    let limit = filter.limit.filter(|l| *l > 0);
    let mut select_sql = format!(
        "SELECT {} {} ORDER BY razao_social, cnpj",
        SELECT_COLUMNS, plan.from_where
    );
    if let Some(limit) = limit {
        select_sql.push_str(&format!(" LIMIT {}", limit));
    }

    utils::ensure_parent_dir(out)?;
    let tmp_path = PathBuf::from(format!("{}.tmp", out.display()));

    let exported = write_rows(db, &select_sql, &plan.params, &tmp_path, total).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        e
    })?;

    fs::rename(&tmp_path, out).with_context(|| {
        format!(
            "Falha ao mover {} para {}",
            tmp_path.display(),
            out.display()
        )
    })?;

    let elapsed = start.elapsed();
    ui::print_success("Exportação concluída.");
    ui::print_field("Linhas exportadas", &utils::format_thousands(exported));
    ui::print_field(
        "Tempo decorrido",
        &format!("{} (mm:ss)", utils::format_elapsed(elapsed)),
    );

    Ok(ExportReport {
        output: out.to_path_buf(),
        total,
        exported,
        elapsed,
    })
}

fn write_rows(
    db: &Database,
    select_sql: &str,
    params: &[String],
    path: &Path,
    total: u64,
) -> Result<u64> {
    let file = fs::File::create(path)
        .with_context(|| format!("Falha ao criar {}", path.display()))?;
    let mut file = BufWriter::new(file);
    file.write_all(UTF8_BOM)?;

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .from_writer(file);
    wtr.write_record(EXPORT_COLUMNS)?;

    let pb = ui::progress_bar(
        total,
        "  [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}",
    )?;
    pb.set_message("exportando");

    let mut stmt = db.get_connection().prepare(select_sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut exported = 0u64;
    let mut record: Vec<String> = Vec::with_capacity(EXPORT_COLUMNS.len());

    while let Some(row) = rows.next()? {
        record.clear();
        for i in 0..EXPORT_COLUMNS.len() {
            let value: Option<String> = row.get(i)?;
            record.push(value.unwrap_or_default());
        }
        wtr.write_record(&record)?;
        exported += 1;
        if exported % 10_000 == 0 {
            pb.set_position(exported);
        }
    }

    wtr.flush()?;
    pb.set_position(exported);
    pb.finish_with_message("CSV gravado");
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Result<Database> {
        let db = Database::open_in_memory()?;
        db.get_connection().execute_batch(
            r#"
            INSERT INTO empresas VALUES
                ('11222333', 'ALFA COMERCIO LTDA', '2062', '49', '1000,00', '01', NULL),
                ('44555666', 'BETA SAUDE LTDA', '2062', '49', '5000,00', '03', NULL),
                ('77888999', 'GAMA SERVICOS', '2135', '50', '0,00', '05', NULL);
            INSERT INTO estabelecimentos
                (cnpj_basico, cnpj_ordem, cnpj_dv, identificador_matriz_filial, nome_fantasia,
                 situacao_cadastral, data_inicio_atividade, cnae_fiscal_principal,
                 cnae_fiscal_secundaria, uf, municipio, ddd_1, telefone_1, correio_eletronico)
            VALUES
                ('11222333', '0001', '81', '1', NULL, '02', '20100101', '4781400',
                 '4782201,4789099', 'MG', '5403', '34', '32101234', 'alfa@example.com'),
                ('11222333', '0002', '62', '2', 'ALFA FILIAL', '02', '20150101', '4781400',
                 NULL, 'SP', '7107', NULL, NULL, NULL),
                ('44555666', '0001', '00', '1', 'CLINICA BETA', '02', '20120101', '8630501',
                 '8640205', 'mg', '5403', NULL, NULL, NULL),
                ('77888999', '0001', '11', '1', NULL, '08', '20000101', '8610101',
                 NULL, 'MG', '4123', NULL, NULL, NULL);
            INSERT INTO municipios VALUES
                ('5403', 'UBERLANDIA'), ('7107', 'SAO PAULO'), ('4123', 'BELO HORIZONTE');
            INSERT INTO cnaes VALUES
                ('4781400', 'Comércio varejista de artigos do vestuário e acessórios'),
                ('8630501', 'Atividade médica ambulatorial com recursos para realização de procedimentos cirúrgicos');
            INSERT INTO simples VALUES
                ('11222333', 'S', '20100101', NULL, 'S', '20100101', NULL),
                ('44555666', 'S', '20120101', NULL, 'N', NULL, NULL);
            "#,
        )?;
        Ok(db)
    }

    fn export(db: &Database, filter: &ExportFilter) -> Result<(ExportReport, Vec<Vec<String>>, Vec<u8>)> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("saida").join("cnpjs.csv");
        let report = export_csv(db, filter, &out)?;
        let bytes = fs::read(&out)?;
        assert!(!PathBuf::from(format!("{}.tmp", out.display())).exists());

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(&bytes[UTF8_BOM.len()..]);
        let rows = rdr
            .records()
            .map(|r| r.map(|r| r.iter().map(str::to_string).collect::<Vec<String>>()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok((report, rows, bytes))
    }

    #[test]
    fn writes_bom_semicolons_and_header() -> Result<()> {
        let db = seeded()?;
        let filter = ExportFilter {
            uf: Some("mg".into()),
            ..ExportFilter::default()
        };
        let (report, rows, bytes) = export(&db, &filter)?;
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec())?;
        assert!(text.starts_with("cnpj;razao_social;nome_fantasia;porte;"));

        assert_eq!(report.total, 3);
        assert_eq!(report.exported, 3);
        let razoes: Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
        assert_eq!(razoes, vec!["ALFA COMERCIO LTDA", "BETA SAUDE LTDA", "GAMA SERVICOS"]);

        let alfa = &rows[0];
        assert_eq!(alfa[0], "11222333000181");
        // sem nome fantasia usa a razão social
        assert_eq!(alfa[2], "ALFA COMERCIO LTDA");
        assert_eq!(alfa[6], "Comércio varejista de artigos do vestuário e acessórios");
        assert_eq!(alfa[10], "UBERLANDIA");
        assert_eq!(alfa[17], "3432101234");
        assert_eq!(alfa[19], "");
        assert_eq!(alfa[21], "S");
        assert_eq!(alfa[22], "S");
        assert_eq!(rows[2][22], "");
        Ok(())
    }

    #[test]
    fn municipality_name_ignores_case_and_accents() -> Result<()> {
        let db = seeded()?;
        let filter = ExportFilter {
            municipio: Some("Uberlândia".into()),
            cnae: Some("86".into()),
            ..ExportFilter::default()
        };
        let (report, rows, _) = export(&db, &filter)?;
        assert_eq!(report.exported, 1);
        assert_eq!(rows[0][0], "44555666000100");
        assert_eq!(rows[0][2], "CLINICA BETA");
        Ok(())
    }

    #[test]
    fn municipality_code_filter() -> Result<()> {
        let db = seeded()?;
        let filter = ExportFilter {
            municipio: Some("07107".into()),
            ..ExportFilter::default()
        };
        let (report, rows, _) = export(&db, &filter)?;
        assert_eq!(report.exported, 1);
        assert_eq!(rows[0][0], "11222333000262");
        Ok(())
    }

    #[test]
    fn secondary_cnae_is_opt_in() -> Result<()> {
        let db = seeded()?;
        let mut filter = ExportFilter {
            cnae: Some("4782".into()),
            ..ExportFilter::default()
        };
        assert_eq!(export(&db, &filter)?.0.exported, 0);

        filter.incluir_secundaria = true;
        let (report, rows, _) = export(&db, &filter)?;
        assert_eq!(report.exported, 1);
        assert_eq!(rows[0][0], "11222333000181");
        Ok(())
    }

    #[test]
    fn porte_situacao_mei_and_matriz() -> Result<()> {
        let db = seeded()?;
        let by_porte = ExportFilter {
            porte: vec![3, 5],
            ..ExportFilter::default()
        };
        assert_eq!(export(&db, &by_porte)?.0.exported, 2);

        let baixadas = ExportFilter {
            situacao: vec![8],
            ativos: true,
            ..ExportFilter::default()
        };
        let (_, rows, _) = export(&db, &baixadas)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "GAMA SERVICOS");

        let mei = ExportFilter {
            mei: true,
            ..ExportFilter::default()
        };
        assert_eq!(export(&db, &mei)?.0.exported, 2);

        let mei_matriz = ExportFilter {
            mei: true,
            somente_matriz: true,
            ..ExportFilter::default()
        };
        assert_eq!(export(&db, &mei_matriz)?.0.exported, 1);

        let sem_mei = ExportFilter {
            sem_mei: true,
            ..ExportFilter::default()
        };
        assert_eq!(export(&db, &sem_mei)?.0.exported, 2);
        Ok(())
    }

    #[test]
    fn ativos_alone_keeps_situacao_2() -> Result<()> {
        let db = seeded()?;
        let mut filter = ExportFilter {
            cnae: Some("86".into()),
            ..ExportFilter::default()
        };
        assert_eq!(export(&db, &filter)?.0.exported, 2);

        filter.ativos = true;
        let (report, rows, _) = export(&db, &filter)?;
        assert_eq!(report.total, 1);
        assert_eq!(rows[0][1], "BETA SAUDE LTDA");
        assert_eq!(rows[0][4], "02");
        Ok(())
    }

    #[test]
    fn simples_optants_only() -> Result<()> {
        let db = seeded()?;
        let filter = ExportFilter {
            simples: true,
            somente_matriz: true,
            ..ExportFilter::default()
        };
        let (report, rows, _) = export(&db, &filter)?;
        assert_eq!(report.exported, 2);
        let razoes: Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
        assert_eq!(razoes, vec!["ALFA COMERCIO LTDA", "BETA SAUDE LTDA"]);
        assert!(rows.iter().all(|r| r[21] == "S"));
        Ok(())
    }

    #[test]
    fn limit_caps_rows_but_not_total() -> Result<()> {
        let db = seeded()?;
        let filter = ExportFilter {
            limit: Some(1),
            ..ExportFilter::default()
        };
        let (report, rows, _) = export(&db, &filter)?;
        assert_eq!(report.total, 4);
        assert_eq!(report.exported, 1);
        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_tables_are_reported() -> Result<()> {
        let db = Database::open_in_memory()?;
        let dir = tempfile::tempdir()?;
        let err = export_csv(&db, &ExportFilter::default(), &dir.path().join("x.csv"))
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Tabelas obrigatórias vazias ou ausentes: empresas, estabelecimentos")
        );
        Ok(())
    }

    #[test]
    fn name_filter_ignored_without_municipios() {
        let available = Available {
            municipios: false,
            simples: false,
            cnaes: true,
        };
        let filter = ExportFilter {
            municipio: Some("Uberlandia".into()),
            mei: true,
            ..ExportFilter::default()
        };
        let plan = build_query(&filter, available);
        assert!(plan.params.is_empty());
        assert_eq!(plan.ignored, vec!["municipio", "simples/mei"]);
        assert!(!plan.from_where.contains("WHERE"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad = [
            ExportFilter {
                uf: Some("MGS".into()),
                ..ExportFilter::default()
            },
            ExportFilter {
                cnae: Some("86A".into()),
                ..ExportFilter::default()
            },
            ExportFilter {
                cnae: Some("12345678".into()),
                ..ExportFilter::default()
            },
            ExportFilter {
                porte: vec![2],
                ..ExportFilter::default()
            },
            ExportFilter {
                situacao: vec![5],
                ..ExportFilter::default()
            },
            ExportFilter {
                mei: true,
                sem_mei: true,
                ..ExportFilter::default()
            },
        ];
        for filter in bad {
            assert!(
                matches!(filter.validate(), Err(CnpjError::InvalidFilter(_))),
                "{filter:?}"
            );
        }
        assert!(ExportFilter::default().validate().is_ok());
    }
}
