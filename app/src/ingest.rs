use anyhow::{Context, Result};
use chrono::Local;
use duckdb::{params, Connection};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{IngestOptions, CSV_DELIMITER, CSV_QUOTE, EXPECTED_ZIP_COUNT};
use crate::database::{Database, LoadedFile};
use crate::extract;
use crate::models::TableKind;
use crate::ui;
use crate::utils;

const RECORDS_TEMPLATE: &str =
    "  Registros: [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg} | ETA: {eta}";
const FILES_TEMPLATE: &str = "  [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}";

/// Linhas gravadas e descartadas de um arquivo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: u64,
    pub invalid: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedArchive {
    pub arquivo: String,
    pub kind: TableKind,
    pub stats: LoadStats,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub loaded: Vec<LoadedArchive>,
    /// Já registrados em `_arquivos`.
    pub skipped: Vec<String>,
    /// Sem tabela reconhecida pelo nome.
    pub unknown: Vec<String>,
    pub failures: Vec<(String, String)>,
    pub reference: Option<String>,
}

/// Lê um CSV da Receita e grava as linhas em `kind` pelo appender do DuckDB.
///
/// Campos vazios viram NULL. Uma primeira linha cujo primeiro campo não é
/// numérico é tratada como cabeçalho. Linhas com quantidade de colunas
/// diferente do layout são descartadas e contadas.
pub fn load_csv_file(conn: &Connection, path: &Path, kind: TableKind) -> Result<LoadStats> {
    let expected = kind.columns().len();
    let (reader, encoding) = utils::create_decoding_reader(path)?;
    ui::print_verbose(&format!(
        "{} lido como {}",
        utils::file_name(path),
        encoding.name()
    ));

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .quote(CSV_QUOTE)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    // Estimativa: ~200 bytes por linha
    let file_size = fs::metadata(path)?.len();
    let pb = ui::progress_bar((file_size / 200).max(1), RECORDS_TEMPLATE)?;

    let mut appender = conn
        .appender(kind.table_name())
        .with_context(|| format!("Falha ao abrir appender de {}", kind.table_name()))?;

    let mut stats = LoadStats::default();
    let start_time = Instant::now();
    let mut last_update = Instant::now();

    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| {
            format!("Falha ao ler {} (linha {})", utils::file_name(path), line + 1)
        })?;

        if line == 0 && !utils::is_intlike(record.get(0).unwrap_or("").trim()) {
            tracing::debug!(file = %path.display(), "cabeçalho ignorado");
            continue;
        }

        if record.len() != expected {
            stats.invalid += 1;
            tracing::debug!(
                file = %path.display(),
                line = line + 1,
                expected,
                found = record.len(),
                "linha com quantidade de colunas inesperada"
            );
            continue;
        }

        appender.append_row(duckdb::appender_params_from_iter(
            record.iter().map(|v| if v.is_empty() { None } else { Some(v) }),
        ))?;
        stats.rows += 1;

        if stats.rows % 10_000 == 0 || last_update.elapsed().as_secs() >= 1 {
            pb.set_position(stats.rows);
            let elapsed = start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                pb.set_message(format!("{:.0} registros/s", stats.rows as f64 / elapsed));
            }
            last_update = Instant::now();
        }
    }

    appender.flush()?;

    pb.set_position(stats.rows);
    let elapsed = start_time.elapsed().as_secs_f64();
    let avg_speed = if elapsed > 0.0 {
        stats.rows as f64 / elapsed
    } else {
        0.0
    };
    pb.finish_with_message(format!(
        "{} registros | {:.0} registros/s",
        utils::format_thousands(stats.rows),
        avg_speed
    ));

    Ok(stats)
}

/// Tabela pelo nome do membro extraído; se não bater, pelo nome do ZIP.
pub fn detect_kind(member_name: &str, zip_name: &str) -> Option<TableKind> {
    TableKind::detect(member_name).or_else(|| TableKind::detect(zip_name))
}

fn list_archives(opts: &IngestOptions) -> Result<Vec<PathBuf>> {
    let mut zips = utils::get_files_by_extension(&opts.input_dir, ".zip")?;
    if let Some(pattern) = &opts.filter {
        let re = regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| crate::error::CnpjError::InvalidFilter(e.to_string()))?;
        zips.retain(|z| re.is_match(utils::file_name(z)));
    }
    if let Some(limit) = opts.limit {
        zips.truncate(limit);
    }
    Ok(zips)
}

/// Carrega o CSV dentro de uma transação junto com o registro em `_arquivos`.
fn load_archive(
    db: &mut Database,
    arquivo: &str,
    csv_path: &Path,
    kind: TableKind,
) -> Result<LoadStats> {
    let tx = db.get_connection_mut().transaction()?;
    let stats = load_csv_file(&tx, csv_path, kind)?;
    tx.execute(
        "INSERT INTO _arquivos (arquivo, tabela, linhas, linhas_invalidas, carregado_em) VALUES (?, ?, ?, ?, ?)",
        params![
            arquivo,
            kind.table_name(),
            stats.rows as i64,
            stats.invalid as i64,
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
        ],
    )?;
    tx.commit()
        .with_context(|| format!("Falha ao confirmar carga de {}", arquivo))?;
    Ok(stats)
}

/// Falha ao apagar um arquivo temporário não interrompe a carga.
fn remove_or_record(path: &Path, arquivo: &str, failures: &mut Vec<(String, String)>) {
    if let Err(e) = fs::remove_file(path) {
        tracing::error!(arquivo, path = %path.display(), "falha ao remover: {}", e);
        failures.push((
            arquivo.to_string(),
            format!("Falha ao remover {}: {}", path.display(), e),
        ));
    }
}

pub fn ingest_archives(db: &mut Database, opts: &IngestOptions, auto_yes: bool) -> Result<IngestReport> {
    ui::print_header("⚙️  Carga dos arquivos da Receita → DuckDB");
    ui::print_info(&format!(
        "Hora de início: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    ui::print_info(&format!("Diretório de entrada: {}", opts.input_dir.display()));
    ui::print_info(&format!("Diretório de trabalho: {}", opts.work_dir.display()));

    let zips = list_archives(opts)?;
    if zips.is_empty() {
        anyhow::bail!(
            "Nenhum arquivo ZIP encontrado em {}",
            opts.input_dir.display()
        );
    }

    if opts.filter.is_none() && opts.limit.is_none() && zips.len() != EXPECTED_ZIP_COUNT {
        ui::print_warning(&format!(
            "A pasta {} deveria conter {} arquivos ZIP, mas contém {}.",
            opts.input_dir.display(),
            EXPECTED_ZIP_COUNT,
            zips.len()
        ));
        ui::print_warning("Sem todos os arquivos a base ficará incompleta.");
        let should_continue = auto_yes || ui::ask_confirmation_no("Deseja prosseguir assim mesmo?")?;
        if !should_continue {
            ui::print_info("Operação cancelada pelo usuário.");
            return Ok(IngestReport::default());
        }
    } else {
        ui::print_success(&format!("{} arquivo(s) ZIP selecionado(s)", zips.len()));
    }

    utils::ensure_dir(&opts.work_dir)?;

    ui::print_separator();
    ui::print_step(1, 2, "Carregando arquivos");

    let already_loaded: HashMap<String, LoadedFile> = db
        .loaded_files()?
        .into_iter()
        .map(|f| (f.arquivo.clone(), f))
        .collect();

    let mut report = IngestReport::default();
    let pb = ui::progress_bar(zips.len() as u64, FILES_TEMPLATE)?;

    for (idx, zip_path) in zips.iter().enumerate() {
        let arquivo = utils::file_name(zip_path).to_string();
        pb.set_message(format!("{} ({}/{})", arquivo, idx + 1, zips.len()));

        if let Some(anterior) = already_loaded.get(&arquivo) {
            ui::print_verbose(&format!(
                "{} já carregado em {} ({} linhas), pulando",
                arquivo,
                anterior.tabela,
                utils::format_thousands(anterior.linhas)
            ));
            report.skipped.push(arquivo);
            pb.inc(1);
            continue;
        }

        let member = match extract::extract_single_csv(zip_path, &opts.work_dir) {
            Ok(member) => member,
            Err(e) => {
                tracing::error!(arquivo = %arquivo, "falha na extração: {:#}", e);
                report.failures.push((arquivo, format!("{:#}", e)));
                pb.inc(1);
                continue;
            }
        };

        let outcome = detect_kind(&member.member_name, &arquivo)
            .map(|kind| (kind, load_archive(db, &arquivo, &member.path, kind)));

        if !opts.keep_csv && member.path.exists() {
            remove_or_record(&member.path, &arquivo, &mut report.failures);
        }

        match outcome {
            None => {
                ui::print_warning(&format!(
                    "Tabela não reconhecida para {} ({}), arquivo ignorado",
                    arquivo, member.member_name
                ));
                report.unknown.push(arquivo);
            }
            Some((kind, Ok(stats))) => {
                if report.reference.is_none() {
                    report.reference = utils::parse_date_from_filename(&member.member_name);
                }
                if stats.invalid > 0 {
                    ui::print_warning(&format!(
                        "{}: {} linha(s) com layout inválido descartada(s)",
                        arquivo,
                        utils::format_thousands(stats.invalid)
                    ));
                }
                if opts.delete_zip {
                    remove_or_record(zip_path, &arquivo, &mut report.failures);
                }
                report.loaded.push(LoadedArchive {
                    arquivo,
                    kind,
                    stats,
                });
            }
            Some((_, Err(e))) => {
                tracing::error!(arquivo = %arquivo, "falha na carga: {:#}", e);
                report.failures.push((arquivo, format!("{:#}", e)));
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("Carga concluída!");

    ui::print_step(2, 2, "Finalizando (índices e referência)");
    let data_referencia = match &report.reference {
        Some(date) => date.clone(),
        None => db
            .reference("CNPJ")?
            .unwrap_or_else(|| "xx/xx/xxxx".to_string()),
    };
    db.finalize_processing(&data_referencia)?;
    ui::print_info(&format!("Data de referência: {}", data_referencia));

    ui::print_separator();
    ui::print_statistics(&[
        ("Arquivos carregados", report.loaded.len() as u64),
        ("Arquivos já existentes", report.skipped.len() as u64),
        ("Empresas", db.count("empresas")?),
        ("Estabelecimentos", db.count("estabelecimentos")?),
        ("Sócios", db.count("socios")?),
        ("Simples", db.count("simples")?),
    ]);

    if !report.failures.is_empty() {
        for (arquivo, erro) in &report.failures {
            ui::print_error(&format!("{}: {}", arquivo, erro));
        }
        anyhow::bail!("{} arquivo(s) falharam na carga", report.failures.len());
    }

    ui::print_success("Carga concluída!");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, data)?;
        Ok(path)
    }

    #[test]
    fn loads_latin1_rows_with_nulls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write(
            dir.path(),
            "F.K03200$Z.D50712.MUNICCSV.csv",
            b"\"0001\";\"GUAJARA-MIRIM\"\n\"9701\";\"BRAS\xcdLIA\"\n\"9999\";\"\"\n",
        )?;
        let db = Database::open_in_memory()?;
        let stats = load_csv_file(db.get_connection(), &path, TableKind::Municipios)?;
        assert_eq!(stats, LoadStats { rows: 3, invalid: 0 });

        let nome: String = db.get_connection().query_row(
            "SELECT descricao FROM municipios WHERE codigo = '9701'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(nome, "BRASÍLIA");
        let nulls: i64 = db.get_connection().query_row(
            "SELECT COUNT(*) FROM municipios WHERE descricao IS NULL",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(nulls, 1);
        Ok(())
    }

    #[test]
    fn header_row_and_bad_rows_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write(
            dir.path(),
            "simples.csv",
            concat!(
                "cnpj_basico;opcao_simples;data_opcao_simples;data_exclusao_simples;opcao_mei;data_opcao_mei;data_exclusao_mei\n",
                "\"11222333\";\"S\";\"20200101\";\"00000000\";\"N\";\"00000000\";\"00000000\"\n",
                "\"44555666\";\"S\"\n",
            )
            .as_bytes(),
        )?;
        let db = Database::open_in_memory()?;
        let stats = load_csv_file(db.get_connection(), &path, TableKind::Simples)?;
        assert_eq!(stats, LoadStats { rows: 1, invalid: 1 });
        assert_eq!(db.count("simples")?, 1);
        Ok(())
    }

    #[test]
    fn kind_falls_back_to_archive_name() {
        assert_eq!(
            detect_kind("K3241.K03200Y0.D50712.EMPRECSV", "x.zip"),
            Some(TableKind::Empresas)
        );
        assert_eq!(detect_kind("dados.csv", "Socios4.zip"), Some(TableKind::Socios));
        assert_eq!(detect_kind("dados.csv", "outro.zip"), None);
    }

    #[test]
    fn archive_filter_and_limit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["Empresas0.zip", "Empresas1.zip", "Socios0.zip"] {
            write(dir.path(), name, b"")?;
        }
        let opts = IngestOptions {
            input_dir: dir.path().to_path_buf(),
            filter: Some("^empresas".into()),
            limit: Some(1),
            ..IngestOptions::default()
        };
        let zips = list_archives(&opts)?;
        assert_eq!(zips.len(), 1);
        assert_eq!(utils::file_name(&zips[0]), "Empresas0.zip");

        let bad = IngestOptions {
            filter: Some("(".into()),
            ..opts
        };
        assert!(list_archives(&bad).is_err());
        Ok(())
    }

    #[test]
    fn failed_cleanup_is_recorded_not_raised() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let csv = write(dir.path(), "dados.csv", b"1;2\n")?;
        let mut failures = Vec::new();

        remove_or_record(&csv, "Cnaes.zip", &mut failures);
        assert!(!csv.exists());
        assert!(failures.is_empty());

        // remove_file recusa diretórios
        let pasta = dir.path().join("pasta.csv");
        fs::create_dir(&pasta)?;
        remove_or_record(&pasta, "Cnaes.zip", &mut failures);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "Cnaes.zip");
        assert!(failures[0].1.contains("pasta.csv"));
        Ok(())
    }
}
