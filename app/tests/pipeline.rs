use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

use cnpj_duckdb::config::{IngestOptions, UTF8_BOM};
use cnpj_duckdb::database::Database;
use cnpj_duckdb::query::{self, ExportFilter};
use cnpj_duckdb::{ingest, ui};

fn latin1_csv(rows: &[Vec<&str>]) -> Vec<u8> {
    let mut text = String::new();
    for row in rows {
        let fields: Vec<String> = row.iter().map(|f| format!("\"{}\"", f)).collect();
        text.push_str(&fields.join(";"));
        text.push('\n');
    }
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(&text);
    bytes.into_owned()
}

fn write_zip(path: &Path, member: &str, data: &[u8]) -> Result<()> {
    let mut writer = zip::ZipWriter::new(fs::File::create(path)?);
    writer.start_file(member, SimpleFileOptions::default())?;
    writer.write_all(data)?;
    writer.finish()?;
    Ok(())
}

fn estabelecimento<'a>(
    basico: &'a str,
    ordem: &'a str,
    dv: &'a str,
    fantasia: &'a str,
    situacao: &'a str,
    uf: &'a str,
    municipio: &'a str,
) -> Vec<&'a str> {
    vec![
        basico, ordem, dv, "1", fantasia, situacao, "20050101", "00", "", "", "20050101",
        "4721102", "4712100,5611201", "RUA", "DAS FLORES", "10", "", "CENTRO", "38400000", uf,
        municipio, "34", "32100000", "", "", "", "", "contato@exemplo.com.br", "", "",
    ]
}

fn seed_zips(dir: &Path) -> Result<()> {
    write_zip(
        &dir.join("Empresas0.zip"),
        "K3241.K03200Y0.D50712.EMPRECSV",
        &latin1_csv(&[
            vec!["11222333", "PADARIA SÃO JOSÉ LTDA", "2062", "49", "1000,00", "01", ""],
            vec!["44555666", "BETA SERVIÇOS LTDA", "2062", "49", "50000,00", "03", ""],
        ]),
    )?;
    write_zip(
        &dir.join("Estabelecimentos0.zip"),
        "K3241.K03200Y0.D50712.ESTABELE",
        &latin1_csv(&[
            estabelecimento("11222333", "0001", "81", "PADARIA SÃO JOSÉ", "02", "MG", "5403"),
            estabelecimento("44555666", "0001", "00", "", "08", "SP", "7107"),
        ]),
    )?;
    write_zip(
        &dir.join("Municipios.zip"),
        "F.K03200$Z.D50712.MUNICCSV",
        &latin1_csv(&[vec!["5403", "UBERLÂNDIA"], vec!["7107", "SAO PAULO"]]),
    )?;
    write_zip(
        &dir.join("Simples.zip"),
        "F.K03200$W.SIMPLES.CSV.D50712",
        &latin1_csv(&[vec![
            "11222333", "S", "20200101", "00000000", "N", "00000000", "00000000",
        ]]),
    )?;
    Ok(())
}

#[test]
fn zips_to_filtered_csv() -> Result<()> {
    ui::init(true, false);
    let dir = tempfile::tempdir()?;
    let zips = dir.path().join("zips");
    fs::create_dir_all(&zips)?;
    seed_zips(&zips)?;

    let opts = IngestOptions {
        input_dir: zips.clone(),
        work_dir: dir.path().join("csv_tmp"),
        ..IngestOptions::default()
    };
    let mut db = Database::open(&dir.path().join("cnpj.duckdb"))?;

    let report = ingest::ingest_archives(&mut db, &opts, true)?;
    assert_eq!(report.loaded.len(), 4);
    assert!(report.failures.is_empty());
    assert_eq!(db.count("empresas")?, 2);
    assert_eq!(db.count("estabelecimentos")?, 2);
    assert_eq!(db.reference("CNPJ")?.as_deref(), Some("12/07/2025"));
    assert_eq!(db.reference("cnpj_qtde")?.as_deref(), Some("2"));
    // CSV temporários removidos
    assert_eq!(fs::read_dir(&opts.work_dir)?.count(), 0);

    let again = ingest::ingest_archives(&mut db, &opts, true)?;
    assert!(again.loaded.is_empty());
    assert_eq!(again.skipped.len(), 4);
    assert_eq!(db.count("empresas")?, 2);

    let out = dir.path().join("exports").join("mg.csv");
    let filter = ExportFilter {
        uf: Some("mg".into()),
        municipio: Some("uberlandia".into()),
        ..ExportFilter::default()
    };
    let export = query::export_csv(&db, &filter, &out)?;
    assert_eq!(export.total, 1);
    assert_eq!(export.exported, 1);

    let bytes = fs::read(&out)?;
    assert!(bytes.starts_with(UTF8_BOM));
    let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec())?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("cnpj;razao_social;nome_fantasia;"));
    assert!(lines[1].starts_with("11222333000181;PADARIA SÃO JOSÉ LTDA;PADARIA SÃO JOSÉ;"));
    assert!(lines[1].contains(";UBERLÂNDIA;"));
    assert!(!Path::new(&format!("{}.tmp", out.display())).exists());
    Ok(())
}

#[test]
fn filter_selects_archives() -> Result<()> {
    ui::init(true, false);
    let dir = tempfile::tempdir()?;
    seed_zips(dir.path())?;

    let opts = IngestOptions {
        input_dir: dir.path().to_path_buf(),
        work_dir: dir.path().join("csv_tmp"),
        filter: Some("^municipios".into()),
        keep_csv: true,
        ..IngestOptions::default()
    };
    let mut db = Database::open_in_memory()?;
    let report = ingest::ingest_archives(&mut db, &opts, true)?;

    assert_eq!(report.loaded.len(), 1);
    assert_eq!(db.count("municipios")?, 2);
    assert_eq!(db.count("empresas")?, 0);
    assert!(opts.work_dir.join("F.K03200$Z.D50712.MUNICCSV.csv").exists());
    Ok(())
}

#[test]
fn failed_archives_are_rolled_back_and_reported() -> Result<()> {
    ui::init(true, false);
    let dir = tempfile::tempdir()?;
    seed_zips(dir.path())?;
    fs::write(dir.path().join("Socios0.zip"), b"isto nao e um zip")?;
    write_zip(
        &dir.path().join("Qualificacoes.zip"),
        "F.K03200$Z.D50712.QUALSCSV",
        &latin1_csv(&[vec!["49", "SÓCIO-ADMINISTRADOR"]]),
    )?;

    let opts = IngestOptions {
        input_dir: dir.path().to_path_buf(),
        work_dir: dir.path().join("csv_tmp"),
        ..IngestOptions::default()
    };
    let mut db = Database::open(&dir.path().join("cnpj.duckdb"))?;
    // o appender falha sem a tabela de destino
    db.get_connection().execute_batch("DROP TABLE qualificacoes")?;

    let err = ingest::ingest_archives(&mut db, &opts, true).unwrap_err();
    assert_eq!(err.to_string(), "2 arquivo(s) falharam na carga");

    // os demais arquivos foram carregados e a finalização rodou
    assert_eq!(db.count("empresas")?, 2);
    assert_eq!(db.count("estabelecimentos")?, 2);
    assert_eq!(db.reference("CNPJ")?.as_deref(), Some("12/07/2025"));

    let registrados: Vec<String> = db.loaded_files()?.into_iter().map(|f| f.arquivo).collect();
    assert_eq!(
        registrados,
        vec!["Empresas0.zip", "Estabelecimentos0.zip", "Municipios.zip", "Simples.zip"]
    );
    Ok(())
}

#[test]
fn unknown_archives_are_skipped() -> Result<()> {
    ui::init(true, false);
    let dir = tempfile::tempdir()?;
    write_zip(&dir.path().join("Layout.zip"), "LEIAME.txt", b"layout dos arquivos\n")?;

    let opts = IngestOptions {
        input_dir: dir.path().to_path_buf(),
        work_dir: dir.path().join("csv_tmp"),
        ..IngestOptions::default()
    };
    let mut db = Database::open_in_memory()?;
    let report = ingest::ingest_archives(&mut db, &opts, true)?;

    assert_eq!(report.unknown, vec!["Layout.zip"]);
    assert!(report.loaded.is_empty());
    assert!(report.failures.is_empty());
    assert!(db.loaded_files()?.is_empty());
    assert_eq!(db.reference("CNPJ")?.as_deref(), Some("xx/xx/xxxx"));
    Ok(())
}
