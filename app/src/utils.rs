use anyhow::{Context, Result};
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ENCODING_SNIFF_BYTES;

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Falha ao criar diretório: {}", path.display()))?;
    }
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

pub fn get_files_by_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*{}", glob::Pattern::escape(&dir.to_string_lossy()), ext);
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    Ok(files)
}

/// Escolhe a codificação pelo início do arquivo: UTF-8 só quando a amostra
/// tem bytes não-ASCII válidos em UTF-8; caso contrário Windows-1252, que é
/// o superconjunto do Latin-1 usado nos dumps da Receita.
pub fn detect_encoding(sample: &[u8]) -> &'static Encoding {
    if sample.is_ascii() {
        return encoding_rs::WINDOWS_1252;
    }
    let valid = match std::str::from_utf8(sample) {
        Ok(_) => true,
        // sequência cortada no fim da amostra
        Err(e) => e.error_len().is_none(),
    };
    if valid {
        encoding_rs::UTF_8
    } else {
        encoding_rs::WINDOWS_1252
    }
}

pub fn create_decoding_reader(file_path: &Path) -> Result<(Box<dyn Read>, &'static Encoding)> {
    let mut sample = Vec::with_capacity(ENCODING_SNIFF_BYTES);
    fs::File::open(file_path)
        .with_context(|| format!("Falha ao abrir arquivo: {}", file_path.display()))?
        .take(ENCODING_SNIFF_BYTES as u64)
        .read_to_end(&mut sample)?;
    let encoding = detect_encoding(&sample);

    let file = fs::File::open(file_path)
        .with_context(|| format!("Falha ao abrir arquivo: {}", file_path.display()))?;
    let reader = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(file);

    Ok((Box::new(reader), encoding))
}

/// `K3241.K03200Y0.D50712.EMPRECSV` -> `12/07/2025`
pub fn parse_date_from_filename(filename: &str) -> Option<String> {
    filename.split('.').find_map(|part| {
        let digits = part.strip_prefix('D').or_else(|| part.strip_prefix('d'))?;
        if digits.len() != 5 || !is_intlike(digits) {
            return None;
        }
        Some(format!(
            "{}/{}/202{}",
            &digits[3..5],
            &digits[1..3],
            &digits[0..1]
        ))
    })
}

pub fn only_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn is_intlike(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Separador de milhar no padrão brasileiro: 1234567 -> 1.234.567
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Literal SQL entre aspas simples, para caminhos em `COPY`.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("arquivo")
}
