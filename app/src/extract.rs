use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::utils;

/// Membro escolhido de um ZIP da Receita.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMember {
    /// Nome original dentro do ZIP (`K3241.K03200Y0.D50712.EMPRECSV`).
    pub member_name: String,
    /// Caminho do CSV gravado no diretório de extração.
    pub path: PathBuf,
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Índice do membro tabular: terminados em `csv`/`.txt`, depois qualquer nome
/// contendo `csv`, por fim o maior arquivo.
pub fn choose_member(entries: &[(String, u64)]) -> Option<usize> {
    let lower: Vec<String> = entries.iter().map(|(n, _)| n.to_lowercase()).collect();

    if let Some(i) = lower
        .iter()
        .position(|n| n.ends_with("csv") || n.ends_with(".txt"))
    {
        return Some(i);
    }
    if let Some(i) = lower.iter().position(|n| n.contains("csv")) {
        return Some(i);
    }
    entries
        .iter()
        .enumerate()
        .max_by_key(|(_, (_, size))| *size)
        .map(|(i, _)| i)
}

/// Nome plano do arquivo extraído, sempre com sufixo `.csv`.
pub fn output_file_name(member_name: &str) -> String {
    let base = base_name(member_name);
    if base.to_lowercase().ends_with(".csv") {
        base.to_string()
    } else {
        format!("{}.csv", base)
    }
}

/// Extrai exatamente um membro do ZIP para `out_dir`.
pub fn extract_single_csv(zip_path: &Path, out_dir: &Path) -> Result<ExtractedMember> {
    let file = fs::File::open(zip_path)
        .with_context(|| format!("Falha ao abrir ZIP: {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("ZIP inválido: {}", zip_path.display()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        entries.push((i, entry.name().to_string(), entry.size()));
    }
    if entries.is_empty() {
        anyhow::bail!("ZIP vazio: {}", zip_path.display());
    }

    let listing: Vec<(String, u64)> = entries
        .iter()
        .map(|(_, name, size)| (name.clone(), *size))
        .collect();
    let chosen = choose_member(&listing)
        .with_context(|| format!("Nenhum membro tabular em {}", zip_path.display()))?;
    let (index, member_name, _) = &entries[chosen];

    utils::ensure_dir(out_dir)?;
    let out_path = out_dir.join(output_file_name(member_name));
    if out_path.exists() {
        fs::remove_file(&out_path)?;
    }

    let mut member = archive.by_index(*index)?;
    let mut out = io::BufWriter::new(
        fs::File::create(&out_path)
            .with_context(|| format!("Falha ao criar {}", out_path.display()))?,
    );
    io::copy(&mut member, &mut out)
        .with_context(|| format!("Falha ao extrair {} de {}", member_name, zip_path.display()))?;

    tracing::debug!(zip = %zip_path.display(), member = %member_name, "membro extraído");

    Ok(ExtractedMember {
        member_name: base_name(member_name).to_string(),
        path: out_path,
    })
}

/// Lê todos os membros até o fim para validar os CRCs.
pub fn verify_zip(zip_path: &Path) -> Result<()> {
    let file = fs::File::open(zip_path)
        .with_context(|| format!("Falha ao abrir ZIP: {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("ZIP inválido: {}", zip_path.display()))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        io::copy(&mut entry, &mut io::sink())
            .with_context(|| format!("ZIP corrompido: {} ({})", zip_path.display(), entry.name()))?;
    }
    Ok(())
}
