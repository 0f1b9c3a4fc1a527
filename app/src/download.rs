use anyhow::{Context, Result};
use futures::future::join_all;
use futures::StreamExt;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::{
    DownloadOptions, CONNECT_ATTEMPTS, CONNECT_TIMEOUT, DOWNLOAD_ATTEMPTS, HTTP_TIMEOUT,
    STALL_TIMEOUT, USER_AGENT,
};
use crate::error::CnpjError;
use crate::extract;
use crate::ui;
use crate::utils;

/// Arquivo listado na pasta do mês.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
}

enum Outcome {
    Downloaded,
    AlreadyPresent,
}

/// Tamanho no formato do índice do servidor (`1.0K`, `47M`, `1.8G`).
pub fn parse_size(size_str: &str) -> u64 {
    let size_str = size_str.trim().replace(' ', "").to_uppercase();
    if size_str.is_empty() || size_str == "-" {
        return 0;
    }

    let mut num_str = String::new();
    let mut unit = String::new();
    for ch in size_str.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            num_str.push(ch);
        } else if ch == ',' {
            num_str.push('.');
        } else if ch.is_ascii_alphabetic() {
            unit.push(ch);
        }
    }

    let num: f64 = num_str.parse().unwrap_or(0.0);
    match unit.as_str() {
        "K" | "KB" => (num * 1024.0) as u64,
        "M" | "MB" => (num * 1024.0 * 1024.0) as u64,
        "G" | "GB" => (num * 1024.0 * 1024.0 * 1024.0) as u64,
        "T" | "TB" => (num * 1024.0 * 1024.0 * 1024.0 * 1024.0) as u64,
        _ => num as u64,
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Seletor inválido {}: {:?}", css, e))
}

/// Pastas mensais (`2025-07/`) do índice, em ordem crescente.
pub fn parse_reference_folders(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let link_selector = selector("a")?;
    let mut folders: Vec<String> = document
        .select(&link_selector)
        .filter_map(|link| link.value().attr("href"))
        .map(|href| href.trim_start_matches("./"))
        .filter(|href| href.starts_with("20") && href.ends_with('/'))
        .map(str::to_string)
        .collect();
    folders.sort();
    folders.dedup();
    Ok(folders)
}

/// Links `.zip` da página do mês, resolvidos contra `page_url`, sem repetição.
/// O tamanho vem da 4ª célula da linha quando a listagem é uma tabela.
pub fn parse_zip_listing(html: &str, page_url: &str) -> Result<Vec<RemoteFile>> {
    let base = Url::parse(page_url).with_context(|| format!("URL inválida: {}", page_url))?;
    let document = Html::parse_document(html);
    let link_selector = selector("a")?;
    let row_selector = selector("tr")?;
    let td_selector = selector("td")?;

    let mut sizes: Vec<(String, u64)> = Vec::new();
    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&td_selector)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();
        if let Some(href) = row
            .select(&link_selector)
            .next()
            .and_then(|link| link.value().attr("href"))
        {
            let size = cells.get(3).map(|c| parse_size(c)).unwrap_or(0);
            sizes.push((href.to_string(), size));
        }
    }

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !href.to_lowercase().ends_with(".zip") {
            continue;
        }
        let url = base
            .join(href)
            .with_context(|| format!("Link inválido: {}", href))?;
        if !seen.insert(url.to_string()) {
            continue;
        }
        let name = url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or(href)
            .to_string();
        let size = sizes
            .iter()
            .find(|(h, _)| h == href)
            .map(|(_, s)| *s)
            .unwrap_or(0);
        files.push(RemoteFile {
            url: url.to_string(),
            name,
            size,
        });
    }
    Ok(files)
}

/// Filtro regex (sem diferenciar maiúsculas) sobre o nome e limite de quantidade.
pub fn apply_filters(
    mut files: Vec<RemoteFile>,
    filter: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<RemoteFile>> {
    if let Some(pattern) = filter {
        let re = regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| CnpjError::InvalidFilter(e.to_string()))?;
        files.retain(|f| re.is_match(&f.name));
    }
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    Ok(files)
}

pub fn part_path(file_path: &Path) -> PathBuf {
    let mut name = file_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Falha ao criar cliente HTTP")
}

async fn fetch_html(client: &reqwest::Client, url: &str, attempts: u64) -> Result<String> {
    let mut last_error: Option<anyhow::Error> = None;
    for attempt in 1..=attempts {
        let result: Result<String, reqwest::Error> = async {
            let resp = client
                .get(url)
                .header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                )
                .header("Accept-Language", "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7")
                .send()
                .await?
                .error_for_status()?;
            resp.text().await
        }
        .await;

        match result {
            Ok(html) => {
                if attempt > 1 {
                    ui::print_success(&format!("Conexão estabelecida na tentativa {}", attempt));
                }
                return Ok(html);
            }
            Err(e) => {
                last_error = Some(e.into());
                if attempt < attempts {
                    let wait_time = attempt * 2;
                    ui::print_warning(&format!(
                        "Tentativa {}/{} falhou. Aguardando {} segundos antes de tentar novamente...",
                        attempt, attempts, wait_time
                    ));
                    tokio::time::sleep(Duration::from_secs(wait_time)).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("Erro desconhecido"))
        .context(format!(
            "Não foi possível acessar {} após {} tentativas",
            url, attempts
        )))
}

fn folder_url(base_url: &str, folder: &str) -> String {
    format!(
        "{}/{}/",
        base_url.trim_end_matches('/'),
        folder.trim_matches('/')
    )
}

pub async fn download_files(opts: &DownloadOptions, auto_yes: bool) -> Result<DownloadReport> {
    ui::print_header("📥 Download de Arquivos da Receita Federal");
    ui::print_info(&format!("Diretório de saída: {}", opts.output_dir.display()));
    utils::ensure_dir(&opts.output_dir)?;

    ui::print_info("Conectando ao servidor da Receita Federal...");
    let client = build_client()?;

    let folder = match &opts.month {
        Some(month) => month.trim_matches('/').to_string(),
        None => {
            ui::print_verbose(&format!("Buscando pasta mais recente em: {}", opts.base_url));
            let html = fetch_html(&client, &opts.base_url, CONNECT_ATTEMPTS)
                .await
                .context("Verifique sua conexão com a internet.")?;
            parse_reference_folders(&html)?
                .pop()
                .context("Não encontrou pastas na página de dados abertos")?
                .trim_end_matches('/')
                .to_string()
        }
    };
    let url = folder_url(&opts.base_url, &folder);
    ui::print_info(&format!("Pasta de referência: {}", folder));
    ui::print_verbose(&format!("URL completa: {}", url));

    ui::print_info("Listando arquivos disponíveis...");
    let html = fetch_html(&client, &url, CONNECT_ATTEMPTS).await?;
    let listed = parse_zip_listing(&html, &url)?;
    if listed.is_empty() {
        anyhow::bail!("Nenhum arquivo ZIP encontrado em {}", url);
    }
    let mut files = apply_filters(listed, opts.filter.as_deref(), opts.limit)?;
    if files.is_empty() {
        anyhow::bail!("Nenhum arquivo corresponde ao filtro informado");
    }
    files.sort_by_key(|f| f.size);

    let total_size: u64 = files.iter().map(|f| f.size).sum();
    ui::print_success(&format!("{} arquivo(s) ZIP selecionado(s)", files.len()));
    ui::print_info(&format!("Tamanho total estimado: {}", HumanBytes(total_size)));
    for f in &files {
        ui::print_verbose(&format!("  {}: {}", f.name, HumanBytes(f.size)));
    }

    let should_download = auto_yes
        || ui::ask_confirmation_yes(&format!(
            "Deseja baixar {} arquivo(s) para {}?",
            files.len(),
            opts.output_dir.display()
        ))?;
    if !should_download {
        ui::print_info("Operação cancelada pelo usuário.");
        return Ok(DownloadReport::default());
    }

    let parallel = opts.parallel.max(1);
    ui::print_info(&format!(
        "Iniciando downloads paralelos ({} arquivos simultâneos)...",
        parallel
    ));
    ui::print_separator();

    let total_files = files.len();
    let multi = if ui::is_quiet() {
        MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };
    let pb_overall = multi.add(ProgressBar::new(total_files as u64));
    pb_overall.set_style(
        ProgressStyle::default_bar()
            .template("📊 Total: [{bar:40.cyan/blue}] {pos}/{len} arquivos ({percent}%) | {msg}")?
            .progress_chars("#>-"),
    );
    pb_overall.set_message("Iniciando downloads...");

    let semaphore = Arc::new(Semaphore::new(parallel));
    let mut tasks = Vec::with_capacity(total_files);

    for (idx, remote) in files.into_iter().enumerate() {
        let client = client.clone();
        let multi = multi.clone();
        let pb_overall = pb_overall.clone();
        let semaphore = Arc::clone(&semaphore);
        let file_path = opts.output_dir.join(&remote.name);

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| anyhow::anyhow!("Erro ao adquirir semáforo: {}", e))?;

            let pb = multi.add(ProgressBar::new(remote.size));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} | {msg}")?
                    .progress_chars("#>-"),
            );
            pb.set_message(format!("{} ({}/{})", remote.name, idx + 1, total_files));

            let result = download_with_retries(&client, &remote, &file_path, &pb).await;
            pb_overall.inc(1);
            result.map(|outcome| (remote.name, outcome))
        }));
    }

    let mut report = DownloadReport::default();
    let mut errors = Vec::new();
    for result in join_all(tasks).await {
        match result {
            Ok(Ok((name, Outcome::Downloaded))) => report.downloaded.push(name),
            Ok(Ok((name, Outcome::AlreadyPresent))) => report.skipped.push(name),
            Ok(Err(e)) => errors.push(e),
            Err(e) => errors.push(anyhow::anyhow!("Erro na task: {}", e)),
        }
    }
    pb_overall.finish_with_message("Download concluído!");

    ui::print_separator();
    ui::print_statistics(&[
        ("Baixados", report.downloaded.len() as u64),
        ("Já existentes e íntegros", report.skipped.len() as u64),
        ("Falhas", errors.len() as u64),
    ]);

    if !errors.is_empty() {
        ui::print_error(&format!("{} erro(s) durante o download:", errors.len()));
        for error in &errors {
            ui::print_error(&format!("  - {:#}", error));
        }
        anyhow::bail!("{} arquivo(s) não foram baixados", errors.len());
    }

    ui::print_success("Download concluído!");
    Ok(report)
}

async fn download_with_retries(
    client: &reqwest::Client,
    remote: &RemoteFile,
    file_path: &Path,
    pb: &ProgressBar,
) -> Result<Outcome> {
    if file_path.exists() {
        match extract::verify_zip(file_path) {
            Ok(()) => {
                pb.finish_with_message(format!("✓ {} já existe e está íntegro", remote.name));
                return Ok(Outcome::AlreadyPresent);
            }
            Err(e) => {
                tracing::warn!(arquivo = %remote.name, "ZIP existente corrompido: {:#}", e);
                pb.set_message(format!("{} corrompido, baixando novamente", remote.name));
                fs::remove_file(file_path)
                    .with_context(|| format!("Falha ao remover {}", file_path.display()))?;
            }
        }
    }

    let mut last_error = None;
    for attempt in 1..=DOWNLOAD_ATTEMPTS {
        match download_single_file_with_progress(client, &remote.url, file_path, pb, attempt).await
        {
            Ok(()) => {
                pb.finish_with_message(format!("✓ {} concluído", remote.name));
                return Ok(Outcome::Downloaded);
            }
            Err(e) => {
                tracing::debug!(arquivo = %remote.name, attempt, "falha no download: {:#}", e);
                last_error = Some(e);
                if attempt < DOWNLOAD_ATTEMPTS {
                    let wait_time = attempt * 3;
                    pb.set_message(format!(
                        "{} | Tentativa {}/{} falhou, aguardando {}s...",
                        remote.name, attempt, DOWNLOAD_ATTEMPTS, wait_time
                    ));
                    tokio::time::sleep(Duration::from_secs(wait_time)).await;
                }
            }
        }
    }

    pb.abandon_with_message(format!("✗ {} falhou", remote.name));
    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("Falha no download"))
        .context(format!(
            "{}: falha após {} tentativas",
            remote.name, DOWNLOAD_ATTEMPTS
        )))
}

fn total_from_content_range(value: &str) -> Option<u64> {
    // "bytes 100-199/500"
    value.rsplit('/').next()?.trim().parse().ok()
}

/// Baixa para `<arquivo>.part`, retomando com `Range` quando o parcial existe,
/// e renomeia para o nome final depois de validar o ZIP.
async fn download_single_file_with_progress(
    client: &reqwest::Client,
    url: &str,
    file_path: &Path,
    pb: &ProgressBar,
    attempt: u64,
) -> Result<()> {
    let part = part_path(file_path);
    let filename = utils::file_name(file_path).to_string();

    let mut start_from = fs::metadata(&part).map(|m| m.len()).unwrap_or(0);
    let mut request = client.get(url);
    if start_from > 0 {
        pb.set_message(format!(
            "{} | Retomando download de {}...",
            filename,
            HumanBytes(start_from)
        ));
        request = request.header(reqwest::header::RANGE, format!("bytes={}-", start_from));
    }

    // Timeout progressivo: 10, 15, 20, 30 e 40 minutos
    let timeout_duration = match attempt {
        1 => Duration::from_secs(600),
        2 => Duration::from_secs(900),
        3 => Duration::from_secs(1200),
        4 => Duration::from_secs(1800),
        _ => Duration::from_secs(2400),
    };

    let response = tokio::time::timeout(timeout_duration, request.send())
        .await
        .map_err(|_| anyhow::anyhow!("Timeout ao iniciar download ({}s)", timeout_duration.as_secs()))?
        .with_context(|| format!("Erro ao iniciar download de {}", url))?;

    let status = response.status();
    if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE && start_from > 0 {
        // parcial já tem o arquivo inteiro
        fs::rename(&part, file_path)?;
        return extract::verify_zip(file_path).map_err(|e| {
            let _ = fs::remove_file(file_path);
            e
        });
    }
    if !status.is_success() {
        anyhow::bail!("Erro HTTP {} ao baixar {}", status, url);
    }

    let resuming = start_from > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
    if !resuming {
        start_from = 0;
    }
    let total_size = if resuming {
        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range)
            .unwrap_or_else(|| response.content_length().unwrap_or(0) + start_from)
    } else {
        response.content_length().unwrap_or(0)
    };

    let file = if resuming {
        fs::OpenOptions::new().append(true).open(&part)?
    } else {
        fs::File::create(&part)?
    };
    let mut writer = BufWriter::with_capacity(8 * 1024 * 1024, file);

    pb.set_length(total_size);
    pb.set_position(start_from);

    let mut downloaded = start_from;
    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::time::timeout(STALL_TIMEOUT, stream.next())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Download travado: sem dados por mais de {} minutos",
                    STALL_TIMEOUT.as_secs() / 60
                )
            })?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        writer.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    writer.flush()?;
    drop(writer);

    if total_size > 0 && downloaded < total_size {
        anyhow::bail!("Download incompleto: {} de {} bytes", downloaded, total_size);
    }

    fs::rename(&part, file_path)
        .with_context(|| format!("Falha ao renomear {}", part.display()))?;
    extract::verify_zip(file_path).map_err(|e| {
        let _ = fs::remove_file(file_path);
        e
    })?;

    tracing::debug!(arquivo = %filename, bytes = downloaded, "download concluído");
    Ok(())
}
