//! Constantes do layout da Receita Federal e opções dos comandos.

use std::path::PathBuf;
use std::time::Duration;

pub const URL_DADOS_ABERTOS: &str =
    "https://arquivos.receitafederal.gov.br/dados/cnpj/dados_abertos_cnpj/";

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_DATABASE: &str = "dados-publicos/cnpj.duckdb";

// Layout dos CSV publicados
pub const CSV_DELIMITER: u8 = b';';
pub const CSV_QUOTE: u8 = b'"';

/// Prefixo gravado nos CSV exportados para o Excel reconhecer UTF-8.
pub const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Quantidade de bytes inspecionada para decidir entre UTF-8 e Latin-1.
pub const ENCODING_SNIFF_BYTES: usize = 1024 * 1024;

/// Quantidade de ZIPs de uma publicação mensal completa.
pub const EXPECTED_ZIP_COUNT: usize = 37;

pub const CONNECT_ATTEMPTS: u64 = 5;
pub const DOWNLOAD_ATTEMPTS: u64 = 5;
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(1800);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const STALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Opções do comando `download`.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub base_url: String,
    /// Pasta do mês (`2025-07`); `None` usa a mais recente.
    pub month: Option<String>,
    pub output_dir: PathBuf,
    pub filter: Option<String>,
    pub limit: Option<usize>,
    pub parallel: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            base_url: URL_DADOS_ABERTOS.to_string(),
            month: None,
            output_dir: PathBuf::from("dados-publicos-zip"),
            filter: None,
            limit: None,
            parallel: 3,
        }
    }
}

/// Opções do comando `ingest`.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub input_dir: PathBuf,
    /// Onde os CSV são descompactados temporariamente.
    pub work_dir: PathBuf,
    pub filter: Option<String>,
    pub limit: Option<usize>,
    pub keep_csv: bool,
    pub delete_zip: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("dados-publicos-zip"),
            work_dir: PathBuf::from("dados-publicos/csv_tmp"),
            filter: None,
            limit: None,
            keep_csv: false,
            delete_zip: false,
        }
    }
}
