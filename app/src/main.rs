use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use cnpj_duckdb::config::{self, DownloadOptions, IngestOptions};
use cnpj_duckdb::database::Database;
use cnpj_duckdb::query::{self, ExportFilter};
use cnpj_duckdb::summary::{self, SummaryFilter};
use cnpj_duckdb::{
    catalog, cleaning, cnae_secundaria, download, ingest, logging, lookup, server, ui,
};

#[derive(Parser)]
#[command(name = "cnpj-duckdb")]
#[command(about = "Dados públicos de CNPJ da Receita Federal em DuckDB", long_about = None)]
struct Cli {
    /// Pula todas as confirmações interativas (yes para tudo)
    #[arg(long, global = true)]
    yes: bool,

    /// Modo silencioso (menos saída)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Modo verboso (mais detalhes)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Caminho do banco DuckDB
    #[arg(long, global = true, env = "CNPJ_DATABASE", default_value = config::DEFAULT_DATABASE)]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Baixa os arquivos ZIP do site da Receita Federal
    Download {
        /// Página de dados abertos
        #[arg(long, env = "CNPJ_BASE_URL", default_value = config::URL_DADOS_ABERTOS)]
        base_url: String,
        /// Pasta do mês (AAAA-MM); padrão: a mais recente
        #[arg(long)]
        mes: Option<String>,
        /// Pasta para salvar os arquivos ZIP
        #[arg(short, long, default_value = "dados-publicos-zip")]
        output: PathBuf,
        /// Regex aplicada ao nome dos arquivos
        #[arg(long)]
        filter: Option<String>,
        /// Quantidade máxima de arquivos
        #[arg(long)]
        limit: Option<usize>,
        /// Downloads simultâneos
        #[arg(long, default_value_t = 3)]
        parallel: usize,
    },
    /// Carrega os ZIPs no banco DuckDB
    Ingest {
        /// Pasta com os arquivos ZIP
        #[arg(short, long, default_value = "dados-publicos-zip")]
        input: PathBuf,
        /// Pasta para descompactar os CSV
        #[arg(long, default_value = "dados-publicos/csv_tmp")]
        work_dir: PathBuf,
        /// Regex aplicada ao nome dos ZIPs
        #[arg(long)]
        filter: Option<String>,
        /// Quantidade máxima de ZIPs
        #[arg(long)]
        limit: Option<usize>,
        /// Mantém os CSV descompactados
        #[arg(long)]
        keep_csv: bool,
        /// Apaga cada ZIP depois de carregado
        #[arg(long)]
        delete_zip: bool,
        /// Threads do DuckDB
        #[arg(long, env = "CNPJ_THREADS")]
        threads: Option<usize>,
    },
    /// Exporta CNPJs filtrados para CSV
    Export {
        /// UF (duas letras)
        #[arg(long)]
        uf: Option<String>,
        /// Código ou nome do município
        #[arg(long)]
        municipio: Option<String>,
        /// Prefixo do CNAE (1 a 7 dígitos)
        #[arg(long)]
        cnae: Option<String>,
        /// Também procura o CNAE entre os secundários
        #[arg(long)]
        cnae_secundaria: bool,
        /// Portes (0,1,3,5)
        #[arg(long, value_delimiter = ',')]
        porte: Vec<u8>,
        /// Situações cadastrais (1,2,3,4,8)
        #[arg(long, value_delimiter = ',')]
        situacao: Vec<u8>,
        /// Somente ativos (situação 2) quando --situacao não é informado
        #[arg(long)]
        ativos: bool,
        /// Somente optantes pelo MEI
        #[arg(long, conflicts_with = "sem_mei")]
        mei: bool,
        /// Exclui optantes pelo MEI
        #[arg(long)]
        sem_mei: bool,
        /// Somente optantes pelo Simples
        #[arg(long)]
        simples: bool,
        /// Somente matrizes
        #[arg(long)]
        somente_matriz: bool,
        /// Quantidade máxima de linhas (0 = sem limite)
        #[arg(long)]
        limit: Option<u64>,
        /// Arquivo CSV de saída
        #[arg(long, default_value = query::DEFAULT_OUTPUT)]
        out: PathBuf,
    },
    /// Consulta um CNPJ
    Lookup {
        /// CNPJ com ou sem formatação
        cnpj: String,
        /// Saída em JSON
        #[arg(long)]
        json: bool,
    },
    /// Resumo por situação cadastral
    Situacao {
        /// UF (duas letras)
        #[arg(long)]
        uf: Option<String>,
        /// Somente optantes pelo MEI
        #[arg(long)]
        mei: bool,
        /// Situações cadastrais (1,2,3,4,8)
        #[arg(long, value_delimiter = ',')]
        situacao: Vec<u8>,
        /// Inclui filiais na contagem
        #[arg(long)]
        incluir_filiais: bool,
        /// Saída em JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove CPF/CNPJ do início e do fim dos nomes
    CleanNames,
    /// Cria tabela normalizada de CNAEs secundários
    CnaeSecundaria,
    /// Lista as colunas das tabelas
    Columns {
        /// Tabelas (todas quando omitido)
        tables: Vec<String>,
    },
    /// Exporta as tabelas para Parquet
    ExportParquet {
        /// Pasta de saída
        dir: PathBuf,
    },
    /// Inicia servidor web API para consulta de CNPJ
    Server {
        /// Porta do servidor
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Endereço do servidor
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn open_existing(path: &Path) -> Result<Database> {
    if !path.exists() {
        anyhow::bail!(
            "Banco de dados não encontrado: {} (execute `ingest` antes)",
            path.display()
        );
    }
    Database::open(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Inicializa o módulo de UI com as configurações globais
    ui::init(cli.quiet, cli.verbose);
    logging::init_logging(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Download {
            base_url,
            mes,
            output,
            filter,
            limit,
            parallel,
        } => {
            let opts = DownloadOptions {
                base_url,
                month: mes,
                output_dir: output,
                filter,
                limit,
                parallel,
            };
            download::download_files(&opts, cli.yes).await?;
        }
        Commands::Ingest {
            input,
            work_dir,
            filter,
            limit,
            keep_csv,
            delete_zip,
            threads,
        } => {
            let opts = IngestOptions {
                input_dir: input,
                work_dir,
                filter,
                limit,
                keep_csv,
                delete_zip,
            };
            let mut db = Database::open(&cli.database)?;
            if let Some(threads) = threads {
                db.set_threads(threads)?;
            }
            ingest::ingest_archives(&mut db, &opts, cli.yes)?;
        }
        Commands::Export {
            uf,
            municipio,
            cnae,
            cnae_secundaria,
            porte,
            situacao,
            ativos,
            mei,
            sem_mei,
            simples,
            somente_matriz,
            limit,
            out,
        } => {
            let filter = ExportFilter {
                uf,
                municipio,
                cnae,
                incluir_secundaria: cnae_secundaria,
                porte,
                situacao,
                ativos,
                mei,
                sem_mei,
                simples,
                somente_matriz,
                limit,
            };
            let db = open_existing(&cli.database)?;
            query::export_csv(&db, &filter, &out)?;
        }
        Commands::Lookup { cnpj, json } => {
            let db = open_existing(&cli.database)?;
            lookup::run(db.get_connection(), &cnpj, json)?;
        }
        Commands::Situacao {
            uf,
            mei,
            situacao,
            incluir_filiais,
            json,
        } => {
            let filter = SummaryFilter {
                uf,
                mei,
                situacao,
                incluir_filiais,
            };
            let db = open_existing(&cli.database)?;
            if json {
                let result = summary::situacao_summary(&db, &filter)?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                summary::run(&db, &filter)?;
            }
        }
        Commands::CleanNames => {
            let db = open_existing(&cli.database)?;
            cleaning::run(&db, cli.yes)?;
        }
        Commands::CnaeSecundaria => {
            let db = open_existing(&cli.database)?;
            cnae_secundaria::run(&db)?;
        }
        Commands::Columns { tables } => {
            let db = open_existing(&cli.database)?;
            catalog::print_columns(&db, &tables)?;
        }
        Commands::ExportParquet { dir } => {
            let db = open_existing(&cli.database)?;
            ui::print_header("📦 Exportação Parquet");
            let files = catalog::export_parquet(&db, &dir)?;
            ui::print_success(&format!("{} arquivo(s) gerado(s) em {}", files.len(), dir.display()));
        }
        Commands::Server { port, host } => {
            server::start_server(&cli.database, &host, port).await?;
        }
    }

    Ok(())
}
