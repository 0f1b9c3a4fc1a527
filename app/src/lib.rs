//! Dados públicos de CNPJ da Receita Federal em DuckDB: download, carga,
//! consultas filtradas e exportação.

pub mod catalog;
pub mod cleaning;
pub mod cnae_secundaria;
pub mod cnpj;
pub mod config;
pub mod database;
pub mod download;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod lookup;
pub mod models;
pub mod query;
pub mod server;
pub mod summary;
pub mod ui;
pub mod utils;
