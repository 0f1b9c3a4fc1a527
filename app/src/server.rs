use actix_web::{web, HttpResponse, Result as ActixResult};
use anyhow::Context;
use duckdb::{Connection, OptionalExt};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::cnpj::Cnpj;
use crate::database::Database;
use crate::error::CnpjError;
use crate::lookup;
use crate::ui;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }
}

fn internal_error(message: String) -> actix_web::Error {
    tracing::error!("{}", message);
    actix_web::error::ErrorInternalServerError(message)
}

pub async fn consultar_cnpj(
    cnpj: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let recebido = cnpj.into_inner();
    let cnpj = match Cnpj::parse(&recebido) {
        Ok(cnpj) => cnpj,
        Err(e) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "erro": e.to_string(),
                "cnpj_recebido": recebido
            })));
        }
    };

    let db = state.db.clone();
    let result = web::block(move || -> anyhow::Result<lookup::CnpjReport> {
        let conn = db
            .lock()
            .map_err(|_| anyhow::anyhow!("conexão com o banco indisponível"))?;
        lookup::lookup_cnpj(&conn, &cnpj)
    })
    .await
    .map_err(|e| internal_error(format!("Erro ao executar consulta: {}", e)))?;

    match result {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(e) => match e.downcast_ref::<CnpjError>() {
            Some(CnpjError::NotFound(_)) => Ok(HttpResponse::NotFound().json(serde_json::json!({
                "erro": e.to_string()
            }))),
            _ => Err(internal_error(format!("Erro ao consultar CNPJ: {:#}", e))),
        },
    }
}

pub async fn health_check(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let db = state.db.clone();
    let referencia = web::block(move || -> anyhow::Result<Option<String>> {
        let conn = db
            .lock()
            .map_err(|_| anyhow::anyhow!("conexão com o banco indisponível"))?;
        let valor: Option<String> = conn
            .query_row(
                "SELECT valor FROM _referencia WHERE referencia = 'CNPJ'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(valor)
    })
    .await
    .map_err(|e| internal_error(format!("Erro no health check: {}", e)))?
    .map_err(|e| internal_error(format!("Erro no health check: {:#}", e)))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "mensagem": "API CNPJ está funcionando",
        "referencia": referencia
    })))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/cnpj/{cnpj}", web::get().to(consultar_cnpj))
        .route("/health", web::get().to(health_check));
}

pub async fn start_server(db_path: &Path, host: &str, port: u16) -> anyhow::Result<()> {
    if !db_path.exists() {
        anyhow::bail!(
            "Banco de dados não encontrado: {} (execute `ingest` antes)",
            db_path.display()
        );
    }
    let db = Database::open(db_path)
        .with_context(|| format!("Falha ao abrir banco de dados: {}", db_path.display()))?;
    let app_state = web::Data::new(AppState::new(db.into_connection()));

    let address = format!("{}:{}", host, port);

    ui::print_header("🌐 Servidor API REST");
    ui::print_success(&format!("Servidor iniciando em http://{}", address));
    ui::print_info("Endpoints disponíveis:");
    ui::print_field("GET /cnpj/{cnpj}", "dados completos de um CNPJ");
    ui::print_field("GET /health", "status do servidor");
    ui::print_verbose(&format!(
        "Exemplo: curl http://{}/cnpj/00000000000191",
        address
    ));
    ui::print_separator();

    actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .app_data(app_state.clone())
            .configure(routes)
    })
    .bind(&address)
    .with_context(|| format!("Falha ao abrir {}", address))?
    .workers(num_cpus::get())
    .run()
    .await?;

    Ok(())
}
