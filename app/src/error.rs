use thiserror::Error;

/// Falhas de domínio que os chamadores precisam distinguir (servidor HTTP,
/// códigos de saída). Erros de I/O e de banco seguem como `anyhow::Error`.
#[derive(Debug, Error)]
pub enum CnpjError {
    #[error("CNPJ inválido: deve ter 14 dígitos (recebido: {0:?})")]
    InvalidCnpj(String),

    #[error("Filtro inválido: {0}")]
    InvalidFilter(String),

    #[error("Tabelas obrigatórias vazias ou ausentes: {}", .0.join(", "))]
    MissingTables(Vec<String>),

    #[error("CNPJ não encontrado na base: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tables_lists_every_table() {
        let err = CnpjError::MissingTables(vec!["empresas".into(), "estabelecimentos".into()]);
        assert_eq!(
            err.to_string(),
            "Tabelas obrigatórias vazias ou ausentes: empresas, estabelecimentos"
        );
    }

    #[test]
    fn downcast_through_anyhow() {
        let err: anyhow::Error = CnpjError::NotFound("11222333000181".into()).into();
        assert!(matches!(
            err.downcast_ref::<CnpjError>(),
            Some(CnpjError::NotFound(_))
        ));
    }
}
