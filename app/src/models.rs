use serde::Serialize;

/// Conjuntos publicados pela Receita Federal, um por tabela no DuckDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Empresas,
    Estabelecimentos,
    Simples,
    Cnaes,
    Municipios,
    Naturezas,
    Motivos,
    Socios,
    Paises,
    Qualificacoes,
}

const CODIGO_DESCRICAO: &[&str] = &["codigo", "descricao"];

impl TableKind {
    /// Ordem de detecção: a primeira palavra-chave encontrada no nome decide.
    pub const ALL: [TableKind; 10] = [
        TableKind::Empresas,
        TableKind::Estabelecimentos,
        TableKind::Simples,
        TableKind::Cnaes,
        TableKind::Municipios,
        TableKind::Naturezas,
        TableKind::Motivos,
        TableKind::Socios,
        TableKind::Paises,
        TableKind::Qualificacoes,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            TableKind::Empresas => "empresas",
            TableKind::Estabelecimentos => "estabelecimentos",
            TableKind::Simples => "simples",
            TableKind::Cnaes => "cnaes",
            TableKind::Municipios => "municipios",
            TableKind::Naturezas => "naturezas",
            TableKind::Motivos => "motivos",
            TableKind::Socios => "socios",
            TableKind::Paises => "paises",
            TableKind::Qualificacoes => "qualificacoes",
        }
    }

    /// Nome usado nos arquivos exportados (`Empresas.parquet`).
    pub fn dataset_name(self) -> &'static str {
        match self {
            TableKind::Empresas => "Empresas",
            TableKind::Estabelecimentos => "Estabelecimentos",
            TableKind::Simples => "Simples",
            TableKind::Cnaes => "Cnaes",
            TableKind::Municipios => "Municipios",
            TableKind::Naturezas => "Naturezas",
            TableKind::Motivos => "Motivos",
            TableKind::Socios => "Socios",
            TableKind::Paises => "Paises",
            TableKind::Qualificacoes => "Qualificacoes",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            TableKind::Empresas => &["empresas", "emprecsv"],
            TableKind::Estabelecimentos => &["estabele", "estabcsv"],
            TableKind::Simples => &["simples"],
            TableKind::Cnaes => &["cnaes", "cnae"],
            TableKind::Municipios => &["municipios", "municípios", "municipio", "municcsv"],
            TableKind::Naturezas => &["naturezas", "natureza", "natjucsv"],
            TableKind::Motivos => &["motivos", "motivo", "moticsv"],
            TableKind::Socios => &["socios", "sócios", "sociocsv", "socioscsv"],
            TableKind::Paises => &["paises", "países", "pais"],
            TableKind::Qualificacoes => &["qualificacoes", "qualificações", "qualif", "qualscsv"],
        }
    }

    /// Colunas na ordem do layout oficial (os arquivos não têm cabeçalho).
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Empresas => &[
                "cnpj_basico",
                "razao_social",
                "natureza_juridica",
                "qualificacao_responsavel",
                "capital_social_empresa",
                "porte_empresa",
                "ente_federativo_responsavel",
            ],
            TableKind::Estabelecimentos => &[
                "cnpj_basico",
                "cnpj_ordem",
                "cnpj_dv",
                "identificador_matriz_filial",
                "nome_fantasia",
                "situacao_cadastral",
                "data_situacao_cadastral",
                "motivo_situacao_cadastral",
                "nome_cidade_exterior",
                "pais",
                "data_inicio_atividade",
                "cnae_fiscal_principal",
                "cnae_fiscal_secundaria",
                "tipo_logradouro",
                "logradouro",
                "numero",
                "complemento",
                "bairro",
                "cep",
                "uf",
                "municipio",
                "ddd_1",
                "telefone_1",
                "ddd_2",
                "telefone_2",
                "ddd_fax",
                "fax",
                "correio_eletronico",
                "situacao_especial",
                "data_situacao_especial",
            ],
            TableKind::Socios => &[
                "cnpj_basico",
                "identificador_socio",
                "nome_socio_ou_razao_social",
                "cnpj_cpf_socio",
                "qualificacao_socio",
                "data_entrada_sociedade",
                "pais",
                "representante_legal",
                "nome_representante",
                "qualificacao_representante_legal",
                "faixa_etaria",
            ],
            TableKind::Simples => &[
                "cnpj_basico",
                "opcao_simples",
                "data_opcao_simples",
                "data_exclusao_simples",
                "opcao_mei",
                "data_opcao_mei",
                "data_exclusao_mei",
            ],
            TableKind::Cnaes
            | TableKind::Municipios
            | TableKind::Naturezas
            | TableKind::Motivos
            | TableKind::Paises
            | TableKind::Qualificacoes => CODIGO_DESCRICAO,
        }
    }

    pub fn from_table_name(name: &str) -> Option<TableKind> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|k| k.table_name() == name)
    }

    /// Detecta o conjunto pelo nome do arquivo (`K3241.K03200Y0.D50712.EMPRECSV`,
    /// `Estabelecimentos3.zip`, ...).
    pub fn detect(file_name: &str) -> Option<TableKind> {
        let name = file_name.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.keywords().iter().any(|k| name.contains(k)))
    }
}

pub fn situacao_label(code: &str) -> &'static str {
    match code.trim().trim_start_matches('0') {
        "1" => "NULA",
        "2" => "ATIVA",
        "3" => "SUSPENSA",
        "4" => "INAPTA",
        "8" => "BAIXADA",
        _ => "DESCONHECIDA",
    }
}

pub fn porte_label(code: &str) -> &'static str {
    match code.trim() {
        "00" | "0" => "NAO INFORMADO",
        "01" | "1" => "MICRO EMPRESA",
        "03" | "3" => "EMPRESA DE PEQUENO PORTE",
        "05" | "5" => "DEMAIS",
        _ => "DESCONHECIDO",
    }
}

pub fn matriz_filial_label(code: &str) -> String {
    match code.trim() {
        "1" => "MATRIZ".to_string(),
        "2" => "FILIAL".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Empresa {
    pub cnpj_basico: String,
    pub razao_social: Option<String>,
    pub natureza_juridica: Option<String>,
    pub natureza_juridica_desc: Option<String>,
    pub qualificacao_responsavel: Option<String>,
    pub qualificacao_responsavel_desc: Option<String>,
    pub capital_social: Option<String>,
    pub porte_empresa: Option<String>,
    pub porte_empresa_desc: Option<String>,
    pub ente_federativo_responsavel: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Estabelecimento {
    pub cnpj: String,
    pub identificador_matriz_filial: Option<String>,
    pub nome_fantasia: Option<String>,
    pub situacao_cadastral: Option<String>,
    pub situacao_cadastral_desc: Option<String>,
    pub data_situacao_cadastral: Option<String>,
    pub motivo_situacao_cadastral: Option<String>,
    pub motivo_situacao_cadastral_desc: Option<String>,
    pub pais: Option<String>,
    pub pais_desc: Option<String>,
    pub data_inicio_atividade: Option<String>,
    pub cnae_fiscal_principal: Option<String>,
    pub cnae_fiscal_principal_desc: Option<String>,
    pub cnae_fiscal_secundaria: Option<String>,
    pub tipo_logradouro: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub cep: Option<String>,
    pub uf: Option<String>,
    pub municipio: Option<String>,
    pub municipio_desc: Option<String>,
    pub telefone1: String,
    pub telefone2: String,
    pub fax: String,
    pub correio_eletronico: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Socio {
    pub identificador_socio: Option<String>,
    pub nome_socio_ou_razao_social: Option<String>,
    pub cnpj_cpf_socio: Option<String>,
    pub qualificacao_socio: Option<String>,
    pub qualificacao_socio_desc: Option<String>,
    pub data_entrada_sociedade: Option<String>,
    pub pais: Option<String>,
    pub representante_legal: Option<String>,
    pub nome_representante: Option<String>,
    pub qualificacao_representante_legal: Option<String>,
    pub faixa_etaria: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Simples {
    pub opcao_simples: Option<String>,
    pub data_opcao_simples: Option<String>,
    pub data_exclusao_simples: Option<String>,
    pub opcao_mei: Option<String>,
    pub data_opcao_mei: Option<String>,
    pub data_exclusao_mei: Option<String>,
}
