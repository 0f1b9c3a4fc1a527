use anyhow::{Context, Result};
use duckdb::{params, Connection, OptionalExt};
use serde::Serialize;

use crate::cnpj::Cnpj;
use crate::error::CnpjError;
use crate::models::{self, Empresa, Estabelecimento, Simples, Socio};
use crate::ui;

/// Tudo o que a base sabe sobre um CNPJ.
#[derive(Debug, Clone, Serialize)]
pub struct CnpjReport {
    pub cnpj: String,
    pub empresa: Option<Empresa>,
    pub simples: Option<Simples>,
    pub estabelecimento: Estabelecimento,
    pub socios: Vec<Socio>,
}

fn buscar_empresa(conn: &Connection, cnpj_basico: &str) -> Result<Option<Empresa>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT
            e.cnpj_basico, e.razao_social,
            e.natureza_juridica, nat.descricao,
            e.qualificacao_responsavel, q.descricao,
            e.capital_social_empresa, e.porte_empresa, e.ente_federativo_responsavel
        FROM empresas e
        LEFT JOIN naturezas nat
            ON TRY_CAST(nat.codigo AS INTEGER) = TRY_CAST(e.natureza_juridica AS INTEGER)
        LEFT JOIN qualificacoes q
            ON TRY_CAST(q.codigo AS INTEGER) = TRY_CAST(e.qualificacao_responsavel AS INTEGER)
        WHERE e.cnpj_basico = ?
        LIMIT 1
        "#,
    )?;

    let empresa = stmt
        .query_row(params![cnpj_basico], |row| {
            let porte: Option<String> = row.get(7)?;
            Ok(Empresa {
                cnpj_basico: row.get(0)?,
                razao_social: row.get(1)?,
                natureza_juridica: row.get(2)?,
                natureza_juridica_desc: row.get(3)?,
                qualificacao_responsavel: row.get(4)?,
                qualificacao_responsavel_desc: row.get(5)?,
                capital_social: row.get(6)?,
                porte_empresa_desc: porte.as_deref().map(|p| models::porte_label(p).to_string()),
                porte_empresa: porte,
                ente_federativo_responsavel: row.get(8)?,
            })
        })
        .optional()
        .context("Erro ao buscar empresa")?;
    Ok(empresa)
}

fn buscar_estabelecimento(conn: &Connection, cnpj: &Cnpj) -> Result<Option<Estabelecimento>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT
            est.cnpj_basico || est.cnpj_ordem || est.cnpj_dv,
            est.identificador_matriz_filial, est.nome_fantasia,
            est.situacao_cadastral, est.data_situacao_cadastral,
            est.motivo_situacao_cadastral, mot.descricao,
            est.pais, pa.descricao,
            est.data_inicio_atividade,
            est.cnae_fiscal_principal, cn.descricao, est.cnae_fiscal_secundaria,
            est.tipo_logradouro, est.logradouro, est.numero, est.complemento,
            est.bairro, est.cep, est.uf,
            est.municipio, mun.descricao,
            COALESCE(est.ddd_1, '') || COALESCE(est.telefone_1, ''),
            COALESCE(est.ddd_2, '') || COALESCE(est.telefone_2, ''),
            COALESCE(est.ddd_fax, '') || COALESCE(est.fax, ''),
            est.correio_eletronico
        FROM estabelecimentos est
        LEFT JOIN motivos mot
            ON TRY_CAST(mot.codigo AS INTEGER) = TRY_CAST(est.motivo_situacao_cadastral AS INTEGER)
        LEFT JOIN paises pa
            ON TRY_CAST(pa.codigo AS INTEGER) = TRY_CAST(est.pais AS INTEGER)
        LEFT JOIN cnaes cn
            ON TRY_CAST(cn.codigo AS INTEGER) = TRY_CAST(est.cnae_fiscal_principal AS INTEGER)
        LEFT JOIN municipios mun
            ON TRY_CAST(mun.codigo AS INTEGER) = TRY_CAST(est.municipio AS INTEGER)
        WHERE est.cnpj_basico = ? AND est.cnpj_ordem = ? AND est.cnpj_dv = ?
        LIMIT 1
        "#,
    )?;

    let estabelecimento = stmt
        .query_row(params![cnpj.basico(), cnpj.ordem(), cnpj.dv()], |row| {
            let situacao: Option<String> = row.get(3)?;
            Ok(Estabelecimento {
                cnpj: row.get(0)?,
                identificador_matriz_filial: row
                    .get::<_, Option<String>>(1)?
                    .map(|c| models::matriz_filial_label(&c)),
                nome_fantasia: row.get(2)?,
                situacao_cadastral_desc: situacao
                    .as_deref()
                    .map(|s| models::situacao_label(s).to_string()),
                situacao_cadastral: situacao,
                data_situacao_cadastral: row.get(4)?,
                motivo_situacao_cadastral: row.get(5)?,
                motivo_situacao_cadastral_desc: row.get(6)?,
                pais: row.get(7)?,
                pais_desc: row.get(8)?,
                data_inicio_atividade: row.get(9)?,
                cnae_fiscal_principal: row.get(10)?,
                cnae_fiscal_principal_desc: row.get(11)?,
                cnae_fiscal_secundaria: row.get(12)?,
                tipo_logradouro: row.get(13)?,
                logradouro: row.get(14)?,
                numero: row.get(15)?,
                complemento: row.get(16)?,
                bairro: row.get(17)?,
                cep: row.get(18)?,
                uf: row.get(19)?,
                municipio: row.get(20)?,
                municipio_desc: row.get(21)?,
                telefone1: row.get(22)?,
                telefone2: row.get(23)?,
                fax: row.get(24)?,
                correio_eletronico: row.get(25)?,
            })
        })
        .optional()
        .context("Erro ao buscar estabelecimento")?;
    Ok(estabelecimento)
}

fn buscar_socios(conn: &Connection, cnpj_basico: &str) -> Result<Vec<Socio>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT
            s.identificador_socio, s.nome_socio_ou_razao_social, s.cnpj_cpf_socio,
            s.qualificacao_socio, q.descricao, s.data_entrada_sociedade, s.pais,
            s.representante_legal, s.nome_representante,
            s.qualificacao_representante_legal, s.faixa_etaria
        FROM socios s
        LEFT JOIN qualificacoes q
            ON TRY_CAST(q.codigo AS INTEGER) = TRY_CAST(s.qualificacao_socio AS INTEGER)
        WHERE s.cnpj_basico = ?
        ORDER BY s.nome_socio_ou_razao_social
        "#,
    )?;

    let rows = stmt.query_map(params![cnpj_basico], |row| {
        Ok(Socio {
            identificador_socio: row.get(0)?,
            nome_socio_ou_razao_social: row.get(1)?,
            cnpj_cpf_socio: row.get(2)?,
            qualificacao_socio: row.get(3)?,
            qualificacao_socio_desc: row.get(4)?,
            data_entrada_sociedade: row.get(5)?,
            pais: row.get(6)?,
            representante_legal: row.get(7)?,
            nome_representante: row.get(8)?,
            qualificacao_representante_legal: row.get(9)?,
            faixa_etaria: row.get(10)?,
        })
    })?;

    let socios = rows
        .collect::<Result<Vec<_>, _>>()
        .context("Erro ao buscar sócios")?;
    Ok(socios)
}

fn buscar_simples(conn: &Connection, cnpj_basico: &str) -> Result<Option<Simples>> {
    let simples = conn
        .query_row(
            r#"
            SELECT opcao_simples, data_opcao_simples, data_exclusao_simples,
                   opcao_mei, data_opcao_mei, data_exclusao_mei
            FROM simples
            WHERE cnpj_basico = ?
            LIMIT 1
            "#,
            params![cnpj_basico],
            |row| {
                Ok(Simples {
                    opcao_simples: row.get(0)?,
                    data_opcao_simples: row.get(1)?,
                    data_exclusao_simples: row.get(2)?,
                    opcao_mei: row.get(3)?,
                    data_opcao_mei: row.get(4)?,
                    data_exclusao_mei: row.get(5)?,
                })
            },
        )
        .optional()
        .context("Erro ao buscar Simples")?;
    Ok(simples)
}

/// Busca o estabelecimento do CNPJ completo e os dados ligados ao CNPJ básico.
pub fn lookup_cnpj(conn: &Connection, cnpj: &Cnpj) -> Result<CnpjReport> {
    let estabelecimento = buscar_estabelecimento(conn, cnpj)?
        .ok_or_else(|| CnpjError::NotFound(cnpj.formatted()))?;

    Ok(CnpjReport {
        cnpj: cnpj.as_str().to_string(),
        empresa: buscar_empresa(conn, cnpj.basico())?,
        simples: buscar_simples(conn, cnpj.basico())?,
        estabelecimento,
        socios: buscar_socios(conn, cnpj.basico())?,
    })
}

fn show(value: &Option<String>) -> &str {
    value.as_deref().filter(|v| !v.is_empty()).unwrap_or("-")
}

fn with_desc(code: &Option<String>, desc: &Option<String>) -> String {
    match desc.as_deref() {
        Some(d) if !d.is_empty() => format!("{} - {}", show(code), d),
        _ => show(code).to_string(),
    }
}

pub fn print_report(report: &CnpjReport) {
    let est = &report.estabelecimento;
    let titulo = report
        .empresa
        .as_ref()
        .and_then(|e| e.razao_social.clone())
        .unwrap_or_else(|| report.cnpj.clone());
    ui::print_header(&format!("🏢 {}", titulo));

    ui::print_field("CNPJ", &est.cnpj);
    ui::print_field("Matriz/Filial", show(&est.identificador_matriz_filial));
    ui::print_field("Nome fantasia", show(&est.nome_fantasia));
    ui::print_field(
        "Situação cadastral",
        &with_desc(&est.situacao_cadastral, &est.situacao_cadastral_desc),
    );
    ui::print_field("Data da situação", show(&est.data_situacao_cadastral));
    ui::print_field(
        "Motivo",
        &with_desc(&est.motivo_situacao_cadastral, &est.motivo_situacao_cadastral_desc),
    );
    ui::print_field("Início de atividade", show(&est.data_inicio_atividade));
    ui::print_field(
        "CNAE principal",
        &with_desc(&est.cnae_fiscal_principal, &est.cnae_fiscal_principal_desc),
    );
    ui::print_field("CNAEs secundários", show(&est.cnae_fiscal_secundaria));

    let endereco = [
        &est.tipo_logradouro,
        &est.logradouro,
        &est.numero,
        &est.complemento,
        &est.bairro,
    ]
    .iter()
    .filter_map(|v| v.as_deref().filter(|s| !s.is_empty()))
    .collect::<Vec<_>>()
    .join(" ");
    ui::print_field("Endereço", if endereco.is_empty() { "-" } else { &endereco });
    ui::print_field("CEP", show(&est.cep));
    ui::print_field(
        "Município/UF",
        &format!(
            "{} / {}",
            with_desc(&est.municipio, &est.municipio_desc),
            show(&est.uf)
        ),
    );
    ui::print_field("País", &with_desc(&est.pais, &est.pais_desc));
    ui::print_field("Telefone 1", if est.telefone1.is_empty() { "-" } else { &est.telefone1 });
    ui::print_field("Telefone 2", if est.telefone2.is_empty() { "-" } else { &est.telefone2 });
    ui::print_field("E-mail", show(&est.correio_eletronico));

    if let Some(emp) = &report.empresa {
        ui::print_header("Empresa");
        ui::print_field(
            "Natureza jurídica",
            &with_desc(&emp.natureza_juridica, &emp.natureza_juridica_desc),
        );
        ui::print_field(
            "Qualificação do resp.",
            &with_desc(&emp.qualificacao_responsavel, &emp.qualificacao_responsavel_desc),
        );
        ui::print_field("Capital social", show(&emp.capital_social));
        ui::print_field("Porte", &with_desc(&emp.porte_empresa, &emp.porte_empresa_desc));
    }

    if let Some(sim) = &report.simples {
        ui::print_header("Simples Nacional / MEI");
        ui::print_field("Opção pelo Simples", show(&sim.opcao_simples));
        ui::print_field("Data opção Simples", show(&sim.data_opcao_simples));
        ui::print_field("Opção pelo MEI", show(&sim.opcao_mei));
        ui::print_field("Data opção MEI", show(&sim.data_opcao_mei));
    }

    if !report.socios.is_empty() {
        ui::print_header(&format!("Sócios ({})", report.socios.len()));
        for socio in &report.socios {
            ui::print_field(
                show(&socio.nome_socio_ou_razao_social),
                &with_desc(&socio.qualificacao_socio, &socio.qualificacao_socio_desc),
            );
        }
    }
}

/// Comando `lookup`: valida, consulta e imprime (relatório ou JSON).
pub fn run(conn: &Connection, input: &str, json: bool) -> Result<()> {
    let cnpj = Cnpj::parse(input)?;
    if !cnpj.has_valid_check_digits() {
        ui::print_warning(&format!(
            "Dígitos verificadores não conferem para {}",
            cnpj.formatted()
        ));
    }

    let report = lookup_cnpj(conn, &cnpj)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::Database;

    pub(crate) fn seeded() -> Result<Database> {
        let db = Database::open_in_memory()?;
        db.get_connection().execute_batch(
            r#"
            INSERT INTO empresas VALUES
                ('11222333', 'ALFA COMERCIO LTDA', '2062', '49', '1000,00', '01', NULL);
            INSERT INTO estabelecimentos
                (cnpj_basico, cnpj_ordem, cnpj_dv, identificador_matriz_filial, nome_fantasia,
                 situacao_cadastral, motivo_situacao_cadastral, pais, cnae_fiscal_principal,
                 uf, municipio, ddd_1, telefone_1)
            VALUES
                ('11222333', '0001', '81', '1', 'ALFA', '02', '00', NULL, '4781400',
                 'MG', '5403', '34', '32101234');
            INSERT INTO socios VALUES
                ('11222333', '2', 'MARIA DA SILVA', '***123456**', '49', '20100101',
                 NULL, '***000000**', NULL, '00', '5'),
                ('11222333', '2', 'JOAO DE SOUZA', '***654321**', '22', '20100101',
                 NULL, '***000000**', NULL, '00', '4');
            INSERT INTO naturezas VALUES ('2062', 'Sociedade Empresária Limitada');
            INSERT INTO qualificacoes VALUES ('49', 'Sócio-Administrador'), ('22', 'Sócio');
            INSERT INTO motivos VALUES ('00', 'SEM MOTIVO');
            INSERT INTO municipios VALUES ('5403', 'UBERLANDIA');
            INSERT INTO simples VALUES ('11222333', 'S', '20100101', NULL, 'N', NULL, NULL);
            "#,
        )?;
        Ok(db)
    }

    #[test]
    fn finds_full_report() -> Result<()> {
        let db = seeded()?;
        let cnpj = Cnpj::parse("11.222.333/0001-81")?;
        let report = lookup_cnpj(db.get_connection(), &cnpj)?;

        let est = &report.estabelecimento;
        assert_eq!(est.cnpj, "11222333000181");
        assert_eq!(est.identificador_matriz_filial.as_deref(), Some("MATRIZ"));
        assert_eq!(est.situacao_cadastral_desc.as_deref(), Some("ATIVA"));
        assert_eq!(est.motivo_situacao_cadastral_desc.as_deref(), Some("SEM MOTIVO"));
        assert_eq!(est.municipio_desc.as_deref(), Some("UBERLANDIA"));
        assert_eq!(est.telefone1, "3432101234");
        assert_eq!(est.fax, "");

        let emp = report.empresa.as_ref().expect("empresa");
        assert_eq!(
            emp.natureza_juridica_desc.as_deref(),
            Some("Sociedade Empresária Limitada")
        );
        assert_eq!(emp.porte_empresa_desc.as_deref(), Some("MICRO EMPRESA"));

        let nomes: Vec<_> = report
            .socios
            .iter()
            .map(|s| s.nome_socio_ou_razao_social.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(nomes, vec!["JOAO DE SOUZA", "MARIA DA SILVA"]);
        assert_eq!(report.socios[0].qualificacao_socio_desc.as_deref(), Some("Sócio"));
        assert_eq!(
            report.simples.as_ref().and_then(|s| s.opcao_simples.as_deref()),
            Some("S")
        );
        Ok(())
    }

    #[test]
    fn unknown_cnpj_is_not_found() -> Result<()> {
        let db = seeded()?;
        let cnpj = Cnpj::parse("11222333000262")?;
        let err = lookup_cnpj(db.get_connection(), &cnpj).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CnpjError>(),
            Some(CnpjError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn serializes_to_json() -> Result<()> {
        let db = seeded()?;
        let cnpj = Cnpj::parse("11222333000181")?;
        let report = lookup_cnpj(db.get_connection(), &cnpj)?;
        let value = serde_json::to_value(&report)?;
        assert_eq!(value["cnpj"], "11222333000181");
        assert_eq!(value["empresa"]["razao_social"], "ALFA COMERCIO LTDA");
        assert_eq!(value["socios"].as_array().map(|a| a.len()), Some(2));
        Ok(())
    }
}
