//! Logs de diagnóstico (`tracing`). A saída para o usuário fica no módulo `ui`.

use tracing_subscriber::EnvFilter;

/// Nível padrão quando `RUST_LOG` não está definido.
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, true) => "debug",
        (false, false) => "warn",
    }
}

/// Inicializa o subscriber global. `RUST_LOG` tem precedência sobre as flags.
pub fn init_logging(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Falha ao inicializar logs: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(default_directive(true, true), "error");
        assert_eq!(default_directive(false, true), "debug");
        assert_eq!(default_directive(false, false), "warn");
    }
}
