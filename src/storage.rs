use crate::types::{Target, TargetStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use tracing::warn;

/// Acesso ao banco via pool: cada chamada adquire uma conexão do pool e a
/// devolve ao sair de escopo, em qualquer caminho de saída.
///
/// Tabelas esperadas:
/// - `monitored_links (id, name, address, status, latency_ms DOUBLE PRECISION
///   NOT NULL DEFAULT 0, status_changed_at)` — `latency_ms` nulo ou de tipo
///   errado é lido como 0, não derruba o ciclo
/// - `settings (code, value int4)` — linha malformada cai no default do código
pub struct Storage {
    pool: Pool,
}

impl Storage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pg_config = database_url
            .parse::<tokio_postgres::Config>()
            .context("database_url inválida")?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .context("falha ao criar o pool de conexões")?;
        Ok(Self { pool })
    }

    /// Snapshot de todos os enlaces monitorados.
    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, name, address, status, latency_ms, status_changed_at \
                 FROM monitored_links ORDER BY id",
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(Target::from).collect())
    }

    /// Grava a observação de um ciclo para um enlace: status, latência e o
    /// momento da última mudança de status. Chamado uma vez por enlace por
    /// ciclo, mesmo sem mudança de status (a latência é sempre atualizada).
    pub async fn update_target_observation(
        &self,
        id: i32,
        status: TargetStatus,
        latency_ms: f64,
        observed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE monitored_links \
                 SET status = $2, latency_ms = $3, status_changed_at = $4 \
                 WHERE id = $1",
                &[&id, &status, &latency_ms, &observed_at],
            )
            .await?;
        Ok(())
    }

    /// Lê um ajuste inteiro pelo código. Código ausente, erro de leitura ou
    /// linha malformada (valor nulo, tipo errado) caem no default informado;
    /// erro é registrado, nunca propagado, para que o ciclo siga com os
    /// valores de fallback.
    pub async fn get_setting(&self, code: &str, default: i32) -> i32 {
        setting_or_default(self.try_get_setting(code).await, code, default)
    }

    async fn try_get_setting(&self, code: &str) -> Result<Option<i32>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT value FROM settings WHERE code = $1", &[&code])
            .await?;
        Ok(row.map(|r| r.try_get("value")).transpose()?)
    }
}

/// Reduz o resultado da leitura de um ajuste ao valor efetivo. Qualquer erro
/// vira o default com um aviso: a resolução de ajustes nunca é fatal.
fn setting_or_default(result: Result<Option<i32>>, code: &str, default: i32) -> i32 {
    match result {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(e) => {
            warn!(
                "Falha ao ler a configuração {}: {:?}. Usando default {}.",
                code, e, default
            );
            default
        }
    }
}
