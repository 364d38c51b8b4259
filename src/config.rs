use crate::storage::Storage;
use config as config_crate;
use serde::Deserialize;
use std::time::Duration;

/// Configuração de bootstrap do processo.
///
/// Apenas o necessário para subir: os ajustes operacionais de monitoramento
/// vivem na tabela de configurações e são relidos a cada ciclo (ver
/// [`CycleSettings`]).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// URL de conexão com o banco PostgreSQL.
    pub database_url: String,
    /// Capacidade do canal de broadcast de resultados de ciclo.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_broadcast_capacity() -> usize {
    64
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config_crate::Config::builder()
            .add_source(config_crate::File::with_name("config"))
            .add_source(config_crate::Environment::with_prefix("MONITOR"))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}

/// Códigos reconhecidos na tabela de configurações, com seus defaults.
pub const PING_TIMEOUT: (&str, i32) = ("PING_TIMEOUT", 3000);
pub const PING_ATTEMPTS: (&str, i32) = ("PING_ATTEMPTS", 10);
pub const PING_DELAY: (&str, i32) = ("PING_DELAY", 25);
pub const PING_INTERVAL: (&str, i32) = ("PING_INTERVAL", 300_000);
pub const TOTAL_MONITORING_TIMEOUT: (&str, i32) = ("TOTAL_MONITORING_TIMEOUT", 300_000);

/// Ajustes resolvidos para um ciclo de monitoramento.
///
/// Snapshot imutável: resolvido de novo a cada ciclo, então o operador pode
/// mudar os valores na tabela de configurações sem reiniciar o processo.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Timeout de cada echo ICMP individual.
    pub echo_timeout: Duration,
    /// Número de echoes por enlace em um ciclo.
    pub attempts: usize,
    /// Pausa entre echoes consecutivos (nunca após o último).
    pub echo_delay: Duration,
    /// Prazo total da frota: tempo máximo de parede para sondar todos os
    /// enlaces de um ciclo.
    pub fleet_timeout: Duration,
    /// Prazo de sondagem de um enlace individual, derivado das tentativas e
    /// limitado ao prazo da frota.
    pub target_timeout: Duration,
    /// Intervalo de espera entre o fim de um ciclo e o início do próximo.
    pub cycle_interval: Duration,
}

impl CycleSettings {
    /// Resolve os ajustes do ciclo na tabela de configurações. Falha de
    /// leitura de qualquer código cai no default correspondente (o Storage
    /// registra o aviso), então a resolução em si nunca falha.
    pub async fn resolve(storage: &Storage) -> Self {
        let echo_timeout_ms = storage.get_setting(PING_TIMEOUT.0, PING_TIMEOUT.1).await;
        let attempts = storage.get_setting(PING_ATTEMPTS.0, PING_ATTEMPTS.1).await;
        let echo_delay_ms = storage.get_setting(PING_DELAY.0, PING_DELAY.1).await;
        let cycle_interval_ms = storage.get_setting(PING_INTERVAL.0, PING_INTERVAL.1).await;
        let fleet_timeout_ms = storage
            .get_setting(TOTAL_MONITORING_TIMEOUT.0, TOTAL_MONITORING_TIMEOUT.1)
            .await;
        Self::from_raw(
            echo_timeout_ms,
            attempts,
            echo_delay_ms,
            fleet_timeout_ms,
            cycle_interval_ms,
        )
    }

    /// Monta o snapshot a partir dos valores crus da tabela.
    ///
    /// Valores negativos são tratados como zero. O prazo por enlace não tem
    /// código próprio: é derivado de `tentativas × (timeout + pausa)` e
    /// recortado ao prazo da frota, de modo que a composição
    /// echo < enlace <= frota vale mesmo com ajustes inconsistentes.
    pub fn from_raw(
        echo_timeout_ms: i32,
        attempts: i32,
        echo_delay_ms: i32,
        fleet_timeout_ms: i32,
        cycle_interval_ms: i32,
    ) -> Self {
        let echo_timeout = Duration::from_millis(echo_timeout_ms.max(0) as u64);
        let attempts = attempts.max(0) as usize;
        let echo_delay = Duration::from_millis(echo_delay_ms.max(0) as u64);
        let fleet_timeout = Duration::from_millis(fleet_timeout_ms.max(0) as u64);
        let cycle_interval = Duration::from_millis(cycle_interval_ms.max(0) as u64);

        let derived = (echo_timeout + echo_delay) * attempts as u32;
        let target_timeout = derived.min(fleet_timeout);

        Self {
            echo_timeout,
            attempts,
            echo_delay,
            fleet_timeout,
            target_timeout,
            cycle_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prazo_por_enlace_derivado_das_tentativas() {
        let s = CycleSettings::from_raw(2000, 10, 25, 300_000, 300_000);
        assert_eq!(s.echo_timeout, Duration::from_millis(2000));
        assert_eq!(s.attempts, 10);
        assert_eq!(s.target_timeout, Duration::from_millis(20_250));
        assert_eq!(s.fleet_timeout, Duration::from_millis(300_000));
    }

    #[test]
    fn prazo_por_enlace_recortado_ao_prazo_da_frota() {
        let s = CycleSettings::from_raw(5000, 20, 0, 30_000, 300_000);
        assert_eq!(s.target_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn valores_negativos_viram_zero() {
        let s = CycleSettings::from_raw(-1, -5, -10, -100, -200);
        assert_eq!(s.echo_timeout, Duration::ZERO);
        assert_eq!(s.attempts, 0);
        assert_eq!(s.echo_delay, Duration::ZERO);
        assert_eq!(s.fleet_timeout, Duration::ZERO);
        assert_eq!(s.cycle_interval, Duration::ZERO);
    }
}
