use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_postgres::Row;

/// Limiar inclusivo de taxa de sucesso para considerar o enlace Up.
pub const UP_THRESHOLD: f64 = 80.0;
/// Limiar inclusivo de taxa de sucesso para considerar o enlace Down.
pub const DOWN_THRESHOLD: f64 = 20.0;

/// Enum de status do enlace (PostgreSQL)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "link_status", rename_all = "lowercase")]
pub enum TargetStatus {
    Unknown,
    Up,
    Down,
    Intermittent,
}

impl TargetStatus {
    /// Classifica a taxa de sucesso (0–100) em Up/Down/Intermittent.
    ///
    /// Os limiares são inclusivos: >= 80 é Up, <= 20 é Down. A faixa morta
    /// (20, 80) vira Intermittent e é o sinal que o notificador usa para
    /// tratar o enlace como instável em vez de binário up/down.
    pub fn from_success_rate(percentage: f64) -> Self {
        if percentage >= UP_THRESHOLD {
            Self::Up
        } else if percentage <= DOWN_THRESHOLD {
            Self::Down
        } else {
            Self::Intermittent
        }
    }
}

/// Struct de enlace monitorado (circuito WAN identificado por hostname/IP)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: i32,
    pub name: String,
    /// Endereço bruto, possivelmente com esquema (`tcp://...`) e porta.
    pub address: String,
    pub status: TargetStatus,
    /// Latência média observada no último ciclo, em milissegundos (0 sem resposta).
    pub latency_ms: f64,
    /// Momento da última mudança de status. `None` se nunca mudou.
    pub status_changed_at: Option<DateTime<Utc>>,
}

impl From<Row> for Target {
    fn from(row: Row) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            address: row.get("address"),
            status: row.get("status"),
            // enlace recém-cadastrado pode nunca ter sido observado
            latency_ms: row.try_get("latency_ms").unwrap_or(0.0),
            status_changed_at: row.get("status_changed_at"),
        }
    }
}

/// Resultado de uma sequência de echoes ICMP para um enlace em um ciclo.
/// Criado a cada ciclo e descartado após ser consolidado no Target persistido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeMeasurement {
    /// Percentual de echoes respondidos (0–100), sempre sobre o número
    /// configurado de tentativas, mesmo que a sequência tenha sido cortada.
    pub success_percentage: f64,
    /// Média de ida e volta dos echoes respondidos, em ms (0 sem sucesso).
    pub average_latency_ms: f64,
    /// Resumo legível do desfecho (contagem de respostas ou motivo da falha).
    pub summary: String,
    pub status: TargetStatus,
}

impl ProbeMeasurement {
    /// Consolida a contagem de uma sequência de echoes em uma medição.
    ///
    /// `attempts` é o número configurado de tentativas e serve de denominador
    /// mesmo quando a sequência parou antes por prazo. `attempts == 0` resulta
    /// em 0% sem erro de divisão.
    pub fn from_tally(
        attempts: usize,
        successes: u32,
        total_rtt: Duration,
        last_error: Option<String>,
    ) -> Self {
        let success_percentage = if attempts == 0 {
            0.0
        } else {
            successes as f64 * 100.0 / attempts as f64
        };
        let average_latency_ms = if successes > 0 {
            total_rtt.as_secs_f64() * 1000.0 / successes as f64
        } else {
            0.0
        };
        let summary = if successes > 0 {
            format!(
                "{}/{} respostas, latência média {:.1} ms",
                successes, attempts, average_latency_ms
            )
        } else {
            let reason = last_error.unwrap_or_else(|| "sem resposta".to_string());
            format!("0/{} respostas ({})", attempts, reason)
        };
        Self {
            success_percentage,
            average_latency_ms,
            summary,
            status: TargetStatus::from_success_rate(success_percentage),
        }
    }

    /// Medição de falha imediata (endereço inválido, resolução falhou, prazo
    /// estourado antes de qualquer echo). Força 0% de sucesso e Down.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success_percentage: 0.0,
            average_latency_ms: 0.0,
            summary: reason.into(),
            status: TargetStatus::Down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classificacao_limiar_superior_inclusivo() {
        assert_eq!(TargetStatus::from_success_rate(100.0), TargetStatus::Up);
        assert_eq!(TargetStatus::from_success_rate(80.0), TargetStatus::Up);
        assert_eq!(
            TargetStatus::from_success_rate(79.9),
            TargetStatus::Intermittent
        );
    }

    #[test]
    fn classificacao_limiar_inferior_inclusivo() {
        assert_eq!(TargetStatus::from_success_rate(0.0), TargetStatus::Down);
        assert_eq!(TargetStatus::from_success_rate(20.0), TargetStatus::Down);
        assert_eq!(
            TargetStatus::from_success_rate(20.1),
            TargetStatus::Intermittent
        );
    }

    #[test]
    fn classificacao_faixa_morta() {
        assert_eq!(
            TargetStatus::from_success_rate(50.0),
            TargetStatus::Intermittent
        );
        assert_eq!(
            TargetStatus::from_success_rate(60.0),
            TargetStatus::Intermittent
        );
    }

    #[test]
    fn medicao_todas_as_respostas() {
        // 5 echoes de 20 ms cada
        let m = ProbeMeasurement::from_tally(5, 5, Duration::from_millis(100), None);
        assert_eq!(m.success_percentage, 100.0);
        assert_eq!(m.average_latency_ms, 20.0);
        assert_eq!(m.status, TargetStatus::Up);
    }

    #[test]
    fn medicao_uma_resposta_em_cinco() {
        let m = ProbeMeasurement::from_tally(5, 1, Duration::from_millis(30), None);
        assert_eq!(m.success_percentage, 20.0);
        assert_eq!(m.status, TargetStatus::Down);
    }

    #[test]
    fn medicao_tres_respostas_em_cinco() {
        let m = ProbeMeasurement::from_tally(5, 3, Duration::from_millis(60), None);
        assert_eq!(m.success_percentage, 60.0);
        assert_eq!(m.average_latency_ms, 20.0);
        assert_eq!(m.status, TargetStatus::Intermittent);
    }

    #[test]
    fn medicao_zero_tentativas_nao_divide_por_zero() {
        let m = ProbeMeasurement::from_tally(0, 0, Duration::ZERO, None);
        assert_eq!(m.success_percentage, 0.0);
        assert_eq!(m.average_latency_ms, 0.0);
        assert_eq!(m.status, TargetStatus::Down);
    }

    #[test]
    fn medicao_sem_sucesso_zera_latencia_e_registra_motivo() {
        let m = ProbeMeasurement::from_tally(
            5,
            0,
            Duration::ZERO,
            Some("tempo de resposta esgotado".to_string()),
        );
        assert_eq!(m.average_latency_ms, 0.0);
        assert_eq!(m.status, TargetStatus::Down);
        assert!(m.summary.contains("tempo de resposta esgotado"));
    }

    #[test]
    fn falha_imediata_forca_down() {
        let m = ProbeMeasurement::failure("falha na resolução DNS: nonexistent.invalid");
        assert_eq!(m.success_percentage, 0.0);
        assert_eq!(m.status, TargetStatus::Down);
        assert!(m.summary.contains("nonexistent.invalid"));
    }
}
