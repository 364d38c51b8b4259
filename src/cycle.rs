//! cycle.rs — Coordenação de um ciclo completo de monitoramento.
//!
//! Um ciclo: snapshot dos enlaces, fan-out de uma task de sondagem por
//! enlace sob um prazo único de frota, classificação, consolidação com
//! debounce da transição de status, persistência e broadcast.

use crate::broadcast::{CYCLE_EVENT, EventBus};
use crate::config::CycleSettings;
use crate::ping::EchoProber;
use crate::storage::Storage;
use crate::types::{ProbeMeasurement, Target};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, warn};

/// Executa um ciclo completo de monitoramento.
///
/// Falha de sondagem de um enlace não afeta os demais; falha de persistência
/// é registrada e engolida por enlace. Só a leitura do snapshot de enlaces
/// propaga erro, porque sem ela não há ciclo.
pub async fn run_cycle(
    storage: &Storage,
    bus: &EventBus,
    prober: &Arc<EchoProber>,
    settings: &CycleSettings,
) -> Result<()> {
    let targets = storage
        .list_targets()
        .await
        .context("falha ao carregar o snapshot de enlaces")?;
    if targets.is_empty() {
        warn!("Nenhum enlace cadastrado; ciclo publica conjunto vazio.");
    }

    let start = Instant::now();
    let deadline = start + settings.fleet_timeout;
    let per_target_deadline = deadline.min(start + settings.target_timeout);

    let prober = Arc::clone(prober);
    let cycle_settings = settings.clone();
    let measurements = probe_fleet(&targets, deadline, move |target: Target| {
        let prober = Arc::clone(&prober);
        let settings = cycle_settings.clone();
        async move {
            prober
                .probe(&target.address, &settings, per_target_deadline)
                .await
        }
    })
    .await;

    let now = Utc::now();
    let mut updated = Vec::with_capacity(targets.len());
    for (target, measurement) in targets.into_iter().zip(measurements) {
        let target = apply_observation(target, &measurement, now);
        debug!(
            "Enlace {} ({}): {} -> {:?}",
            target.name, target.address, measurement.summary, target.status
        );
        if let Err(e) = storage
            .update_target_observation(
                target.id,
                target.status,
                target.latency_ms,
                target.status_changed_at,
            )
            .await
        {
            error!(
                "Falha ao persistir a observação do enlace {}: {:?}",
                target.name, e
            );
        }
        updated.push(target);
    }

    bus.publish(CYCLE_EVENT, updated);
    Ok(())
}

/// Sonda todos os enlaces concorrentemente, uma task por enlace, sob um
/// prazo único de frota.
///
/// Tasks ainda em execução quando o prazo vence são abortadas e entram no
/// resultado como 0%/Down; a coordenação retorna dentro do prazo mais uma
/// folga pequena, nunca espera retardatários. Pânico em uma sonda vira
/// medição de falha daquele enlace, sem derrubar o ciclo.
pub(crate) async fn probe_fleet<F, Fut>(
    targets: &[Target],
    deadline: Instant,
    probe_fn: F,
) -> Vec<ProbeMeasurement>
where
    F: Fn(Target) -> Fut,
    Fut: Future<Output = ProbeMeasurement> + Send + 'static,
{
    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        handles.push(tokio::spawn(probe_fn(target.clone())));
    }

    let mut measurements = Vec::with_capacity(handles.len());
    for (target, mut handle) in targets.iter().zip(handles) {
        let measurement = match timeout_at(deadline, &mut handle).await {
            Ok(Ok(measurement)) => measurement,
            Ok(Err(e)) => {
                error!(
                    "Sonda do enlace {} terminou anormalmente: {:?}",
                    target.name, e
                );
                ProbeMeasurement::failure("falha interna na sonda")
            }
            Err(_) => {
                handle.abort();
                ProbeMeasurement::failure("prazo total do ciclo excedido")
            }
        };
        measurements.push(measurement);
    }
    measurements
}

/// Consolida a medição de um ciclo no estado do enlace.
///
/// Debounce: o carimbo de última mudança só avança quando o status observado
/// difere do anterior. A latência é atualizada em todo ciclo. Um relógio fora
/// da faixa representável (ano 1 a 9999, faixa de datetime do SQL) não avança
/// o carimbo; a mudança de status em si é aplicada mesmo assim.
pub(crate) fn apply_observation(
    mut target: Target,
    measurement: &ProbeMeasurement,
    now: DateTime<Utc>,
) -> Target {
    if target.status != measurement.status {
        if representable_timestamp(now) {
            target.status_changed_at = Some(now);
        } else {
            warn!(
                "Relógio fora da faixa representável ({}); mantendo o carimbo anterior do enlace {}.",
                now, target.name
            );
        }
        target.status = measurement.status;
    }
    target.latency_ms = measurement.average_latency_ms;
    target
}

fn representable_timestamp(ts: DateTime<Utc>) -> bool {
    (1..=9999).contains(&ts.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetStatus;
    use chrono::TimeZone;
    use std::time::Duration;

    fn target(id: i32, status: TargetStatus) -> Target {
        Target {
            id,
            name: format!("enlace-{id}"),
            address: "192.0.2.1".to_string(),
            status,
            latency_ms: 0.0,
            status_changed_at: None,
        }
    }

    fn measurement(status: TargetStatus, latency_ms: f64) -> ProbeMeasurement {
        ProbeMeasurement {
            success_percentage: 100.0,
            average_latency_ms: latency_ms,
            summary: "teste".to_string(),
            status,
        }
    }

    #[test]
    fn debounce_mantem_carimbo_com_status_igual() {
        let t0 = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 5, 0).unwrap();
        let mut before = target(1, TargetStatus::Up);
        before.status_changed_at = Some(t0);
        before.latency_ms = 15.0;

        let after = apply_observation(before, &measurement(TargetStatus::Up, 22.0), now);
        assert_eq!(after.status, TargetStatus::Up);
        assert_eq!(after.status_changed_at, Some(t0));
        // latência é atualizada mesmo sem mudança de status
        assert_eq!(after.latency_ms, 22.0);
    }

    #[test]
    fn mudanca_de_status_avanca_o_carimbo() {
        let t0 = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 5, 0).unwrap();
        let mut before = target(1, TargetStatus::Up);
        before.status_changed_at = Some(t0);

        let after = apply_observation(before, &measurement(TargetStatus::Down, 0.0), now);
        assert_eq!(after.status, TargetStatus::Down);
        assert_eq!(after.status_changed_at, Some(now));
    }

    #[test]
    fn relogio_fora_da_faixa_nao_avanca_o_carimbo() {
        let t0 = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let bad_now = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();
        let mut before = target(1, TargetStatus::Up);
        before.status_changed_at = Some(t0);

        let after = apply_observation(before, &measurement(TargetStatus::Down, 0.0), bad_now);
        // o status muda, o carimbo não
        assert_eq!(after.status, TargetStatus::Down);
        assert_eq!(after.status_changed_at, Some(t0));
    }

    #[tokio::test(start_paused = true)]
    async fn frota_respeita_o_prazo_total() {
        let targets = vec![target(1, TargetStatus::Up), target(2, TargetStatus::Up)];
        let start = Instant::now();
        let deadline = start + Duration::from_secs(5);

        // sondas que nunca respondem
        let measurements = probe_fleet(&targets, deadline, |_t: Target| async {
            std::future::pending::<ProbeMeasurement>().await
        })
        .await;

        assert_eq!(measurements.len(), 2);
        for m in &measurements {
            assert_eq!(m.status, TargetStatus::Down);
            assert_eq!(m.success_percentage, 0.0);
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn retardatario_nao_descarta_resultado_dos_demais() {
        let targets = vec![target(1, TargetStatus::Up), target(2, TargetStatus::Up)];
        let deadline = Instant::now() + Duration::from_secs(5);

        let measurements = probe_fleet(&targets, deadline, |t: Target| async move {
            if t.id == 1 {
                ProbeMeasurement::from_tally(5, 5, Duration::from_millis(100), None)
            } else {
                std::future::pending::<ProbeMeasurement>().await
            }
        })
        .await;

        assert_eq!(measurements[0].status, TargetStatus::Up);
        assert_eq!(measurements[0].average_latency_ms, 20.0);
        assert_eq!(measurements[1].status, TargetStatus::Down);
    }

    #[tokio::test]
    async fn panico_em_uma_sonda_nao_derruba_o_ciclo() {
        let targets = vec![target(1, TargetStatus::Up), target(2, TargetStatus::Up)];
        let deadline = Instant::now() + Duration::from_secs(5);

        let measurements = probe_fleet(&targets, deadline, |t: Target| async move {
            if t.id == 1 {
                panic!("sonda quebrada");
            }
            ProbeMeasurement::from_tally(1, 1, Duration::from_millis(10), None)
        })
        .await;

        assert_eq!(measurements[0].status, TargetStatus::Down);
        assert!(measurements[0].summary.contains("falha interna"));
        assert_eq!(measurements[1].status, TargetStatus::Up);
    }
}
