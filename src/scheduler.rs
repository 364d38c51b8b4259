// src/scheduler.rs

use crate::broadcast::EventBus;
use crate::config::{CycleSettings, PING_INTERVAL};
use crate::cycle;
use crate::ping::EchoProber;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{error, info};

/// Estados do scheduler: ocioso entre ciclos ou com um ciclo em andamento.
enum SchedulerState {
    Idle,
    Running,
}

/// Loop principal de monitoramento: executa um ciclo, dorme o intervalo
/// configurado e repete, até o sinal de encerramento.
///
/// Os ajustes são resolvidos de novo a cada ciclo, então o operador pode
/// mudar intervalo e timeouts sem reiniciar o processo. Nunca há dois ciclos
/// em voo: o intervalo só começa a contar depois que o ciclo anterior
/// retorna, mesmo que ele tenha estourado o próprio prazo. Falha de ciclo é
/// registrada e o loop segue para a próxima iteração.
pub async fn run_scheduler(
    storage: Arc<Storage>,
    bus: EventBus,
    prober: Arc<EchoProber>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut state = SchedulerState::Running;
    let mut cycle_number: u64 = 0;
    let mut interval = Duration::from_millis(PING_INTERVAL.1 as u64);

    loop {
        match state {
            SchedulerState::Running => {
                cycle_number += 1;
                let settings = CycleSettings::resolve(&storage).await;
                info!(
                    "[CICLO {}] Iniciando ciclo ({} tentativas por enlace, prazo da frota {:?}).",
                    cycle_number, settings.attempts, settings.fleet_timeout
                );
                let cycle_start = Instant::now();
                if let Err(e) = cycle::run_cycle(&storage, &bus, &prober, &settings).await {
                    error!("[CICLO {}] Ciclo falhou: {:?}", cycle_number, e);
                }
                info!(
                    "[CICLO {}] Fim do ciclo. Duração: {:?}",
                    cycle_number,
                    cycle_start.elapsed()
                );
                interval = settings.cycle_interval;
                state = SchedulerState::Idle;
            }
            SchedulerState::Idle => {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Encerramento solicitado; scheduler finalizado.");
                        break;
                    }
                    _ = sleep(interval) => {
                        state = SchedulerState::Running;
                    }
                }
            }
        }
    }
}
