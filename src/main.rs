mod broadcast;
mod config;
mod cycle;
mod normalize;
mod ping;
mod scheduler;
mod storage;
mod types;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializa o sistema de logging (tracing)
    tracing_subscriber::fmt::init();

    // Carrega a configuração de bootstrap
    let config = config::Config::load()?;

    // Conecta ao banco de dados (os enlaces e ajustes são relidos a cada ciclo)
    let storage: Arc<storage::Storage> =
        Arc::new(storage::Storage::connect(&config.database_url).await?);
    info!("Banco de dados conectado.");

    // Sockets ICMP compartilhados e resolvedor DNS
    let prober: Arc<ping::EchoProber> = Arc::new(ping::EchoProber::new()?);

    // Canal de broadcast para os observadores do processo que nos embute
    let bus = broadcast::EventBus::new(config.broadcast_capacity);

    // Observador local: registra um resumo de cada ciclo publicado
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    "Evento {}: {} enlaces publicados.",
                    event.event,
                    event.targets.len()
                ),
                Err(broadcast::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Observador atrasado; {} eventos perdidos.", skipped);
                }
                Err(broadcast::RecvError::Closed) => break,
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler::run_scheduler(
        Arc::clone(&storage),
        bus.clone(),
        Arc::clone(&prober),
        shutdown_rx,
    ));
    info!("Monitoramento iniciado.");

    tokio::signal::ctrl_c().await?;
    info!("Sinal de encerramento recebido; aguardando o ciclo em andamento.");
    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        eprintln!("Scheduler error: {:?}", e);
    }

    Ok(())
}
