use crate::types::Target;
use tokio::sync::broadcast;
use tracing::debug;

pub use tokio::sync::broadcast::error::RecvError;

/// Nome do evento publicado ao fim de cada ciclo de monitoramento.
pub const CYCLE_EVENT: &str = "monitoramento.ciclo";

/// Evento de ciclo: a lista completa de enlaces com o estado atualizado.
#[derive(Debug, Clone)]
pub struct CycleEvent {
    pub event: String,
    pub targets: Vec<Target>,
}

/// Canal de broadcast dos resultados de ciclo para observadores externos
/// (notificadores, superfícies HTTP/WebSocket do processo que nos embute).
///
/// Publicação é fire-and-forget: sem assinantes o evento é descartado e o
/// monitor segue normalmente.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: &str, targets: Vec<Target>) {
        let event = CycleEvent {
            event: event.to_string(),
            targets,
        };
        if self.tx.send(event).is_err() {
            debug!("Broadcast sem assinantes; evento de ciclo descartado.");
        }
    }
}
