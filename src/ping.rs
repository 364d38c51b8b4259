//! ping.rs — Sonda de echo ICMP de um enlace dentro de um ciclo.
//!
//! Cliente surge-ping compartilhado (um para IPv4, um para IPv6), seguro para
//! uso concorrente entre as tasks do ciclo. Cada enlace recebe um `Pinger`
//! próprio com identificador único para demultiplexar as respostas.

use crate::config::CycleSettings;
use crate::normalize::normalize_address;
use crate::types::ProbeMeasurement;
use anyhow::{Context, Result};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::time::{Instant, sleep, timeout_at};
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};

const DEADLINE_MSG: &str = "prazo de sondagem excedido";

/// Contador global de identificadores ICMP, para distinguir sondas
/// concorrentes mesmo quando apontam para o mesmo destino.
static PROBE_IDENT: AtomicU16 = AtomicU16::new(0);

fn next_ident() -> u16 {
    PROBE_IDENT.fetch_add(1, Ordering::Relaxed)
}

/// Remove colchetes de literal IPv6 vindo do normalizador (`[2001:db8::1]`).
fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Contagem acumulada de uma sequência de echoes.
#[derive(Debug, Default)]
pub(crate) struct EchoTally {
    pub successes: u32,
    pub total_rtt: Duration,
    pub last_error: Option<String>,
}

/// Executa a sequência de echoes de um enlace: estritamente sequencial, com a
/// pausa configurada entre tentativas consecutivas (nunca após a última).
///
/// Cada tentativa é independente: falha de uma não aborta as demais. Quando o
/// `deadline` vence — durante uma tentativa ou durante a pausa — a sequência
/// para e a contagem parcial acumulada até ali é retornada. O timeout por
/// echo fica dentro de `echo_fn` (no `Pinger`, em produção).
pub(crate) async fn echo_sequence<F>(
    attempts: usize,
    echo_delay: Duration,
    deadline: Instant,
    mut echo_fn: F,
) -> EchoTally
where
    F: AsyncFnMut(u16) -> std::result::Result<Duration, String>,
{
    let mut tally = EchoTally::default();
    for seq in 0..attempts {
        if seq > 0 && !echo_delay.is_zero() {
            // pausa entre echoes consecutivos, também limitada pelo prazo
            if timeout_at(deadline, sleep(echo_delay)).await.is_err() {
                tally.last_error = Some(DEADLINE_MSG.to_string());
                break;
            }
        }
        match timeout_at(deadline, echo_fn(seq as u16)).await {
            Ok(Ok(rtt)) => {
                tally.successes += 1;
                tally.total_rtt += rtt;
            }
            Ok(Err(e)) => {
                tally.last_error = Some(e);
            }
            Err(_) => {
                tally.last_error = Some(DEADLINE_MSG.to_string());
                break;
            }
        }
    }
    tally
}

/// Sonda de reachability por echo ICMP.
pub struct EchoProber {
    client_v4: Client,
    client_v6: Client,
    resolver: TokioAsyncResolver,
}

impl EchoProber {
    /// Cria os sockets ICMP compartilhados e o resolvedor DNS. Requer
    /// CAP_NET_RAW ou ping_group_range liberado para sockets sem privilégio.
    pub fn new() -> Result<Self> {
        let client_v4 =
            Client::new(&Config::default()).context("falha ao criar o socket ICMPv4")?;
        let client_v6 = Client::new(&Config::builder().kind(ICMP::V6).build())
            .context("falha ao criar o socket ICMPv6")?;
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Ok(Self {
            client_v4,
            client_v6,
            resolver,
        })
    }

    /// Executa a sequência de echoes de um enlace e reduz a uma medição.
    ///
    /// Se o `deadline` vencer no meio da sequência, a contagem parcial é
    /// consolidada (denominador continua sendo o número configurado de
    /// tentativas). Nunca retorna erro: endereço vazio ou irresolvível vira
    /// uma medição de 0% com o motivo no resumo, sem nenhuma chamada de rede.
    pub async fn probe(
        &self,
        address: &str,
        settings: &CycleSettings,
        deadline: Instant,
    ) -> ProbeMeasurement {
        let host = match normalize_address(address) {
            Ok(host) => host,
            Err(e) => return ProbeMeasurement::failure(format!("endereço inválido: {e}")),
        };

        let ip = match timeout_at(deadline, self.resolve(&host)).await {
            Ok(Ok(ip)) => ip,
            Ok(Err(reason)) => return ProbeMeasurement::failure(reason),
            Err(_) => {
                return ProbeMeasurement::failure(format!(
                    "{DEADLINE_MSG} durante a resolução de {host}"
                ));
            }
        };

        let mut pinger = match ip {
            IpAddr::V4(_) => self.client_v4.pinger(ip, PingIdentifier(next_ident())).await,
            IpAddr::V6(_) => self.client_v6.pinger(ip, PingIdentifier(next_ident())).await,
        };
        pinger.timeout(settings.echo_timeout);

        let payload = [0u8; 56];
        let tally = echo_sequence(
            settings.attempts,
            settings.echo_delay,
            deadline,
            async move |seq| match pinger.ping(PingSequence(seq), &payload).await {
                Ok((_reply, rtt)) => Ok(rtt),
                Err(e) => Err(e.to_string()),
            },
        )
        .await;

        ProbeMeasurement::from_tally(
            settings.attempts,
            tally.successes,
            tally.total_rtt,
            tally.last_error,
        )
    }

    /// Resolve o host para um IP. Literais IPv4/IPv6 (com ou sem colchetes)
    /// não passam pelo DNS.
    async fn resolve(&self, host: &str) -> std::result::Result<IpAddr, String> {
        let bare = strip_brackets(host);
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return Ok(ip);
        }
        match self.resolver.lookup_ip(bare).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .ok_or_else(|| format!("nenhum IP encontrado para {bare}")),
            Err(e) => Err(format!("falha na resolução DNS de {bare}: {e}")),
        }
    }
}
