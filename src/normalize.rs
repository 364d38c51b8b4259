use std::net::Ipv6Addr;
use thiserror::Error;

/// Esquemas de transporte aceitos como prefixo de endereço cadastrado.
const SCHEMES: [&str; 5] = ["tcp://", "udp://", "http://", "https://", "snmp://"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("endereço vazio")]
    Empty,
}

/// Normaliza um endereço bruto de enlace em host/IP puro, pronto para
/// resolução DNS ou endereçamento ICMP direto.
///
/// Remove no máximo um prefixo de esquema (`tcp://`, `udp://`, `http://`,
/// `https://`, `snmp://`, sem distinção de caixa) e depois um sufixo `:porta`
/// totalmente numérico. Literais IPv6 entre colchetes mantêm os colchetes e
/// perdem apenas a porta após o `]`; um literal IPv6 sem colchetes nunca é
/// mutilado. Endereço vazio é erro, consumido pela sonda como falha imediata.
pub fn normalize_address(raw: &str) -> Result<String, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let mut rest = trimmed;
    for scheme in SCHEMES {
        if rest.len() > scheme.len() && rest[..scheme.len()].eq_ignore_ascii_case(scheme) {
            rest = &rest[scheme.len()..];
            break;
        }
    }

    if rest.starts_with('[') {
        // IPv6 com colchetes: só pode haver porta depois do ']'
        if let Some(close) = rest.find(']') {
            let after = &rest[close + 1..];
            if let Some(port) = after.strip_prefix(':') {
                if is_port_suffix(port) {
                    return Ok(rest[..=close].to_string());
                }
            }
        }
        return Ok(rest.to_string());
    }

    // IPv6 sem colchetes tem vários ':' e nenhum deles delimita porta
    if rest.parse::<Ipv6Addr>().is_ok() {
        return Ok(rest.to_string());
    }

    if let Some((host, port)) = rest.rsplit_once(':') {
        if !host.contains(':') && is_port_suffix(port) {
            return Ok(host.to_string());
        }
    }

    Ok(rest.to_string())
}

fn is_port_suffix(suffix: &str) -> bool {
    !suffix.is_empty()
        && suffix.bytes().all(|b| b.is_ascii_digit())
        && suffix.parse::<u32>().is_ok()
}
