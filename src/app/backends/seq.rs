use super::Backend;
use crate::domain::model::ServiceKind;
use crate::domain::ports::ReadinessSignal;

pub const DEFAULT_IMAGE: &str = "datalust/seq:2024.3";

pub const API_PORT: u16 = 80;
pub const INGEST_PORT: u16 = 5341;

const PORTS: [u16; 2] = [API_PORT, INGEST_PORT];

/// Seq, the log backend.
#[derive(Debug, Clone)]
pub struct Seq {
    image: String,
}

impl Seq {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

impl Backend for Seq {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Seq
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn ports(&self) -> &'static [u16] {
        &PORTS
    }

    fn readiness(&self) -> ReadinessSignal {
        ReadinessSignal::ListeningPort(API_PORT)
    }

    fn env(&self) -> Vec<(String, String)> {
        vec![("ACCEPT_EULA".to_string(), "Y".to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Network;

    #[test]
    fn test_seq_accepts_eula_and_waits_for_api_port() {
        let seq = Seq::new(DEFAULT_IMAGE);
        let spec = seq.container_spec(&Network::new("id", "net"));

        assert_eq!(spec.env, vec![("ACCEPT_EULA".to_string(), "Y".to_string())]);
        assert_eq!(spec.exposed_ports, vec![80, 5341]);
        assert!(spec.files.is_empty());
        assert_eq!(seq.readiness(), ReadinessSignal::ListeningPort(80));
    }
}
